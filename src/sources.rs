//! Rig listing for the `beadboard sources` command.
//!
//! Groups the registry's prefixes by the beads directory they resolve to and
//! reports whether each directory is actually present on disk.
//!
//! | Column | Meaning |
//! |--------|---------|
//! | `NAME` | Rig name from `routes.jsonl`, else the rig directory name |
//! | `PREFIXES` | Every registry key resolving to this location |
//! | `HEALTHY` | The beads directory exists |

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::registry::SourceRegistry;
use crate::routes::{rig_prefix_names, BEADS_DIR, TOWN_DISPLAY_NAME};

/// One distinct bead source and the keys that route to it.
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub name: String,
    pub location: PathBuf,
    pub prefixes: Vec<String>,
    pub healthy: bool,
}

/// Collect one [`SourceStatus`] per distinct location, in location order.
pub fn get_sources(registry: &SourceRegistry) -> Vec<SourceStatus> {
    let names = rig_prefix_names(registry.town_root());

    let mut grouped: BTreeMap<&Path, Vec<String>> = BTreeMap::new();
    for (prefix, location) in registry.iter() {
        grouped.entry(location).or_default().push(prefix.to_string());
    }

    grouped
        .into_iter()
        .map(|(location, prefixes)| SourceStatus {
            name: display_name(registry, location, &prefixes, &names),
            location: location.to_path_buf(),
            healthy: location.is_dir(),
            prefixes,
        })
        .collect()
}

/// Manifest name for any of the prefixes, else the rig directory, else the
/// first prefix.
fn display_name(
    registry: &SourceRegistry,
    location: &Path,
    prefixes: &[String],
    names: &BTreeMap<String, String>,
) -> String {
    if let Some(name) = prefixes.iter().find_map(|p| names.get(p)) {
        return name.clone();
    }
    if location == registry.hq_location() {
        return TOWN_DISPLAY_NAME.to_string();
    }
    location
        .parent()
        .filter(|_| location.ends_with(BEADS_DIR))
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().to_string())
        .or_else(|| prefixes.first().cloned())
        .unwrap_or_default()
}

/// CLI entry point: print a table of sources to stdout.
pub fn list_sources(registry: &SourceRegistry) -> Result<()> {
    let sources = get_sources(registry);

    println!("{:<16} {:<24} {:<8} LOCATION", "NAME", "PREFIXES", "HEALTHY");
    for s in &sources {
        println!(
            "{:<16} {:<24} {:<8} {}",
            s.name,
            s.prefixes.join(","),
            s.healthy,
            s.location.display()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MARKER_FILE;
    use crate::routes::ROUTES_FILE;
    use std::fs;

    #[test]
    fn groups_prefixes_by_location() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join(".beads")).unwrap();
        fs::write(
            root.join(".beads").join(ROUTES_FILE),
            "{\"prefix\":\"gt-core-\",\"path\":\"gastown\"}\n",
        )
        .unwrap();
        let scanned = root.join("myrig").join(".beads");
        fs::create_dir_all(&scanned).unwrap();
        fs::write(scanned.join(MARKER_FILE), b"").unwrap();

        let registry = SourceRegistry::build(root);
        let sources = get_sources(&registry);
        assert_eq!(sources.len(), 3);

        let hq = sources.iter().find(|s| s.prefixes == ["hq"]).unwrap();
        assert_eq!(hq.name, "town");
        assert!(hq.healthy);

        let gastown = sources
            .iter()
            .find(|s| s.location == root.join("gastown").join(".beads"))
            .unwrap();
        assert_eq!(gastown.prefixes, vec!["gastown", "gt", "gt-core"]);
        assert_eq!(gastown.name, "gastown");
        assert!(!gastown.healthy);

        let myrig = sources.iter().find(|s| s.location == scanned).unwrap();
        assert_eq!(myrig.name, "myrig");
        assert!(myrig.healthy);
    }
}
