//! Source registry: which beads directory owns which identifier prefix.
//!
//! The registry is assembled once at startup from two inputs, in priority
//! order:
//!
//! ```text
//! "hq" seed  →  routes.jsonl (manifest)  →  directory scan (fallback)
//! ```
//!
//! Every registration is first-wins: once a key is claimed, later sources of
//! routing information cannot move it. The resulting value is immutable and
//! shared across request handlers behind an `Arc`.
//!
//! # Aliases
//!
//! A manifest route `{"prefix":"gt-core-","path":"gastown"}` registers
//! `gt-core`, the first-segment alias `gt`, and the directory alias
//! `gastown`, all pointing at `<town>/gastown/.beads`. A scanned rig
//! directory registers under its directory name.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::routes::{self, RouteEntry, BEADS_DIR};

/// Prefix of the town's own beads, always present in the registry.
pub const HQ_PREFIX: &str = "hq";

/// Marker file whose presence makes a rig discoverable by directory scan.
pub const MARKER_FILE: &str = "beads.db";

/// Mapping of identifier prefix → beads directory for one town.
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    town_root: PathBuf,
    prefixes: BTreeMap<String, PathBuf>,
}

impl SourceRegistry {
    /// Build the registry for `town_root` from its manifest and rig directories.
    pub fn build(town_root: &Path) -> Self {
        let routes = routes::read_routes(town_root);
        let mut registry = Self::from_routes(town_root, &routes);
        let scanned = registry.scan_rigs();

        tracing::info!(
            town = %town_root.display(),
            routes = routes.len(),
            scanned,
            prefixes = registry.prefixes.len(),
            sources = registry.locations().len(),
            "source registry built"
        );
        registry
    }

    /// Build a registry from already-parsed routes, without scanning.
    pub fn from_routes(town_root: &Path, routes: &[RouteEntry]) -> Self {
        let mut registry = Self {
            town_root: town_root.to_path_buf(),
            prefixes: BTreeMap::new(),
        };
        registry.register(HQ_PREFIX, town_root.join(BEADS_DIR));

        for route in routes {
            let location = route.location(town_root);
            if !registry.register(&route.prefix, location.clone()) {
                tracing::debug!(prefix = %route.prefix, "duplicate route ignored");
            }
            if let Some(segment) = route.first_segment() {
                registry.register(segment, location.clone());
            }
            if !route.is_town() {
                registry.register(&route.path, location);
            }
        }
        registry
    }

    /// Claim `key` for `location` unless it is already taken.
    ///
    /// Returns `true` if the key was newly registered.
    fn register(&mut self, key: &str, location: PathBuf) -> bool {
        if self.prefixes.contains_key(key) {
            return false;
        }
        self.prefixes.insert(key.to_string(), location);
        true
    }

    /// Register every immediate subdirectory of the town root that carries a
    /// `.beads/beads.db` marker. Returns how many new keys were added.
    fn scan_rigs(&mut self) -> usize {
        let entries = match std::fs::read_dir(&self.town_root) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(
                    town = %self.town_root.display(),
                    error = %e,
                    "cannot scan town root for rigs"
                );
                return 0;
            }
        };

        let mut added = 0;
        for entry in entries.flatten() {
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }
            let beads_dir = entry.path().join(BEADS_DIR);
            if !beads_dir.join(MARKER_FILE).is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if self.register(&name, beads_dir) {
                added += 1;
            }
        }
        added
    }

    /// The town root this registry was built for.
    pub fn town_root(&self) -> &Path {
        &self.town_root
    }

    /// Location of the town's own beads.
    pub fn hq_location(&self) -> &Path {
        // Seeded in `from_routes` and never removed.
        self.prefixes
            .get(HQ_PREFIX)
            .map(PathBuf::as_path)
            .unwrap_or(self.town_root.as_path())
    }

    /// Location registered for an exact prefix key.
    pub fn get(&self, prefix: &str) -> Option<&Path> {
        self.prefixes.get(prefix).map(PathBuf::as_path)
    }

    /// Resolve the beads directory that owns `bead_id`.
    ///
    /// The prefix is everything before the first dash. Identifiers without a
    /// dash, or with an unknown prefix, fall back to the `hq` location.
    pub fn location_for(&self, bead_id: &str) -> &Path {
        match bead_id.find('-') {
            Some(dash) if dash > 0 => self
                .get(&bead_id[..dash])
                .unwrap_or_else(|| self.hq_location()),
            _ => self.hq_location(),
        }
    }

    /// Distinct beads directories, each listed once regardless of how many
    /// prefixes alias it.
    pub fn locations(&self) -> BTreeSet<PathBuf> {
        self.prefixes.values().cloned().collect()
    }

    /// All `(prefix, location)` pairs in prefix order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.prefixes
            .iter()
            .map(|(prefix, location)| (prefix.as_str(), location.as_path()))
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}
