//! Route manifest (`routes.jsonl`) parsing.
//!
//! The town keeps an append-only manifest at `<town>/.beads/routes.jsonl`
//! declaring which identifier prefix belongs to which rig:
//!
//! ```text
//! {"prefix":"hq-","path":"."}
//! {"prefix":"ri-","path":"rigradar"}
//! {"prefix":"gt-core-","path":"gastown"}
//! ```
//!
//! The manifest is best-effort. Blank or malformed lines are skipped rather
//! than failing the whole read, and a missing file reads as empty.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Directory holding a source's bead data, relative to the rig (or town) root.
pub const BEADS_DIR: &str = ".beads";

/// Manifest file name inside the town's `.beads` directory.
pub const ROUTES_FILE: &str = "routes.jsonl";

/// `path` value that refers to the town root itself.
pub const TOWN_PATH: &str = ".";

/// Display name used for routes whose path is the town root.
pub const TOWN_DISPLAY_NAME: &str = "town";

/// One declared route from the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    /// Identifier prefix with the trailing separator removed (`"ri"`, `"gt-core"`).
    pub prefix: String,
    /// Rig path relative to the town root, or `"."` for the town itself.
    pub path: String,
}

#[derive(Deserialize)]
struct RawRoute {
    #[serde(default)]
    prefix: String,
    #[serde(default)]
    path: String,
}

impl RouteEntry {
    /// Returns `true` when this route points at the town root.
    pub fn is_town(&self) -> bool {
        self.path == TOWN_PATH
    }

    /// First dash-separated segment of a multi-segment prefix.
    ///
    /// Returns `None` for single-segment prefixes.
    pub fn first_segment(&self) -> Option<&str> {
        match self.prefix.find('-') {
            Some(idx) if idx > 0 => Some(&self.prefix[..idx]),
            _ => None,
        }
    }

    /// Absolute beads directory this route resolves to.
    pub fn location(&self, town_root: &Path) -> PathBuf {
        if self.is_town() {
            town_root.join(BEADS_DIR)
        } else {
            town_root.join(&self.path).join(BEADS_DIR)
        }
    }
}

/// Path of the manifest for a given town root.
pub fn manifest_path(town_root: &Path) -> PathBuf {
    town_root.join(BEADS_DIR).join(ROUTES_FILE)
}

/// Parse one manifest line.
///
/// Returns `None` for blank lines, invalid JSON, and entries whose prefix is
/// empty once the trailing `-` is stripped.
pub fn parse_route_line(line: &str) -> Option<RouteEntry> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let raw: RawRoute = serde_json::from_str(line).ok()?;
    let prefix = raw.prefix.strip_suffix('-').unwrap_or(&raw.prefix);
    if prefix.is_empty() {
        return None;
    }
    Some(RouteEntry {
        prefix: prefix.to_string(),
        path: raw.path,
    })
}

/// Parse manifest content into routes, preserving line order.
pub fn parse_routes(content: &str) -> Vec<RouteEntry> {
    content
        .lines()
        .filter_map(|line| {
            let entry = parse_route_line(line);
            if entry.is_none() && !line.trim().is_empty() {
                tracing::debug!(line = line.trim(), "skipping malformed route line");
            }
            entry
        })
        .collect()
}

/// Read the town's manifest. A missing or unreadable file yields no routes.
pub fn read_routes(town_root: &Path) -> Vec<RouteEntry> {
    let path = manifest_path(town_root);
    match std::fs::read_to_string(&path) {
        Ok(content) => parse_routes(&content),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "no route manifest");
            Vec::new()
        }
    }
}

/// Build the prefix → rig display name map used to label beads in the UI.
///
/// Keys are the first segment of each prefix (so `gt-core` is shown under
/// `gt`); values are the rig path, or `"town"` for the root. The first route
/// for a key wins. Read fresh from disk on every call.
pub fn rig_prefix_names(town_root: &Path) -> BTreeMap<String, String> {
    let mut names = BTreeMap::new();
    for route in read_routes(town_root) {
        let key = route.first_segment().unwrap_or(&route.prefix).to_string();
        let name = if route.is_town() {
            TOWN_DISPLAY_NAME.to_string()
        } else {
            route.path.clone()
        };
        names.entry(key).or_insert(name);
    }
    names
}
