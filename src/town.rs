//! Town root discovery.
//!
//! A town is recognized by a `mayor/` directory or a `.gastown` marker file
//! at its root. The server is usually launched from somewhere inside a rig
//! (for example `<town>/<rig>/polecats/<name>/<project>`), so discovery walks
//! up from the working directory.

use std::path::{Path, PathBuf};

const MAYOR_DIR: &str = "mayor";
const GASTOWN_MARKER: &str = ".gastown";
const MAX_DEPTH: usize = 10;

/// Returns `true` if `dir` looks like a town root.
pub fn is_town_root(dir: &Path) -> bool {
    dir.join(MAYOR_DIR).exists() || dir.join(GASTOWN_MARKER).exists()
}

/// Find the town root at or above `start`.
///
/// Walks up at most ten levels. When no marker is found, tries four levels
/// up (the usual depth of a polecat checkout) and finally gives up and
/// returns `start` itself.
pub fn find_town_root(start: &Path) -> PathBuf {
    let mut dir = Some(start);
    for _ in 0..MAX_DEPTH {
        let Some(current) = dir else { break };
        if is_town_root(current) {
            return current.to_path_buf();
        }
        dir = current.parent();
    }

    let candidate = start.join("..").join("..").join("..").join("..");
    if let Ok(abs) = candidate.canonicalize() {
        if abs.join(MAYOR_DIR).exists() {
            return abs;
        }
    }

    start.to_path_buf()
}
