//! Locating the external binaries collectors depend on.

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;

/// Binary lookup: explicit entries from configuration win, then `PATH`.
#[derive(Debug, Clone, Default)]
pub struct ToolPaths {
    explicit: HashMap<String, PathBuf>,
    /// Overrides `PATH` when set.
    search: Option<OsString>,
}

impl ToolPaths {
    pub fn from_env(explicit: HashMap<String, PathBuf>) -> Self {
        ToolPaths { explicit, search: None }
    }

    pub fn with_search(explicit: HashMap<String, PathBuf>, search: Vec<PathBuf>) -> Self {
        let search = std::env::join_paths(search).ok().unwrap_or_default();
        ToolPaths { explicit, search: Some(search) }
    }

    /// An explicit entry must itself be executable; it never falls back to
    /// a search.
    pub fn resolve(&self, binary: &str) -> Option<PathBuf> {
        let name = self.explicit.get(binary).map(|p| p.as_os_str()).unwrap_or(OsStr::new(binary));
        let found = match &self.search {
            None => which::which(name),
            Some(paths) => {
                let cwd = std::env::current_dir().unwrap_or_default();
                which::which_in(name, Some(paths), cwd)
            }
        };
        found.ok()
    }
}
