//! Navigation seam used for the post-eviction redirect.

use std::sync::{PoisonError, RwLock};

/// Where the console currently is and how to move it.
pub trait Navigator: Send + Sync {
    /// Current location path, e.g. `/routes`.
    fn current_path(&self) -> String;

    /// Move to `path`.
    fn navigate(&self, path: &str);
}

/// Navigator that only records where it was sent.
#[derive(Debug)]
pub struct MemoryNavigator {
    location: RwLock<String>,
    history: RwLock<Vec<String>>,
}

impl MemoryNavigator {
    pub fn new(start: impl Into<String>) -> Self {
        Self {
            location: RwLock::new(start.into()),
            history: RwLock::new(Vec::new()),
        }
    }

    /// Every navigation performed, oldest first.
    pub fn history(&self) -> Vec<String> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for MemoryNavigator {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Navigator for MemoryNavigator {
    fn current_path(&self) -> String {
        self.location
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn navigate(&self, path: &str) {
        *self.location.write().unwrap_or_else(PoisonError::into_inner) = path.to_string();
        self.history
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.to_string());
    }
}

/// Navigate to `target` unless already there.
///
/// Returns whether a navigation happened.
pub fn redirect_once(navigator: &dyn Navigator, target: &str) -> bool {
    if navigator.current_path() == target {
        return false;
    }
    navigator.navigate(target);
    true
}
