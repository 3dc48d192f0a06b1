//! Ignore list

use parking_lot::RwLock;

/// Module names exempt from bulk and automatic operations.
///
/// Names compare case-insensitively. Once [`IgnoreList::clear`] ran (on
/// shutdown) the list is gone and additions are refused.
#[derive(Debug)]
pub struct IgnoreList {
    names: RwLock<Option<Vec<String>>>,
}

impl Default for IgnoreList {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}

impl IgnoreList {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list: Vec<String> = Vec::new();
        for name in names {
            let name = name.into();
            if !list.iter().any(|n| n.eq_ignore_ascii_case(&name)) {
                list.push(name);
            }
        }
        Self {
            names: RwLock::new(Some(list)),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names
            .read()
            .as_ref()
            .is_some_and(|names| names.iter().any(|n| n.eq_ignore_ascii_case(name)))
    }

    /// Add a name. Returns `false` when it is already listed or the list
    /// was cleared.
    pub fn add(&self, name: &str) -> bool {
        let mut guard = self.names.write();
        let Some(names) = guard.as_mut() else {
            return false;
        };
        if names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
            return false;
        }
        names.push(name.to_string());
        true
    }

    pub fn remove(&self, name: &str) -> bool {
        let mut guard = self.names.write();
        let Some(names) = guard.as_mut() else {
            return false;
        };
        let before = names.len();
        names.retain(|n| !n.eq_ignore_ascii_case(name));
        names.len() != before
    }

    pub fn names(&self) -> Vec<String> {
        self.names.read().clone().unwrap_or_default()
    }

    /// Drop the list for good
    pub fn clear(&self) {
        self.names.write().take();
    }

    pub fn is_cleared(&self) -> bool {
        self.names.read().is_none()
    }
}
