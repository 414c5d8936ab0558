//! Append-only set of handles banned from trading.

use serde::{Deserialize, Serialize};

use crate::Handle;

/// Handles marked as scammers. Persisted as a plain list, in marking order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Blacklist {
    handles: Vec<Handle>,
}

impl Blacklist {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handle`. Returns `false` if it was already listed.
    pub fn add(&mut self, handle: Handle) -> bool {
        if self.contains(&handle) {
            return false;
        }
        self.handles.push(handle);
        true
    }

    #[must_use]
    pub fn contains(&self, handle: &Handle) -> bool {
        self.handles.contains(handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Handle> {
        self.handles.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent() {
        let mut list = Blacklist::new();
        assert!(list.add(Handle::new("@scammer")));
        assert!(!list.add(Handle::new("@Scammer")));
        assert_eq!(list.len(), 1);
        assert!(list.contains(&Handle::new("scammer")));
    }

    #[test]
    fn serializes_as_list() {
        let mut list = Blacklist::new();
        list.add(Handle::new("@a"));
        list.add(Handle::new("@b"));
        assert_eq!(serde_json::to_string(&list).unwrap(), r#"["a","b"]"#);
    }
}
