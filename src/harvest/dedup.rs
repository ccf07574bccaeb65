use crate::harvest::RepoKey;
use std::collections::HashSet;

const LOG_TARGET: &str = "     dedup";

/// Repositories already emitted in the current cycle.
///
/// A fresh set is created for every cycle and never outlives it. Keys compare case-insensitively,
/// the way GitHub resolves owner and repository names.
#[derive(Debug, Default)]
pub struct ProcessedKeys {
    seen: HashSet<(String, String)>,
}

impl ProcessedKeys {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn seen(&self, key: &RepoKey) -> bool {
        self.seen.contains(&key.identity())
    }

    /// Record `key`, returning `true` if it had not been seen before.
    pub fn mark_seen(&mut self, key: &RepoKey) -> bool {
        self.seen.insert(key.identity())
    }

    /// Record `key` like [`Self::mark_seen`], logging when it is a duplicate to be dropped.
    pub fn admit(&mut self, key: &RepoKey) -> bool {
        let fresh = self.mark_seen(key);
        if !fresh {
            log::info!(target: LOG_TARGET, "skipping {key}: already collected in this cycle");
        }
        fresh
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_and_seen() {
        let mut keys = ProcessedKeys::new();
        let key = RepoKey::new("acme", "widgets");

        assert!(!keys.seen(&key));
        assert!(keys.mark_seen(&key));
        assert!(keys.seen(&key));
        assert!(!keys.mark_seen(&key));
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let mut keys = ProcessedKeys::new();
        assert!(keys.mark_seen(&RepoKey::new("Acme", "Widgets")));
        assert!(keys.seen(&RepoKey::new("acme", "widgets")));
    }

    #[test]
    fn test_admit_keeps_first_occurrence() {
        let mut keys = ProcessedKeys::new();
        let items = [("acme", "a"), ("acme", "b"), ("ACME", "A"), ("other", "a"), ("acme", "b")];

        let kept: Vec<_> = items.into_iter().filter(|(o, n)| keys.admit(&RepoKey::new(o, n))).collect();
        assert_eq!(kept, vec![("acme", "a"), ("acme", "b"), ("other", "a")]);
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn test_new_set_is_empty() {
        assert!(ProcessedKeys::new().is_empty());
    }
}
