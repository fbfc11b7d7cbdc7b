//! Canonical committed key-value map.
//!
//! Only commit mutates this map, so a reader can never observe values from
//! an uncommitted transaction. Uncommitted writes live in the transaction
//! table until then.

use std::collections::HashMap;

use crate::table::Operation;

#[derive(Debug, Default)]
pub struct StoreEngine {
    map: HashMap<String, String>,
}

impl StoreEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed value for `key`, or `None` if it was never written.
    pub fn read(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    /// Apply a committing transaction's buffered PUTs, in log order. Later
    /// PUTs to the same key within one transaction overwrite earlier ones.
    pub fn apply(&mut self, ops: &[Operation]) {
        for op in ops {
            if let Operation::Put { key, value } = op {
                self.map.insert(key.clone(), value.clone());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_skips_gets() {
        let mut store = StoreEngine::new();
        store.apply(&[
            Operation::Get { key: "a".into() },
            Operation::Put {
                key: "a".into(),
                value: "1".into(),
            },
        ]);

        assert_eq!(store.read("a"), Some("1"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_apply_last_put_wins() {
        let mut store = StoreEngine::new();
        store.apply(&[
            Operation::Put {
                key: "k".into(),
                value: "first".into(),
            },
            Operation::Put {
                key: "k".into(),
                value: "second".into(),
            },
        ]);

        assert_eq!(store.read("k"), Some("second"));
    }

    #[test]
    fn test_empty_value_is_stored() {
        let mut store = StoreEngine::new();
        store.apply(&[Operation::Put {
            key: "k".into(),
            value: String::new(),
        }]);

        // An empty committed value is distinct from an absent key.
        assert_eq!(store.read("k"), Some(""));
        assert_eq!(store.read("missing"), None);
    }
}
