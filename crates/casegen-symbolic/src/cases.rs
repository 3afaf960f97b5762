//! Deduplicating, capacity-bounded case set.

use serde_json::Value;
use std::collections::HashSet;

/// Cases keyed by their canonical JSON text. Object keys serialize sorted,
/// so structurally equal cases collapse to one entry.
#[derive(Debug)]
pub struct CaseSet {
    capacity: usize,
    seen: HashSet<String>,
    cases: Vec<Value>,
    duplicates: usize,
}

impl CaseSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            seen: HashSet::new(),
            cases: Vec::new(),
            duplicates: 0,
        }
    }

    /// Insert a case. Returns `false` for duplicates and when full.
    pub fn insert(&mut self, case: Value) -> bool {
        if self.is_full() {
            return false;
        }
        let key = case.to_string();
        if !self.seen.insert(key) {
            self.duplicates += 1;
            return false;
        }
        self.cases.push(case);
        true
    }

    pub fn is_full(&self) -> bool {
        self.cases.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Number of absorbed duplicate insertions.
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    pub fn into_cases(self) -> Vec<Value> {
        self.cases
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_duplicates_absorbed() {
        let mut set = CaseSet::new(10);
        assert!(set.insert(json!({"a": 1, "b": [1, 2]})));
        assert!(!set.insert(json!({"b": [1, 2], "a": 1})));
        assert!(set.insert(json!({"a": 2, "b": [1, 2]})));
        assert_eq!(set.len(), 2);
        assert_eq!(set.duplicates(), 1);
    }

    #[test]
    fn test_capacity_bound() {
        let mut set = CaseSet::new(2);
        assert!(set.insert(json!({"a": 1})));
        assert!(set.insert(json!({"a": 2})));
        assert!(set.is_full());
        assert!(!set.insert(json!({"a": 3})));
        assert_eq!(set.into_cases().len(), 2);
    }

    #[test]
    fn test_int_and_float_differ() {
        let mut set = CaseSet::new(4);
        assert!(set.insert(json!({"c": 1})));
        assert!(set.insert(json!({"c": 1.0})));
    }
}
