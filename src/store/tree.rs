//! Ordered key → txId list map
//!
//! Holds one entry per unique encoded key. Keys compare byte-wise, txIds
//! under a key keep insertion order, and a (key, txId) pair is stored at
//! most once.
//!
//! # Performance
//! - Insert: O(log n + m) where m = txIds already under the key
//! - Point lookup: O(log n)
//! - Bound / range query: O(log n + k) where k = matching entries

use crate::store::types::{InsertOutcome, KeyQuery};
use std::collections::BTreeMap;
use std::ops::Bound;

#[derive(Debug, Default)]
pub struct OrderedTree {
    entries: BTreeMap<String, Vec<String>>,
    entry_count: u64,
}

impl OrderedTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the pair is already present
    pub fn contains(&self, key: &str, tx_id: &str) -> bool {
        self.entries
            .get(key)
            .map(|txs| txs.iter().any(|t| t == tx_id))
            .unwrap_or(false)
    }

    /// Insert a pair, appending to the key's list
    pub fn insert(&mut self, key: &str, tx_id: &str) -> InsertOutcome {
        if let Some(txs) = self.entries.get_mut(key) {
            if txs.iter().any(|t| t == tx_id) {
                return InsertOutcome::Duplicate;
            }
            txs.push(tx_id.to_string());
        } else {
            self.entries.insert(key.to_string(), vec![tx_id.to_string()]);
        }
        self.entry_count += 1;
        InsertOutcome::Inserted
    }

    /// txIds stored under exactly `key`
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries.get(key).map(|v| v.as_slice())
    }

    /// Evaluate a predicate; txIds are concatenated in ascending key order
    pub fn search(&self, query: &KeyQuery) -> Vec<String> {
        self.search_limited(query, None)
    }

    /// Like [`search`](Self::search) but stops after `limit` txIds
    pub fn search_limited(&self, query: &KeyQuery, limit: Option<usize>) -> Vec<String> {
        let limit = limit.unwrap_or(usize::MAX);
        let mut out = Vec::new();

        match query {
            KeyQuery::Eq(key) => {
                if let Some(txs) = self.entries.get(key) {
                    out.extend(txs.iter().take(limit).cloned());
                }
            }
            KeyQuery::NotEq(key) => {
                let matching = self.entries.iter().filter(|(k, _)| *k != key);
                collect_into(&mut out, matching, limit);
            }
            KeyQuery::Lt(key) => {
                let range = self
                    .entries
                    .range::<str, _>((Bound::Unbounded, Bound::Excluded(key.as_str())));
                collect_into(&mut out, range, limit);
            }
            KeyQuery::LtEq(key) => {
                let range = self
                    .entries
                    .range::<str, _>((Bound::Unbounded, Bound::Included(key.as_str())));
                collect_into(&mut out, range, limit);
            }
            KeyQuery::Gt(key) => {
                let range = self
                    .entries
                    .range::<str, _>((Bound::Excluded(key.as_str()), Bound::Unbounded));
                collect_into(&mut out, range, limit);
            }
            KeyQuery::GtEq(key) => {
                let range = self
                    .entries
                    .range::<str, _>((Bound::Included(key.as_str()), Bound::Unbounded));
                collect_into(&mut out, range, limit);
            }
            KeyQuery::Range { begin, end } => {
                // BTreeMap::range panics on an inverted interval
                if begin < end {
                    let range = self.entries.range::<str, _>((
                        Bound::Included(begin.as_str()),
                        Bound::Excluded(end.as_str()),
                    ));
                    collect_into(&mut out, range, limit);
                }
            }
        }

        out
    }

    /// Number of unique keys
    pub fn key_count(&self) -> u64 {
        self.entries.len() as u64
    }

    /// Number of (key, txId) pairs
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Smallest and largest key
    pub fn key_bounds(&self) -> Option<(&str, &str)> {
        let first = self.entries.keys().next()?;
        let last = self.entries.keys().next_back()?;
        Some((first.as_str(), last.as_str()))
    }

    /// Iterate entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

fn collect_into<'a>(
    out: &mut Vec<String>,
    entries: impl Iterator<Item = (&'a String, &'a Vec<String>)>,
    limit: usize,
) {
    for (_, txs) in entries {
        for tx in txs {
            if out.len() >= limit {
                return;
            }
            out.push(tx.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> OrderedTree {
        let mut tree = OrderedTree::new();
        tree.insert("k1", "a");
        tree.insert("k2", "b");
        tree.insert("k2", "c");
        tree.insert("k3", "d");
        tree
    }

    #[test]
    fn test_insert_appends_in_order() {
        let tree = sample_tree();
        assert_eq!(tree.get("k2").unwrap(), &["b".to_string(), "c".to_string()]);
        assert_eq!(tree.key_count(), 3);
        assert_eq!(tree.entry_count(), 4);
    }

    #[test]
    fn test_duplicate_pair_is_noop() {
        let mut tree = sample_tree();
        assert_eq!(tree.insert("k2", "b"), InsertOutcome::Duplicate);
        assert_eq!(tree.entry_count(), 4);
        assert!(tree.contains("k2", "b"));
        assert!(!tree.contains("k2", "z"));
    }

    #[test]
    fn test_eq_search() {
        let tree = sample_tree();
        assert_eq!(tree.search(&KeyQuery::Eq("k2".into())), vec!["b", "c"]);
        assert!(tree.search(&KeyQuery::Eq("missing".into())).is_empty());
    }

    #[test]
    fn test_bound_searches() {
        let tree = sample_tree();
        assert_eq!(tree.search(&KeyQuery::Gt("k2".into())), vec!["d"]);
        assert_eq!(tree.search(&KeyQuery::GtEq("k2".into())), vec!["b", "c", "d"]);
        assert_eq!(tree.search(&KeyQuery::Lt("k2".into())), vec!["a"]);
        assert_eq!(tree.search(&KeyQuery::LtEq("k2".into())), vec!["a", "b", "c"]);
        assert_eq!(tree.search(&KeyQuery::NotEq("k2".into())), vec!["a", "d"]);
    }

    #[test]
    fn test_range_is_half_open() {
        let tree = sample_tree();
        let result = tree.search(&KeyQuery::range("k1", "k3"));
        assert_eq!(result, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_inverted_range_is_empty() {
        let tree = sample_tree();
        assert!(tree.search(&KeyQuery::range("k3", "k1")).is_empty());
        assert!(tree.search(&KeyQuery::range("k2", "k2")).is_empty());
    }

    #[test]
    fn test_prefix_threshold_search() {
        let mut tree = OrderedTree::new();
        tree.insert("spd::055::obu1::t", "tx55");
        tree.insert("spd::060::obu1::t", "tx60");
        tree.insert("spd::080::obu1::t", "tx80");
        tree.insert("spd::095::obu1::t", "tx95");

        let result = tree.search(&KeyQuery::GtEq("spd::060::".into()));
        assert_eq!(result, vec!["tx60", "tx80", "tx95"]);
    }

    #[test]
    fn test_search_limit() {
        let tree = sample_tree();
        let result = tree.search_limited(&KeyQuery::GtEq("k1".into()), Some(2));
        assert_eq!(result, vec!["a", "b"]);
    }

    #[test]
    fn test_key_bounds() {
        let tree = sample_tree();
        assert_eq!(tree.key_bounds(), Some(("k1", "k3")));
        assert!(OrderedTree::new().key_bounds().is_none());
    }
}
