//! Prefix trie over case-folded names.
//!
//! Each node owns the ids whose folded name ends exactly at that node; a
//! prefix query walks to the prefix node and drains its subtree depth-first
//! until `limit` distinct ids are collected. Children are visited in
//! ascending character order and ids in insertion order, so a query is
//! deterministic for a given index state.

use crate::store::fold_name;
use parking_lot::RwLock;
use shardcache_core::Snowflake;
use std::collections::{BTreeMap, HashSet};
use std::str::Chars;

#[derive(Debug, Default)]
struct TrieNode {
    children: BTreeMap<char, TrieNode>,
    ids: Vec<Snowflake>,
    /// Number of (key, id) entries stored in this subtree.
    weight: usize,
}

impl TrieNode {
    fn insert(&mut self, mut key: Chars<'_>, id: Snowflake) -> bool {
        let inserted = match key.next() {
            None => {
                if self.ids.contains(&id) {
                    false
                } else {
                    self.ids.push(id);
                    true
                }
            }
            Some(c) => self.children.entry(c).or_default().insert(key, id),
        };
        if inserted {
            self.weight += 1;
        }
        inserted
    }

    fn remove(&mut self, mut key: Chars<'_>, id: Snowflake) -> bool {
        let removed = match key.next() {
            None => match self.ids.iter().position(|existing| *existing == id) {
                Some(index) => {
                    self.ids.remove(index);
                    true
                }
                None => false,
            },
            Some(c) => {
                let Some(child) = self.children.get_mut(&c) else {
                    return false;
                };
                let removed = child.remove(key, id);
                if child.weight == 0 {
                    self.children.remove(&c);
                }
                removed
            }
        };
        if removed {
            self.weight -= 1;
        }
        removed
    }

    fn find(&self, key: &str) -> Option<&TrieNode> {
        let mut node = self;
        for c in key.chars() {
            node = node.children.get(&c)?;
        }
        Some(node)
    }

    fn collect(&self, limit: usize, out: &mut Vec<Snowflake>) {
        let mut seen = HashSet::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            for id in &node.ids {
                if out.len() >= limit {
                    return;
                }
                if seen.insert(*id) {
                    out.push(*id);
                }
            }
            if out.len() >= limit {
                return;
            }
            stack.extend(node.children.values().rev());
        }
    }
}

/// Distinct folded keys an entity is indexed under.
///
/// A nickname contributes a second key only when it folds to something
/// different from the name.
pub fn index_keys(name: &str, nickname: Option<&str>) -> Vec<String> {
    let mut keys = vec![fold_name(name)];
    if let Some(nickname) = nickname {
        let folded = fold_name(nickname);
        if folded != keys[0] {
            keys.push(folded);
        }
    }
    keys
}

/// Case-insensitive prefix index for one shard and entity kind.
#[derive(Debug, Default)]
pub struct PrefixIndex {
    root: RwLock<TrieNode>,
}

impl PrefixIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index `id` under `name`. Returns false if it was already there.
    pub fn insert(&self, name: &str, id: Snowflake) -> bool {
        self.root.write().insert(fold_name(name).chars(), id)
    }

    /// Remove `id` from under `name`. Returns false if it was not there.
    pub fn remove(&self, name: &str, id: Snowflake) -> bool {
        self.root.write().remove(fold_name(name).chars(), id)
    }

    /// Move `id` from the `old` keys to the `new` keys in one critical section.
    ///
    /// Every old key must currently hold `id`; anything else means the index
    /// has drifted from its store and the process aborts.
    pub fn replace(&self, id: Snowflake, old: &[String], new: &[String]) {
        let mut root = self.root.write();
        for key in old {
            let removed = root.remove(key.chars(), id);
            assert!(removed, "prefix index lost entity {} under {:?}", id, key);
        }
        for key in new {
            root.insert(key.chars(), id);
        }
    }

    /// Up to `limit` distinct ids whose indexed name starts with `prefix`.
    ///
    /// An empty prefix or a zero limit matches nothing.
    pub fn query(&self, prefix: &str, limit: usize) -> Vec<Snowflake> {
        let folded = fold_name(prefix);
        if folded.is_empty() || limit == 0 {
            return Vec::new();
        }
        let root = self.root.read();
        let mut out = Vec::new();
        if let Some(node) = root.find(&folded) {
            node.collect(limit, &mut out);
        }
        out
    }

    /// Every id reachable from the root.
    pub fn ids(&self) -> HashSet<Snowflake> {
        let mut out = Vec::new();
        self.root.read().collect(usize::MAX, &mut out);
        out.into_iter().collect()
    }

    /// Number of (key, id) entries.
    pub fn len(&self) -> usize {
        self.root.read().weight
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
