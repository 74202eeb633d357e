//! Prefix tree over dotted key paths, used to match merge allow lists.
//!
//! A `*` segment matches exactly one segment at its level. A terminal `*`
//! also matches any longer suffix, so `global.*` covers every key below
//! the `global` section.

use std::collections::BTreeMap;

/// Single-level wildcard segment.
pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct TrieNode {
    children: BTreeMap<String, TrieNode>,
    end_of_sequence: bool,
}

impl TrieNode {
    /// True when the only child is a wildcard.
    fn is_wildcard(&self) -> bool {
        self.children.len() == 1 && self.children.contains_key(WILDCARD)
    }

    fn terminal_wildcard(&self) -> bool {
        self.is_wildcard()
            && self
                .children
                .get(WILDCARD)
                .is_some_and(|child| child.end_of_sequence)
    }
}

/// Set of accepted segment sequences with wildcard support.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trie {
    root: TrieNode,
}

impl Trie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a trie from dotted paths such as `services.default.core.VAR`.
    pub fn from_dotted<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut trie = Self::new();
        for path in paths {
            let segments: Vec<&str> = path.as_ref().split('.').collect();
            trie.insert(&segments);
        }
        trie
    }

    /// Insert a sequence of segments.
    ///
    /// Insertion stops below a node whose only child is a terminal wildcard:
    /// that wildcard already accepts every longer path.
    pub fn insert<S: AsRef<str>>(&mut self, segments: &[S]) {
        let mut current = &mut self.root;
        for segment in segments {
            if current.terminal_wildcard() {
                return;
            }
            current = current
                .children
                .entry(segment.as_ref().to_string())
                .or_default();
        }
        current.end_of_sequence = true;
    }

    /// Check whether `path` is accepted.
    pub fn has<S: AsRef<str>>(&self, path: &[S]) -> bool {
        Self::has_from(&self.root, path)
    }

    fn has_from<S: AsRef<str>>(node: &TrieNode, path: &[S]) -> bool {
        let Some((first, rest)) = path.split_first() else {
            return node.end_of_sequence;
        };
        let word = first.as_ref();
        let word_is_wildcard = word == WILDCARD;

        node.children.iter().any(|(key, child)| {
            let key_is_wildcard = key == WILDCARD;
            if (word_is_wildcard && rest.is_empty()) || (key_is_wildcard && child.end_of_sequence) {
                return true;
            }
            (word_is_wildcard || key_is_wildcard || word == key) && Self::has_from(child, rest)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty() && !self.root.end_of_sequence
    }
}
