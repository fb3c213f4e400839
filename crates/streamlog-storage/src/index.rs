//! Node Index: ordered map from node key to node
//!
//! The stream keeps its nodes in a `BTreeMap` keyed by the ID of each node's
//! first record. Every seek the iterator and trim paths need is a range query:
//!
//! ```text
//! BTreeMap<StreamId, Node>
//!   1000-0  -> Node { 1000-0 .. 1000-99 }
//!   1000-100 -> Node { 1000-100 .. 1002-4 }
//!   1003-0  -> Node { 1003-0 .. }
//!
//! Where does 1001-7 live?
//!   range(..=1001-7).next_back() -> Some((1000-100, Node))
//! ```
//!
//! Because IDs only grow, the node a record lives in is always the greatest
//! key that is less than or equal to the record's ID.

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};

use streamlog_core::{Node, StreamId};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeIndex {
    nodes: BTreeMap<StreamId, Node>,
}

impl NodeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn insert(&mut self, node: Node) -> Option<Node> {
        self.nodes.insert(node.key(), node)
    }

    pub fn remove(&mut self, key: &StreamId) -> Option<Node> {
        self.nodes.remove(key)
    }

    pub fn get(&self, key: &StreamId) -> Option<&Node> {
        self.nodes.get(key)
    }

    pub fn get_mut(&mut self, key: &StreamId) -> Option<&mut Node> {
        self.nodes.get_mut(key)
    }

    pub fn first(&self) -> Option<&Node> {
        self.nodes.values().next()
    }

    pub fn last(&self) -> Option<&Node> {
        self.nodes.values().next_back()
    }

    pub fn last_mut(&mut self) -> Option<&mut Node> {
        self.nodes.values_mut().next_back()
    }

    /// Node with the greatest key `<= id`: the only node that can hold `id`.
    pub fn floor(&self, id: StreamId) -> Option<&Node> {
        self.nodes.range(..=id).next_back().map(|(_, node)| node)
    }

    /// Node with the smallest key `> key`.
    pub fn successor(&self, key: StreamId) -> Option<&Node> {
        self.nodes
            .range((Excluded(key), Unbounded))
            .next()
            .map(|(_, node)| node)
    }

    /// Node with the greatest key `< key`.
    pub fn predecessor(&self, key: StreamId) -> Option<&Node> {
        self.nodes.range(..key).next_back().map(|(_, node)| node)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn keys(&self) -> impl DoubleEndedIterator<Item = StreamId> + '_ {
        self.nodes.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamlog_core::SystemAllocator;

    fn node(ms: u64) -> Node {
        Node::new(StreamId::new(ms, 0), &[("f", "v")], &SystemAllocator).unwrap()
    }

    #[test]
    fn test_floor_successor_predecessor() {
        let mut index = NodeIndex::new();
        for ms in [10, 20, 30] {
            index.insert(node(ms));
        }

        let key = |n: Option<&Node>| n.map(|n| n.key().ms);
        assert_eq!(key(index.floor(StreamId::new(25, 9))), Some(20));
        assert_eq!(key(index.floor(StreamId::new(20, 0))), Some(20));
        assert_eq!(key(index.floor(StreamId::new(5, 0))), None);
        assert_eq!(key(index.successor(StreamId::new(20, 0))), Some(30));
        assert_eq!(key(index.successor(StreamId::new(30, 0))), None);
        assert_eq!(key(index.predecessor(StreamId::new(20, 0))), Some(10));
        assert_eq!(key(index.predecessor(StreamId::new(10, 0))), None);
        assert_eq!(key(index.first()), Some(10));
        assert_eq!(key(index.last()), Some(30));
    }

    #[test]
    fn test_remove() {
        let mut index = NodeIndex::new();
        index.insert(node(1));
        index.insert(node(2));
        assert!(index.remove(&StreamId::new(1, 0)).is_some());
        assert_eq!(index.len(), 1);
        assert_eq!(index.keys().collect::<Vec<_>>(), vec![StreamId::new(2, 0)]);
    }
}
