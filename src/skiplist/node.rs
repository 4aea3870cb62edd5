use std::cmp::Ordering as KeyOrdering;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::thread;

/// Null forward link. Never a valid arena index.
pub(crate) const NIL: u32 = u32::MAX;

/// Spins before a waiter starts yielding its timeslice.
const SPIN_LIMIT: u32 = 64;

/// Key slot of a node. The sentinel variants compare below and above every
/// user key, so head and tail bound any `K: Ord` without reserving values
/// from the key domain.
#[derive(Clone, PartialEq, Eq)]
pub(crate) enum NodeKey<K> {
    NegInf,
    Key(K),
    PosInf,
}

impl<K: Ord> NodeKey<K> {
    fn compare(&self, key: &K) -> KeyOrdering {
        match self {
            NodeKey::NegInf => KeyOrdering::Less,
            NodeKey::Key(k) => k.cmp(key),
            NodeKey::PosInf => KeyOrdering::Greater,
        }
    }

    /// True when this key sorts strictly before `key`.
    pub(crate) fn is_less_than(&self, key: &K) -> bool {
        self.compare(key) == KeyOrdering::Less
    }

    /// True when this key sorts strictly after `key`.
    pub(crate) fn exceeds(&self, key: &K) -> bool {
        self.compare(key) == KeyOrdering::Greater
    }

    /// True when this is a data key equal to `key`. Sentinels never match.
    pub(crate) fn equals(&self, key: &K) -> bool {
        self.compare(key) == KeyOrdering::Equal
    }

    /// The user key, if this is a data key.
    pub(crate) fn as_key(&self) -> Option<&K> {
        match self {
            NodeKey::Key(k) => Some(k),
            _ => None,
        }
    }
}

impl<K: fmt::Debug> fmt::Debug for NodeKey<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKey::NegInf => write!(f, "-inf"),
            NodeKey::Key(k) => write!(f, "{:?}", k),
            NodeKey::PosInf => write!(f, "+inf"),
        }
    }
}

/// A single element of the skip list.
///
/// The key and value are immutable once the node is constructed. The
/// `forward` array holds one arena index per level the node participates in
/// and is mutated only while `lock()` is held by the mutating thread. The
/// two flags are read lock-free by every traversal:
///
/// - `marked` goes true exactly once, when a removal has claimed the node
///   logically but not yet unlinked it everywhere.
/// - `fully_linked` goes true exactly once, when an insertion has finished
///   wiring the node in at all of its levels.
pub(crate) struct Node<K, V> {
    key: NodeKey<K>,
    value: Option<V>,
    forward: Box<[AtomicU32]>,
    top_level: usize,
    mutex: Mutex<()>,
    marked: AtomicBool,
    fully_linked: AtomicBool,
}

impl<K, V> Node<K, V> {
    /// Build a boundary node spanning `max_level + 1` levels. Sentinels are
    /// permanently present, so they start fully linked and carry no value.
    pub(crate) fn sentinel(key: NodeKey<K>, max_level: usize) -> Self {
        Node::with_parts(key, None, max_level, true)
    }

    /// Build a data node with a tower of `top_level + 1` levels. The node is
    /// not fully linked until the inserting thread says so.
    pub(crate) fn data(key: K, value: V, top_level: usize) -> Self {
        Node::with_parts(NodeKey::Key(key), Some(value), top_level, false)
    }

    fn with_parts(
        key: NodeKey<K>,
        value: Option<V>,
        top_level: usize,
        fully_linked: bool,
    ) -> Self {
        let forward = (0..=top_level).map(|_| AtomicU32::new(NIL)).collect();
        Node {
            key,
            value,
            forward,
            top_level,
            mutex: Mutex::new(()),
            marked: AtomicBool::new(false),
            fully_linked: AtomicBool::new(fully_linked),
        }
    }

    pub(crate) fn key(&self) -> &NodeKey<K> {
        &self.key
    }

    pub(crate) fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }

    /// Highest level this node participates in.
    pub(crate) fn top_level(&self) -> usize {
        self.top_level
    }

    /// Current successor at `level`.
    pub(crate) fn forward(&self, level: usize) -> u32 {
        self.forward[level].load(Ordering::Acquire)
    }

    /// Point the level-`level` link at `target`. Caller holds this node's
    /// lock, except while wiring a node that is not yet reachable.
    pub(crate) fn set_forward(&self, level: usize, target: u32) {
        self.forward[level].store(target, Ordering::Release);
    }

    /// Take this node's link lock. Poisoning means a mutating thread
    /// panicked mid-update, which the retry protocol cannot recover from.
    pub(crate) fn lock(&self) -> MutexGuard<'_, ()> {
        self.mutex.lock().expect("skip list node lock poisoned")
    }

    pub(crate) fn is_marked(&self) -> bool {
        self.marked.load(Ordering::Acquire)
    }

    /// Flag this node as logically deleted. Only ever called under the
    /// node's own lock, and never reset.
    pub(crate) fn set_marked(&self) {
        self.marked.store(true, Ordering::Release);
    }

    pub(crate) fn is_fully_linked(&self) -> bool {
        self.fully_linked.load(Ordering::Acquire)
    }

    /// Flag this node as linked in at all of its levels. Never reset.
    pub(crate) fn set_fully_linked(&self) {
        self.fully_linked.store(true, Ordering::Release);
    }

    /// Wait for a concurrent insertion of this node to finish linking.
    /// Spins briefly, then yields, since the racing inserter only has a few
    /// stores left to make.
    pub(crate) fn wait_fully_linked(&self) {
        let mut spins: u32 = 0;
        while !self.is_fully_linked() {
            spins = spins.saturating_add(1);
            if spins < SPIN_LIMIT {
                std::hint::spin_loop();
            } else {
                thread::yield_now();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn sentinel_keys_bound_every_user_key() {
        let neg: NodeKey<i64> = NodeKey::NegInf;
        let pos: NodeKey<i64> = NodeKey::PosInf;
        for key in [i64::MIN, -1, 0, 1, i64::MAX] {
            assert!(neg.is_less_than(&key));
            assert!(!neg.equals(&key));
            assert!(pos.exceeds(&key));
            assert!(!pos.equals(&key));
        }
        assert!(NodeKey::Key(5).equals(&5));
        assert!(NodeKey::Key(4).is_less_than(&5));
        assert!(NodeKey::Key(6).exceeds(&5));
    }

    #[test]
    fn data_node_starts_unlinked_and_unmarked() {
        let node: Node<i64, String> = Node::data(7, "seven".to_string(), 2);
        assert!(!node.is_marked());
        assert!(!node.is_fully_linked());
        assert_eq!(node.top_level(), 2);
        assert_eq!(node.value(), Some(&"seven".to_string()));
        for level in 0..=2 {
            assert_eq!(node.forward(level), NIL);
        }
    }

    #[test]
    fn sentinel_starts_fully_linked() {
        let head: Node<i64, String> = Node::sentinel(NodeKey::NegInf, 4);
        assert!(head.is_fully_linked());
        assert!(!head.is_marked());
        assert!(head.value().is_none());
        assert_eq!(head.top_level(), 4);
    }

    #[test]
    fn forward_links_round_trip() {
        let node: Node<i64, String> = Node::data(1, "one".to_string(), 1);
        node.set_forward(0, 42);
        node.set_forward(1, 99);
        assert_eq!(node.forward(0), 42);
        assert_eq!(node.forward(1), 99);
    }

    #[test]
    fn wait_fully_linked_observes_racing_setter() {
        let node: Arc<Node<i64, String>> = Arc::new(Node::data(3, "three".to_string(), 0));
        let setter = {
            let node = Arc::clone(&node);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(10));
                node.set_fully_linked();
            })
        };
        node.wait_fully_linked();
        assert!(node.is_fully_linked());
        setter.join().unwrap();
    }

    #[test]
    fn key_debug_renders_sentinels() {
        assert_eq!(format!("{:?}", NodeKey::<i64>::NegInf), "-inf");
        assert_eq!(format!("{:?}", NodeKey::<i64>::PosInf), "+inf");
        assert_eq!(format!("{:?}", NodeKey::Key(12)), "12");
    }
}
