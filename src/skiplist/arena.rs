use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU32, Ordering};
use std::sync::Mutex;

use crate::skiplist::node::{Node, NIL};

/// log2 of the first bucket's capacity.
const BUCKET_BASE_BITS: u32 = 6;
/// Nodes in the first bucket. Each later bucket doubles.
const BUCKET_BASE: u32 = 1 << BUCKET_BASE_BITS;
/// Bucket spine length. 26 doubling buckets cover the whole u32 index
/// space, so the spine itself never grows or moves.
const BUCKET_COUNT: usize = 26;
/// Total slots addressable before the index space runs out.
const CAPACITY: u32 = u32::MAX - (BUCKET_BASE - 1);

/// Append-only table owning every node of one skip list.
///
/// Nodes are addressed by `u32` indices that stay valid, at a stable
/// address, for the arena's whole lifetime. Forward links between nodes are
/// these indices rather than pointers, so a traversal that races a removal
/// can keep walking through an unlinked node: the node is never freed or
/// moved until the arena itself is dropped.
///
/// Allocation reserves a slot with one atomic increment. Bucket storage is
/// lazily created behind a growth lock and published once; existing buckets
/// are never reallocated.
pub(crate) struct NodeArena<K, V> {
    buckets: [AtomicPtr<Node<K, V>>; BUCKET_COUNT],
    len: AtomicU32,
    grow: Mutex<()>,
}

// Moving the arena moves ownership of every node, so Send follows the
// contents. Sharing it lets any thread alloc (move keys and values in) and
// read &Node, and node interior mutability is confined to atomics and the
// per-node mutex, so Sync needs the contents to be Send + Sync.
unsafe impl<K: Send, V: Send> Send for NodeArena<K, V> {}
unsafe impl<K: Send + Sync, V: Send + Sync> Sync for NodeArena<K, V> {}

/// Bucket and in-bucket offset for an index. Index 0 lands at the start of
/// bucket 0; bucket `b` spans `BUCKET_BASE << b` slots.
fn locate(index: u32) -> (usize, usize) {
    let shifted = index as u64 + BUCKET_BASE as u64;
    let bucket = (63 - shifted.leading_zeros()) as usize - BUCKET_BASE_BITS as usize;
    let offset = (shifted - (1u64 << (bucket as u32 + BUCKET_BASE_BITS))) as usize;
    (bucket, offset)
}

fn bucket_capacity(bucket: usize) -> usize {
    (BUCKET_BASE as usize) << bucket
}

impl<K, V> NodeArena<K, V> {
    pub(crate) fn new() -> Self {
        NodeArena {
            buckets: std::array::from_fn(|_| AtomicPtr::new(ptr::null_mut())),
            len: AtomicU32::new(0),
            grow: Mutex::new(()),
        }
    }

    /// Number of slots allocated so far.
    pub(crate) fn len(&self) -> u32 {
        self.len.load(Ordering::Acquire)
    }

    /// Move `node` into the arena and return its index.
    ///
    /// The fetch-add makes the reserved slot exclusively ours to write;
    /// nobody can learn the index before we return it.
    pub(crate) fn alloc(&self, node: Node<K, V>) -> u32 {
        let index = self.len.fetch_add(1, Ordering::AcqRel);
        if index >= CAPACITY {
            panic!("node arena exhausted the u32 index space");
        }
        let (bucket, offset) = locate(index);
        let base = self.bucket_ptr(bucket);
        // Safety: `index` was reserved above and is ours alone until the
        // caller publishes it, and `base` points at live storage for at
        // least `bucket_capacity(bucket)` nodes.
        unsafe { ptr::write(base.add(offset), node) };
        index
    }

    /// Resolve an index to its node.
    ///
    /// Callers only ever pass indices read out of published forward links
    /// (or the sentinel indices fixed at construction), so the slot is
    /// always initialized by the time it is resolved.
    pub(crate) fn node(&self, index: u32) -> &Node<K, V> {
        debug_assert!(index != NIL, "resolved a nil link");
        debug_assert!(index < self.len(), "index beyond allocated length");
        let (bucket, offset) = locate(index);
        let base = self.buckets[bucket].load(Ordering::Acquire);
        debug_assert!(!base.is_null(), "bucket not yet published");
        // Safety: the publishing store of the link that carried `index`
        // ordered the slot write (and the bucket publication) before it.
        unsafe { &*base.add(offset) }
    }

    /// Storage for `bucket`, creating and publishing it on first use.
    fn bucket_ptr(&self, bucket: usize) -> *mut Node<K, V> {
        let existing = self.buckets[bucket].load(Ordering::Acquire);
        if !existing.is_null() {
            return existing;
        }
        let _guard = self.grow.lock().expect("arena growth lock poisoned");
        // Double-check: another allocator may have published while we
        // waited for the lock.
        let existing = self.buckets[bucket].load(Ordering::Acquire);
        if !existing.is_null() {
            return existing;
        }
        let storage: Box<[MaybeUninit<Node<K, V>>]> =
            Box::new_uninit_slice(bucket_capacity(bucket));
        let base = Box::into_raw(storage).cast::<Node<K, V>>();
        self.buckets[bucket].store(base, Ordering::Release);
        base
    }
}

impl<K, V> Drop for NodeArena<K, V> {
    fn drop(&mut self) {
        // Exclusive access: every allocated slot below `len` is initialized
        // and nobody else holds references into the arena any more.
        let len = (*self.len.get_mut()).min(CAPACITY);
        for index in 0..len {
            let (bucket, offset) = locate(index);
            let base = *self.buckets[bucket].get_mut();
            unsafe { ptr::drop_in_place(base.add(offset)) };
        }
        for (bucket, slot) in self.buckets.iter_mut().enumerate() {
            let base = *slot.get_mut();
            if !base.is_null() {
                let slice = ptr::slice_from_raw_parts_mut(
                    base.cast::<MaybeUninit<Node<K, V>>>(),
                    bucket_capacity(bucket),
                );
                // Safety: reconstructs the Box created in bucket_ptr; the
                // MaybeUninit element type frees the storage without
                // double-dropping nodes.
                unsafe { drop(Box::from_raw(slice)) };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn data_node(key: i64) -> Node<i64, String> {
        Node::data(key, key.to_string(), 0)
    }

    #[test]
    fn locate_maps_indices_densely() {
        // First bucket holds 64 slots, second 128, third 256.
        assert_eq!(locate(0), (0, 0));
        assert_eq!(locate(63), (0, 63));
        assert_eq!(locate(64), (1, 0));
        assert_eq!(locate(191), (1, 127));
        assert_eq!(locate(192), (2, 0));
        assert_eq!(locate(447), (2, 255));
        assert_eq!(locate(448), (3, 0));
    }

    #[test]
    fn alloc_and_resolve_round_trip() {
        let arena: NodeArena<i64, String> = NodeArena::new();
        let a = arena.alloc(data_node(10));
        let b = arena.alloc(data_node(20));
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(arena.len(), 2);
        assert!(arena.node(a).key().equals(&10));
        assert!(arena.node(b).key().equals(&20));
        assert_eq!(arena.node(b).value(), Some(&"20".to_string()));
    }

    #[test]
    fn nodes_stay_put_across_bucket_growth() {
        let arena: NodeArena<i64, String> = NodeArena::new();
        let first = arena.alloc(data_node(0));
        let first_addr = arena.node(first) as *const _ as usize;
        // Spill well past the first two buckets.
        for key in 1..500 {
            arena.alloc(data_node(key));
        }
        assert_eq!(arena.node(first) as *const _ as usize, first_addr);
        for key in 0..500 {
            assert!(arena.node(key as u32).key().equals(&key));
        }
    }

    #[test]
    fn concurrent_alloc_yields_distinct_dense_indices() {
        let arena: Arc<NodeArena<i64, String>> = Arc::new(NodeArena::new());
        let threads = 8;
        let per_thread = 200;
        let barrier = Arc::new(Barrier::new(threads));

        let mut handles = vec![];
        for t in 0..threads {
            let arena = Arc::clone(&arena);
            let barrier = Arc::clone(&barrier);
            handles.push(thread::spawn(move || {
                barrier.wait();
                let mut indices = Vec::with_capacity(per_thread);
                for i in 0..per_thread {
                    let key = (t * per_thread + i) as i64;
                    indices.push((key, arena.alloc(data_node(key))));
                }
                indices
            }));
        }

        let mut seen = vec![false; threads * per_thread];
        for handle in handles {
            for (key, index) in handle.join().unwrap() {
                assert!(arena.node(index).key().equals(&key));
                let slot = index as usize;
                assert!(!seen[slot], "index {} handed out twice", index);
                seen[slot] = true;
            }
        }
        assert!(seen.iter().all(|&s| s), "indices were not dense");
        assert_eq!(arena.len(), (threads * per_thread) as u32);
    }
}
