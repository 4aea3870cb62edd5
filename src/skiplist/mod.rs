mod arena;
mod async_skiplist;
mod error;
mod level;
mod node;
mod traits;

pub use async_skiplist::{AsyncSkipList, AsyncStringSkipList};
pub use error::SkipListError;
pub use traits::OrderedIndex;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::MutexGuard;

use arena::NodeArena;
use level::LevelGenerator;
use node::{Node, NodeKey, NIL};

/// Hard cap on the total level count of any list, including level 0.
pub const MAX_LEVELS: usize = 32;

/// A concurrent ordered map built on a lazy lock-based skip list.
///
/// Lookups and range scans are lock-free. Inserts and removes take locks
/// only on the handful of predecessor nodes they rewire, after an
/// optimistic lock-free descent, and revalidate under those locks that the
/// neighborhood did not change; on any mismatch they release everything and
/// retry. Two per-node flags carry logical state between threads: `marked`
/// (the node is being removed) and `fully_linked` (the node is wired in at
/// every level and therefore visible).
///
/// All operations take `&self`; share the list across threads with `Arc`.
///
/// # Examples
///
/// ```
/// use skiplane::SkipList;
///
/// let list = SkipList::new(16, 0.5).unwrap();
/// assert!(list.insert(2, "two".to_string()));
/// assert!(list.insert(1, "one".to_string()));
/// assert_eq!(list.get(&2), Some("two".to_string()));
/// assert!(list.remove(&2));
/// assert_eq!(list.get(&2), None);
/// ```
pub struct SkipList<K, V> {
    arena: NodeArena<K, V>,
    levels: LevelGenerator,
    max_level: usize,
    head: u32,
    tail: u32,
    len: AtomicUsize,
}

impl<K: Ord, V> SkipList<K, V> {
    /// Create a list sized for `expected_elements` entries with the given
    /// level-growth probability.
    ///
    /// The maximum level is `round(log(expected_elements) / log(1 /
    /// probability)) - 1`, clamped to `0..MAX_LEVELS`. `expected_elements`
    /// must be at least 1 and `probability` strictly between 0 and 1;
    /// anything else is a configuration error reported before any node
    /// exists.
    ///
    /// # Examples
    ///
    /// ```
    /// use skiplane::{SkipList, SkipListError};
    ///
    /// let list: SkipList<i64, String> = SkipList::new(1000, 0.5).unwrap();
    /// assert!(list.is_empty());
    ///
    /// let bad: Result<SkipList<i64, String>, _> = SkipList::new(0, 0.5);
    /// assert_eq!(bad.unwrap_err(), SkipListError::InvalidExpectedElements(0));
    /// ```
    pub fn new(expected_elements: usize, probability: f64) -> Result<Self, SkipListError> {
        let max_level = Self::derive_max_level(expected_elements, probability)?;
        Ok(Self::build(max_level, None))
    }

    /// Like [`SkipList::new`], but with a fixed seed for the tower-height
    /// generator so level draws are reproducible.
    pub fn with_seed(
        expected_elements: usize,
        probability: f64,
        seed: u64,
    ) -> Result<Self, SkipListError> {
        let max_level = Self::derive_max_level(expected_elements, probability)?;
        Ok(Self::build(max_level, Some(seed)))
    }

    /// Create a list with an explicit maximum level instead of deriving one.
    pub fn with_max_level(max_level: usize) -> Result<Self, SkipListError> {
        if max_level >= MAX_LEVELS {
            return Err(SkipListError::InvalidMaxLevel(max_level));
        }
        Ok(Self::build(max_level, None))
    }

    fn derive_max_level(
        expected_elements: usize,
        probability: f64,
    ) -> Result<usize, SkipListError> {
        if expected_elements == 0 {
            return Err(SkipListError::InvalidExpectedElements(expected_elements));
        }
        if !(probability > 0.0 && probability < 1.0) {
            // Also rejects NaN, which fails both comparisons.
            return Err(SkipListError::InvalidProbability(probability));
        }
        let raw = ((expected_elements as f64).ln() / (1.0 / probability).ln()).round() as i64 - 1;
        Ok(raw.clamp(0, (MAX_LEVELS - 1) as i64) as usize)
    }

    fn build(max_level: usize, seed: Option<u64>) -> Self {
        let arena = NodeArena::new();
        let head = arena.alloc(Node::sentinel(NodeKey::NegInf, max_level));
        let tail = arena.alloc(Node::sentinel(NodeKey::PosInf, max_level));
        for level in 0..=max_level {
            arena.node(head).set_forward(level, tail);
        }
        let levels = match seed {
            Some(seed) => LevelGenerator::with_seed(max_level, seed),
            None => LevelGenerator::new(max_level),
        };
        SkipList {
            arena,
            levels,
            max_level,
            head,
            tail,
            len: AtomicUsize::new(0),
        }
    }

    /// The number of levels above level 0.
    pub fn max_level(&self) -> usize {
        self.max_level
    }

    /// Live entries currently in the list. Exact when the list is quiescent;
    /// during concurrent mutation it trails in-flight commits.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn neighbor_slots(&self) -> Vec<u32> {
        vec![NIL; self.max_level + 1]
    }

    /// Lock-free descent. Fills `preds`/`succs` with, per level, the last
    /// node whose key is below `key` and the first whose key is at or above
    /// it. Returns the highest level at which `key` itself was seen.
    ///
    /// The snapshot is stale the moment it is taken; mutators must
    /// revalidate under locks and call this again after any failure.
    fn find(&self, key: &K, preds: &mut [u32], succs: &mut [u32]) -> Option<usize> {
        let mut found = None;
        let mut pred = self.head;
        for level in (0..=self.max_level).rev() {
            let mut curr = self.arena.node(pred).forward(level);
            while self.arena.node(curr).key().is_less_than(key) {
                pred = curr;
                curr = self.arena.node(pred).forward(level);
            }
            if found.is_none() && self.arena.node(curr).key().equals(key) {
                found = Some(level);
            }
            preds[level] = pred;
            succs[level] = curr;
        }
        found
    }

    /// Insert `key` mapped to `value`. Returns true if a new entry was
    /// created, false if the key is already present (the existing value is
    /// kept).
    ///
    /// May block briefly: on the predecessor locks of the affected levels,
    /// and while a racing insert of the same key finishes linking.
    ///
    /// # Examples
    ///
    /// ```
    /// use skiplane::SkipList;
    ///
    /// let list = SkipList::new(16, 0.5).unwrap();
    /// assert!(list.insert(7, "first".to_string()));
    /// assert!(!list.insert(7, "second".to_string()));
    /// assert_eq!(list.get(&7), Some("first".to_string()));
    /// ```
    pub fn insert(&self, key: K, value: V) -> bool {
        let top_level = self.levels.random_level();
        let mut preds = self.neighbor_slots();
        let mut succs = self.neighbor_slots();
        loop {
            if let Some(found_level) = self.find(&key, &mut preds, &mut succs) {
                let existing = self.arena.node(succs[found_level]);
                if !existing.is_marked() {
                    // Present, possibly still being wired in by a racing
                    // insert; report it only once it is fully visible.
                    existing.wait_fully_linked();
                    return false;
                }
                // Marked by an in-flight remove; retry until it unlinks.
                continue;
            }

            let mut guards: Vec<(u32, MutexGuard<'_, ()>)> = Vec::with_capacity(top_level + 1);
            let mut valid = true;
            for level in 0..=top_level {
                let pred = preds[level];
                let succ = succs[level];
                if !guards.iter().any(|(locked, _)| *locked == pred) {
                    guards.push((pred, self.arena.node(pred).lock()));
                }
                let pred_node = self.arena.node(pred);
                let succ_node = self.arena.node(succ);
                valid = !pred_node.is_marked()
                    && !succ_node.is_marked()
                    && pred_node.forward(level) == succ;
                if !valid {
                    break;
                }
            }
            if !valid {
                // Neighborhood changed under us; drop this attempt's locks
                // and start over from a fresh descent.
                continue;
            }

            let index = self.arena.alloc(Node::data(key, value, top_level));
            let new_node = self.arena.node(index);
            // Wire the new node's own links first: a lock-free reader that
            // reaches it through a predecessor must find complete forwards.
            for level in 0..=top_level {
                new_node.set_forward(level, succs[level]);
            }
            for level in 0..=top_level {
                self.arena.node(preds[level]).set_forward(level, index);
            }
            new_node.set_fully_linked();
            self.len.fetch_add(1, Ordering::AcqRel);
            return true;
        }
    }

    /// Look up `key` and clone its value if a live entry holds it.
    ///
    /// Lock-free and non-blocking: one optimistic descent, then one
    /// physical re-descent to level 0, then the visibility check against
    /// `fully_linked`/`marked`. Never retries.
    ///
    /// # Examples
    ///
    /// ```
    /// use skiplane::SkipList;
    ///
    /// let list = SkipList::new(16, 0.5).unwrap();
    /// list.insert(3, "three".to_string());
    /// assert_eq!(list.get(&3), Some("three".to_string()));
    /// assert_eq!(list.get(&4), None);
    /// ```
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let index = self.locate_live(key)?;
        self.arena.node(index).value().cloned()
    }

    /// True if a live entry currently holds `key`. Same protocol as
    /// [`SkipList::get`] without cloning the value.
    pub fn contains_key(&self, key: &K) -> bool {
        self.locate_live(key).is_some()
    }

    fn locate_live(&self, key: &K) -> Option<u32> {
        let mut preds = self.neighbor_slots();
        let mut succs = self.neighbor_slots();
        self.find(key, &mut preds, &mut succs)?;

        // The descent's snapshot may already be stale; re-walk down to the
        // first level-0 node at or past the key before judging visibility.
        let mut pred = self.head;
        for level in (0..=self.max_level).rev() {
            let mut curr = self.arena.node(pred).forward(level);
            while self.arena.node(curr).key().is_less_than(key) {
                pred = curr;
                curr = self.arena.node(pred).forward(level);
            }
        }
        let candidate = self.arena.node(pred).forward(0);
        let node = self.arena.node(candidate);
        if node.key().equals(key) && node.is_fully_linked() && !node.is_marked() {
            Some(candidate)
        } else {
            None
        }
    }

    /// Remove the entry for `key`. Returns true iff this call took a live,
    /// fully-present entry out of the list.
    ///
    /// A candidate is only removable when the descent saw it first at its
    /// own top level, meaning its whole tower is in place. Once this call
    /// marks the victim, the mark (and the victim's lock) persist across
    /// validation retries, so no racer can re-insert the key or still
    /// report it present.
    ///
    /// # Examples
    ///
    /// ```
    /// use skiplane::SkipList;
    ///
    /// let list = SkipList::new(16, 0.5).unwrap();
    /// list.insert(9, "nine".to_string());
    /// assert!(list.remove(&9));
    /// assert!(!list.remove(&9));
    /// ```
    pub fn remove(&self, key: &K) -> bool {
        let mut preds = self.neighbor_slots();
        let mut succs = self.neighbor_slots();
        let mut victim = NIL;
        let mut unlink_height = 0;
        let mut victim_guard: Option<MutexGuard<'_, ()>> = None;
        loop {
            let found = self.find(key, &mut preds, &mut succs);

            if victim_guard.is_none() {
                let Some(found_level) = found else {
                    return false;
                };
                let candidate = succs[found_level];
                let node = self.arena.node(candidate);
                // Fully present means: seen at its own top level, linked
                // everywhere, and not claimed by another remove.
                if !(node.is_fully_linked()
                    && node.top_level() == found_level
                    && !node.is_marked())
                {
                    return false;
                }
                let guard = node.lock();
                if node.is_marked() {
                    // Lost the race to a concurrent remove.
                    return false;
                }
                node.set_marked();
                victim = candidate;
                unlink_height = node.top_level();
                victim_guard = Some(guard);
            }

            let mut guards: Vec<(u32, MutexGuard<'_, ()>)> =
                Vec::with_capacity(unlink_height + 1);
            let mut valid = true;
            for level in 0..=unlink_height {
                let pred = preds[level];
                if !guards.iter().any(|(locked, _)| *locked == pred) {
                    guards.push((pred, self.arena.node(pred).lock()));
                }
                let pred_node = self.arena.node(pred);
                valid = !pred_node.is_marked() && pred_node.forward(level) == victim;
                if !valid {
                    break;
                }
            }
            if !valid {
                // Predecessors moved; retry with fresh neighbors. The mark
                // set above keeps the victim logically gone meanwhile.
                continue;
            }

            let victim_node = self.arena.node(victim);
            // Unlink top-down so the node stays reachable from below until
            // its taller links are gone.
            for level in (0..=unlink_height).rev() {
                self.arena
                    .node(preds[level])
                    .set_forward(level, victim_node.forward(level));
            }
            self.len.fetch_sub(1, Ordering::AcqRel);
            return true;
        }
    }

    /// Collect every entry with key in `[start, end]` into an ordered map.
    ///
    /// Returns an empty map when `start > end`. Lock-free, and deliberately
    /// weaker than [`SkipList::get`]: scanned nodes are not checked against
    /// `marked`/`fully_linked`, so a scan racing a mutation may include an
    /// entry mid-removal or mid-insertion. Each key appears at most once.
    ///
    /// # Examples
    ///
    /// ```
    /// use skiplane::SkipList;
    ///
    /// let list = SkipList::new(16, 0.5).unwrap();
    /// for key in 1..=5 {
    ///     list.insert(key, key.to_string());
    /// }
    /// let mid = list.range(&2, &4);
    /// assert_eq!(mid.keys().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
    /// assert!(list.range(&4, &2).is_empty());
    /// ```
    pub fn range(&self, start: &K, end: &K) -> BTreeMap<K, V>
    where
        K: Clone,
        V: Clone,
    {
        let mut results = BTreeMap::new();
        if start > end {
            return results;
        }

        let mut pred = self.head;
        for level in (0..=self.max_level).rev() {
            loop {
                let next = self.arena.node(pred).forward(level);
                if !self.arena.node(next).key().is_less_than(start) {
                    break;
                }
                self.collect_if_in_range(pred, start, end, &mut results);
                pred = next;
            }
        }

        // Sweep the base level from the last node below `start` until the
        // keys pass `end`.
        let mut curr = pred;
        loop {
            let node = self.arena.node(curr);
            if node.key().exceeds(end) {
                break;
            }
            self.collect_if_in_range(curr, start, end, &mut results);
            curr = node.forward(0);
        }
        results
    }

    fn collect_if_in_range(
        &self,
        index: u32,
        start: &K,
        end: &K,
        results: &mut BTreeMap<K, V>,
    ) where
        K: Clone,
        V: Clone,
    {
        let node = self.arena.node(index);
        let Some(key) = node.key().as_key() else {
            return;
        };
        if key < start || key > end {
            return;
        }
        let Some(value) = node.value() else {
            return;
        };
        // First sighting wins; a key revisited by the base sweep after the
        // descent keeps its original value.
        results.entry(key.clone()).or_insert_with(|| value.clone());
    }

    /// Print the key sequence of each populated level to stdout.
    ///
    /// Diagnostic only. Levels holding just the two sentinels are skipped,
    /// and the dump stops after a level that is down to a single data
    /// entry, since everything above it repeats the same tail.
    pub fn display(&self)
    where
        K: fmt::Debug,
    {
        for level in 0..=self.max_level {
            if self.arena.node(self.head).forward(level) == self.tail {
                continue;
            }
            let mut line = String::new();
            let mut printed = 0usize;
            let mut curr = self.head;
            loop {
                let node = self.arena.node(curr);
                if !line.is_empty() {
                    line.push_str(" -> ");
                }
                line.push_str(&format!("{:?}", node.key()));
                printed += 1;
                if curr == self.tail {
                    break;
                }
                curr = node.forward(level);
            }
            println!("Level {}: {}", level, line);
            if printed == 3 {
                break;
            }
        }
        println!("----------");
    }
}

impl<K, V> fmt::Debug for SkipList<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SkipList")
            .field("len", &self.len.load(Ordering::Acquire))
            .field("max_level", &self.max_level)
            .finish_non_exhaustive()
    }
}
