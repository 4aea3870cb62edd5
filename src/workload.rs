//! Workload generation and parallel execution helpers for driving an
//! ordered index from many threads, with per-phase timing reports.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use rayon::prelude::*;

use crate::skiplist::OrderedIndex;

/// Parameters shaping a generated workload.
#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    /// Keys run from 1 up to and including this value.
    pub max_key: i64,
    /// Worker threads the runners will spawn.
    pub num_threads: usize,
    /// Seed for the workload's own key sampling.
    pub seed: u64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        WorkloadConfig {
            max_key: 1000,
            num_threads: num_cpus::get(),
            seed: 0x5EED,
        }
    }
}

/// A generated set of operations to replay against an index.
#[derive(Debug, Clone)]
pub struct Workload {
    /// Keys to insert, in execution order.
    pub inserts: Vec<i64>,
    /// Keys to remove after the inserts land.
    pub removes: Vec<i64>,
    /// Keys to look up.
    pub lookups: Vec<i64>,
    /// Inclusive `(start, end)` spans to scan, one per worker.
    pub ranges: Vec<(i64, i64)>,
}

impl Workload {
    /// Uniform workload: every key once, with remove and lookup subsets
    /// sampled at roughly one key in four, and one bounded range span per
    /// worker. Deterministic for a given seed.
    pub fn generate(config: &WorkloadConfig) -> Workload {
        let mut rng = KeyRng::new(config.seed);
        let max_key = config.max_key.max(1);
        let inserts: Vec<i64> = (1..=max_key).collect();

        let mut removes = Vec::new();
        let mut lookups = Vec::new();
        for &key in &inserts {
            if rng.below(4) == 0 {
                removes.push(key);
            }
            if rng.below(4) == 0 {
                lookups.push(key);
            }
        }

        let mut ranges = Vec::new();
        for _ in 0..config.num_threads.max(1) {
            let start = rng.below(max_key as u64) as i64 + 1;
            let width = rng.below((max_key - start + 1) as u64) as i64;
            ranges.push((start, start + width));
        }

        Workload {
            inserts,
            removes,
            lookups,
            ranges,
        }
    }

    /// Adversarial workload: every phase hammers a band of just
    /// `2 * num_threads` keys, so most operations collide with each other.
    pub fn high_contention(config: &WorkloadConfig) -> Workload {
        let mut rng = KeyRng::new(config.seed);
        let band = (config.num_threads.max(1) * 2) as i64;
        let ops = config.max_key.max(1) as usize;

        let mut inserts = Vec::with_capacity(ops);
        let mut removes = Vec::with_capacity(ops);
        let mut lookups = Vec::with_capacity(ops);
        for _ in 0..ops {
            inserts.push(rng.below(band as u64) as i64 + 1);
            removes.push(rng.below(band as u64) as i64 + 1);
            lookups.push(rng.below(band as u64) as i64 + 1);
        }
        let ranges = vec![(1, band); config.num_threads.max(1)];

        Workload {
            inserts,
            removes,
            lookups,
            ranges,
        }
    }

    /// Low-contention workload: keys stay in per-worker stripes, so with
    /// matching thread counts each runner chunk (and each range span)
    /// touches only its own stripe.
    pub fn partitioned(config: &WorkloadConfig) -> Workload {
        let mut rng = KeyRng::new(config.seed);
        let threads = config.num_threads.max(1) as i64;
        let max_key = config.max_key.max(threads);
        let stripe = max_key / threads;

        let inserts: Vec<i64> = (1..=max_key).collect();
        let mut removes = Vec::new();
        let mut lookups = Vec::new();
        for &key in &inserts {
            if rng.below(4) == 0 {
                removes.push(key);
            }
            if rng.below(4) == 0 {
                lookups.push(key);
            }
        }

        let mut ranges = Vec::new();
        for t in 0..threads {
            let lo = t * stripe + 1;
            let hi = if t == threads - 1 { max_key } else { (t + 1) * stripe };
            ranges.push((lo, hi));
        }

        Workload {
            inserts,
            removes,
            lookups,
            ranges,
        }
    }
}

/// Timing summary of one executed phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpReport {
    /// Wall time from first spawn to last join.
    pub elapsed: Duration,
    /// Operations attempted.
    pub attempted: usize,
    /// Operations that reported success (created, removed, found, or for
    /// scans: returned at least one entry).
    pub succeeded: usize,
}

impl OpReport {
    /// Attempted operations per second; zero when nothing ran.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.attempted as f64 / secs
        } else {
            0.0
        }
    }
}

/// Per-phase reports from a combined run.
#[derive(Debug, Clone, Copy)]
pub struct CombinedReport {
    pub inserts: OpReport,
    pub removes: OpReport,
    pub lookups: OpReport,
    pub ranges: OpReport,
}

/// Insert every key, valued with its decimal form, across `num_threads`
/// workers released together.
pub fn run_inserts<I>(index: &Arc<I>, keys: &[i64], num_threads: usize) -> OpReport
where
    I: OrderedIndex<i64, String> + Send + Sync + 'static,
{
    run_phase(index, keys, num_threads, |index, key| {
        index.insert(key, key.to_string())
    })
}

/// Remove every key across `num_threads` workers.
pub fn run_removes<I>(index: &Arc<I>, keys: &[i64], num_threads: usize) -> OpReport
where
    I: OrderedIndex<i64, String> + Send + Sync + 'static,
{
    run_phase(index, keys, num_threads, |index, key| index.remove(&key))
}

/// Look up every key across `num_threads` workers; a hit counts as success.
pub fn run_lookups<I>(index: &Arc<I>, keys: &[i64], num_threads: usize) -> OpReport
where
    I: OrderedIndex<i64, String> + Send + Sync + 'static,
{
    run_phase(index, keys, num_threads, |index, key| {
        index.get(&key).is_some()
    })
}

/// Scan every span across `num_threads` workers; a non-empty result counts
/// as success.
pub fn run_ranges<I>(index: &Arc<I>, spans: &[(i64, i64)], num_threads: usize) -> OpReport
where
    I: OrderedIndex<i64, String> + Send + Sync + 'static,
{
    run_spans(index, spans, num_threads, |index, (start, end)| {
        !index.range(&start, &end).is_empty()
    })
}

/// Run all four phases of a workload at once, a quarter of the workers
/// each, mirroring a mixed production load.
pub fn run_combined<I>(index: &Arc<I>, workload: &Workload, num_threads: usize) -> CombinedReport
where
    I: OrderedIndex<i64, String> + Send + Sync + 'static,
{
    let group = (num_threads / 4).max(1);

    let insert_task = {
        let index = Arc::clone(index);
        let keys = workload.inserts.clone();
        thread::spawn(move || run_inserts(&index, &keys, group))
    };
    let remove_task = {
        let index = Arc::clone(index);
        let keys = workload.removes.clone();
        thread::spawn(move || run_removes(&index, &keys, group))
    };
    let lookup_task = {
        let index = Arc::clone(index);
        let keys = workload.lookups.clone();
        thread::spawn(move || run_lookups(&index, &keys, group))
    };
    let range_task = {
        let index = Arc::clone(index);
        let spans = workload.ranges.clone();
        thread::spawn(move || run_ranges(&index, &spans, group))
    };

    CombinedReport {
        inserts: insert_task.join().expect("insert phase panicked"),
        removes: remove_task.join().expect("remove phase panicked"),
        lookups: lookup_task.join().expect("lookup phase panicked"),
        ranges: range_task.join().expect("range phase panicked"),
    }
}

/// Bulk-load keys through rayon's thread pool, for test and benchmark
/// setup paths that just need the index populated fast.
pub fn par_fill<I>(index: &I, keys: &[i64])
where
    I: OrderedIndex<i64, String> + Sync,
{
    keys.par_iter().for_each(|&key| {
        index.insert(key, key.to_string());
    });
}

fn run_phase<I>(
    index: &Arc<I>,
    keys: &[i64],
    num_threads: usize,
    op: fn(&I, i64) -> bool,
) -> OpReport
where
    I: OrderedIndex<i64, String> + Send + Sync + 'static,
{
    let chunks: Vec<Vec<i64>> = split_chunks(keys, num_threads);
    let started = Instant::now();
    // Size the barrier to the chunks actually spawned, not the requested
    // thread count, or a short key set would strand the workers.
    let barrier = Arc::new(Barrier::new(chunks.len().max(1)));

    let mut handles = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let index = Arc::clone(index);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            let mut succeeded = 0usize;
            for key in chunk {
                if op(&index, key) {
                    succeeded += 1;
                }
            }
            succeeded
        }));
    }

    let mut succeeded = 0usize;
    for handle in handles {
        succeeded += handle.join().expect("worker thread panicked");
    }
    OpReport {
        elapsed: started.elapsed(),
        attempted: keys.len(),
        succeeded,
    }
}

fn run_spans<I>(
    index: &Arc<I>,
    spans: &[(i64, i64)],
    num_threads: usize,
    op: fn(&I, (i64, i64)) -> bool,
) -> OpReport
where
    I: OrderedIndex<i64, String> + Send + Sync + 'static,
{
    let chunks: Vec<Vec<(i64, i64)>> = split_chunks(spans, num_threads);
    let started = Instant::now();
    let barrier = Arc::new(Barrier::new(chunks.len().max(1)));

    let mut handles = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let index = Arc::clone(index);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            let mut succeeded = 0usize;
            for span in chunk {
                if op(&index, span) {
                    succeeded += 1;
                }
            }
            succeeded
        }));
    }

    let mut succeeded = 0usize;
    for handle in handles {
        succeeded += handle.join().expect("worker thread panicked");
    }
    OpReport {
        elapsed: started.elapsed(),
        attempted: spans.len(),
        succeeded,
    }
}

fn split_chunks<T: Clone>(items: &[T], num_threads: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    let chunk_size = items.len().div_ceil(num_threads.max(1));
    items.chunks(chunk_size).map(|c| c.to_vec()).collect()
}

/// Sequential xorshift for sampling workload keys.
struct KeyRng(u64);

impl KeyRng {
    fn new(seed: u64) -> Self {
        KeyRng(seed.max(1))
    }

    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn below(&mut self, bound: u64) -> u64 {
        self.next() % bound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_is_deterministic_per_seed() {
        let config = WorkloadConfig {
            max_key: 200,
            num_threads: 4,
            seed: 99,
        };
        let a = Workload::generate(&config);
        let b = Workload::generate(&config);
        assert_eq!(a.inserts, b.inserts);
        assert_eq!(a.removes, b.removes);
        assert_eq!(a.lookups, b.lookups);
        assert_eq!(a.ranges, b.ranges);
    }

    #[test]
    fn generated_keys_and_spans_stay_in_bounds() {
        let config = WorkloadConfig {
            max_key: 150,
            num_threads: 3,
            seed: 7,
        };
        let workload = Workload::generate(&config);
        assert_eq!(workload.inserts.len(), 150);
        assert!(workload.removes.iter().all(|k| (1..=150).contains(k)));
        assert!(workload.lookups.iter().all(|k| (1..=150).contains(k)));
        assert_eq!(workload.ranges.len(), 3);
        for &(start, end) in &workload.ranges {
            assert!(start >= 1 && end <= 150 && start <= end);
        }
        // Sampling at one in four should land well inside these bounds.
        assert!(workload.removes.len() < 100);
        assert!(!workload.removes.is_empty());
    }

    #[test]
    fn high_contention_stays_inside_the_band() {
        let config = WorkloadConfig {
            max_key: 400,
            num_threads: 4,
            seed: 11,
        };
        let workload = Workload::high_contention(&config);
        let band = 8;
        assert!(workload.inserts.iter().all(|k| (1..=band).contains(k)));
        assert!(workload.removes.iter().all(|k| (1..=band).contains(k)));
        assert!(workload.lookups.iter().all(|k| (1..=band).contains(k)));
    }

    #[test]
    fn partitioned_spans_tile_the_key_space() {
        let config = WorkloadConfig {
            max_key: 100,
            num_threads: 4,
            seed: 5,
        };
        let workload = Workload::partitioned(&config);
        assert_eq!(
            workload.ranges,
            vec![(1, 25), (26, 50), (51, 75), (76, 100)]
        );
    }

    #[test]
    fn chunking_never_outnumbers_the_items() {
        let chunks = split_chunks(&[1i64, 2, 3], 8);
        assert_eq!(chunks.len(), 3);
        let empty: Vec<Vec<i64>> = split_chunks(&[], 8);
        assert!(empty.is_empty());
        let even = split_chunks(&(0i64..100).collect::<Vec<_>>(), 4);
        assert_eq!(even.len(), 4);
        assert!(even.iter().all(|c| c.len() == 25));
    }
}
