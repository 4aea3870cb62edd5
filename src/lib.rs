// Re-export the index types and the workload helpers at the crate root
pub mod skiplist;
pub mod workload;

pub use skiplist::{
    AsyncSkipList, AsyncStringSkipList, OrderedIndex, SkipList, SkipListError, MAX_LEVELS,
};
pub use workload::{CombinedReport, OpReport, Workload, WorkloadConfig};
