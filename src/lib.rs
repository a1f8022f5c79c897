// Allow lints that fight the byte-slice and builder style used throughout
#![allow(
    clippy::len_without_is_empty,
    clippy::manual_range_contains,
    clippy::needless_return
)]

/// Use mimalloc as the global allocator for all binaries.
/// Dedup sets allocate one small Vec per record; mimalloc's thread-local
/// caches keep that cheap across the worker pool.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod common;
pub mod error;
pub mod extsort;
pub mod fanout;
pub mod merge;
pub mod scheduler;
pub mod shard;

pub use error::{Error, Result};
pub use merge::{MergeConfig, MergeSummary, Merger};
