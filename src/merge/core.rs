//! Top-level driver: fan every combolist out into the shard tree, then
//! sort and deduplicate every leaf in parallel.
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};

use crate::common::io::open_input;
use crate::error::{Error, Result};
use crate::extsort::ExternalSorter;
use crate::fanout::{FanOutWriter, dedup_paths};
use crate::scheduler::{CancelToken, TaskScheduler};
use crate::shard::{ShardTree, resolve_data_dir};

/// 10MB: governs both window size and sort spill thresholds.
pub const DEFAULT_RAM_BUDGET: usize = 10 * 1024 * 1024;

/// Configuration for a merge.
#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// Compilation directory; leaves live in its `data` subdirectory.
    pub compilation: PathBuf,
    /// Bytes per window and per in-memory dedup set.
    pub ram_budget: usize,
    /// Worker threads; `None` uses host parallelism.
    pub threads: Option<usize>,
    /// Upper bound on each barrier wait.
    pub task_deadline: Option<Duration>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        MergeConfig {
            compilation: PathBuf::from("."),
            ram_budget: DEFAULT_RAM_BUDGET,
            threads: None,
            task_deadline: None,
        }
    }
}

/// What a successful merge did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergeSummary {
    pub inputs: usize,
    pub bytes: u64,
    pub windows: usize,
    pub leaves: usize,
}

/// Parse a size string like "10K", "1M", "1G".
pub fn parse_size(s: &str) -> std::result::Result<usize, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size".to_string());
    }

    let (num_part, suffix) = if s.ends_with(|c: char| c.is_ascii_alphabetic()) {
        let (n, s) = s.split_at(s.len() - 1);
        (n, s.chars().next())
    } else {
        (s, None)
    };

    let base: usize = num_part
        .parse()
        .map_err(|_| format!("invalid size: {}", s))?;

    let multiplier = match suffix {
        Some('K') | Some('k') => 1024,
        Some('M') | Some('m') => 1024 * 1024,
        Some('G') | Some('g') => 1024 * 1024 * 1024,
        Some('T') | Some('t') => 1024usize.pow(4),
        Some('b') => 512,
        Some(c) => return Err(format!("invalid suffix '{}' in size", c)),
        None => 1,
    };

    base.checked_mul(multiplier)
        .ok_or_else(|| format!("size too large: {}", s))
}

/// `<leaf>.tmp`, the sort target that is renamed over the leaf.
fn temp_path(leaf: &Path) -> PathBuf {
    let mut name: OsString = leaf.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Sort one leaf into its temp file, then atomically rename it into place.
fn finalize_leaf(leaf: &Path, ram_budget: usize, token: &CancelToken) -> Result<()> {
    let tmp = temp_path(leaf);
    ExternalSorter::new(leaf, ram_budget)
        .with_cancel(token.clone())
        .sort(&tmp)?;
    fs::rename(&tmp, leaf).map_err(|e| Error::disk(leaf, e))?;
    debug!("sorted {}", leaf.display());
    Ok(())
}

/// Owns the shard tree and the worker pool for the duration of a merge.
pub struct Merger {
    config: MergeConfig,
    tree: ShardTree,
    scheduler: TaskScheduler,
}

impl Merger {
    /// Resolve and bootstrap the data directory and start the worker pool.
    pub fn new(config: MergeConfig) -> Result<Merger> {
        if config.ram_budget == 0 {
            return Err(Error::InvalidConfig("RAM budget must be positive".into()));
        }
        let tree = ShardTree::bootstrap(resolve_data_dir(&config.compilation))?;
        let scheduler = TaskScheduler::new(config.threads)?;
        info!(
            "compilation at {} ({} workers, {} byte budget)",
            tree.root().display(),
            scheduler.threads(),
            config.ram_budget
        );
        Ok(Merger {
            config,
            tree,
            scheduler,
        })
    }

    pub fn tree(&self) -> &ShardTree {
        &self.tree
    }

    fn barrier(&self) -> Result<()> {
        match self.config.task_deadline {
            Some(deadline) => self.scheduler.barrier_timeout(deadline),
            None => self.scheduler.barrier(),
        }
    }

    /// Merge every distinct input path into the compilation and leave each
    /// leaf sorted and deduplicated.
    pub fn merge_combolists<P: AsRef<Path>>(&self, inputs: &[P]) -> Result<MergeSummary> {
        let inputs = dedup_paths(inputs);
        let root = fs::canonicalize(self.tree.root())
            .map_err(|e| Error::unreadable(self.tree.root(), e))?;
        // Fail on an unreadable input before any leaf is modified. An input
        // inside the data directory would be appended to while it is read.
        for input in &inputs {
            open_input(input)?;
            let resolved = fs::canonicalize(input).map_err(|e| Error::unreadable(input, e))?;
            if resolved.starts_with(&root) {
                return Err(Error::InvalidConfig(format!(
                    "{} lies inside the compilation data directory",
                    input.display()
                )));
            }
        }

        let fanout = FanOutWriter::new(&self.tree, &self.scheduler, self.config.ram_budget)
            .with_deadline(self.config.task_deadline);
        let stats = fanout.merge(inputs.as_slice())?;

        info!("sorting leaves...");
        let leaves = self.finalize_all()?;
        info!("all {} leaves sorted", leaves);

        Ok(MergeSummary {
            inputs: stats.len(),
            bytes: stats.iter().map(|s| s.bytes).sum(),
            windows: stats.iter().map(|s| s.windows).sum(),
            leaves,
        })
    }

    /// Sort every leaf in place, one task per leaf. Returns the leaf count.
    pub fn finalize_all(&self) -> Result<usize> {
        let leaves = self.tree.enumerate_leaves()?;
        let count = leaves.len();
        let ram_budget = self.config.ram_budget;
        for leaf in leaves {
            self.scheduler
                .submit(move |token| finalize_leaf(&leaf.path, ram_budget, token));
        }
        self.barrier()?;
        Ok(count)
    }
}
