//! Streams combolists into the shard tree one bounded window at a time.
//!
//! Each window is record-aligned: the partial record after its last newline
//! is carried over and prepended to the next read. Every leaf gets its own
//! task that appends the window's matching records, and the next window is
//! read only after a barrier confirms all leaves absorbed the current one.
use std::collections::HashSet;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};

use crate::common::io::{append_writer, open_input, read_full};
use crate::common::{TERMINATOR, is_blank, records};
use crate::error::{Error, Result};
use crate::scheduler::{CancelToken, TaskScheduler};
use crate::shard::{ShardLeaf, ShardTree};

/// Records routed between cancellation checks.
const CANCEL_CHECK_INTERVAL: usize = 4096;

/// Per-input counters reported after ingestion.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub bytes: u64,
    pub windows: usize,
}

/// Drop repeated path strings, keeping the first occurrence of each.
/// Two spellings of the same file are not collapsed.
pub fn dedup_paths<P: AsRef<Path>>(paths: &[P]) -> Vec<PathBuf> {
    let mut seen: HashSet<OsString> = HashSet::with_capacity(paths.len());
    paths
        .iter()
        .map(|p| p.as_ref())
        .filter(|p| seen.insert(p.as_os_str().to_os_string()))
        .map(Path::to_path_buf)
        .collect()
}

/// Append every record of `window` that belongs to `leaf`. The leaf file is
/// only opened once a match is found.
pub(crate) fn append_matching(
    leaf: &ShardLeaf,
    window: &[u8],
    token: &CancelToken,
) -> Result<usize> {
    let mut writer = None;
    let mut written = 0usize;
    for (i, record) in records(window).enumerate() {
        if i % CANCEL_CHECK_INTERVAL == 0 {
            token.check()?;
        }
        if is_blank(record) || !leaf.address.matches(record) {
            continue;
        }
        if writer.is_none() {
            writer = Some(append_writer(&leaf.path)?);
        }
        if let Some(w) = writer.as_mut() {
            w.write_all(record)
                .and_then(|_| w.write_all(&[TERMINATOR]))
                .map_err(|e| Error::disk(&leaf.path, e))?;
            written += 1;
        }
    }
    if let Some(mut w) = writer {
        w.flush().map_err(|e| Error::disk(&leaf.path, e))?;
    }
    Ok(written)
}

pub struct FanOutWriter<'a> {
    tree: &'a ShardTree,
    scheduler: &'a TaskScheduler,
    ram_budget: usize,
    task_deadline: Option<Duration>,
}

impl<'a> FanOutWriter<'a> {
    pub fn new(tree: &'a ShardTree, scheduler: &'a TaskScheduler, ram_budget: usize) -> Self {
        FanOutWriter {
            tree,
            scheduler,
            ram_budget: ram_budget.max(1),
            task_deadline: None,
        }
    }

    /// Bound how long each window's barrier may wait.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.task_deadline = deadline;
        self
    }

    fn barrier(&self) -> Result<()> {
        match self.task_deadline {
            Some(deadline) => self.scheduler.barrier_timeout(deadline),
            None => self.scheduler.barrier(),
        }
    }

    /// Route one record-aligned window to every leaf and wait for all of
    /// them to finish appending.
    pub fn write_chunk_to_all_leaves(&self, window: Vec<u8>) -> Result<()> {
        let window: Arc<[u8]> = window.into();
        let leaves = self.tree.enumerate_leaves()?;
        debug!(
            "dispatching {} byte window to {} leaves",
            window.len(),
            leaves.len()
        );
        for leaf in leaves {
            let window = Arc::clone(&window);
            self.scheduler.submit(move |token| {
                let n = append_matching(&leaf, &window, token)?;
                if n > 0 {
                    debug!("appended {} records to {}", n, leaf.address);
                }
                Ok(())
            });
        }
        self.barrier()
    }

    /// Stream one combolist through the tree in `ram_budget`-sized windows.
    pub fn ingest(&self, path: &Path) -> Result<IngestStats> {
        let mut file = open_input(path)?;
        let mut buf = vec![0u8; self.ram_budget];
        let mut leftover: Vec<u8> = Vec::new();
        let mut stats = IngestStats::default();

        loop {
            let n = read_full(&mut file, &mut buf).map_err(|e| Error::unreadable(path, e))?;
            if n == 0 {
                break;
            }
            stats.bytes += n as u64;

            let mut window = std::mem::take(&mut leftover);
            window.extend_from_slice(&buf[..n]);
            match memchr::memrchr(TERMINATOR, &window) {
                Some(pos) => {
                    leftover = window.split_off(pos + 1);
                    self.write_chunk_to_all_leaves(window)?;
                    stats.windows += 1;
                }
                // No newline yet: a record longer than the window keeps growing.
                None => leftover = window,
            }
        }

        if !leftover.is_empty() {
            self.write_chunk_to_all_leaves(leftover)?;
            stats.windows += 1;
        }
        Ok(stats)
    }

    /// Ingest each distinct path string in order.
    pub fn merge<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Vec<IngestStats>> {
        let mut all = Vec::new();
        for path in dedup_paths(paths) {
            info!("merging {}", path.display());
            let stats = self.ingest(&path)?;
            info!(
                "combolist {} complete: {} bytes in {} window(s)",
                path.display(),
                stats.bytes,
                stats.windows
            );
            all.push(stats);
        }
        Ok(all)
    }
}
