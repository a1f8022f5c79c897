//! Bounded-memory deduplicating external sort of one record file.
//!
//! Phase 1 streams the source into a set of unique records and spills it as
//! a sorted run whenever its byte size reaches the RAM budget. Phase 2 merges
//! the runs with a heap and deduplicates the merged stream through a second
//! bounded set, appending each sorted flush to the output.
use std::collections::HashSet;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use log::debug;
use rayon::prelude::*;

use super::merge::RunMerger;
use crate::common::io::{append_writer, open_reader, remove, truncate};
use crate::common::{TERMINATOR, is_blank};
use crate::error::{Error, Result};
use crate::scheduler::CancelToken;

/// Sets larger than this are sorted with rayon's parallel pdqsort.
const PARALLEL_SORT_THRESHOLD: usize = 10_000;

/// Records processed between cancellation checks.
const CANCEL_CHECK_INTERVAL: usize = 4096;

/// Sort and write a set of records, terminating each with a newline.
/// Returns the greatest record written, or `None` for an empty set.
fn write_sorted(path: &Path, set: &mut HashSet<Vec<u8>>) -> Result<Option<Vec<u8>>> {
    let mut records: Vec<Vec<u8>> = set.drain().collect();
    if records.len() > PARALLEL_SORT_THRESHOLD {
        records.par_sort_unstable();
    } else {
        records.sort_unstable();
    }

    let mut writer = append_writer(path)?;
    for record in &records {
        writer
            .write_all(record)
            .and_then(|_| writer.write_all(&[TERMINATOR]))
            .map_err(|e| Error::disk(path, e))?;
    }
    writer.flush().map_err(|e| Error::disk(path, e))?;
    Ok(records.pop())
}

/// Size charged against the budget for one record.
#[inline]
fn footprint(record: &[u8]) -> usize {
    record.len() + 1
}

pub struct ExternalSorter {
    source: PathBuf,
    ram_budget: usize,
    runs: Vec<PathBuf>,
    cancel: Option<CancelToken>,
}

impl ExternalSorter {
    pub fn new(source: impl Into<PathBuf>, ram_budget: usize) -> Self {
        ExternalSorter {
            source: source.into(),
            ram_budget: ram_budget.max(1),
            runs: Vec::new(),
            cancel: None,
        }
    }

    /// Abort with `Error::Cancelled` once `token` trips.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Runs written by phase 1 and not yet removed.
    pub fn runs(&self) -> &[PathBuf] {
        &self.runs
    }

    /// `<source>.<n>.run`, numbered from 1.
    fn run_path(&self, index: usize) -> PathBuf {
        let mut name = self.source.clone().into_os_string();
        name.push(format!(".{}.run", index));
        PathBuf::from(name)
    }

    #[inline]
    fn checkpoint(&self, processed: usize) -> Result<()> {
        match &self.cancel {
            Some(token) if processed % CANCEL_CHECK_INTERVAL == 0 => token.check(),
            _ => Ok(()),
        }
    }

    fn spill(&mut self, set: &mut HashSet<Vec<u8>>) -> Result<()> {
        let path = self.run_path(self.runs.len() + 1);
        // A crashed earlier sort may have left a run under this name.
        truncate(&path)?;
        let records = set.len();
        write_sorted(&path, set)?;
        debug!("spilled {} records to {}", records, path.display());
        self.runs.push(path);
        Ok(())
    }

    /// Split the source into sorted, locally deduplicated runs.
    pub fn phase1(&mut self) -> Result<()> {
        let mut reader = open_reader(&self.source)?;
        let mut unique: HashSet<Vec<u8>> = HashSet::new();
        let mut used = 0usize;
        let mut processed = 0usize;
        let mut line = Vec::with_capacity(256);

        loop {
            line.clear();
            let n = reader
                .read_until(TERMINATOR, &mut line)
                .map_err(|e| Error::unreadable(&self.source, e))?;
            if n == 0 {
                break;
            }
            if line.last() == Some(&TERMINATOR) {
                line.pop();
            }
            if is_blank(&line) {
                continue;
            }
            processed += 1;
            self.checkpoint(processed)?;

            if unique.contains(line.as_slice()) {
                continue;
            }
            used += footprint(&line);
            unique.insert(line.clone());
            if used >= self.ram_budget {
                self.spill(&mut unique)?;
                used = 0;
            }
        }

        if !unique.is_empty() {
            self.spill(&mut unique)?;
        }
        Ok(())
    }

    /// Merge every run into `output` in sorted order without duplicates.
    /// `output` is truncated first, then appended to one bounded flush at a
    /// time.
    pub fn phase2(&mut self, output: &Path) -> Result<()> {
        truncate(output)?;
        let mut merger = RunMerger::open(&self.runs)?;
        let mut pending: HashSet<Vec<u8>> = HashSet::new();
        let mut used = 0usize;
        let mut processed = 0usize;
        // The stream is sorted, so a repeat of an already flushed record can
        // only be the greatest record of the latest flush.
        let mut last_flushed: Option<Vec<u8>> = None;

        while let Some(record) = merger.next_record()? {
            processed += 1;
            self.checkpoint(processed)?;
            if last_flushed.as_deref() == Some(record.as_slice()) || pending.contains(&record) {
                continue;
            }
            used += footprint(&record);
            pending.insert(record);
            if used >= self.ram_budget {
                last_flushed = write_sorted(output, &mut pending)?;
                used = 0;
            }
        }

        if !pending.is_empty() {
            write_sorted(output, &mut pending)?;
        }
        Ok(())
    }

    /// Sort and deduplicate the source into `output`, then delete the runs.
    /// On failure the runs written so far stay on disk.
    pub fn sort(&mut self, output: &Path) -> Result<()> {
        self.phase1()?;
        self.phase2(output)?;
        for run in self.runs.drain(..) {
            remove(&run)?;
        }
        Ok(())
    }
}
