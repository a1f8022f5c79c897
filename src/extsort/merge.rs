use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use crate::common::io::open_reader;
use crate::common::{TERMINATOR, is_blank};
use crate::error::{Error, Result};

/// Head record of one run. BinaryHeap is a max-heap, so entries are wrapped
/// in `Reverse` to pop the smallest record first; ties break on run index.
#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct MergeEntry {
    record: Vec<u8>,
    run: usize,
}

struct RunReader {
    path: PathBuf,
    reader: BufReader<File>,
}

impl RunReader {
    fn next_record(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            let mut buf = Vec::with_capacity(256);
            let n = self
                .reader
                .read_until(TERMINATOR, &mut buf)
                .map_err(|e| Error::unreadable(&self.path, e))?;
            if n == 0 {
                return Ok(None);
            }
            if buf.last() == Some(&TERMINATOR) {
                buf.pop();
            }
            if !is_blank(&buf) {
                return Ok(Some(buf));
            }
        }
    }
}

/// K-way merge over individually sorted runs, O(log k) per record.
///
/// Yields every record of every run in global byte order. Duplicates across
/// runs come out adjacent; removing them is the caller's job.
pub struct RunMerger {
    readers: Vec<RunReader>,
    heap: BinaryHeap<Reverse<MergeEntry>>,
}

impl RunMerger {
    pub fn open(runs: &[PathBuf]) -> Result<RunMerger> {
        let mut readers = Vec::with_capacity(runs.len());
        for path in runs {
            let reader = open_reader(path)?;
            readers.push(RunReader {
                path: path.clone(),
                reader,
            });
        }

        // Initialize heap with first record from each run
        let mut heap = BinaryHeap::with_capacity(readers.len());
        for (run, reader) in readers.iter_mut().enumerate() {
            if let Some(record) = reader.next_record()? {
                heap.push(Reverse(MergeEntry { record, run }));
            }
        }
        Ok(RunMerger { readers, heap })
    }

    pub fn next_record(&mut self) -> Result<Option<Vec<u8>>> {
        let Some(Reverse(min)) = self.heap.pop() else {
            return Ok(None);
        };
        if let Some(record) = self.readers[min.run].next_record()? {
            self.heap.push(Reverse(MergeEntry {
                record,
                run: min.run,
            }));
        }
        Ok(Some(min.record))
    }
}

impl Iterator for RunMerger {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}
