use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read};
use std::path::Path;

#[cfg(target_os = "linux")]
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};

/// 256KB read buffer for streaming runs and leaves.
pub const READ_BUF_SIZE: usize = 256 * 1024;

/// 1MB write buffer: leaves receive many small appends per window.
pub const WRITE_BUF_SIZE: usize = 1024 * 1024;

/// Track whether O_NOATIME is supported to avoid repeated failed open() attempts.
/// After the first EPERM, we never try O_NOATIME again (saves one syscall per file).
#[cfg(target_os = "linux")]
static NOATIME_SUPPORTED: AtomicBool = AtomicBool::new(true);

/// Open a file with O_NOATIME on Linux to avoid atime inode writes.
/// Caches whether O_NOATIME works to avoid double-open on every file.
#[cfg(target_os = "linux")]
fn open_noatime(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    if NOATIME_SUPPORTED.load(Ordering::Relaxed) {
        match OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NOATIME)
            .open(path)
        {
            Ok(f) => return Ok(f),
            Err(ref e) if e.raw_os_error() == Some(libc::EPERM) => {
                // O_NOATIME requires file ownership or CAP_FOWNER
                NOATIME_SUPPORTED.store(false, Ordering::Relaxed);
            }
            Err(e) => return Err(e),
        }
    }
    File::open(path)
}

#[cfg(not(target_os = "linux"))]
fn open_noatime(path: &Path) -> io::Result<File> {
    File::open(path)
}

/// Open a combolist for reading. Directories and other non-regular files
/// are rejected up front so the merge fails before any leaf is touched.
pub fn open_input(path: &Path) -> Result<File> {
    let file = open_noatime(path).map_err(|e| Error::unreadable(path, e))?;
    let meta = file.metadata().map_err(|e| Error::unreadable(path, e))?;
    if meta.is_dir() {
        return Err(Error::unreadable(
            path,
            io::Error::new(io::ErrorKind::InvalidInput, "is a directory"),
        ));
    }
    Ok(file)
}

/// Buffered reader over a file the merger itself produced (a leaf or a run).
pub fn open_reader(path: &Path) -> Result<BufReader<File>> {
    let file = open_noatime(path).map_err(|e| Error::unreadable(path, e))?;
    Ok(BufReader::with_capacity(READ_BUF_SIZE, file))
}

/// Buffered appender; creates the file if it is missing.
pub fn append_writer(path: &Path) -> Result<BufWriter<File>> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::disk(path, e))?;
    Ok(BufWriter::with_capacity(WRITE_BUF_SIZE, file))
}

/// Create or truncate `path` to zero length.
pub fn truncate(path: &Path) -> Result<()> {
    File::create(path).map_err(|e| Error::disk(path, e))?;
    Ok(())
}

/// Remove a file the merger owns.
pub fn remove(path: &Path) -> Result<()> {
    fs::remove_file(path).map_err(|e| Error::disk(path, e))
}

/// Read as many bytes as possible into buf, retrying on partial reads.
/// Ensures the full buffer is filled (or EOF reached), so every window
/// handed to the fan-out is exactly the requested size until the tail.
/// Fast path: regular file reads usually return the full buffer on the first call.
#[inline]
pub fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let n = reader.read(buf)?;
    if n == buf.len() || n == 0 {
        return Ok(n);
    }
    // Slow path: partial read (pipes, slow devices)
    let mut total = n;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}
