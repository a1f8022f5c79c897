pub mod io;

/// Record terminator used by every file the merger reads or writes.
pub const TERMINATOR: u8 = b'\n';

/// Iterate the newline-delimited records of a window, terminators stripped.
/// A final record without a trailing newline is yielded as well; empty
/// lines are yielded as empty slices and left to the caller to skip.
#[inline]
pub fn records(data: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut start = 0usize;
    let mut bounds = memchr::memchr_iter(TERMINATOR, data);
    std::iter::from_fn(move || {
        if let Some(pos) = bounds.next() {
            let rec = &data[start..pos];
            start = pos + 1;
            return Some(rec);
        }
        if start < data.len() {
            let rec = &data[start..];
            start = data.len();
            return Some(rec);
        }
        None
    })
}

/// Blank lines (empty, or only ASCII whitespace including vertical tab)
/// are not records.
#[inline]
pub fn is_blank(line: &[u8]) -> bool {
    line.iter().all(|&b| b.is_ascii_whitespace() || b == 0x0b)
}

/// Format an IO error message without the "(os error N)" suffix.
pub fn io_error_msg(e: &std::io::Error) -> String {
    if let Some(raw) = e.raw_os_error() {
        let os_err = std::io::Error::from_raw_os_error(raw);
        let msg = format!("{}", os_err);
        msg.replace(&format!(" (os error {})", raw), "")
    } else {
        format!("{}", e)
    }
}
