//! Bounded output channels.
//!
//! Process output is read line by line with a per-line cap so a process that
//! never writes a newline cannot grow memory without bound. Accepted text is
//! collected into a [`BoundedBuffer`] with a byte ceiling; whatever does not
//! fit is counted and reported with a visible marker.

use quiver_core::truncate_to_boundary;
use quiver_core::utils::truncation_marker;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Bytes read past a channel ceiling so that redaction, which runs before
/// the ceiling is applied, still sees a secret that straddles it.
pub const REDACTION_SLACK: usize = 4096;

/// One line read from a process stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CappedLine {
    /// Line text without the terminator, lossily decoded.
    pub text: String,
    /// Bytes beyond the cap that were discarded.
    pub dropped: usize,
}

/// Read one line, keeping at most `max` bytes of it.
///
/// Returns `None` at end of stream. The rest of an over-long line is
/// consumed and counted, never buffered.
///
/// # Errors
///
/// Returns any I/O error from the underlying reader.
pub async fn read_capped_line<R>(reader: &mut R, max: usize) -> std::io::Result<Option<CappedLine>>
where
    R: AsyncBufRead + Unpin,
{
    let mut kept: Vec<u8> = Vec::new();
    let mut dropped = 0usize;
    let mut saw_any = false;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            if !saw_any {
                return Ok(None);
            }
            break;
        }
        saw_any = true;

        let (chunk, used, done) = match available.iter().position(|b| *b == b'\n') {
            Some(pos) => (&available[..pos], pos.saturating_add(1), true),
            None => (available, available.len(), false),
        };
        let room = max.saturating_sub(kept.len());
        let take = room.min(chunk.len());
        kept.extend_from_slice(&chunk[..take]);
        dropped = dropped.saturating_add(chunk.len().saturating_sub(take));
        reader.consume(used);
        if done {
            break;
        }
    }

    if kept.last() == Some(&b'\r') {
        kept.pop();
    }
    Ok(Some(CappedLine {
        text: String::from_utf8_lossy(&kept).into_owned(),
        dropped,
    }))
}

/// Accumulates text up to a byte ceiling.
#[derive(Debug, Clone)]
pub struct BoundedBuffer {
    ceiling: usize,
    text: String,
    dropped: usize,
}

impl BoundedBuffer {
    /// Create an empty buffer holding at most `ceiling` bytes.
    #[must_use]
    pub fn new(ceiling: usize) -> Self {
        Self {
            ceiling,
            text: String::new(),
            dropped: 0,
        }
    }

    /// Append `line` and a newline, plus `already_dropped` bytes that were
    /// cut before the line got here.
    pub fn push_line(&mut self, line: &str, already_dropped: usize) {
        self.dropped = self.dropped.saturating_add(already_dropped);
        let needed = line.len().saturating_add(1);
        let room = self.ceiling.saturating_sub(self.text.len());
        if needed <= room {
            self.text.push_str(line);
            self.text.push('\n');
            return;
        }
        let kept = truncate_to_boundary(line, room);
        self.text.push_str(kept);
        self.dropped = self
            .dropped
            .saturating_add(needed.saturating_sub(kept.len()));
    }

    /// Bytes discarded so far.
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Whether anything was discarded.
    #[must_use]
    pub fn truncated(&self) -> bool {
        self.dropped > 0
    }

    /// Collected text, with the truncation marker when anything was cut.
    #[must_use]
    pub fn finish(self) -> String {
        if self.dropped == 0 {
            return self.text;
        }
        let mut text = self.text;
        text.push_str(&truncation_marker(self.dropped));
        text
    }
}

/// Cut `payload` to `ceiling` bytes, returning the kept text and the number
/// of bytes dropped.
#[must_use]
pub fn cap_payload(payload: &str, ceiling: usize) -> (String, usize) {
    let kept = truncate_to_boundary(payload, ceiling);
    (kept.to_owned(), payload.len().saturating_sub(kept.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn test_reads_lines_and_eof() {
        let mut reader = BufReader::new(&b"one\r\ntwo\nthree"[..]);
        let mut lines = Vec::new();
        while let Some(line) = read_capped_line(&mut reader, 100).await.unwrap() {
            lines.push(line.text);
        }
        assert_eq!(lines, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_long_line_capped_across_reads() {
        let data = format!("{}\nnext\n", "x".repeat(50));
        let mut reader = BufReader::with_capacity(8, data.as_bytes());
        let first = read_capped_line(&mut reader, 10).await.unwrap().unwrap();
        assert_eq!(first.text, "x".repeat(10));
        assert_eq!(first.dropped, 40);
        let second = read_capped_line(&mut reader, 10).await.unwrap().unwrap();
        assert_eq!(second.text, "next");
        assert_eq!(second.dropped, 0);
        assert!(read_capped_line(&mut reader, 10).await.unwrap().is_none());
    }

    #[test]
    fn test_buffer_ceiling_and_marker() {
        let mut buf = BoundedBuffer::new(10);
        buf.push_line("abcd", 0);
        buf.push_line("efghij", 0);
        buf.push_line("more", 0);
        assert!(buf.truncated());
        // "abcd\n" (5) + "efghi" (5) kept; "j\n" (2) + "more\n" (5) dropped.
        assert_eq!(buf.dropped(), 7);
        assert_eq!(buf.finish(), "abcd\nefghi\n[... truncated 7 bytes]");
    }

    #[test]
    fn test_buffer_under_ceiling_has_no_marker() {
        let mut buf = BoundedBuffer::new(64);
        buf.push_line("fine", 0);
        assert_eq!(buf.finish(), "fine\n");
    }

    #[test]
    fn test_cap_payload() {
        assert_eq!(cap_payload("hello", 10), ("hello".to_owned(), 0));
        assert_eq!(cap_payload("hello world", 5), ("hello".to_owned(), 6));
    }
}
