//! Line reassembly over a byte stream with read timeouts.

use std::io::{ErrorKind, Read};

/// Outcome of one read attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    /// A complete, trimmed, non-empty line.
    Line(String),
    /// Nothing complete yet (timeout, empty line, or a partial line buffered).
    Pending,
    /// The stream reached end of file.
    Closed,
}

/// Longest run of bytes held without a newline. Anything longer is flushed
/// as a line of its own.
pub const MAX_LINE_BYTES: usize = 4096;

/// Accumulates bytes across read timeouts and yields whole lines.
pub struct LineReader<R> {
    inner: R,
    pending: Vec<u8>,
    chunk: Vec<u8>,
}

impl<R: Read> LineReader<R> {
    const CHUNK_SIZE: usize = 256;

    /// Wrap a reader.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            pending: Vec::new(),
            chunk: vec![0; Self::CHUNK_SIZE],
        }
    }

    /// Attempt to produce one line.
    ///
    /// Buffered complete lines are returned before the underlying reader is
    /// touched again. Timeouts and interrupts yield [`LineRead::Pending`].
    /// A partial line reaching [`MAX_LINE_BYTES`] is returned as is.
    pub fn poll_line(&mut self) -> std::io::Result<LineRead> {
        loop {
            if let Some(line) = self.take_buffered_line() {
                if line.is_empty() {
                    continue;
                }
                return Ok(LineRead::Line(line));
            }

            match self.inner.read(&mut self.chunk) {
                Ok(0) => return Ok(LineRead::Closed),
                Ok(n) => {
                    self.pending.extend_from_slice(&self.chunk[..n]);
                    if self.pending.contains(&b'\n') {
                        continue;
                    }
                    if self.pending.len() >= MAX_LINE_BYTES {
                        let overlong = std::mem::take(&mut self.pending);
                        let line = String::from_utf8_lossy(&overlong).trim().to_string();
                        if !line.is_empty() {
                            return Ok(LineRead::Line(line));
                        }
                    }
                    return Ok(LineRead::Pending);
                }
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    return Ok(LineRead::Pending);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => return Ok(LineRead::Pending),
                Err(e) => return Err(e),
            }
        }
    }

    fn take_buffered_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=end).collect();
        Some(String::from_utf8_lossy(&line).trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::{Cursor, Error};

    /// Replays scripted chunks and timeouts.
    struct Scripted(VecDeque<std::io::Result<Vec<u8>>>);

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.0.pop_front() {
                None => Ok(0),
                Some(Err(e)) => Err(e),
                Some(Ok(bytes)) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
            }
        }
    }

    fn timeout() -> std::io::Result<Vec<u8>> {
        Err(Error::new(ErrorKind::TimedOut, "timed out"))
    }

    #[test]
    fn test_reads_multiple_lines_from_one_chunk() {
        let mut reader = LineReader::new(Cursor::new(b"ok\r\nstatus: idle\n".to_vec()));
        assert_eq!(reader.poll_line().unwrap(), LineRead::Line("ok".into()));
        assert_eq!(
            reader.poll_line().unwrap(),
            LineRead::Line("status: idle".into())
        );
        assert_eq!(reader.poll_line().unwrap(), LineRead::Closed);
    }

    #[test]
    fn test_reassembles_across_timeouts() {
        let mut reader = LineReader::new(Scripted(VecDeque::from([
            Ok(b"Device 1 | MA".to_vec()),
            timeout(),
            Ok(b"C: aa\n".to_vec()),
        ])));

        assert_eq!(reader.poll_line().unwrap(), LineRead::Pending);
        assert_eq!(reader.poll_line().unwrap(), LineRead::Pending);
        assert_eq!(
            reader.poll_line().unwrap(),
            LineRead::Line("Device 1 | MAC: aa".into())
        );
        assert_eq!(reader.poll_line().unwrap(), LineRead::Closed);
    }

    #[test]
    fn test_unterminated_output_is_flushed_at_limit() {
        let mut bytes = vec![b'x'; MAX_LINE_BYTES + 4];
        bytes.extend_from_slice(b"\nok\n");
        let mut reader = LineReader::new(Cursor::new(bytes));

        let mut lines = Vec::new();
        let mut pending = 0;
        loop {
            match reader.poll_line().unwrap() {
                LineRead::Line(line) => lines.push(line),
                LineRead::Pending => pending += 1,
                LineRead::Closed => break,
            }
        }

        assert_eq!(pending, MAX_LINE_BYTES / 256 - 1);
        assert_eq!(
            lines,
            vec!["x".repeat(MAX_LINE_BYTES), "xxxx".to_string(), "ok".to_string()]
        );
        assert!(reader.pending.is_empty());
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let mut reader = LineReader::new(Cursor::new(b"\n\r\n  \nhello\n".to_vec()));
        assert_eq!(reader.poll_line().unwrap(), LineRead::Line("hello".into()));
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let mut reader = LineReader::new(Cursor::new(vec![b'a', 0xFF, b'\n']));
        assert_eq!(
            reader.poll_line().unwrap(),
            LineRead::Line("a\u{FFFD}".into())
        );
    }

    #[test]
    fn test_hard_errors_propagate() {
        let mut reader = LineReader::new(Scripted(VecDeque::from([Err(Error::new(
            ErrorKind::BrokenPipe,
            "unplugged",
        ))])));
        assert_eq!(
            reader.poll_line().unwrap_err().kind(),
            ErrorKind::BrokenPipe
        );
    }
}
