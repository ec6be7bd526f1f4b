// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Line reassembly on top of a buffered, possibly still-growing stream.
//!
//! A file being tailed reports end-of-data whenever the reader catches up with
//! the writer. That is not the end of the source, so [`LineReader::read_line`]
//! sleeps and retries until either a full line is available or the idle timeout
//! expires. Segments read before the terminator shows up are kept, which lets a
//! line be longer than the buffer and survive a slow writer.
//!
//! Nothing bounds the length of a single line: an unterminated stream keeps
//! growing the partial buffer.

use std::io::SeekFrom;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncSeek, AsyncSeekExt, BufReader};
use tokio::time::{sleep, Instant};
use tracing::trace;

use crate::errors::ReadError;

/// One terminator-delimited line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    /// Line content without the `\n` (and without a preceding `\r`).
    pub text: String,
    /// Bytes taken from the stream for this line, terminator included.
    pub consumed: u64,
}

pub struct LineReader<R> {
    reader: BufReader<R>,
    partial: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(inner: R, buffer_size: usize) -> Self {
        Self {
            reader: BufReader::with_capacity(buffer_size, inner),
            partial: Vec::new(),
        }
    }

    pub fn get_ref(&self) -> &R {
        self.reader.get_ref()
    }

    /// Reads the next complete line.
    ///
    /// While no data is available the call sleeps `poll_interval` between
    /// attempts. Once more than `idle_timeout` has passed since the call started
    /// it gives up with [`ReadError::EofTimeout`]; bytes of an unfinished line
    /// stay buffered for the next call. Any other I/O error is returned as is.
    pub async fn read_line(
        &mut self,
        idle_timeout: Duration,
        poll_interval: Duration,
    ) -> Result<RawLine, ReadError> {
        let start_time = Instant::now();
        loop {
            let available = self.reader.fill_buf().await?;

            if available.is_empty() {
                sleep(poll_interval).await;
                if start_time.elapsed() > idle_timeout {
                    return Err(ReadError::EofTimeout);
                }
                continue;
            }

            match available.iter().position(|&b| b == b'\n') {
                Some(newline) => {
                    self.partial.extend_from_slice(&available[..newline]);
                    self.reader.consume(newline + 1);
                    return Ok(self.take_line());
                }
                None => {
                    let segment_len = available.len();
                    self.partial.extend_from_slice(available);
                    self.reader.consume(segment_len);
                    trace!("Buffered partial segment of {} bytes", segment_len);
                }
            }
        }
    }

    fn take_line(&mut self) -> RawLine {
        let bytes = std::mem::take(&mut self.partial);
        let consumed = bytes.len() as u64 + 1;
        let content = match bytes.last() {
            Some(b'\r') => &bytes[..bytes.len() - 1],
            _ => &bytes[..],
        };
        RawLine {
            text: String::from_utf8_lossy(content).into_owned(),
            consumed,
        }
    }
}

impl<R: AsyncRead + AsyncSeek + Unpin> LineReader<R> {
    /// Moves back to the start of the stream, discarding buffered and partial data.
    pub async fn rewind(&mut self) -> std::io::Result<u64> {
        self.partial.clear();
        // Seeking through the BufReader drops whatever it had buffered.
        self.reader.seek(SeekFrom::Start(0)).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    const IDLE: Duration = Duration::from_secs(10);
    const POLL: Duration = Duration::from_secs(1);

    /// Replays chunks one read at a time. An empty chunk reads as "no data yet",
    /// and so does running out of chunks.
    struct ChunkedReader {
        chunks: VecDeque<io::Result<Vec<u8>>>,
    }

    impl ChunkedReader {
        fn new(chunks: Vec<&[u8]>) -> Self {
            Self {
                chunks: chunks.into_iter().map(|c| Ok(c.to_vec())).collect(),
            }
        }

        fn with_error(mut self, kind: io::ErrorKind) -> Self {
            self.chunks.push_back(Err(io::Error::from(kind)));
            self
        }
    }

    impl AsyncRead for ChunkedReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            match self.chunks.pop_front() {
                Some(Ok(chunk)) => {
                    buf.put_slice(&chunk);
                    Poll::Ready(Ok(()))
                }
                Some(Err(e)) => Poll::Ready(Err(e)),
                None => Poll::Ready(Ok(())),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_lines_in_order() {
        let mut reader = LineReader::new(&b"first\nsecond\n"[..], 16 * 1024);

        let line = reader.read_line(IDLE, POLL).await.unwrap();
        assert_eq!(line.text, "first");
        assert_eq!(line.consumed, 6);

        let line = reader.read_line(IDLE, POLL).await.unwrap();
        assert_eq!(line.text, "second");
        assert_eq!(line.consumed, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_line() {
        let mut reader = LineReader::new(&b"\n"[..], 16);
        let line = reader.read_line(IDLE, POLL).await.unwrap();
        assert_eq!(line.text, "");
        assert_eq!(line.consumed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_line_longer_than_buffer() {
        let long = "x".repeat(100);
        let input = format!("{long}\nshort\n");
        let mut reader = LineReader::new(input.as_bytes(), 8);

        let line = reader.read_line(IDLE, POLL).await.unwrap();
        assert_eq!(line.text, long);
        assert_eq!(line.consumed, 101);

        let line = reader.read_line(IDLE, POLL).await.unwrap();
        assert_eq!(line.text, "short");
    }

    #[tokio::test(start_paused = true)]
    async fn test_strips_carriage_return() {
        let mut reader = LineReader::new(&b"windows\r\n"[..], 64);
        let line = reader.read_line(IDLE, POLL).await.unwrap();
        assert_eq!(line.text, "windows");
        assert_eq!(line.consumed, 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_utf8_is_replaced() {
        let mut reader = LineReader::new(&b"bad \xff byte\n"[..], 64);
        let line = reader.read_line(IDLE, POLL).await.unwrap();
        assert_eq!(line.text, "bad \u{fffd} byte");
        assert_eq!(line.consumed, 11);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_data_across_idle_reads() {
        // Two "no data" polls, then the rest of the line arrives.
        let chunks: Vec<&[u8]> = vec![&b"hel"[..], &b""[..], &b""[..], &b"lo\n"[..]];
        let mut reader = LineReader::new(ChunkedReader::new(chunks), 64);

        let start = Instant::now();
        let line = reader.read_line(IDLE, POLL).await.unwrap();
        assert_eq!(line.text, "hello");
        assert_eq!(line.consumed, 6);
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_eof_timeout() {
        let mut reader = LineReader::new(&b""[..], 64);

        let start = Instant::now();
        let result = reader.read_line(IDLE, POLL).await;
        assert!(matches!(result, Err(ReadError::EofTimeout)));
        // Gives up on the first wake-up past the timeout.
        assert_eq!(start.elapsed(), Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_line_survives_timeout() {
        let chunks: Vec<&[u8]> = vec![&b"par"[..]];
        let mut reader = LineReader::new(ChunkedReader::new(chunks), 64);

        let result = reader.read_line(Duration::from_secs(2), POLL).await;
        assert!(matches!(result, Err(ReadError::EofTimeout)));
        assert_eq!(reader.partial, b"par");
    }

    #[tokio::test(start_paused = true)]
    async fn test_io_error_is_not_retried() {
        let chunks: Vec<&[u8]> = vec![&b"ok\n"[..]];
        let source = ChunkedReader::new(chunks).with_error(io::ErrorKind::BrokenPipe);
        let mut reader = LineReader::new(source, 64);

        assert_eq!(reader.read_line(IDLE, POLL).await.unwrap().text, "ok");

        let start = Instant::now();
        match reader.read_line(IDLE, POLL).await {
            Err(ReadError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("expected an io error, got {:?}", other),
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rewind_discards_partial_data() {
        let cursor = io::Cursor::new(b"one\ntwo".to_vec());
        let mut reader = LineReader::new(cursor, 64);

        assert_eq!(reader.read_line(IDLE, POLL).await.unwrap().text, "one");
        assert!(reader.read_line(POLL, POLL).await.is_err());
        assert_eq!(reader.partial, b"two");

        assert_eq!(reader.rewind().await.unwrap(), 0);
        assert!(reader.partial.is_empty());
        assert_eq!(reader.read_line(IDLE, POLL).await.unwrap().text, "one");
    }
}
