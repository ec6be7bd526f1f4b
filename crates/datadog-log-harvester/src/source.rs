// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Opening and positioning a watched source.
//!
//! A path that cannot be opened is treated as not available yet: the open is
//! retried forever with a fixed backoff. Once open, the stream is positioned
//! at the saved offset, at the start of the file, or at its end (tail mode).

use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncSeek, AsyncSeekExt, ReadBuf, Stdin};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::{HarvestOptions, WatchedSource};
use crate::errors::ReadError;
use crate::event::FileInfo;
use crate::line_reader::{LineReader, RawLine};

/// The underlying stream of an open source.
pub enum SourceStream {
    File(File),
    Stdin(Stdin),
}

impl AsyncRead for SourceStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            SourceStream::File(file) => Pin::new(file).poll_read(cx, buf),
            SourceStream::Stdin(stdin) => Pin::new(stdin).poll_read(cx, buf),
        }
    }
}

impl AsyncSeek for SourceStream {
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        match self.get_mut() {
            SourceStream::File(file) => Pin::new(file).start_seek(position),
            SourceStream::Stdin(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "standard input is not seekable",
            )),
        }
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        match self.get_mut() {
            SourceStream::File(file) => Pin::new(file).poll_complete(cx),
            SourceStream::Stdin(_) => Poll::Ready(Ok(0)),
        }
    }
}

/// A source that is open and positioned for reading.
pub struct OpenSource {
    lines: LineReader<SourceStream>,
    position: u64,
    file_info: Option<FileInfo>,
}

impl OpenSource {
    /// Stream position right after opening.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    #[must_use]
    pub fn file_info(&self) -> Option<&FileInfo> {
        self.file_info.as_ref()
    }

    pub async fn read_line(
        &mut self,
        idle_timeout: Duration,
        poll_interval: Duration,
    ) -> Result<RawLine, ReadError> {
        self.lines.read_line(idle_timeout, poll_interval).await
    }

    /// Current size of the open handle, or `None` for standard input.
    pub async fn current_size(&self) -> io::Result<Option<u64>> {
        match self.lines.get_ref() {
            SourceStream::File(file) => Ok(Some(file.metadata().await?.len())),
            SourceStream::Stdin(_) => Ok(None),
        }
    }

    /// Seeks back to byte 0, dropping anything buffered.
    pub async fn rewind(&mut self) -> io::Result<()> {
        self.lines.rewind().await.map(|_| ())
    }
}

/// Opens `source`, retrying until it succeeds, and positions it for reading.
pub async fn open_source(source: &WatchedSource, options: &HarvestOptions) -> OpenSource {
    if source.is_stdin() {
        return OpenSource {
            lines: LineReader::new(SourceStream::Stdin(tokio::io::stdin()), options.buffer_size),
            position: 0,
            file_info: None,
        };
    }

    let mut file = loop {
        match File::open(&source.path).await {
            Ok(file) => break file,
            Err(e) => {
                warn!("Failed opening {}: {}", source.path, e);
                sleep(options.open_retry_interval).await;
            }
        }
    };

    let file_info = match file.metadata().await {
        Ok(metadata) => Some(FileInfo::from(&metadata)),
        Err(e) => {
            warn!("Failed to stat {}: {}", source.path, e);
            None
        }
    };

    // TODO: only seek regular files, pipes and sockets opened by path cannot seek.
    let target = if source.offset > 0 {
        SeekFrom::Start(source.offset)
    } else if options.from_beginning {
        SeekFrom::Start(0)
    } else {
        SeekFrom::End(0)
    };

    let position = match file.seek(target).await {
        Ok(position) => position,
        Err(e) => {
            warn!("Failed to seek {} to {:?}: {}", source.path, target, e);
            file.stream_position().await.unwrap_or(0)
        }
    };
    debug!("Opened {} at position {}", source.path, position);
    if source.offset > 0 {
        info!("Resuming {} from offset {}", source.path, position);
    }

    OpenSource {
        lines: LineReader::new(SourceStream::File(file), options.buffer_size),
        position,
        file_info,
    }
}
