// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The per-source harvest loop.
//!
//! ```text
//!   Opening ──> Reading ──(line)──> aggregate ──(record)──> send on channel
//!                 ^  │
//!                 │  └─(idle timeout)──> liveness check
//!                 │                         │  continue / reset (seek to 0)
//!                 └─────────────────────────┘
//!                                           └─ stop (dead source)
//! ```
//!
//! One loop owns its source, its aggregation state and its counters, so none of
//! them are shared. All loops write to the same bounded channel; a full channel
//! stalls the sending loop, which is the backpressure point of the pipeline.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};

use crate::config::{HarvestOptions, WatchedSource};
use crate::errors::{HarvestError, ReadError};
use crate::event::{FileInfo, HarvestEvent};
use crate::liveness::{self, Liveness};
use crate::multiline::{Aggregator, Multiline};
use crate::source::{open_source, OpenSource};

/// Why a harvest loop ended.
#[derive(Debug)]
pub enum StopReason {
    /// No line was read for longer than the configured dead time.
    Idle,
    /// Reading failed with something other than "no data yet".
    ReadError(io::Error),
    /// Every receiver of the output channel is gone.
    OutputClosed,
    /// The cancellation token fired.
    Shutdown,
}

pub struct Harvester {
    source: WatchedSource,
    options: HarvestOptions,
    multiline: Option<Multiline>,
    cancel_token: CancellationToken,
}

impl Harvester {
    /// Validates the source's multi-line policy. An unknown mode or a bad pattern
    /// is rejected here, before anything is read.
    pub fn new(source: WatchedSource, options: HarvestOptions) -> Result<Self, HarvestError> {
        let multiline = Multiline::from_config(&source.multiline)?;
        Ok(Self {
            source,
            options,
            multiline,
            cancel_token: CancellationToken::new(),
        })
    }

    #[must_use]
    pub fn with_cancel_token(mut self, cancel_token: CancellationToken) -> Self {
        self.cancel_token = cancel_token;
        self
    }

    #[must_use]
    pub fn source(&self) -> &WatchedSource {
        &self.source
    }

    /// Runs the loop on its own task.
    pub fn spawn(self, output: mpsc::Sender<HarvestEvent>) -> JoinHandle<StopReason> {
        let span = info_span!("harvester", path = %self.source.path);
        tokio::spawn(self.run(output).instrument(span))
    }

    /// Harvests the source until it goes idle for good, fails, loses its
    /// consumer, or is cancelled. Pending multi-line content is dropped on exit.
    pub async fn run(self, output: mpsc::Sender<HarvestEvent>) -> StopReason {
        let Harvester {
            source,
            options,
            multiline,
            cancel_token,
        } = self;

        if source.offset > 0 {
            info!("Starting harvester at position {}: {}", source.offset, source.path);
        } else {
            info!("Starting harvester: {}", source.path);
        }

        let mut open = tokio::select! {
            open = open_source(&source, &options) => open,
            () = cancel_token.cancelled() => {
                debug!("Harvester for {} cancelled before the source opened", source.path);
                return StopReason::Shutdown;
            }
        };

        let mut state = HarvestState {
            path: Arc::from(source.path.as_str()),
            fields: Arc::new(source.fields),
            offset: open.position(),
            line: 0,
            last_read_time: Instant::now(),
            aggregator: Aggregator::new(multiline, source.drop_empty_line),
        };
        info!("Current file offset: {}", state.offset);

        loop {
            let read = tokio::select! {
                read = open.read_line(options.idle_timeout, options.poll_interval) => read,
                () = cancel_token.cancelled() => {
                    info!("Stopping harvest of {}; shutdown requested", state.path);
                    return StopReason::Shutdown;
                }
            };

            let raw = match read {
                Ok(raw) => raw,
                Err(ReadError::EofTimeout) => {
                    match state.check_liveness(&open, &options).await {
                        Ok(Liveness::Continue) => {}
                        Ok(Liveness::Reset) => {
                            info!("File truncated, seeking to beginning: {}", state.path);
                            if let Err(e) = open.rewind().await {
                                error!("Failed to seek {} to the beginning: {}", state.path, e);
                                return StopReason::ReadError(e);
                            }
                            state.offset = 0;
                        }
                        Ok(Liveness::Stop) => {
                            info!(
                                "Stopping harvest of {}; last change was {} seconds ago",
                                state.path,
                                state.last_read_time.elapsed().as_secs()
                            );
                            return StopReason::Idle;
                        }
                        Err(e) => {
                            error!("Unexpected state reading from {}; error: {}", state.path, e);
                            return StopReason::ReadError(e);
                        }
                    }
                    continue;
                }
                Err(ReadError::Io(e)) => {
                    error!("Unexpected state reading from {}; error: {}", state.path, e);
                    return StopReason::ReadError(e);
                }
            };

            let Some(event) = state.accept(raw.text, raw.consumed, open.file_info()) else {
                continue;
            };

            tokio::select! {
                sent = output.send(event) => {
                    if sent.is_err() {
                        info!("Output channel closed, stopping harvest of {}", state.path);
                        return StopReason::OutputClosed;
                    }
                }
                () = cancel_token.cancelled() => {
                    info!("Stopping harvest of {}; shutdown requested", state.path);
                    return StopReason::Shutdown;
                }
            }
        }
    }
}

/// Counters and aggregation state owned by one running loop.
struct HarvestState {
    path: Arc<str>,
    fields: Arc<HashMap<String, String>>,
    offset: u64,
    line: u64,
    last_read_time: Instant,
    aggregator: Aggregator,
}

impl HarvestState {
    /// Accounts for one raw line and returns the event it completes, if any.
    fn accept(
        &mut self,
        text: String,
        consumed: u64,
        file_info: Option<&FileInfo>,
    ) -> Option<HarvestEvent> {
        self.last_read_time = Instant::now();
        self.line += 1;
        self.offset += consumed;

        let record = self.aggregator.apply(text)?;
        Some(HarvestEvent {
            source: Arc::clone(&self.path),
            offset: self.offset,
            line: self.line,
            text: record,
            fields: Arc::clone(&self.fields),
            file_info: file_info.cloned(),
        })
    }

    async fn check_liveness(
        &self,
        open: &OpenSource,
        options: &HarvestOptions,
    ) -> io::Result<Liveness> {
        let size = open.current_size().await?;
        Ok(liveness::check(
            size,
            self.offset,
            self.last_read_time.elapsed(),
            options.dead_time,
        ))
    }
}
