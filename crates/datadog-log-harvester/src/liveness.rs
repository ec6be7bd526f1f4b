// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Decides what to do with a source that produced no line within the idle timeout.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Keep waiting for data.
    Continue,
    /// The source shrank below the read offset: start again from byte 0.
    Reset,
    /// Nothing was read for longer than the dead time: give up on the source.
    Stop,
}

/// Truncation wins over the idle ceiling. `current_size` is `None` for sources
/// without a size, such as standard input, which are never considered truncated.
#[must_use]
pub fn check(
    current_size: Option<u64>,
    offset: u64,
    idle_for: Duration,
    dead_time: Duration,
) -> Liveness {
    match current_size {
        Some(size) if size < offset => Liveness::Reset,
        _ if idle_for > dead_time => Liveness::Stop,
        _ => Liveness::Continue,
    }
}
