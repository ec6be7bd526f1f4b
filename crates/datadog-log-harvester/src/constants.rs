// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Default tunables for a harvest loop.

use std::time::Duration;

/// Path that selects the process's standard input instead of a file.
pub const STDIN_PATH: &str = "-";

/// Capacity of the buffered reader wrapped around every source.
pub const DEFAULT_BUFFER_SIZE: usize = 16 * 1024;

/// How long `read_line` keeps waiting for data before reporting an EOF timeout.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Sleep between reads while no new data is available.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Backoff between attempts to open a path that is not available yet.
pub const DEFAULT_OPEN_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// A source with no new line for longer than this is considered dead.
pub const DEFAULT_DEAD_TIME: Duration = Duration::from_secs(24 * 60 * 60);

/// Capacity of the output channel shared by all harvest loops.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
