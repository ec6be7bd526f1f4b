// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Harvester configuration.
//!
//! A [`WatchedSource`] describes one input and is normally handed over by the
//! file discovery side of the agent. [`HarvestOptions`] holds the timing and
//! buffering tunables shared by every loop. [`AgentConfig`] gathers both from
//! the environment for the agent binary:
//!
//! ```text
//! DD_HARVEST_SOURCES='[{"path":"/var/log/app.log","multiline":{"enabled":true,"pattern":"^\\s","what":"previous"}}]'
//! DD_HARVEST_FROM_BEGINNING=true
//! DD_HARVEST_IDLE_TIMEOUT_SECS=10
//! DD_HARVEST_DEAD_TIME_SECS=86400
//! ```

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use serde::Deserialize;

use crate::constants::{
    DEFAULT_BUFFER_SIZE, DEFAULT_CHANNEL_CAPACITY, DEFAULT_DEAD_TIME, DEFAULT_IDLE_TIMEOUT,
    DEFAULT_OPEN_RETRY_INTERVAL, DEFAULT_POLL_INTERVAL, STDIN_PATH,
};
use crate::errors::HarvestError;

/// Multi-line merge settings as they appear in configuration.
///
/// `what` stays a plain string here; it is checked when a harvester is built so
/// that a bad value stops the agent before any line is read.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MultilineConfig {
    pub enabled: bool,
    pub pattern: String,
    pub negate: bool,
    /// One of `previous`, `not_merged` or `next`.
    pub what: String,
}

/// One input to harvest: a file path, or `-` for standard input.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct WatchedSource {
    pub path: String,
    /// Byte offset to resume from. Zero means no saved position.
    #[serde(default)]
    pub offset: u64,
    /// Attached to every event produced from this source.
    #[serde(default)]
    pub fields: HashMap<String, String>,
    #[serde(default)]
    pub multiline: MultilineConfig,
    #[serde(default)]
    pub drop_empty_line: bool,
}

impl WatchedSource {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            fields: HashMap::new(),
            multiline: MultilineConfig::default(),
            drop_empty_line: false,
        }
    }

    #[must_use]
    pub fn is_stdin(&self) -> bool {
        self.path == STDIN_PATH
    }
}

/// Timing and buffering tunables for a harvest loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HarvestOptions {
    /// Start at the beginning of a file when no offset was saved, instead of tailing.
    pub from_beginning: bool,
    pub idle_timeout: Duration,
    pub poll_interval: Duration,
    pub open_retry_interval: Duration,
    /// Idle ceiling after which the loop gives up on a source.
    pub dead_time: Duration,
    pub buffer_size: usize,
}

impl Default for HarvestOptions {
    fn default() -> Self {
        Self {
            from_beginning: false,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            open_retry_interval: DEFAULT_OPEN_RETRY_INTERVAL,
            dead_time: DEFAULT_DEAD_TIME,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// Everything the agent binary needs to start harvesting.
#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub sources: Vec<WatchedSource>,
    pub options: HarvestOptions,
    pub channel_capacity: usize,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            options: HarvestOptions::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            log_level: "info".to_string(),
        }
    }
}

impl AgentConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, HarvestError> {
        let sources = match env::var("DD_HARVEST_SOURCES") {
            Ok(raw) => parse_sources(&raw)?,
            Err(_) => Vec::new(),
        };
        let defaults = HarvestOptions::default();
        let options = HarvestOptions {
            from_beginning: env::var("DD_HARVEST_FROM_BEGINNING")
                .map(|val| val.to_lowercase() == "true")
                .unwrap_or(false),
            idle_timeout: env_secs("DD_HARVEST_IDLE_TIMEOUT_SECS").unwrap_or(defaults.idle_timeout),
            dead_time: env_secs("DD_HARVEST_DEAD_TIME_SECS").unwrap_or(defaults.dead_time),
            open_retry_interval: env_secs("DD_HARVEST_OPEN_RETRY_SECS")
                .unwrap_or(defaults.open_retry_interval),
            buffer_size: env::var("DD_HARVEST_BUFFER_SIZE")
                .ok()
                .and_then(|val| val.parse::<usize>().ok())
                .unwrap_or(defaults.buffer_size),
            poll_interval: defaults.poll_interval,
        };
        let channel_capacity = env::var("DD_HARVEST_CHANNEL_CAPACITY")
            .ok()
            .and_then(|val| val.parse::<usize>().ok())
            .unwrap_or(DEFAULT_CHANNEL_CAPACITY);
        let log_level = env::var("DD_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or_else(|_| "info".to_string());

        let config = Self {
            sources,
            options,
            channel_capacity,
            log_level,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.sources.is_empty() {
            return Err(HarvestError::InvalidConfig(
                "DD_HARVEST_SOURCES must list at least one source".to_string(),
            ));
        }

        if let Some(source) = self.sources.iter().find(|s| s.path.trim().is_empty()) {
            return Err(HarvestError::InvalidConfig(format!(
                "source path cannot be empty: {:?}",
                source
            )));
        }

        if self.options.buffer_size == 0 {
            return Err(HarvestError::InvalidConfig(
                "DD_HARVEST_BUFFER_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.channel_capacity == 0 {
            return Err(HarvestError::InvalidConfig(
                "DD_HARVEST_CHANNEL_CAPACITY must be greater than 0".to_string(),
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(HarvestError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }
}

/// Parses the JSON array of sources found in `DD_HARVEST_SOURCES`.
pub fn parse_sources(raw: &str) -> Result<Vec<WatchedSource>, HarvestError> {
    serde_json::from_str(raw)
        .map_err(|e| HarvestError::InvalidConfig(format!("Failed to parse sources: {}", e)))
}

fn env_secs(key: &str) -> Option<Duration> {
    env::var(key)
        .ok()
        .and_then(|val| val.parse::<u64>().ok())
        .map(Duration::from_secs)
}
