// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Multi-line record aggregation.
//!
//! Every raw line is tested against the configured pattern (optionally negated)
//! and then, depending on the mode, buffered, merged with what is pending, or
//! used to flush the pending buffer as one record:
//!
//! - `previous`: matching lines belong to the record before them. A
//!   non-matching line flushes what is pending and starts a new record.
//! - `not_merged`: a matching line flushes pending content only when the line
//!   before it did not match; a non-matching line always flushes pending
//!   content. The current line is then buffered.
//! - `next`: matching lines belong to the record after them. A non-matching
//!   line completes the record and is emitted together with the buffer, even
//!   when both are empty.
//!
//! Lines are concatenated as is, without a separator. Whatever is still pending
//! when the source stops is dropped, and the pending buffer has no size limit.

use std::str::FromStr;

use regex::Regex;

use crate::config::MultilineConfig;
use crate::errors::HarvestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultilineMode {
    Previous,
    NotMerged,
    Next,
}

impl FromStr for MultilineMode {
    type Err = HarvestError;

    fn from_str(what: &str) -> Result<Self, Self::Err> {
        match what {
            "previous" => Ok(Self::Previous),
            "not_merged" => Ok(Self::NotMerged),
            "next" => Ok(Self::Next),
            other => Err(HarvestError::InvalidMultilineMode(other.to_string())),
        }
    }
}

/// A validated multi-line policy.
#[derive(Debug, Clone)]
pub struct Multiline {
    pattern: Regex,
    negate: bool,
    mode: MultilineMode,
}

impl Multiline {
    /// Compiles the policy. Returns `Ok(None)` when multi-line merging is disabled,
    /// in which case the pattern and mode are not looked at.
    pub fn from_config(config: &MultilineConfig) -> Result<Option<Self>, HarvestError> {
        if !config.enabled {
            return Ok(None);
        }
        let mode = config.what.parse::<MultilineMode>()?;
        let pattern = Regex::new(&config.pattern).map_err(|source| HarvestError::InvalidPattern {
            pattern: config.pattern.clone(),
            source,
        })?;
        Ok(Some(Self {
            pattern,
            negate: config.negate,
            mode,
        }))
    }

    #[must_use]
    pub fn mode(&self) -> MultilineMode {
        self.mode
    }

    fn matches(&self, line: &str) -> bool {
        self.pattern.is_match(line) != self.negate
    }
}

/// Per-source aggregation state.
#[derive(Debug)]
pub struct Aggregator {
    multiline: Option<Multiline>,
    drop_empty_line: bool,
    pending: String,
    previous_match: bool,
}

impl Aggregator {
    #[must_use]
    pub fn new(multiline: Option<Multiline>, drop_empty_line: bool) -> Self {
        Self {
            multiline,
            drop_empty_line,
            pending: String::new(),
            previous_match: false,
        }
    }

    /// Feeds one raw line and returns the record it completes, if any.
    pub fn apply(&mut self, line: String) -> Option<String> {
        if self.drop_empty_line && line.trim().is_empty() {
            return None;
        }

        let Some(multiline) = &self.multiline else {
            return Some(line);
        };

        let matched = multiline.matches(&line);
        let record = match multiline.mode() {
            MultilineMode::Previous => {
                let record = if !matched { self.flush() } else { None };
                self.pending.push_str(&line);
                record
            }
            MultilineMode::NotMerged => {
                let record = if matched {
                    if self.previous_match {
                        None
                    } else {
                        self.flush()
                    }
                } else {
                    self.flush()
                };
                self.pending.push_str(&line);
                record
            }
            MultilineMode::Next => {
                self.pending.push_str(&line);
                if matched {
                    None
                } else {
                    // Always a record, even an empty one.
                    Some(std::mem::take(&mut self.pending))
                }
            }
        };

        self.previous_match = matched;
        record
    }

    #[must_use]
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Takes the pending buffer, or `None` if nothing is pending.
    fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}
