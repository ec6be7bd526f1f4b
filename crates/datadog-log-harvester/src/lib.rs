// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! File tailing core of the log agent.
//!
//! A [`harvester::Harvester`] follows one file (or standard input), reassembles
//! multi-line records and sends each completed record as a
//! [`event::HarvestEvent`] on a channel shared with every other harvester.
//! Events carry the byte offset and line count needed to resume after a
//! restart.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod constants;
pub mod errors;
pub mod event;
pub mod harvester;
pub mod line_reader;
pub mod liveness;
pub mod logger;
pub mod multiline;
pub mod pipeline;
pub mod source;
