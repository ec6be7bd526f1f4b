// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;
use std::process::ExitCode;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use datadog_log_harvester::{
    config::AgentConfig, event::HarvestEvent, harvester::StopReason, logger,
    pipeline::HarvestPipeline,
};

#[tokio::main]
pub async fn main() -> ExitCode {
    let log_level = env::var("DD_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or_else(|_| "info".to_string());

    let env_filter = match EnvFilter::try_new(&log_level) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("could not parse log level in configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Events go to stdout, so diagnostics stay on stderr.
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .event_format(logger::Formatter)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {e}");
        return ExitCode::FAILURE;
    }

    debug!("Logging subsystem enabled");

    let config = match AgentConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Error creating config on log harvester startup: {e}");
            return ExitCode::FAILURE;
        }
    };

    let (pipeline, rx) =
        match HarvestPipeline::start(config.sources, &config.options, config.channel_capacity) {
            Ok(started) => started,
            Err(e) => {
                error!("Refusing to start harvesting: {e}");
                return ExitCode::FAILURE;
            }
        };
    info!("Harvesting {} source(s)", pipeline.len());

    let mut writer = tokio::spawn(write_events(rx));

    // The writer ends on its own once every harvester has stopped.
    let finished = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("Received Ctrl+C, initiating shutdown"),
                Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
            }
            pipeline.shutdown();
            None
        }
        result = &mut writer => Some(result),
    };

    for (path, reason) in pipeline.join().await {
        match reason {
            Some(StopReason::ReadError(e)) => warn!("Harvester for {path} failed: {e}"),
            Some(reason) => debug!("Harvester for {path} stopped: {reason:?}"),
            None => {}
        }
    }

    let result = match finished {
        Some(result) => result,
        None => writer.await,
    };
    match result {
        Ok(written) => {
            info!("Wrote {written} event(s)");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Event writer failed: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Stand-in consumer: one JSON object per event on stdout. Returns once every
/// harvester has dropped its sender.
async fn write_events(mut rx: mpsc::Receiver<HarvestEvent>) -> u64 {
    let mut stdout = tokio::io::stdout();
    let mut written = 0;

    while let Some(event) = rx.recv().await {
        let mut line = match serde_json::to_vec(&event) {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize event from {}: {}", event.source, e);
                continue;
            }
        };
        line.push(b'\n');

        if let Err(e) = stdout.write_all(&line).await {
            error!("Failed to write event: {}", e);
            break;
        }
        if let Err(e) = stdout.flush().await {
            error!("Failed to flush events: {}", e);
            break;
        }
        written += 1;
    }

    written
}
