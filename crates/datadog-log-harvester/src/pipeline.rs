// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Runs one harvest loop per source, all feeding a single bounded channel.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::config::{HarvestOptions, WatchedSource};
use crate::errors::HarvestError;
use crate::event::HarvestEvent;
use crate::harvester::{Harvester, StopReason};

pub struct HarvestPipeline {
    harvesters: Vec<(String, JoinHandle<StopReason>)>,
    cancel_token: CancellationToken,
}

impl HarvestPipeline {
    /// Builds a harvester for every source and spawns them. Every policy is
    /// validated first, so a bad source means nothing gets started.
    pub fn start(
        sources: Vec<WatchedSource>,
        options: &HarvestOptions,
        channel_capacity: usize,
    ) -> Result<(Self, mpsc::Receiver<HarvestEvent>), HarvestError> {
        if channel_capacity == 0 {
            return Err(HarvestError::InvalidConfig(
                "channel capacity must be greater than 0".to_string(),
            ));
        }

        let cancel_token = CancellationToken::new();
        let harvesters = sources
            .into_iter()
            .map(|source| {
                Harvester::new(source, options.clone())
                    .map(|h| h.with_cancel_token(cancel_token.child_token()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let (tx, rx) = mpsc::channel(channel_capacity);
        let harvesters = harvesters
            .into_iter()
            .map(|harvester| {
                let path = harvester.source().path.clone();
                debug!("Spawning harvester for {}", path);
                (path, harvester.spawn(tx.clone()))
            })
            .collect();

        Ok((
            Self {
                harvesters,
                cancel_token,
            },
            rx,
        ))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.harvesters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.harvesters.is_empty()
    }

    /// Asks every loop to stop. Pending multi-line records are dropped.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    /// Waits for every loop to end and reports why each one stopped.
    pub async fn join(self) -> Vec<(String, Option<StopReason>)> {
        let mut results = Vec::with_capacity(self.harvesters.len());
        for (path, handle) in self.harvesters {
            let reason = match handle.await {
                Ok(reason) => Some(reason),
                Err(e) => {
                    error!("Harvester task for {} failed: {}", path, e);
                    None
                }
            };
            results.push((path, reason));
        }
        results
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::MultilineConfig;
    use std::time::Duration;

    #[tokio::test]
    async fn test_start_fails_fast_on_bad_policy() {
        let good = WatchedSource::new("/var/log/good.log");
        let mut bad = WatchedSource::new("/var/log/bad.log");
        bad.multiline = MultilineConfig {
            enabled: true,
            pattern: ".".to_string(),
            negate: false,
            what: "before".to_string(),
        };

        let result = HarvestPipeline::start(vec![good, bad], &HarvestOptions::default(), 10);
        assert!(matches!(result, Err(HarvestError::InvalidMultilineMode(_))));
    }

    #[tokio::test]
    async fn test_start_rejects_zero_capacity() {
        let result = HarvestPipeline::start(
            vec![WatchedSource::new("/var/log/a.log")],
            &HarvestOptions::default(),
            0,
        );
        assert!(matches!(result, Err(HarvestError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_shutdown_stops_every_harvester() {
        let dir = tempfile::tempdir().unwrap();
        let sources = vec![
            WatchedSource::new(dir.path().join("a.log").to_str().unwrap()),
            WatchedSource::new(dir.path().join("b.log").to_str().unwrap()),
        ];

        let (pipeline, mut rx) =
            HarvestPipeline::start(sources, &HarvestOptions::default(), 10).unwrap();
        assert_eq!(pipeline.len(), 2);

        pipeline.shutdown();
        let results = tokio::time::timeout(Duration::from_secs(5), pipeline.join())
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        for (_, reason) in results {
            assert!(matches!(reason, Some(StopReason::Shutdown)));
        }
        // Every sender is gone once the loops have ended.
        assert!(rx.recv().await.is_none());
    }
}
