//! SourceAdapter - the configured source, chosen once at construction

use std::sync::Arc;

use contracts::{
    Clock, ContractError, RawRecord, RecordSource, ResumePoint, SourceConfig, SourceKind,
    SourceTag,
};
use tracing::info;

use crate::config::IngestionMetrics;
use crate::live::LiveFeedSource;
use crate::replay::ReplayFileSource;

/// Either the live feed or the replay directory
///
/// There is no runtime failover between the two variants.
pub enum SourceAdapter {
    Live(LiveFeedSource),
    Replay(ReplayFileSource),
}

impl SourceAdapter {
    /// Build the variant selected by `source.kind`
    ///
    /// # Errors
    /// The selected section is missing from the configuration.
    pub fn from_config(
        config: &SourceConfig,
        clock: Arc<dyn Clock>,
        metrics: Arc<IngestionMetrics>,
    ) -> Result<Self, ContractError> {
        let adapter = match config.kind {
            SourceKind::Live => {
                let live = config.live.clone().ok_or_else(|| {
                    ContractError::config_validation("source.live", "live source selected but not configured")
                })?;
                Self::Live(LiveFeedSource::new(live, clock, metrics))
            }
            SourceKind::Replay => {
                let replay = config.replay.clone().ok_or_else(|| {
                    ContractError::config_validation(
                        "source.replay",
                        "replay source selected but not configured",
                    )
                })?;
                Self::Replay(ReplayFileSource::new(replay, clock, metrics))
            }
        };

        info!(source = %adapter.name(), kind = %adapter.tag(), "source adapter selected");
        Ok(adapter)
    }
}

impl RecordSource for SourceAdapter {
    fn name(&self) -> &str {
        match self {
            Self::Live(s) => s.name(),
            Self::Replay(s) => s.name(),
        }
    }

    fn tag(&self) -> SourceTag {
        match self {
            Self::Live(s) => s.tag(),
            Self::Replay(s) => s.tag(),
        }
    }

    async fn open(&mut self, resume: &ResumePoint) -> Result<(), ContractError> {
        match self {
            Self::Live(s) => s.open(resume).await,
            Self::Replay(s) => s.open(resume).await,
        }
    }

    async fn next_record(&mut self) -> Result<Option<RawRecord>, ContractError> {
        match self {
            Self::Live(s) => s.next_record().await,
            Self::Replay(s) => s.next_record().await,
        }
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        match self {
            Self::Live(s) => s.close().await,
            Self::Replay(s) => s.close().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ReplayConfig, SystemClock};
    use std::path::PathBuf;

    fn replay_config() -> SourceConfig {
        SourceConfig {
            kind: SourceKind::Replay,
            live: None,
            replay: Some(ReplayConfig {
                directory: PathBuf::from("/nonexistent/firehose"),
                poll_interval_ms: 100,
                watch: false,
            }),
        }
    }

    #[test]
    fn test_selects_replay_variant() {
        let adapter = SourceAdapter::from_config(
            &replay_config(),
            Arc::new(SystemClock),
            Arc::new(IngestionMetrics::new()),
        )
        .unwrap();
        assert!(matches!(adapter, SourceAdapter::Replay(_)));
        assert_eq!(adapter.tag(), SourceTag::Replay);
    }

    #[test]
    fn test_missing_section_is_error() {
        let mut config = replay_config();
        config.kind = SourceKind::Live;
        let result = SourceAdapter::from_config(
            &config,
            Arc::new(SystemClock),
            Arc::new(IngestionMetrics::new()),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_source_fails_open() {
        let mut adapter = SourceAdapter::from_config(
            &replay_config(),
            Arc::new(SystemClock),
            Arc::new(IngestionMetrics::new()),
        )
        .unwrap();
        assert!(adapter.open(&ResumePoint::fresh()).await.is_err());
    }
}
