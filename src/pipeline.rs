use crate::config::Config;
use crate::dedup::DuplicateDetector;
use crate::error::{FeedError, Result};
use crate::fetch::{FetchWindow, NewsSource};
use crate::metrics::PipelineMetrics;
use crate::normalize::normalize_batch;
use crate::publisher::{publish_all, Publisher, ThreatSubmission};
use crate::storage::PartitionStore;
use crate::types::{Clock, RawIncident};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

/// Knobs the orchestrator needs from [`Config`]
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub window_days: i64,
    pub lookback_hours: i64,
    pub threshold: f64,
    pub lga_placeholder: String,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            window_days: config.storage.window_days,
            lookback_hours: config.fetch.lookback_hours,
            threshold: config.dedup.threshold,
            lga_placeholder: config.publish.lga_placeholder.clone(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Result of one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub fetched: usize,
    pub duplicates: usize,
    pub unique: usize,
    pub published: usize,
    /// Partition the batch was persisted to; `None` when nothing was fetched
    pub partition: Option<PathBuf>,
}

impl RunReport {
    fn empty(run_id: Uuid) -> Self {
        Self {
            run_id,
            fetched: 0,
            duplicates: 0,
            unique: 0,
            published: 0,
            partition: None,
        }
    }
}

/// Fetch -> load history -> normalize & persist -> dedup -> filter -> publish.
///
/// Nothing is rolled back: a persisted batch stays persisted even when
/// publishing fails afterwards.
pub struct Pipeline {
    source: Box<dyn NewsSource>,
    publisher: Box<dyn Publisher>,
    store: PartitionStore,
    clock: Box<dyn Clock>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        source: Box<dyn NewsSource>,
        publisher: Box<dyn Publisher>,
        store: PartitionStore,
        clock: Box<dyn Clock>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            source,
            publisher,
            store,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run the whole sequence starting from the upstream fetch.
    pub fn run(&self) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline_run", run_id = %run_id);
        let _enter = span.enter();
        let started = Instant::now();

        let window = FetchWindow::last_hours(self.clock.now(), self.settings.lookback_hours)?;
        info!("📡 Fetching incidents from {} to {}", window.start, window.end);

        let raw = match self.source.fetch(&window) {
            Ok(items) => items,
            Err(FeedError::MalformedResponse { message }) => {
                warn!(
                    "⚠️ Upstream content is not valid JSON, skipping this batch: {}",
                    message
                );
                PipelineMetrics::record_malformed_response();
                Vec::new()
            }
            Err(e) => {
                error!("Fetch failed: {}", e);
                return Err(e);
            }
        };

        let result = self.process(run_id, raw);
        PipelineMetrics::record_run_duration(started.elapsed().as_secs_f64());
        result
    }

    /// Everything after the fetch, for records obtained elsewhere.
    pub fn filter_and_publish(&self, raw: Vec<RawIncident>) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline_run", run_id = %run_id);
        let _enter = span.enter();
        self.process(run_id, raw)
    }

    fn process(&self, run_id: Uuid, raw: Vec<RawIncident>) -> Result<RunReport> {
        PipelineMetrics::record_fetched(raw.len());
        if raw.is_empty() {
            warn!("⚠️ No news items returned");
            return Ok(RunReport::empty(run_id));
        }
        info!("✅ Received {} raw incident(s)", raw.len());

        let now = self.clock.now();
        let history = self.store.load_recent(now, self.settings.window_days)?;

        let mut current = normalize_batch(&raw).map_err(|e| {
            error!("❌ {}", e);
            PipelineMetrics::record_validation_failure(e.violations.len());
            FeedError::from(e)
        })?;

        let partition = self.store.save_batch(&current, now)?;

        let detector = DuplicateDetector::new(self.settings.threshold);
        detector.mark(&mut current, &history);

        let submissions: Vec<ThreatSubmission> = current
            .iter()
            .filter(|record| record.is_duplicate == Some(false))
            .map(|record| ThreatSubmission::from_record(record, &self.settings.lga_placeholder))
            .collect();
        let duplicates = current.len() - submissions.len();
        PipelineMetrics::record_dedup(duplicates, submissions.len());
        info!(
            "📊 Found {} unique incident(s) out of {}",
            submissions.len(),
            current.len()
        );

        let mut report = RunReport {
            run_id,
            fetched: raw.len(),
            duplicates,
            unique: submissions.len(),
            published: 0,
            partition: Some(partition),
        };

        if submissions.is_empty() {
            warn!("⚠️ No unique news to publish");
            return Ok(report);
        }

        match publish_all(self.publisher.as_ref(), &submissions) {
            Ok(responses) => {
                PipelineMetrics::record_published(responses.len());
                info!("✅ Successfully published {} incident(s)", responses.len());
                report.published = responses.len();
                Ok(report)
            }
            Err(e) => {
                if let FeedError::PublishAborted { sent, .. } = &e {
                    PipelineMetrics::record_published(*sent);
                }
                PipelineMetrics::record_publish_failure();
                Err(e)
            }
        }
    }
}
