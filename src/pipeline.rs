//! Batch pipeline orchestration
//!
//! Runs the staged transformation over one materialized event batch:
//! raw events → sessionized events → window signals → window metrics.
//! Each stage consumes the previous stage's full output as an immutable batch;
//! a run either completes over its whole input or fails before producing
//! anything.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::DetectorConfig;
use crate::error::MetricsError;
use crate::sessionizer::sessionize;
use crate::synthesizer::{synthesize_all, FeatureMask};
use crate::types::{RawEvent, SessionEvent, WindowMetrics, WindowRecord};
use crate::windower::extract_windows;

/// Result of one pipeline run, with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutput {
    /// Unique id for this run
    pub run_id: Uuid,
    /// Producing software, for provenance
    pub producer: String,
    /// Producing software version
    pub producer_version: String,
    /// When the run was computed
    pub computed_at: DateTime<Utc>,
    /// Events dropped for missing or unparseable timestamps
    pub discarded: usize,
    /// Sessionized events (the windower's input, kept for the sequence view)
    pub events: Vec<SessionEvent>,
    /// Windowed feature table
    pub windows: Vec<WindowRecord>,
    /// Synthesized window metrics
    pub metrics: Vec<WindowMetrics>,
}

/// A parsed NDJSON batch with malformed-line accounting
#[derive(Debug, Clone, Default)]
pub struct ParsedBatch {
    pub events: Vec<RawEvent>,
    /// Lines that failed to parse; dropped, never fatal
    pub malformed: usize,
}

/// Parse a JSON array of raw events
pub fn parse_events(json: &str) -> Result<Vec<RawEvent>, MetricsError> {
    serde_json::from_str(json)
        .map_err(|e| MetricsError::ParseError(format!("event batch is not a JSON array: {}", e)))
}

/// Parse newline-delimited JSON, one event per line. Blank lines are skipped;
/// malformed lines are dropped and tallied.
pub fn parse_ndjson(input: &str) -> ParsedBatch {
    let mut batch = ParsedBatch::default();
    for line in input.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<RawEvent>(line) {
            Ok(event) => batch.events.push(event),
            Err(_) => batch.malformed += 1,
        }
    }
    batch
}

/// Run the full pipeline over one event batch with the base formula.
///
/// # Example
/// ```ignore
/// let output = run_pipeline(events, &DetectorConfig::default());
/// println!("{} windows, {} dropped", output.windows.len(), output.discarded);
/// ```
pub fn run_pipeline(events: Vec<RawEvent>, config: &DetectorConfig) -> PipelineOutput {
    run_pipeline_with_mask(events, config, FeatureMask::default())
}

/// Run the full pipeline with an explicit feature mask (ablation runs)
pub fn run_pipeline_with_mask(
    events: Vec<RawEvent>,
    config: &DetectorConfig,
    mask: FeatureMask,
) -> PipelineOutput {
    // Stage 1: Sessionize
    let outcome = sessionize(events, config);

    // Stage 2: Extract windows
    let windows = extract_windows(&outcome.events, config);

    // Stage 3: Synthesize metrics
    let metrics = synthesize_all(&windows, mask);

    PipelineOutput {
        run_id: Uuid::new_v4(),
        producer: crate::PRODUCER_NAME.to_string(),
        producer_version: crate::VERSION.to_string(),
        computed_at: Utc::now(),
        discarded: outcome.discarded,
        events: outcome.events,
        windows,
        metrics,
    }
}
