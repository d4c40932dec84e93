//! Visage Metrics - privacy-preserving behavioral quality metrics from raw UI
//! interaction events
//!
//! The crate transforms a materialized batch of capture-SDK events through a
//! deterministic pipeline: session reconstruction → windowed feature
//! extraction → composite metric synthesis → privacy-bounded aggregation.
//!
//! ## Modules
//!
//! - **Sessionizer**: inactivity-gap session reconstruction
//! - **Windower**: fixed-interval signal extraction (speed, rage/dead clicks,
//!   hover stalls, scroll behavior)
//! - **Synthesizer**: UFI / RCS / MIV composite scores, with ablation masks
//! - **Privacy**: k-anonymous, differentially private group aggregation
//! - **Sequences**: the window-sequence view consumed by the drop-off
//!   classifier

pub mod config;
pub mod error;
pub mod pipeline;
pub mod privacy;
pub mod sequences;
pub mod sessionizer;
pub mod synthesizer;
pub mod types;
pub mod windower;

pub use config::{DetectorConfig, PrivacyDefaults, SequenceConfig};
pub use error::MetricsError;
pub use pipeline::{parse_events, parse_ndjson, run_pipeline, run_pipeline_with_mask, PipelineOutput};
pub use privacy::{dp_group_aggregate, LaplaceNoise};
pub use sessionizer::{sessionize, SessionizeOutcome};
pub use synthesizer::{synthesize, synthesize_all, FeatureMask};
pub use types::{
    AggregationOp, AggregationRequest, AggregationResult, EventType, MetricKind, RawEvent,
    SessionEvent, WindowMetrics, WindowRecord, WindowSignals,
};
pub use windower::extract_windows;

/// Crate version embedded in run provenance
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for run provenance
pub const PRODUCER_NAME: &str = "visage-metrics";
