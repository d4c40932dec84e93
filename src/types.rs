//! Core data types for the metrics pipeline
//!
//! This module defines the wire schema for raw capture events and the record
//! types produced by each pipeline stage: sessionized events, window signal
//! rows, synthesized window metrics, and privacy-aggregation requests/results.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::MetricsError;

/// Event types captured by the browser SDK
///
/// Anything the SDK does not recognize arrives as a free-form tag and is
/// preserved as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    #[serde(alias = "mousemove")]
    Move,
    Click,
    Scroll,
    /// For custom/unknown event tags
    #[serde(untagged)]
    Other(String),
}

/// Viewport state nested in scroll events
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewState {
    /// Vertical scroll position in pixels
    #[serde(default)]
    pub y: Option<f64>,
}

/// One raw UI interaction event, as posted by the capture SDK
///
/// Field names match the ingestion wire format (`sid`/`uid`/`ts`/`ev`/...).
/// All identifying fields are hashed upstream; events are immutable once
/// recorded and may arrive out of order across sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    /// Hashed session id (device/tab scoped)
    pub sid: String,
    /// Hashed user id
    pub uid: String,
    /// Epoch seconds; producers occasionally send this as a numeric string
    #[serde(default, deserialize_with = "lenient_f64")]
    pub ts: Option<f64>,
    /// Event type tag
    pub ev: EventType,
    /// Pointer x coordinate in pixels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    /// Pointer y coordinate in pixels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    /// Lowercase tag/selector of the target element
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub el: Option<String>,
    /// Viewport state (scroll events)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<ViewState>,
}

impl RawEvent {
    /// Timestamp when present and finite, else `None`
    pub fn timestamp(&self) -> Option<f64> {
        self.ts.filter(|t| t.is_finite())
    }

    /// Scroll position carried in the view payload, if any
    pub fn scroll_y(&self) -> Option<f64> {
        self.view.as_ref().and_then(|v| v.y).filter(|y| y.is_finite())
    }
}

/// Accept epoch seconds as a JSON number or a numeric string; anything else
/// becomes `None` and is discarded (with a count) by the sessionizer.
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }))
}

/// A raw event annotated with its derived session key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    /// `{uid}@{sid}:{segment}` where segment increments at each inactivity gap
    pub sess_key: String,
    #[serde(flatten)]
    pub event: RawEvent,
}

/// Column order of the windowed feature vector, as consumed by the drop-off
/// classifier's training utilities. Do not reorder.
pub const FEATURE_NAMES: [&str; 11] = [
    "speed_mean",
    "speed_max",
    "speed_std",
    "rage_clicks",
    "dead_clicks",
    "hover_stall",
    "scroll_velocity",
    "scroll_oscillations",
    "scroll_depth",
    "clicks",
    "moves",
];

/// Behavioral signals extracted from one window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowSignals {
    /// Mean cursor speed (px/s) over in-window move samples
    pub speed_mean: f64,
    /// Maximum cursor speed (px/s)
    pub speed_max: f64,
    /// Population standard deviation of cursor speed
    pub speed_std: f64,
    /// Consecutive click triplets within the rage burst/radius thresholds
    pub rage_clicks: u32,
    /// Clicks on non-actionable elements
    pub dead_clicks: u32,
    /// Clicks preceded by a sustained low-speed hover
    pub hover_stall: u32,
    /// Net scroll velocity (px/s) over the window
    pub scroll_velocity: f64,
    /// Scroll direction reversals
    pub scroll_oscillations: u32,
    /// Maximum scroll position observed in-window
    pub scroll_depth: f64,
    /// Click count
    pub clicks: u32,
    /// Move-sample count
    pub moves: u32,
}

impl WindowSignals {
    /// Flatten into the fixed feature-vector order of [`FEATURE_NAMES`]
    pub fn to_feature_vec(&self) -> [f64; 11] {
        [
            self.speed_mean,
            self.speed_max,
            self.speed_std,
            self.rage_clicks as f64,
            self.dead_clicks as f64,
            self.hover_stall as f64,
            self.scroll_velocity,
            self.scroll_oscillations as f64,
            self.scroll_depth,
            self.clicks as f64,
            self.moves as f64,
        ]
    }
}

/// One row of the windowed feature table: a half-open interval
/// `[w_start, w_end)` of a session plus its extracted signals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowRecord {
    /// Session key this window belongs to
    pub sess_key: String,
    /// Hashed user id (duplicated out of the key for grouping)
    pub uid: String,
    /// Zero-based window index within the session
    pub window_index: u32,
    /// Window start (epoch seconds, inclusive)
    pub w_start: f64,
    /// Window end (epoch seconds, exclusive)
    pub w_end: f64,
    /// Extracted signals
    #[serde(flatten)]
    pub signals: WindowSignals,
}

/// Composite scores for one window, with the raw signals retained for
/// auditability and ablation reruns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowMetrics {
    pub sess_key: String,
    pub uid: String,
    pub w_start: f64,
    pub w_end: f64,
    /// Unproductive Friction Index, 0-1
    pub ufi: f64,
    /// Reading Comfort Score, 0-1
    pub rcs: f64,
    /// Interaction-latency proxy (seconds); `None` when undefined for the window
    #[serde(default)]
    pub miv: Option<f64>,
    /// Raw signals the scores were synthesized from
    #[serde(flatten)]
    pub signals: WindowSignals,
}

/// Target metric for a privacy aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricKind {
    #[serde(rename = "UFI")]
    Ufi,
    #[serde(rename = "RCS")]
    Rcs,
    #[serde(rename = "MIV")]
    Miv,
}

impl MetricKind {
    /// Extract this metric's value from a row; `None` only for undefined MIV
    pub fn value(&self, row: &WindowMetrics) -> Option<f64> {
        match self {
            MetricKind::Ufi => Some(row.ufi),
            MetricKind::Rcs => Some(row.rcs),
            MetricKind::Miv => row.miv,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Ufi => "UFI",
            MetricKind::Rcs => "RCS",
            MetricKind::Miv => "MIV",
        }
    }
}

impl FromStr for MetricKind {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "UFI" => Ok(MetricKind::Ufi),
            "RCS" => Ok(MetricKind::Rcs),
            "MIV" => Ok(MetricKind::Miv),
            other => Err(MetricsError::UnknownMetric(other.to_string())),
        }
    }
}

/// Aggregation operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationOp {
    Mean,
    Sum,
    Count,
}

impl AggregationOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationOp::Mean => "mean",
            AggregationOp::Sum => "sum",
            AggregationOp::Count => "count",
        }
    }
}

impl FromStr for AggregationOp {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mean" => Ok(AggregationOp::Mean),
            "sum" => Ok(AggregationOp::Sum),
            "count" => Ok(AggregationOp::Count),
            other => Err(MetricsError::UnsupportedOperator(other.to_string())),
        }
    }
}

/// A privacy-bounded aggregation query over the window-metrics table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationRequest {
    /// Grouping columns (subset of `sess_key`, `uid`, `w_start`, `w_end`)
    pub group_by: Vec<String>,
    /// Target metric
    pub metric: MetricKind,
    /// Aggregation operator
    pub agg: AggregationOp,
    /// Privacy budget; floored at a tiny positive constant when <= 0
    pub epsilon: f64,
    /// Minimum group size; smaller groups are suppressed entirely
    pub k: usize,
    /// Lower clipping bound on metric values
    pub clip_lo: f64,
    /// Upper clipping bound on metric values
    pub clip_hi: f64,
}

impl AggregationRequest {
    /// Build a request with the default privacy parameters
    pub fn new(group_by: Vec<String>, metric: MetricKind, agg: AggregationOp) -> Self {
        let defaults = crate::config::PrivacyDefaults::default();
        Self {
            group_by,
            metric,
            agg,
            epsilon: defaults.epsilon,
            k: defaults.k,
            clip_lo: defaults.clip_lo,
            clip_hi: defaults.clip_hi,
        }
    }
}

/// One retained group of an aggregation: key values, the noised aggregate, and
/// a noised count estimate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationResult {
    /// Grouping column -> key value
    pub group: BTreeMap<String, String>,
    /// Noised aggregate of the requested metric
    pub value: f64,
    /// Noised group-size estimate (same epsilon; free relative to the caller's
    /// budget bookkeeping)
    pub dp_count: f64,
}
