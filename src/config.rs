//! Pipeline configuration
//!
//! Every threshold used by the signal detectors lives in an explicit, immutable
//! config struct that is threaded into each detector call. Defaults match the
//! values the production capture SDK was tuned against.

use serde::{Deserialize, Serialize};

/// Inactivity gap (seconds) that splits a (user, tab) event stream into sessions
pub const DEFAULT_SESSION_GAP_SEC: f64 = 30.0 * 60.0;

/// Floor applied to every elapsed-time denominator to keep results finite
pub const MIN_ELAPSED_SEC: f64 = 1e-6;

/// Assumed move-sampling quantum (20 Hz) used by the hover-stall duration proxy.
/// Changing this changes the meaning of the UFI stall term; keep in sync with
/// the capture SDK's sampling rate.
pub const MOVE_SAMPLE_QUANTUM_SEC: f64 = 0.05;

/// Thresholds for the per-window signal detectors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Window length in seconds
    pub window_sec: f64,
    /// Inactivity gap (seconds) that starts a new session segment
    pub session_gap_sec: f64,
    /// Maximum time span of a click triplet to count as a rage burst
    pub rage_burst_sec: f64,
    /// Maximum pairwise pixel distance within a rage triplet
    pub rage_radius_px: f64,
    /// Cursor speed below which a move sample counts toward a hover stall
    pub low_speed_px_per_sec: f64,
    /// Minimum accumulated low-speed duration to count one stall
    pub stall_sec: f64,
    /// Tag prefixes considered actionable; clicks elsewhere are dead clicks
    pub actionable_prefixes: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_sec: 5.0,
            session_gap_sec: DEFAULT_SESSION_GAP_SEC,
            rage_burst_sec: 0.6,
            rage_radius_px: 50.0,
            low_speed_px_per_sec: 40.0,
            stall_sec: 0.7,
            actionable_prefixes: ["button", "a", "input", "select", "textarea", "label"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Default privacy parameters, exposed for client introspection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivacyDefaults {
    /// Privacy budget per query
    pub epsilon: f64,
    /// Minimum group size below which a group is suppressed
    pub k: usize,
    /// Lower clipping bound applied to metric values before aggregation
    pub clip_lo: f64,
    /// Upper clipping bound applied to metric values before aggregation
    pub clip_hi: f64,
}

impl Default for PrivacyDefaults {
    fn default() -> Self {
        Self {
            epsilon: 1.0,
            k: 5,
            clip_lo: 0.0,
            clip_hi: 1.0,
        }
    }
}

/// Parameters for the training-sequence view consumed by the drop-off classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceConfig {
    /// Number of consecutive windows per sequence
    pub seq_len: usize,
    /// A window is a drop-off when the next raw event is at least this far
    /// past the window end (or absent)
    pub horizon_sec: f64,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            seq_len: 6,
            horizon_sec: 10.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_detector_config() {
        let config = DetectorConfig::default();
        assert_eq!(config.window_sec, 5.0);
        assert_eq!(config.session_gap_sec, 1800.0);
        assert_eq!(config.rage_burst_sec, 0.6);
        assert_eq!(config.rage_radius_px, 50.0);
        assert!(config.actionable_prefixes.contains(&"button".to_string()));
        assert_eq!(config.actionable_prefixes.len(), 6);
    }

    #[test]
    fn test_privacy_defaults_serialization() {
        let defaults = PrivacyDefaults::default();
        let json = serde_json::to_string(&defaults).unwrap();
        let parsed: PrivacyDefaults = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.epsilon, 1.0);
        assert_eq!(parsed.k, 5);
        assert_eq!(parsed.clip_lo, 0.0);
        assert_eq!(parsed.clip_hi, 1.0);
    }
}
