//! Training-sequence view over the windowed feature table
//!
//! The external drop-off classifier consumes fixed-length runs of consecutive
//! windows per session. Each run is labeled by whether the next raw event
//! after the run's last window end is at least a horizon away, or absent.
//! Feature scaling matches the training utilities: per-column z-score with
//! zero-variance columns floored to a unit scale.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::SequenceConfig;
use crate::types::{SessionEvent, WindowRecord, FEATURE_NAMES};

/// One training sequence: consecutive windows of a session plus the drop-off
/// label of the last window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowSequence {
    pub sess_key: String,
    /// Index of the first window of the run within its session
    pub start_index: u32,
    /// Feature vectors in window order, one per window
    pub features: Vec<[f64; 11]>,
    /// True when the session goes quiet after the last window
    pub dropoff: bool,
}

/// Gap (seconds) from each window's end to the next raw event strictly after
/// it; infinite when the session has no later event.
pub fn next_event_gaps(events: &[SessionEvent], windows: &[WindowRecord]) -> Vec<f64> {
    let mut by_session: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for event in events {
        if let Some(ts) = event.event.timestamp() {
            by_session.entry(&event.sess_key).or_default().push(ts);
        }
    }
    for timestamps in by_session.values_mut() {
        timestamps.sort_by(f64::total_cmp);
    }

    windows
        .iter()
        .map(|window| {
            let Some(timestamps) = by_session.get(window.sess_key.as_str()) else {
                return f64::INFINITY;
            };
            let next = timestamps.partition_point(|&ts| ts <= window.w_end);
            match timestamps.get(next) {
                Some(&ts) => ts - window.w_end,
                None => f64::INFINITY,
            }
        })
        .collect()
}

/// Drop-off label per window: next event at least `horizon_sec` past the
/// window end, or absent
pub fn dropoff_labels(gaps: &[f64], horizon_sec: f64) -> Vec<bool> {
    gaps.iter().map(|&gap| gap >= horizon_sec).collect()
}

/// Slide a fixed-length run over each session's consecutive windows.
///
/// `windows` and `labels` are parallel and ordered by (session, window index),
/// as produced by the windower. Sessions shorter than `seq_len` yield nothing.
pub fn build_sequences(
    windows: &[WindowRecord],
    labels: &[bool],
    config: &SequenceConfig,
) -> Vec<WindowSequence> {
    let mut out = Vec::new();
    if config.seq_len == 0 {
        return out;
    }

    let mut start = 0;
    while start < windows.len() {
        let sess_key = &windows[start].sess_key;
        let mut end = start;
        while end < windows.len() && windows[end].sess_key == *sess_key {
            end += 1;
        }

        for offset in 0..(end - start).saturating_sub(config.seq_len - 1) {
            let run = &windows[start + offset..start + offset + config.seq_len];
            out.push(WindowSequence {
                sess_key: sess_key.clone(),
                start_index: run[0].window_index,
                features: run.iter().map(|w| w.signals.to_feature_vec()).collect(),
                dropoff: labels[start + offset + config.seq_len - 1],
            });
        }
        start = end;
    }
    out
}

/// Per-column z-score scaler over the 11-signal feature vector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureScaler {
    pub mean: [f64; 11],
    pub std: [f64; 11],
}

impl FeatureScaler {
    /// Fit column means and population standard deviations; a zero std is
    /// floored to 1 so constant columns pass through centered.
    pub fn fit(windows: &[WindowRecord]) -> Self {
        let n = windows.len().max(1) as f64;
        let mut mean = [0.0f64; 11];
        let mut std = [0.0f64; 11];

        for window in windows {
            let vec = window.signals.to_feature_vec();
            for (m, v) in mean.iter_mut().zip(vec) {
                *m += v;
            }
        }
        for m in &mut mean {
            *m /= n;
        }

        for window in windows {
            let vec = window.signals.to_feature_vec();
            for ((s, m), v) in std.iter_mut().zip(mean).zip(vec) {
                *s += (v - m).powi(2);
            }
        }
        for s in &mut std {
            *s = (*s / n).sqrt();
            if *s == 0.0 {
                *s = 1.0;
            }
        }

        Self { mean, std }
    }

    /// Scale one feature vector
    pub fn apply(&self, features: &[f64; 11]) -> [f64; 11] {
        let mut out = [0.0f64; 11];
        for i in 0..11 {
            out[i] = (features[i] - self.mean[i]) / self.std[i];
        }
        out
    }

    /// Column names in scaler order
    pub fn columns() -> [&'static str; 11] {
        FEATURE_NAMES
    }
}
