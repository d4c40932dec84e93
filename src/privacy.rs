//! Privacy-bounded aggregation
//!
//! Groups window metrics by caller-specified columns and releases aggregates
//! under k-anonymity and epsilon-differential privacy. Suppression happens
//! before noise addition: a group smaller than k contributes nothing to the
//! output, for any epsilon, so noise calibration never has to account for
//! possible-zero-size groups and small-cohort membership is never leaked.
//!
//! The noise source is an explicitly passed, seedable object; each group's
//! draws are independent and results are reproducible under a fixed seed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

use crate::error::MetricsError;
use crate::types::{AggregationOp, AggregationRequest, AggregationResult, WindowMetrics};

/// Floor applied to caller-supplied epsilon; keeps the noise scale finite and
/// prevents trivially requesting zero noise via epsilon = 0
pub const EPSILON_FLOOR: f64 = 1e-6;

/// Columns of the window-metrics table that may be grouped on
pub const GROUPABLE_COLUMNS: [&str; 4] = ["sess_key", "uid", "w_start", "w_end"];

/// Seedable Laplace noise source
#[derive(Debug)]
pub struct LaplaceNoise {
    rng: StdRng,
}

impl LaplaceNoise {
    /// Noise source seeded from OS entropy
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic noise source for reproducible runs and tests
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// One draw from Laplace(0, scale) via inverse-CDF sampling
    pub fn sample(&mut self, scale: f64) -> f64 {
        let u: f64 = self.rng.gen::<f64>() - 0.5;
        // 1 - 2|u| can reach zero when the rng returns exactly 0; floor it so
        // the log stays finite.
        -scale * u.signum() * (1.0 - 2.0 * u.abs()).max(f64::MIN_POSITIVE).ln()
    }
}

/// Run a k-anonymous, differentially private aggregation over the
/// window-metrics table.
///
/// Grouping columns are validated before any row is touched; an unknown column
/// or empty `group_by` is an invalid-argument error. Returned rows are sorted
/// by group key. Each row carries the requested noised aggregate plus a noised
/// count estimate under the same epsilon.
pub fn dp_group_aggregate(
    rows: &[WindowMetrics],
    request: &AggregationRequest,
    noise: &mut LaplaceNoise,
) -> Result<Vec<AggregationResult>, MetricsError> {
    if request.group_by.is_empty() {
        return Err(MetricsError::InvalidArgument(
            "group_by must name at least one column".to_string(),
        ));
    }
    for column in &request.group_by {
        if !GROUPABLE_COLUMNS.contains(&column.as_str()) {
            return Err(MetricsError::UnknownColumn(column.clone()));
        }
    }
    if request.clip_hi < request.clip_lo {
        return Err(MetricsError::InvalidArgument(format!(
            "clip_hi ({}) must be >= clip_lo ({})",
            request.clip_hi, request.clip_lo
        )));
    }

    let epsilon = request.epsilon.max(EPSILON_FLOOR);
    let clip_range = request.clip_hi - request.clip_lo;

    // Deterministic group order; true group size counts every row, including
    // rows whose metric value is undefined.
    let mut groups: BTreeMap<Vec<String>, Vec<&WindowMetrics>> = BTreeMap::new();
    for row in rows {
        let key: Vec<String> = request
            .group_by
            .iter()
            .map(|column| group_value(row, column))
            .collect();
        groups.entry(key).or_default().push(row);
    }

    let mut out = Vec::new();
    for (key, members) in groups {
        if members.len() < request.k {
            continue;
        }

        let values: Vec<f64> = members
            .iter()
            .filter_map(|row| request.metric.value(row))
            .map(|v| v.clamp(request.clip_lo, request.clip_hi))
            .collect();
        let n = values.len();

        let value = match request.agg {
            AggregationOp::Count => n as f64 + noise.sample(1.0 / epsilon),
            AggregationOp::Sum => {
                values.iter().sum::<f64>() + noise.sample(clip_range / epsilon)
            }
            AggregationOp::Mean => {
                let denom = n.max(1) as f64;
                let sensitivity = clip_range / denom;
                values.iter().sum::<f64>() / denom + noise.sample(sensitivity / epsilon)
            }
        };
        let dp_count = n as f64 + noise.sample(1.0 / epsilon);

        out.push(AggregationResult {
            group: request
                .group_by
                .iter()
                .cloned()
                .zip(key.into_iter())
                .collect(),
            value,
            dp_count,
        });
    }
    Ok(out)
}

/// Extract a row's value for one grouping column. Columns are validated
/// upstream, so an unknown name here is unreachable.
fn group_value(row: &WindowMetrics, column: &str) -> String {
    match column {
        "sess_key" => row.sess_key.clone(),
        "uid" => row.uid.clone(),
        "w_start" => format!("{}", row.w_start),
        "w_end" => format!("{}", row.w_end),
        _ => String::new(),
    }
}
