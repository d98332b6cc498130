use serde::Deserialize;

/// Anomaly detection limits, read from `[monitor.thresholds]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Any error rate strictly above this raises a warning.
    pub error_rate_max: f64,

    /// Fraction of fetched reviews already stored above which the source
    /// looks stale.
    pub dedup_rate_ceiling: f64,

    /// Duration above `multiplier * trailing average` is a spike.
    pub duration_multiplier: f64,

    /// Percent deviation of inserted reviews from the trailing average,
    /// applied in both directions.
    pub inserted_change_pct: f64,

    /// Null-rate shift, in percentage points, for the tracked optional fields.
    pub null_rate_shift_pp: f64,

    pub z_score_limit: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            error_rate_max: 0.0,
            dedup_rate_ceiling: 0.995,
            duration_multiplier: 2.0,
            inserted_change_pct: 50.0,
            null_rate_shift_pp: 5.0,
            z_score_limit: 2.0,
        }
    }
}
