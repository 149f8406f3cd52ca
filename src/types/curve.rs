use serde::{Deserialize, Serialize};

/// A normalized correlation curve G(τ).
///
/// `lags[0] == 0` and `values[0] == 0.0` form a structural placeholder; the
/// measured part of the curve starts at index 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationCurve {
    lags: Vec<u64>,
    values: Vec<f64>,
    /// Seconds per lag tick, if known.
    time_calibration: Option<f64>,
}

impl CorrelationCurve {
    pub(crate) fn new(lags: Vec<u64>, values: Vec<f64>, time_calibration: Option<f64>) -> Self {
        debug_assert_eq!(lags.len(), values.len());
        Self {
            lags,
            values,
            time_calibration,
        }
    }

    pub fn len(&self) -> usize {
        self.lags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lags.is_empty()
    }

    /// Lag axis in ticks of the correlated time axis.
    pub fn lags(&self) -> &[u64] {
        &self.lags
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn time_calibration(&self) -> Option<f64> {
        self.time_calibration
    }

    /// Lag axis in seconds; uncalibrated curves report ticks as `f64`.
    pub fn lag_times(&self) -> Vec<f64> {
        let scale = self.time_calibration.unwrap_or(1.0);
        self.lags.iter().map(|&lag| lag as f64 * scale).collect()
    }

    /// Iterates the measured `(lag, value)` pairs, skipping the zero-lag placeholder.
    pub fn measured(&self) -> impl Iterator<Item = (u64, f64)> + '_ {
        self.lags
            .iter()
            .copied()
            .zip(self.values.iter().copied())
            .skip(1)
    }
}
