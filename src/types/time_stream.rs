//! Weighted time streams fed into the correlator

use crate::error::{Result, TttrError};
use itertools::Itertools;

/// Ordered `(time, weight)` pairs derived from one channel selection.
///
/// Times are non-decreasing. A zero weight removes an event from the
/// correlation sums while keeping it on the time axis, so the stream's
/// duration (and with it the normalization) is unaffected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeStream {
    times: Vec<u64>,
    weights: Vec<f64>,
}

impl TimeStream {
    /// Creates a stream from matching time and weight vectors.
    pub fn new(times: Vec<u64>, weights: Vec<f64>) -> Result<Self> {
        if times.len() != weights.len() {
            return Err(TttrError::LengthMismatch {
                what: "weights",
                expected: times.len(),
                actual: weights.len(),
            });
        }
        check_ordered(&times)?;
        if let Some(pos) = weights.iter().position(|w| !w.is_finite()) {
            return Err(TttrError::config(format!(
                "weight at index {pos} is not finite"
            )));
        }
        Ok(Self { times, weights })
    }

    /// Creates a stream where every event carries weight 1.0.
    pub fn unit(times: Vec<u64>) -> Result<Self> {
        let weights = vec![1.0; times.len()];
        Self::new(times, weights)
    }

    pub(crate) fn from_ordered(times: Vec<u64>) -> Self {
        debug_assert!(check_ordered(&times).is_ok());
        let weights = vec![1.0; times.len()];
        Self { times, weights }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[u64] {
        &self.times
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Sum of all weights (the effective number of photons).
    pub fn total_weight(&self) -> f64 {
        self.weights.iter().sum()
    }

    /// Time between the first and the last event, zero for fewer than two events.
    pub fn duration(&self) -> u64 {
        match (self.times.first(), self.times.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0,
        }
    }

    /// Sets the weight of every event in the half-open `[start, stop)` ranges to zero.
    pub fn zero_ranges(&mut self, ranges: &[(usize, usize)]) -> Result<()> {
        for &(start, stop) in ranges {
            if start > stop || stop > self.len() {
                return Err(TttrError::RangeOutOfBounds {
                    axis: "time stream",
                    start,
                    stop,
                    len: self.len(),
                });
            }
        }
        for &(start, stop) in ranges {
            self.weights[start..stop].fill(0.0);
        }
        Ok(())
    }

    /// Multiplies weights element-wise, e.g. with a micro-time filter.
    pub fn scale_weights(&mut self, factors: &[f64]) -> Result<()> {
        if factors.len() != self.len() {
            return Err(TttrError::LengthMismatch {
                what: "weight factors",
                expected: self.len(),
                actual: factors.len(),
            });
        }
        self.weights
            .iter_mut()
            .zip(factors)
            .for_each(|(w, f)| *w *= f);
        Ok(())
    }

    pub(crate) fn into_parts(self) -> (Vec<u64>, Vec<f64>) {
        (self.times, self.weights)
    }
}

pub(crate) fn check_ordered(times: &[u64]) -> Result<()> {
    match times.iter().tuple_windows().position(|(a, b)| b < a) {
        Some(pos) => Err(TttrError::UnorderedTimes(pos + 1)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_mismatched_lengths() {
        let err = TimeStream::new(vec![1, 2, 3], vec![1.0, 1.0]).unwrap_err();
        assert!(matches!(
            err,
            TttrError::LengthMismatch {
                expected: 3,
                actual: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_unordered_times() {
        let err = TimeStream::unit(vec![1, 5, 4]).unwrap_err();
        assert!(matches!(err, TttrError::UnorderedTimes(2)));
    }

    #[test]
    fn test_zero_ranges_keeps_timing() -> Result<()> {
        let mut stream = TimeStream::unit(vec![0, 10, 20, 30, 40])?;
        stream.zero_ranges(&[(1, 3)])?;
        assert_eq!(stream.weights(), &[1.0, 0.0, 0.0, 1.0, 1.0]);
        assert_eq!(stream.duration(), 40);
        assert_eq!(stream.total_weight(), 3.0);
        assert!(stream.zero_ranges(&[(4, 6)]).is_err());
        Ok(())
    }
}
