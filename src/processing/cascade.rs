//! Multi-tau cascades
//!
//! A correlation run walks `n_casc` cascades of `n_bins` lags each. Between
//! cascades both working streams are coarsened by a factor of two, so the
//! lag spacing doubles while the cost per cascade stays roughly constant.
//! The two strategies differ only in how they coarsen and how they sum
//! coincidences; they produce the same curve up to rounding.

use crate::types::{CorrelationMethod, TimeStream};

/// Lag axis of a multi-tau correlation.
///
/// Starts with the zero-lag placeholder; cascade `k` adds `n_bins` lags
/// spaced by `2^k`, continuing from the last lag of the previous cascade.
/// For `n_bins = 3, n_casc = 3`: `0, 1, 2, 3, 5, 7, 9, 13, 17, 21`.
///
/// Callers validate that the axis fits into 64 bits.
pub fn lag_axis(n_bins: usize, n_casc: usize) -> Vec<u64> {
    let mut lags = Vec::with_capacity(n_bins * n_casc + 1);
    lags.push(0);
    let mut last = 0u64;
    for cascade in 0..n_casc {
        let spacing = 1u64 << cascade;
        for _ in 0..n_bins {
            last += spacing;
            lags.push(last);
        }
    }
    lags
}

/// A time stream that is coarsened in place between cascades.
#[derive(Debug, Clone, Default)]
pub struct WorkingStream {
    pub(crate) times: Vec<u64>,
    pub(crate) weights: Vec<f64>,
}

impl WorkingStream {
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
}

impl From<TimeStream> for WorkingStream {
    fn from(stream: TimeStream) -> Self {
        let (times, weights) = stream.into_parts();
        Self { times, weights }
    }
}

/// One cascade step of a multi-tau correlation.
pub trait CascadeStrategy: Sync {
    /// Readies a fresh copy of an input stream for the first cascade.
    fn prepare(&self, _stream: &mut WorkingStream) {}

    /// Sums `w1 * w2` over all event pairs with `t2 == t1 + shift`, per shift.
    ///
    /// `shifts` are given in the stream's current (coarsened) time units.
    fn compute_cascade(
        &self,
        stream1: &WorkingStream,
        stream2: &WorkingStream,
        shifts: &[u64],
    ) -> Vec<f64>;

    /// Halves the time resolution of a stream.
    fn coarsen(&self, stream: &mut WorkingStream);
}

/// Keeps every working time unique by merging events that share a bin.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergedCascade;

/// Keeps every event and multiplies runs of equal times instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunLengthCascade;

static MERGED: MergedCascade = MergedCascade;
static RUN_LENGTH: RunLengthCascade = RunLengthCascade;

impl CorrelationMethod {
    pub fn strategy(self) -> &'static dyn CascadeStrategy {
        match self {
            Self::Default => &MERGED,
            Self::Alternate => &RUN_LENGTH,
        }
    }
}

/// Merges adjacent events with equal times after applying `shift_right`.
fn merge_equal_times(stream: &mut WorkingStream, shift_right: u32) {
    let mut write = 0;
    for read in 0..stream.times.len() {
        let time = stream.times[read] >> shift_right;
        let weight = stream.weights[read];
        if write > 0 && stream.times[write - 1] == time {
            stream.weights[write - 1] += weight;
        } else {
            stream.times[write] = time;
            stream.weights[write] = weight;
            write += 1;
        }
    }
    stream.times.truncate(write);
    stream.weights.truncate(write);
}

impl CascadeStrategy for MergedCascade {
    fn prepare(&self, stream: &mut WorkingStream) {
        // Zero-weight events never contribute to the sums.
        let (times, weights): (Vec<u64>, Vec<f64>) = stream
            .times
            .iter()
            .zip(&stream.weights)
            .filter(|(_, w)| **w != 0.0)
            .map(|(&t, &w)| (t, w))
            .unzip();
        stream.times = times;
        stream.weights = weights;
        merge_equal_times(stream, 0);
    }

    fn compute_cascade(
        &self,
        stream1: &WorkingStream,
        stream2: &WorkingStream,
        shifts: &[u64],
    ) -> Vec<f64> {
        let mut sums = vec![0.0; shifts.len()];
        // One cursor per shift; targets grow with t1, so cursors only move forward.
        let mut cursors = vec![0usize; shifts.len()];
        let n2 = stream2.len();

        for (&t1, &w1) in stream1.times.iter().zip(&stream1.weights) {
            for ((sum, cursor), &shift) in sums.iter_mut().zip(cursors.iter_mut()).zip(shifts) {
                let Some(target) = t1.checked_add(shift) else {
                    continue;
                };
                while *cursor < n2 && stream2.times[*cursor] < target {
                    *cursor += 1;
                }
                if *cursor < n2 && stream2.times[*cursor] == target {
                    *sum += w1 * stream2.weights[*cursor];
                }
            }
        }
        sums
    }

    fn coarsen(&self, stream: &mut WorkingStream) {
        merge_equal_times(stream, 1);
    }
}

impl CascadeStrategy for RunLengthCascade {
    fn compute_cascade(
        &self,
        stream1: &WorkingStream,
        stream2: &WorkingStream,
        shifts: &[u64],
    ) -> Vec<f64> {
        let mut sums = vec![0.0; shifts.len()];
        let mut cursors = vec![0usize; shifts.len()];
        let n1 = stream1.len();
        let n2 = stream2.len();

        let mut i = 0;
        while i < n1 {
            let t1 = stream1.times[i];
            let mut run1 = 0.0;
            while i < n1 && stream1.times[i] == t1 {
                run1 += stream1.weights[i];
                i += 1;
            }
            if run1 == 0.0 {
                continue;
            }
            for ((sum, cursor), &shift) in sums.iter_mut().zip(cursors.iter_mut()).zip(shifts) {
                let Some(target) = t1.checked_add(shift) else {
                    continue;
                };
                while *cursor < n2 && stream2.times[*cursor] < target {
                    *cursor += 1;
                }
                let run2: f64 = stream2.times[*cursor..]
                    .iter()
                    .zip(&stream2.weights[*cursor..])
                    .take_while(|(t, _)| **t == target)
                    .map(|(_, w)| w)
                    .sum();
                *sum += run1 * run2;
            }
        }
        sums
    }

    fn coarsen(&self, stream: &mut WorkingStream) {
        stream.times.iter_mut().for_each(|t| *t >>= 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn working(times: &[u64], weights: &[f64]) -> WorkingStream {
        WorkingStream {
            times: times.to_vec(),
            weights: weights.to_vec(),
        }
    }

    #[test]
    fn test_lag_axis_reference() {
        assert_eq!(
            lag_axis(3, 5),
            vec![0, 1, 2, 3, 5, 7, 9, 13, 17, 21, 29, 37, 45, 61, 77, 93]
        );
        assert_eq!(lag_axis(1, 4), vec![0, 1, 3, 7, 15]);
    }

    #[test]
    fn test_merged_coarsen_sums_weights() {
        let mut stream = working(&[0, 1, 2, 3, 7], &[1.0, 2.0, 1.0, 1.0, 0.5]);
        MergedCascade.coarsen(&mut stream);
        assert_eq!(stream.times(), &[0, 1, 3]);
        assert_eq!(stream.weights(), &[3.0, 2.0, 0.5]);
    }

    #[test]
    fn test_prepare_drops_zero_weights_and_duplicates() {
        let mut stream = working(&[1, 1, 2, 5], &[1.0, 1.0, 0.0, 2.0]);
        MergedCascade.prepare(&mut stream);
        assert_eq!(stream.times(), &[1, 5]);
        assert_eq!(stream.weights(), &[2.0, 2.0]);
    }

    #[test]
    fn test_strategies_count_the_same_pairs() {
        let s1 = working(&[0, 0, 3, 4, 4, 9], &[1.0, 1.0, 1.0, 0.5, 1.0, 1.0]);
        let s2 = working(&[1, 2, 5, 5, 6, 10], &[1.0, 1.0, 1.0, 2.0, 1.0, 1.0]);
        let shifts = [1, 2, 3];

        let mut merged1 = s1.clone();
        let mut merged2 = s2.clone();
        MergedCascade.prepare(&mut merged1);
        MergedCascade.prepare(&mut merged2);
        let merged = MergedCascade.compute_cascade(&merged1, &merged2, &shifts);
        let run_length = RunLengthCascade.compute_cascade(&s1, &s2, &shifts);

        // shift 1: 0->1 (2 * 1), 4->5 (1.5 * 3), 9->10 (1 * 1) = 7.5
        assert_eq!(merged, vec![7.5, 2.0 + 3.0 + 1.5, 1.0]);
        assert_eq!(merged, run_length);
    }
}
