//! Index selections over a time axis: count-rate filtering and burst search

use crate::error::{Result, TttrError};
use crate::types::time_stream::check_ordered;
use bon::Builder;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Thresholds for [`ranges_by_time_window`]. Lengths are in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Builder, Serialize, Deserialize)]
pub struct BurstCriteria {
    /// A window is closed as soon as its duration reaches this length.
    pub minimum_window_length: f64,
    #[builder(default = 1)]
    pub minimum_number_of_photons: usize,
    pub maximum_window_length: Option<f64>,
    pub maximum_number_of_photons: Option<usize>,
    /// Report the closed windows that fail the thresholds instead.
    #[builder(default)]
    pub invert: bool,
}

impl BurstCriteria {
    pub fn validate(&self) -> Result<()> {
        if !(self.minimum_window_length >= 0.0) || !self.minimum_window_length.is_finite() {
            return Err(TttrError::config(
                "minimum window length must be a finite, non-negative duration",
            ));
        }
        if let Some(max) = self.maximum_window_length {
            if !(max >= self.minimum_window_length) {
                return Err(TttrError::config(
                    "maximum window length is below the minimum window length",
                ));
            }
        }
        if let Some(max) = self.maximum_number_of_photons {
            if max < self.minimum_number_of_photons {
                return Err(TttrError::config(
                    "maximum number of photons is below the minimum number of photons",
                ));
            }
        }
        Ok(())
    }

    fn accepts(&self, n_photons: usize, duration: f64) -> bool {
        n_photons >= self.minimum_number_of_photons
            && self.maximum_window_length.is_none_or(|max| duration <= max)
            && self.maximum_number_of_photons.is_none_or(|max| n_photons <= max)
    }
}

fn check_calibration(calibration: f64) -> Result<()> {
    if calibration > 0.0 && calibration.is_finite() {
        Ok(())
    } else {
        Err(TttrError::config(format!(
            "time calibration must be positive, got {calibration}"
        )))
    }
}

/// Selects events by the photon count of the time window they fall into.
///
/// Windows are laid out greedily: a window starts at the first event not yet
/// assigned and holds every following event closer than `time_window` to it.
/// Each event belongs to exactly one window, the trailing partial window
/// included.
///
/// # Arguments
/// * `times` - Non-decreasing event times in ticks
/// * `time_window` - Window length in seconds
/// * `n_photon_max` - Count threshold per window
/// * `calibration` - Seconds per tick
/// * `invert` - If false, keep windows with at most `n_photon_max` events;
///   if true, keep windows with more
///
/// # Returns
/// Increasing indices of the selected events.
pub fn selection_by_count_rate(
    times: &[u64],
    time_window: f64,
    n_photon_max: usize,
    calibration: f64,
    invert: bool,
) -> Result<Vec<usize>> {
    check_ordered(times)?;
    check_calibration(calibration)?;
    if !(time_window > 0.0) {
        return Err(TttrError::config(format!(
            "time window must be positive, got {time_window}"
        )));
    }

    let mut selected = Vec::new();
    let mut begin = 0;
    while begin < times.len() {
        let mut end = begin + 1;
        while end < times.len()
            && ((times[end] - times[begin]) as f64 * calibration) < time_window
        {
            end += 1;
        }
        let below = end - begin <= n_photon_max;
        if below != invert {
            selected.extend(begin..end);
        }
        begin = end;
    }
    Ok(selected)
}

/// Searches for time windows ("bursts") meeting the duration and photon thresholds.
///
/// Starting at `begin`, a window is extended until its calibrated duration
/// first reaches `minimum_window_length` and is closed there; the next window
/// starts at the following event. A trailing window that never reaches the
/// minimum duration is not reported.
///
/// # Returns
/// Interleaved half-open `[start, stop)` index pairs, increasing and
/// non-overlapping.
pub fn ranges_by_time_window(
    times: &[u64],
    criteria: &BurstCriteria,
    calibration: f64,
) -> Result<Vec<usize>> {
    check_ordered(times)?;
    check_calibration(calibration)?;
    criteria.validate()?;

    let n = times.len();
    let mut ranges = Vec::new();
    let mut begin = 0;
    while begin < n {
        let mut end = begin;
        while end < n
            && ((times[end] - times[begin]) as f64 * calibration) < criteria.minimum_window_length
        {
            end += 1;
        }
        if end == n {
            break;
        }
        let stop = end + 1;
        let duration = (times[end] - times[begin]) as f64 * calibration;
        if criteria.accepts(stop - begin, duration) != criteria.invert {
            ranges.push(begin);
            ranges.push(stop);
        }
        begin = stop;
    }
    log::debug!(
        "time window search: {} of {} events in {} ranges",
        ranges.chunks(2).map(|pair| pair[1] - pair[0]).sum::<usize>(),
        n,
        ranges.len() / 2
    );
    Ok(ranges)
}

/// Splits interleaved `[start, stop)` indices into pairs.
pub fn range_pairs(ranges: &[usize]) -> Result<Vec<(usize, usize)>> {
    if ranges.len() % 2 != 0 {
        return Err(TttrError::config(format!(
            "interleaved ranges need an even number of entries, got {}",
            ranges.len()
        )));
    }
    Ok(ranges.iter().copied().tuples().collect())
}

/// Expands interleaved `[start, stop)` pairs into the covered indices.
pub fn ranges_to_indices(ranges: &[usize]) -> Result<Vec<usize>> {
    Ok(range_pairs(ranges)?
        .into_iter()
        .flat_map(|(start, stop)| start..stop)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_rate_partitions_every_event() -> Result<()> {
        // Windows of 10 ticks: [0,1,2] [10,11] [25] [40,41,42,43]
        let times = [0, 1, 2, 10, 11, 25, 40, 41, 42, 43];
        let low = selection_by_count_rate(&times, 10.0, 2, 1.0, false)?;
        let high = selection_by_count_rate(&times, 10.0, 2, 1.0, true)?;
        assert_eq!(low, vec![3, 4, 5]);
        assert_eq!(high, vec![0, 1, 2, 6, 7, 8, 9]);
        assert_eq!(low.len() + high.len(), times.len());
        Ok(())
    }

    #[test]
    fn test_count_rate_monotonic_in_threshold() -> Result<()> {
        let times: Vec<u64> = (0..200u64).map(|i| i * i % 97 + i * 3).sorted().collect();
        let mut previous: Vec<usize> = Vec::new();
        for k in 0..12 {
            let current = selection_by_count_rate(&times, 7.0, k, 1.0, false)?;
            assert!(previous.iter().all(|i| current.contains(i)));
            previous = current;
        }
        Ok(())
    }

    #[test]
    fn test_count_rate_rejects_bad_window() {
        assert!(selection_by_count_rate(&[1, 2], 0.0, 1, 1.0, false).is_err());
        assert!(selection_by_count_rate(&[1, 2], 1.0, 1, 0.0, false).is_err());
        assert!(selection_by_count_rate(&[], 1.0, 1, 1.0, false).unwrap().is_empty());
    }

    #[test]
    fn test_unordered_times_are_rejected() {
        let times = [5, 3, 8];
        assert!(matches!(
            selection_by_count_rate(&times, 10.0, 1, 1.0, false),
            Err(TttrError::UnorderedTimes(1))
        ));
        let criteria = BurstCriteria::builder().minimum_window_length(1.0).build();
        assert!(matches!(
            ranges_by_time_window(&times, &criteria, 1.0),
            Err(TttrError::UnorderedTimes(1))
        ));
    }

    #[test]
    fn test_time_windows_close_at_minimum_length() -> Result<()> {
        let times = [0, 2, 4, 6, 8, 30, 31, 32, 33, 34, 35, 50];
        let criteria = BurstCriteria::builder()
            .minimum_window_length(5.0)
            .minimum_number_of_photons(4)
            .build();
        let ranges = ranges_by_time_window(&times, &criteria, 1.0)?;
        // [0..4) holds 0,2,4,6; [4..6) holds 8,30, too few; the window at 31
        // first reaches 5 ticks at 50 and holds 6 photons.
        assert_eq!(ranges, vec![0, 4, 6, 12]);

        for (start, stop) in range_pairs(&ranges)? {
            assert!(times[stop - 1] - times[start] >= 5);
            assert!(stop - start >= 4);
        }
        Ok(())
    }

    #[test]
    fn test_time_window_maximums_and_invert() -> Result<()> {
        let times = [0, 2, 4, 6, 8, 30, 31, 32, 33, 34, 35, 50];
        let capped = BurstCriteria::builder()
            .minimum_window_length(5.0)
            .minimum_number_of_photons(4)
            .maximum_window_length(10.0)
            .build();
        assert_eq!(ranges_by_time_window(&times, &capped, 1.0)?, vec![0, 4]);

        let inverted = BurstCriteria::builder()
            .minimum_window_length(5.0)
            .minimum_number_of_photons(4)
            .invert(true)
            .build();
        assert_eq!(ranges_by_time_window(&times, &inverted, 1.0)?, vec![4, 6]);
        Ok(())
    }

    #[test]
    fn test_trailing_window_is_dropped() -> Result<()> {
        let criteria = BurstCriteria::builder().minimum_window_length(100.0).build();
        assert!(ranges_by_time_window(&[0, 1, 2, 3], &criteria, 1.0)?.is_empty());
        assert!(ranges_by_time_window(&[], &criteria, 1.0)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_range_helpers() -> Result<()> {
        assert_eq!(ranges_to_indices(&[1, 3, 5, 6])?, vec![1, 2, 5]);
        assert!(range_pairs(&[1, 2, 3]).is_err());
        Ok(())
    }
}
