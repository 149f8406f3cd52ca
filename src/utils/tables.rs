//! Tabular export of correlation curves and burst searches

use crate::error::Result;
use crate::event_stream::EventStream;
use crate::processing::selection::range_pairs;
use crate::types::CorrelationCurve;
use polars::prelude::*;

/// Converts a correlation curve into a DataFrame.
///
/// # Returns
/// Columns `lag` (ticks), `lag_time` (seconds, or ticks when uncalibrated)
/// and `correlation`, including the zero-lag placeholder row.
pub fn curve_to_dataframe(curve: &CorrelationCurve) -> Result<DataFrame> {
    let df = DataFrame::new(vec![
        Series::new("lag".into(), curve.lags()).into(),
        Series::new("lag_time".into(), &curve.lag_times()).into(),
        Series::new("correlation".into(), curve.values()).into(),
    ])?;
    Ok(df)
}

/// Summarizes bursts found by [`EventStream::ranges_by_time_window`].
///
/// # Arguments
/// * `stream` - The stream the ranges index into
/// * `ranges` - Interleaved half-open `[start, stop)` index pairs
///
/// # Returns
/// One row per burst with columns `start`, `stop`, `n_photons` and
/// `duration` (seconds, first to last event).
pub fn bursts_to_dataframe(stream: &EventStream, ranges: &[usize]) -> Result<DataFrame> {
    let pairs = range_pairs(ranges)?;
    let times = stream.macro_times();
    let resolution = stream.header().macro_time_resolution;

    let mut starts = Vec::with_capacity(pairs.len());
    let mut stops = Vec::with_capacity(pairs.len());
    let mut n_photons = Vec::with_capacity(pairs.len());
    let mut durations = Vec::with_capacity(pairs.len());
    for (start, stop) in pairs {
        let photons = (start..stop)
            .filter(|&i| stream.event_types()[i].is_photon())
            .count();
        let duration = match (times.get(start), stop.checked_sub(1).and_then(|last| times.get(last))) {
            (Some(&first), Some(&last)) if last >= first => (last - first) as f64 * resolution,
            _ => 0.0,
        };
        starts.push(start as u64);
        stops.push(stop as u64);
        n_photons.push(photons as u64);
        durations.push(duration);
    }

    let df = DataFrame::new(vec![
        Series::new("start".into(), &starts).into(),
        Series::new("stop".into(), &stops).into(),
        Series::new("n_photons".into(), &n_photons).into(),
        Series::new("duration".into(), &durations).into(),
    ])?;
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::selection::BurstCriteria;
    use crate::types::{EventType, Header};

    #[test]
    fn test_curve_table_has_one_row_per_lag() -> Result<()> {
        let curve = CorrelationCurve::new(vec![0, 1, 2], vec![0.0, 1.5, 1.2], Some(0.5));
        let df = curve_to_dataframe(&curve)?;
        assert_eq!(df.shape(), (3, 3));
        let lag_time = df.column("lag_time")?.f64()?.get(2);
        assert_eq!(lag_time, Some(1.0));
        Ok(())
    }

    #[test]
    fn test_burst_table() -> Result<()> {
        let times = vec![0, 2, 4, 6, 8, 30, 31, 32, 33, 34, 35, 50];
        let stream = EventStream::builder()
            .header(
                Header::builder()
                    .macro_time_resolution(1e-3)
                    .micro_time_resolution(1e-9)
                    .build(),
            )
            .micro_times(vec![0; times.len()])
            .channels(vec![0; times.len()])
            .event_types(vec![EventType::Photon; times.len()])
            .macro_times(times)
            .build()?;
        let criteria = BurstCriteria::builder()
            .minimum_window_length(5e-3)
            .minimum_number_of_photons(4)
            .build();
        let ranges = stream.ranges_by_time_window(&criteria)?;
        let df = bursts_to_dataframe(&stream, &ranges)?;
        assert_eq!(df.height(), 2);
        let n_photons: Vec<Option<u64>> = df.column("n_photons")?.u64()?.into_iter().collect();
        assert_eq!(n_photons, vec![Some(4), Some(6)]);
        assert!(bursts_to_dataframe(&stream, &[1]).is_err());
        Ok(())
    }
}
