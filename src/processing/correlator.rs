//! Multi-tau cross- and auto-correlation of weighted time streams

use crate::error::{Result, TttrError};
use crate::event_stream::EventStream;
use crate::processing::cascade::{WorkingStream, lag_axis};
use crate::profile_scope;
use crate::types::{CorrelationCurve, CorrelationMethod, CorrelatorSettings, TimeStream};
use crate::utils::cache::Cached;

/// Computes a normalized correlation curve G(τ) between two time streams.
///
/// Every setter marks the curve dirty. The curve is recomputed on the first
/// read afterwards and served from the cache until the next write.
#[derive(Debug, Clone)]
pub struct Correlator {
    settings: CorrelatorSettings,
    stream1: TimeStream,
    stream2: TimeStream,
    /// Seconds per tick of the correlated time axis.
    time_calibration: Option<f64>,
    curve: Cached<CorrelationCurve>,
}

impl Default for Correlator {
    fn default() -> Self {
        Self {
            settings: CorrelatorSettings::default(),
            stream1: TimeStream::default(),
            stream2: TimeStream::default(),
            time_calibration: None,
            curve: Cached::new(),
        }
    }
}

impl Correlator {
    pub fn new(settings: CorrelatorSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            ..Self::default()
        })
    }

    pub fn settings(&self) -> &CorrelatorSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: CorrelatorSettings) -> Result<()> {
        settings.validate()?;
        self.settings = settings;
        self.curve.invalidate();
        Ok(())
    }

    pub fn set_n_bins(&mut self, n_bins: usize) -> Result<()> {
        self.set_settings(CorrelatorSettings {
            n_bins,
            ..self.settings
        })
    }

    pub fn set_n_casc(&mut self, n_casc: usize) -> Result<()> {
        self.set_settings(CorrelatorSettings {
            n_casc,
            ..self.settings
        })
    }

    pub fn set_method(&mut self, method: CorrelationMethod) {
        self.settings.method = method;
        self.curve.invalidate();
    }

    /// Seconds per tick used for [`Correlator::lag_times`].
    pub fn set_time_calibration(&mut self, calibration: Option<f64>) {
        self.time_calibration = calibration;
        self.curve.invalidate();
    }

    /// Replaces both inputs with raw times and weights.
    pub fn set_events(
        &mut self,
        times1: Vec<u64>,
        weights1: Vec<f64>,
        times2: Vec<u64>,
        weights2: Vec<f64>,
    ) -> Result<()> {
        let stream1 = TimeStream::new(times1, weights1)?;
        let stream2 = TimeStream::new(times2, weights2)?;
        self.set_time_streams(stream1, stream2);
        Ok(())
    }

    pub fn set_time_streams(&mut self, stream1: TimeStream, stream2: TimeStream) {
        self.stream1 = stream1;
        self.stream2 = stream2;
        self.curve.invalidate();
    }

    /// Correlates every event of two (usually channel-selected) event streams.
    ///
    /// With `make_fine` the time axis combines macro and micro times, and the
    /// calibration switches to the fine time resolution of the first stream.
    /// Fails without touching the inputs when a fine time overflows.
    pub fn set_tttr(
        &mut self,
        stream1: &EventStream,
        stream2: &EventStream,
        make_fine: bool,
    ) -> Result<()> {
        let time_stream1 = stream1.time_stream(make_fine)?;
        let time_stream2 = stream2.time_stream(make_fine)?;
        self.settings.make_fine = make_fine;
        self.time_calibration = Some(stream1.time_calibration(make_fine));
        self.set_time_streams(time_stream1, time_stream2);
        Ok(())
    }

    /// Like [`Correlator::set_tttr`], weighting each photon by a per-micro-time
    /// filter value (filtered FCS).
    ///
    /// # Arguments
    /// * `filter1`, `filter2` - One weight per micro-time channel of the respective stream
    pub fn set_tttr_filtered(
        &mut self,
        stream1: &EventStream,
        filter1: &[f64],
        stream2: &EventStream,
        filter2: &[f64],
        make_fine: bool,
    ) -> Result<()> {
        let weighted1 = filtered_time_stream(stream1, filter1, make_fine)?;
        let weighted2 = filtered_time_stream(stream2, filter2, make_fine)?;
        self.settings.make_fine = make_fine;
        self.time_calibration = Some(stream1.time_calibration(make_fine));
        self.set_time_streams(weighted1, weighted2);
        Ok(())
    }

    pub fn stream1(&self) -> &TimeStream {
        &self.stream1
    }

    pub fn stream2(&self) -> &TimeStream {
        &self.stream2
    }

    /// Counter bumped by every write.
    pub fn generation(&self) -> u64 {
        self.curve.generation()
    }

    pub fn is_dirty(&self) -> bool {
        self.curve.is_dirty()
    }

    pub fn curve(&self) -> &CorrelationCurve {
        self.curve.get_or_compute(|| {
            correlate(
                &self.settings,
                &self.stream1,
                &self.stream2,
                self.time_calibration,
            )
        })
    }

    pub fn correlation(&self) -> &[f64] {
        self.curve().values()
    }

    /// Lag axis in ticks.
    pub fn x_axis(&self) -> &[u64] {
        self.curve().lags()
    }

    /// Lag axis in seconds (ticks when no calibration is set).
    pub fn lag_times(&self) -> Vec<f64> {
        self.curve().lag_times()
    }
}

fn filtered_time_stream(
    stream: &EventStream,
    filter: &[f64],
    make_fine: bool,
) -> Result<TimeStream> {
    let n_channels = stream.header().n_micro_time_channels as usize;
    if filter.len() != n_channels {
        return Err(TttrError::LengthMismatch {
            what: "micro time filter",
            expected: n_channels,
            actual: filter.len(),
        });
    }
    let mut time_stream = stream.time_stream(make_fine)?;
    let factors = stream
        .micro_times()
        .iter()
        .map(|&micro| {
            filter
                .get(micro as usize)
                .copied()
                .ok_or(TttrError::IndexOutOfBounds {
                    index: micro as usize,
                    len: filter.len(),
                })
        })
        .collect::<Result<Vec<f64>>>()?;
    time_stream.scale_weights(&factors)?;
    Ok(time_stream)
}

/// Runs all cascades and normalizes the raw coincidence sums.
pub fn correlate(
    settings: &CorrelatorSettings,
    stream1: &TimeStream,
    stream2: &TimeStream,
    time_calibration: Option<f64>,
) -> CorrelationCurve {
    profile_scope!(format!(
        "correlate {}x{} events ({:?})",
        stream1.len(),
        stream2.len(),
        settings.method
    ));
    let n_bins = settings.n_bins;
    let lags = lag_axis(n_bins, settings.n_casc);
    let mut raw = vec![0.0; lags.len()];

    if !stream1.is_empty() && !stream2.is_empty() {
        let strategy = settings.method.strategy();
        let mut work1 = WorkingStream::from(stream1.clone());
        let mut work2 = WorkingStream::from(stream2.clone());
        strategy.prepare(&mut work1);
        strategy.prepare(&mut work2);

        for cascade in 0..settings.n_casc {
            let bins = 1 + cascade * n_bins..1 + (cascade + 1) * n_bins;
            let shifts: Vec<u64> = lags[bins.clone()].iter().map(|&lag| lag >> cascade).collect();
            let sums = strategy.compute_cascade(&work1, &work2, &shifts);
            raw[bins].copy_from_slice(&sums);
            strategy.coarsen(&mut work1);
            strategy.coarsen(&mut work2);
        }
    }

    let values = normalize(&raw, &lags, n_bins, stream1, stream2);
    CorrelationCurve::new(lags, values, time_calibration)
}

/// Turns coincidence sums into G(τ).
///
/// `G(τ) = corr(τ) / 2^k / (r1 · r2 · overlap(τ))` with count rates
/// `r = total weight / duration` and the overlap of stream 1 with stream 2
/// shifted back by τ. Degenerate factors give 0.
fn normalize(
    raw: &[f64],
    lags: &[u64],
    n_bins: usize,
    stream1: &TimeStream,
    stream2: &TimeStream,
) -> Vec<f64> {
    let mut values = vec![0.0; raw.len()];
    let (Some(&b1), Some(&e1), Some(&b2), Some(&e2)) = (
        stream1.times().first(),
        stream1.times().last(),
        stream2.times().first(),
        stream2.times().last(),
    ) else {
        return values;
    };
    let duration1 = (e1 - b1) as f64;
    let duration2 = (e2 - b2) as f64;
    let rate1 = stream1.total_weight() / duration1;
    let rate2 = stream2.total_weight() / duration2;
    if !(rate1 > 0.0 && rate1.is_finite() && rate2 > 0.0 && rate2.is_finite()) {
        return values;
    }

    for (j, (value, &lag)) in values.iter_mut().zip(lags).enumerate().skip(1) {
        let cascade = (j - 1) / n_bins;
        let (b1, e1, b2, e2, lag) = (b1 as i128, e1 as i128, b2 as i128, e2 as i128, lag as i128);
        let overlap = e1.min(e2 - lag) - b1.max(b2 - lag);
        if overlap <= 0 {
            continue;
        }
        let g = raw[j] / (1u64 << cascade) as f64 / (rate1 * rate2 * overlap as f64);
        if g.is_finite() {
            *value = g;
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventType, Header};
    use approx::assert_relative_eq;

    /// Bernoulli process: each tick holds an event with probability `p`.
    fn bernoulli_times(n_ticks: u64, p: f64, seed: u64) -> Vec<u64> {
        let mut state = seed;
        (0..n_ticks)
            .filter(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                (state >> 11) as f64 / (1u64 << 53) as f64 <= p
            })
            .collect()
    }

    fn correlator(n_bins: usize, n_casc: usize, method: CorrelationMethod) -> Correlator {
        Correlator::new(
            CorrelatorSettings::builder()
                .n_bins(n_bins)
                .n_casc(n_casc)
                .method(method)
                .build(),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_streams_give_zero_curve() {
        let mut corr = correlator(3, 5, CorrelationMethod::Default);
        corr.set_events(vec![], vec![], vec![], vec![]).unwrap();
        assert_eq!(corr.correlation().len(), 16);
        assert!(corr.correlation().iter().all(|&v| v == 0.0));

        corr.set_events(vec![5], vec![1.0], vec![5], vec![1.0]).unwrap();
        assert!(corr.correlation().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_lazy_and_idempotent() -> Result<()> {
        let times = bernoulli_times(20_000, 0.1, 7);
        let mut corr = correlator(4, 6, CorrelationMethod::Default);
        corr.set_events(times.clone(), vec![1.0; times.len()], times.clone(), vec![1.0; times.len()])?;
        assert!(corr.is_dirty());

        let first = corr.correlation().to_vec();
        assert!(!corr.is_dirty());
        let second = corr.correlation();
        assert!(first.iter().zip(second).all(|(a, b)| a.to_bits() == b.to_bits()));

        corr.set_n_bins(5)?;
        assert!(corr.is_dirty());
        assert_eq!(corr.correlation().len(), 5 * 6 + 1);
        assert!(corr.set_n_bins(0).is_err());
        Ok(())
    }

    #[test]
    fn test_uncorrelated_streams_normalize_to_one() -> Result<()> {
        let t1 = bernoulli_times(2_000_000, 0.05, 0x9E37_79B9_7F4A_7C15);
        let t2 = bernoulli_times(2_000_000, 0.05, 0xD1B5_4A32_D192_ED03);
        for method in [CorrelationMethod::Default, CorrelationMethod::Alternate] {
            let mut corr = correlator(8, 10, method);
            corr.set_events(t1.clone(), vec![1.0; t1.len()], t2.clone(), vec![1.0; t2.len()])?;
            for (lag, g) in corr.curve().measured() {
                assert!((g - 1.0).abs() < 0.1, "lag {lag}: G = {g}");
            }
        }
        Ok(())
    }

    #[test]
    fn test_shifted_copy_peaks_at_shift() -> Result<()> {
        let t1 = bernoulli_times(200_000, 0.02, 11);
        let t2: Vec<u64> = t1.iter().map(|t| t + 4).collect();
        let mut corr = correlator(8, 4, CorrelationMethod::Default);
        corr.set_events(t1.clone(), vec![1.0; t1.len()], t2, vec![1.0; t1.len()])?;
        let values = corr.correlation();
        let peak = (1..values.len())
            .max_by(|&a, &b| values[a].total_cmp(&values[b]))
            .unwrap();
        assert_eq!(corr.x_axis()[peak], 4);
        assert!(values[peak] > 10.0);
        Ok(())
    }

    #[test]
    fn test_methods_agree_with_fractional_weights() -> Result<()> {
        let t1 = bernoulli_times(100_000, 0.05, 3);
        let t2 = bernoulli_times(100_000, 0.05, 5);
        let w1: Vec<f64> = (0..t1.len()).map(|i| 0.1 + (i % 7) as f64 * 0.3).collect();
        let w2: Vec<f64> = (0..t2.len()).map(|i| 1.7 - (i % 5) as f64 * 0.25).collect();

        let mut default = correlator(6, 8, CorrelationMethod::Default);
        default.set_events(t1.clone(), w1.clone(), t2.clone(), w2.clone())?;
        let mut alternate = correlator(6, 8, CorrelationMethod::Alternate);
        alternate.set_events(t1, w1, t2, w2)?;

        for (a, b) in default.correlation().iter().zip(alternate.correlation()) {
            assert_relative_eq!(a, b, max_relative = 1e-9);
        }
        Ok(())
    }

    #[test]
    fn test_set_tttr_fine_calibration() -> Result<()> {
        let header = Header::builder()
            .macro_time_resolution(1e-8)
            .micro_time_resolution(1e-11)
            .n_micro_time_channels(4)
            .build();
        let stream = EventStream::builder()
            .header(header)
            .macro_times(vec![0, 1, 2, 3])
            .micro_times(vec![0, 1, 2, 3])
            .channels(vec![0; 4])
            .event_types(vec![EventType::Photon; 4])
            .build()?;

        let mut corr = correlator(2, 2, CorrelationMethod::Default);
        corr.set_tttr(&stream, &stream, true)?;
        assert_eq!(corr.stream1().times(), &[0, 5, 10, 15]);
        assert!(corr.settings().make_fine);
        let lag_times = corr.lag_times();
        assert_relative_eq!(lag_times[1], 1e-8 / 4.0);

        let filter = [1.0, 0.0, 0.5, 2.0];
        corr.set_tttr_filtered(&stream, &filter, &stream, &filter, false)?;
        assert_eq!(corr.stream1().weights(), &[1.0, 0.0, 0.5, 2.0]);
        assert!(corr.set_tttr_filtered(&stream, &[1.0], &stream, &filter, false).is_err());
        Ok(())
    }

    #[test]
    fn test_set_tttr_rejects_overflowing_fine_times() -> Result<()> {
        let header = Header::builder()
            .macro_time_resolution(1e-8)
            .micro_time_resolution(1e-12)
            .n_micro_time_channels(4096)
            .build();
        let stream = EventStream::builder()
            .header(header)
            .macro_times(vec![1 << 60, (1 << 60) + 1])
            .micro_times(vec![0, 1])
            .channels(vec![0; 2])
            .event_types(vec![EventType::Photon; 2])
            .build()?;

        let mut corr = correlator(2, 2, CorrelationMethod::Default);
        let generation = corr.generation();
        assert!(matches!(
            corr.set_tttr(&stream, &stream, true),
            Err(TttrError::TimeOverflow { index: 0 })
        ));
        assert_eq!(corr.generation(), generation);
        corr.set_tttr(&stream, &stream, false)?;
        assert_eq!(corr.stream1().len(), 2);
        Ok(())
    }
}
