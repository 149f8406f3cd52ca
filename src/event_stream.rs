use crate::error::{Result, TttrError};
use crate::processing::selection::{self, BurstCriteria};
use crate::types::time_stream::check_ordered;
use crate::types::{EventType, Header, PhotonEvent, TimeStream};
use crate::utils::misc::coarsened_len;
use bon::bon;

/// A read-only, randomly indexable stream of time-tagged events.
///
/// Events are stored column-wise. Macro times are non-decreasing with the
/// index; overflow correction is expected to have happened upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct EventStream {
    header: Header,
    macro_times: Vec<u64>,
    micro_times: Vec<u16>,
    channels: Vec<u8>,
    event_types: Vec<EventType>,
}

#[bon]
impl EventStream {
    /// Builds a stream from its columns, validating lengths, ordering and
    /// micro-time bounds.
    #[builder]
    pub fn new(
        #[builder(default)] header: Header,
        macro_times: Vec<u64>,
        micro_times: Vec<u16>,
        channels: Vec<u8>,
        event_types: Vec<EventType>,
    ) -> Result<Self> {
        let n = macro_times.len();
        for (what, len) in [
            ("micro_times", micro_times.len()),
            ("channels", channels.len()),
            ("event_types", event_types.len()),
        ] {
            if len != n {
                return Err(TttrError::LengthMismatch {
                    what,
                    expected: n,
                    actual: len,
                });
            }
        }
        check_ordered(&macro_times)?;

        let n_channels = header.n_micro_time_channels;
        if n_channels > 0 {
            if let Some(pos) = micro_times.iter().position(|&m| m as u32 >= n_channels) {
                return Err(TttrError::config(format!(
                    "micro time {} at index {} exceeds {} micro-time channels",
                    micro_times[pos], pos, n_channels
                )));
            }
        }

        Ok(Self {
            header,
            macro_times,
            micro_times,
            channels,
            event_types,
        })
    }
}

impl EventStream {
    /// A stream without events.
    pub fn empty(header: Header) -> Self {
        Self {
            header,
            macro_times: Vec::new(),
            micro_times: Vec::new(),
            channels: Vec::new(),
            event_types: Vec::new(),
        }
    }

    /// Collects materialized events into a stream.
    pub fn from_events(
        header: Header,
        events: impl IntoIterator<Item = PhotonEvent>,
    ) -> Result<Self> {
        let events = events.into_iter();
        let capacity = events.size_hint().0;
        let mut macro_times = Vec::with_capacity(capacity);
        let mut micro_times = Vec::with_capacity(capacity);
        let mut channels = Vec::with_capacity(capacity);
        let mut event_types = Vec::with_capacity(capacity);
        for event in events {
            macro_times.push(event.macro_time);
            micro_times.push(event.micro_time);
            channels.push(event.channel);
            event_types.push(event.event_type);
        }
        Self::builder()
            .header(header)
            .macro_times(macro_times)
            .micro_times(micro_times)
            .channels(channels)
            .event_types(event_types)
            .build()
    }

    pub fn len(&self) -> usize {
        self.macro_times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macro_times.is_empty()
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn macro_times(&self) -> &[u64] {
        &self.macro_times
    }

    pub fn micro_times(&self) -> &[u16] {
        &self.micro_times
    }

    pub fn channels(&self) -> &[u8] {
        &self.channels
    }

    pub fn event_types(&self) -> &[EventType] {
        &self.event_types
    }

    pub fn macro_time(&self, index: usize) -> Option<u64> {
        self.macro_times.get(index).copied()
    }

    pub fn micro_time(&self, index: usize) -> Option<u16> {
        self.micro_times.get(index).copied()
    }

    pub fn channel(&self, index: usize) -> Option<u8> {
        self.channels.get(index).copied()
    }

    pub fn event_type(&self, index: usize) -> Option<EventType> {
        self.event_types.get(index).copied()
    }

    /// Materializes the event at `index`.
    pub fn get(&self, index: usize) -> Option<PhotonEvent> {
        (index < self.len()).then(|| PhotonEvent {
            macro_time: self.macro_times[index],
            micro_time: self.micro_times[index],
            channel: self.channels[index],
            event_type: self.event_types[index],
        })
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = PhotonEvent> + '_ {
        (0..self.len()).map(|i| PhotonEvent {
            macro_time: self.macro_times[i],
            micro_time: self.micro_times[i],
            channel: self.channels[i],
            event_type: self.event_types[i],
        })
    }

    /// Materializes the sub-stream at `indices`.
    ///
    /// The indices may be any subset but must keep macro times ordered,
    /// which holds for every increasing index array.
    pub fn slice(&self, indices: &[usize]) -> Result<EventStream> {
        if let Some(&index) = indices.iter().find(|&&i| i >= self.len()) {
            return Err(TttrError::IndexOutOfBounds {
                index,
                len: self.len(),
            });
        }
        let macro_times: Vec<u64> = indices.iter().map(|&i| self.macro_times[i]).collect();
        check_ordered(&macro_times)?;
        Ok(Self {
            header: self.header,
            macro_times,
            micro_times: indices.iter().map(|&i| self.micro_times[i]).collect(),
            channels: indices.iter().map(|&i| self.channels[i]).collect(),
            event_types: indices.iter().map(|&i| self.event_types[i]).collect(),
        })
    }

    /// Indices of photons routed to any of `channels`.
    pub fn selection_by_channels(&self, channels: &[u8]) -> Vec<usize> {
        (0..self.len())
            .filter(|&i| {
                self.event_types[i].is_photon() && channels.contains(&self.channels[i])
            })
            .collect()
    }

    pub fn selection_by_event_type(&self, event_type: EventType) -> Vec<usize> {
        (0..self.len())
            .filter(|&i| self.event_types[i] == event_type)
            .collect()
    }

    /// Count-rate filter over the photons of this stream, calibrated with the
    /// header. Markers neither count toward a window nor get selected.
    ///
    /// # Arguments
    /// * `time_window` - Window length in seconds
    /// * `n_photon_max` - Count threshold per window
    /// * `invert` - Select the windows above the threshold instead
    pub fn selection_by_count_rate(
        &self,
        time_window: f64,
        n_photon_max: usize,
        invert: bool,
    ) -> Result<Vec<usize>> {
        let (photons, times) = self.photon_times();
        let selected = selection::selection_by_count_rate(
            &times,
            time_window,
            n_photon_max,
            self.header.macro_time_resolution,
            invert,
        )?;
        Ok(selected.into_iter().map(|i| photons[i]).collect())
    }

    /// Burst search over the photons of this stream, calibrated with the header.
    ///
    /// # Returns
    /// Interleaved half-open `[start, stop)` pairs of stream indices, each
    /// spanning from the first to the last photon of a burst. Markers inside a
    /// burst fall within its range but are not counted.
    pub fn ranges_by_time_window(&self, criteria: &BurstCriteria) -> Result<Vec<usize>> {
        let (photons, times) = self.photon_times();
        let ranges = selection::ranges_by_time_window(
            &times,
            criteria,
            self.header.macro_time_resolution,
        )?;
        Ok(selection::range_pairs(&ranges)?
            .into_iter()
            .flat_map(|(start, stop)| [photons[start], photons[stop - 1] + 1])
            .collect())
    }

    /// Stream indices of the photons and their macro times.
    fn photon_times(&self) -> (Vec<usize>, Vec<u64>) {
        let photons = self.selection_by_event_type(EventType::Photon);
        let times = photons.iter().map(|&i| self.macro_times[i]).collect();
        (photons, times)
    }

    /// Photon counts in consecutive windows of `time_window` seconds,
    /// starting at the first event.
    pub fn intensity_trace(&self, time_window: f64) -> Result<Vec<u32>> {
        let calibration = self.header.macro_time_resolution;
        if !(time_window > 0.0) || !(calibration > 0.0) {
            return Err(TttrError::config(
                "time window and macro time resolution must be positive",
            ));
        }
        let Some(&first) = self.macro_times.first() else {
            return Ok(Vec::new());
        };
        let bin_of = |t: u64| ((t - first) as f64 * calibration / time_window) as usize;
        let n_bins = self.macro_times.last().map_or(0, |&t| bin_of(t) + 1);
        let mut trace = vec![0u32; n_bins];
        for (i, &t) in self.macro_times.iter().enumerate() {
            if self.event_types[i].is_photon() {
                trace[bin_of(t)] += 1;
            }
        }
        Ok(trace)
    }

    /// Number of micro-time channels: the header's count, or one past the
    /// largest recorded micro time when the header declares none.
    pub fn micro_time_channel_count(&self) -> usize {
        match self.header.n_micro_time_channels {
            0 => self.micro_times.iter().max().map_or(0, |&m| m as usize + 1),
            n => n as usize,
        }
    }

    /// Histogram of photon micro times.
    ///
    /// # Arguments
    /// * `coarsening` - Number of adjacent micro-time channels merged per bin
    ///
    /// # Returns
    /// Counts per bin and the bin start times in seconds.
    pub fn micro_time_histogram(&self, coarsening: usize) -> Result<(Vec<u32>, Vec<f64>)> {
        if coarsening == 0 {
            return Err(TttrError::config("micro time coarsening must be positive"));
        }
        let n_bins = coarsened_len(self.micro_time_channel_count(), coarsening);
        let mut counts = vec![0u32; n_bins];
        for (i, &micro) in self.micro_times.iter().enumerate() {
            if self.event_types[i].is_photon() {
                counts[micro as usize / coarsening] += 1;
            }
        }
        let bin_width = coarsening as f64 * self.header.micro_time_resolution;
        let axis = (0..n_bins).map(|b| b as f64 * bin_width).collect();
        Ok((counts, axis))
    }

    /// Unit-weight time stream of every event in this stream.
    ///
    /// With `make_fine` the times are composed as
    /// `macro_time * n_micro_time_channels + micro_time`, failing with
    /// [`TttrError::TimeOverflow`] when a composed time exceeds 64 bits.
    pub fn time_stream(&self, make_fine: bool) -> Result<TimeStream> {
        let times: Vec<u64> = if make_fine {
            let n_channels = self.header.n_micro_time_channels;
            self.iter()
                .enumerate()
                .map(|(index, event)| {
                    event
                        .fine_time(n_channels)
                        .ok_or(TttrError::TimeOverflow { index })
                })
                .collect::<Result<_>>()?
        } else {
            self.macro_times.clone()
        };
        // Fine times stay ordered: micro times are bounded by the channel count.
        Ok(TimeStream::from_ordered(times))
    }

    /// Seconds per tick of [`EventStream::time_stream`].
    pub fn time_calibration(&self, make_fine: bool) -> f64 {
        if make_fine {
            self.header.fine_time_resolution()
        } else {
            self.header.macro_time_resolution
        }
    }
}
