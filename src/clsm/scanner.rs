//! Marker state machine recovering frame and line timing from an event stream

use crate::event_stream::EventStream;
use crate::types::{ClsmSettings, MarkerConfig};
use serde::Serialize;

/// Timing of one scanned line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineTiming {
    /// Stream index of the line-start marker.
    pub start_index: usize,
    /// Stream index of the line-stop marker.
    pub stop_index: usize,
    /// End (exclusive) of the events considered when masking is disabled:
    /// the next line start of the frame, or the frame end.
    pub extent_index: usize,
    pub start_time: u64,
    pub stop_time: u64,
}

impl LineTiming {
    pub fn duration(&self) -> u64 {
        self.stop_time - self.start_time
    }

    /// Stream indices whose photons may be attributed to this line.
    pub fn candidates(&self, mask_invalid: bool) -> std::ops::Range<usize> {
        let end = if mask_invalid {
            self.stop_index
        } else {
            self.extent_index
        };
        self.start_index + 1..end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameTiming {
    pub lines: Vec<LineTiming>,
    /// Stream index where the frame starts (its marker, or 0 for an implicit frame).
    pub start_index: usize,
    /// End (exclusive) of the frame: the next frame marker or the stream end.
    pub end_index: usize,
    /// Opened by a frame marker rather than by lines preceding the first one.
    pub from_marker: bool,
}

/// Frames recovered by one scan; every frame holds the same number of lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanTopology {
    pub frames: Vec<FrameTiming>,
    pub n_lines: usize,
    pub n_pixel: usize,
}

impl ScanTopology {
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    BeforeFirstFrame,
    BetweenLines,
    /// `valid` holds from a line start until the matching line stop.
    InLine { valid: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Frame,
    LineStart,
    LineStop,
}

fn classify(markers: &MarkerConfig, stream: &EventStream, index: usize) -> Option<Marker> {
    if stream.event_types()[index] != markers.event_type {
        return None;
    }
    let channel = stream.channels()[index];
    if markers.is_frame_marker(channel) {
        Some(Marker::Frame)
    } else if channel == markers.line_start {
        Some(Marker::LineStart)
    } else if channel == markers.line_stop {
        Some(Marker::LineStop)
    } else {
        None
    }
}

fn push_frame(frames: &mut Vec<FrameTiming>, frame: OpenFrame, end_index: usize) {
    if !frame.lines.is_empty() {
        frames.push(frame.close(end_index));
    }
}

struct OpenFrame {
    start_index: usize,
    from_marker: bool,
    lines: Vec<LineTiming>,
}

impl OpenFrame {
    fn close(mut self, end_index: usize) -> FrameTiming {
        let next_starts: Vec<usize> = self
            .lines
            .iter()
            .skip(1)
            .map(|line| line.start_index)
            .chain(std::iter::once(end_index))
            .collect();
        for (line, extent) in self.lines.iter_mut().zip(next_starts) {
            line.extent_index = extent;
        }
        FrameTiming {
            lines: self.lines,
            start_index: self.start_index,
            end_index,
            from_marker: self.from_marker,
        }
    }
}

/// Walks every event once and collects frame and line timing.
///
/// Never fails: streams without usable markers produce an empty topology.
/// Lines without a stop marker are discarded, frames without lines are not
/// emitted, and frames whose line count differs from the first
/// marker-opened frame's are dropped with a warning. An implicit leading
/// frame only sets the line count when no frame marker was seen.
pub fn scan(stream: &EventStream, settings: &ClsmSettings) -> ScanTopology {
    let markers = &settings.markers;
    let n_events = stream.len();
    let mut frames: Vec<FrameTiming> = Vec::new();
    let mut current: Option<OpenFrame> = None;
    let mut pending_start: Option<(usize, u64)> = None;
    let mut state = ScanState::BeforeFirstFrame;
    let mut discarded_lines = 0usize;
    let frame_limit = settings.n_frames_max.unwrap_or(usize::MAX);

    for index in 0..n_events {
        let Some(marker) = classify(markers, stream, index) else {
            continue;
        };
        let time = stream.macro_times()[index];
        match marker {
            Marker::Frame => {
                if pending_start.take().is_some() {
                    discarded_lines += 1;
                }
                if let Some(frame) = current.take() {
                    push_frame(&mut frames, frame, index);
                }
                if frames.len() >= frame_limit {
                    break;
                }
                current = Some(OpenFrame {
                    start_index: index,
                    from_marker: true,
                    lines: Vec::new(),
                });
                state = ScanState::BetweenLines;
            }
            Marker::LineStart => {
                if state == ScanState::BeforeFirstFrame {
                    if settings.skip_before_first_frame_marker {
                        continue;
                    }
                    current = Some(OpenFrame {
                        start_index: 0,
                        from_marker: false,
                        lines: Vec::new(),
                    });
                }
                if pending_start.replace((index, time)).is_some() {
                    discarded_lines += 1;
                }
                state = ScanState::InLine { valid: true };
            }
            Marker::LineStop => {
                if state != (ScanState::InLine { valid: true }) {
                    continue;
                }
                if let (Some((start_index, start_time)), Some(frame)) =
                    (pending_start.take(), current.as_mut())
                {
                    frame.lines.push(LineTiming {
                        start_index,
                        stop_index: index,
                        extent_index: index,
                        start_time,
                        stop_time: time,
                    });
                }
                state = ScanState::InLine { valid: false };
            }
        }
    }

    if pending_start.is_some() {
        discarded_lines += 1;
    }
    if let Some(frame) = current.take() {
        let trailing = frame.from_marker && settings.skip_after_last_frame_marker;
        if !trailing && frames.len() < frame_limit {
            push_frame(&mut frames, frame, n_events);
        }
    }
    if discarded_lines > 0 {
        log::warn!("discarded {discarded_lines} lines without a stop marker");
    }

    let reference = frames
        .iter()
        .find(|frame| frame.from_marker)
        .or_else(|| frames.first());
    let Some(n_lines) = reference.map(|frame| frame.lines.len()) else {
        log::debug!("scan of {n_events} events found no complete lines");
        return ScanTopology::default();
    };
    let n_scanned = frames.len();
    frames.retain(|frame| frame.lines.len() == n_lines);
    if frames.len() < n_scanned {
        log::warn!(
            "dropped {} frames whose line count differs from {n_lines}",
            n_scanned - frames.len()
        );
    }
    let n_pixel = settings.n_pixel_per_line.unwrap_or(n_lines);
    log::debug!(
        "scan found {} frames of {n_lines} lines, {n_pixel} pixels per line",
        frames.len()
    );
    ScanTopology {
        frames,
        n_lines,
        n_pixel,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventType, Header};

    const FRAME: u8 = 4;
    const START: u8 = 1;
    const STOP: u8 = 2;

    /// Builds a stream from `(time, channel, is_marker)` triples.
    fn stream_of(events: &[(u64, u8, bool)]) -> EventStream {
        let event_types = events
            .iter()
            .map(|&(_, _, marker)| if marker { EventType::Marker } else { EventType::Photon })
            .collect();
        EventStream::builder()
            .header(Header::default())
            .macro_times(events.iter().map(|e| e.0).collect())
            .micro_times(vec![0; events.len()])
            .channels(events.iter().map(|e| e.1).collect())
            .event_types(event_types)
            .build()
            .unwrap()
    }

    fn marker(time: u64, channel: u8) -> (u64, u8, bool) {
        (time, channel, true)
    }

    fn photon(time: u64) -> (u64, u8, bool) {
        (time, 0, false)
    }

    #[test]
    fn test_two_frames_of_two_lines() {
        let stream = stream_of(&[
            marker(0, FRAME),
            marker(10, START),
            photon(12),
            marker(20, STOP),
            photon(25),
            marker(30, START),
            marker(40, STOP),
            marker(50, FRAME),
            marker(60, START),
            marker(70, STOP),
            marker(80, START),
            marker(90, STOP),
        ]);
        let topology = scan(&stream, &ClsmSettings::default());
        assert_eq!(topology.frames.len(), 2);
        assert_eq!((topology.n_lines, topology.n_pixel), (2, 2));

        let first = &topology.frames[0].lines[0];
        assert_eq!((first.start_time, first.stop_time), (10, 20));
        assert_eq!(first.candidates(true), 2..3);
        assert_eq!(first.candidates(false), 2..5);
        assert_eq!(topology.frames[0].lines[1].extent_index, 7);
        assert_eq!(topology.frames[1].end_index, 12);
    }

    #[test]
    fn test_incomplete_lines_and_inconsistent_frames_are_dropped() {
        let stream = stream_of(&[
            marker(0, FRAME),
            marker(10, START),
            marker(20, STOP),
            marker(30, START),
            marker(40, STOP),
            marker(50, FRAME),
            marker(60, START),
            marker(70, STOP),
            marker(80, START),
            marker(100, FRAME),
            marker(110, START),
        ]);
        let topology = scan(&stream, &ClsmSettings::default());
        assert_eq!(topology.frames.len(), 1);
        assert_eq!(topology.n_lines, 2);
    }

    #[test]
    fn test_frame_limit_and_skips() {
        let events = [
            marker(0, START),
            marker(5, STOP),
            marker(10, FRAME),
            marker(20, START),
            marker(30, STOP),
            marker(40, FRAME),
            marker(50, START),
            marker(60, STOP),
        ];
        let stream = stream_of(&events);

        let all = scan(&stream, &ClsmSettings::default());
        assert_eq!(all.frames.len(), 3);
        assert_eq!(all.frames[0].start_index, 0);
        assert!(!all.frames[0].from_marker);

        let skipped = ClsmSettings::builder()
            .skip_before_first_frame_marker(true)
            .skip_after_last_frame_marker(true)
            .build();
        let topology = scan(&stream, &skipped);
        assert_eq!(topology.frames.len(), 1);
        assert_eq!(topology.frames[0].lines[0].start_time, 20);

        let limited = ClsmSettings::builder().n_frames_max(2).build();
        assert_eq!(scan(&stream, &limited).frames.len(), 2);
    }

    #[test]
    fn test_partial_leading_frame_does_not_set_line_count() {
        let mut events = vec![marker(0, START), marker(5, STOP)];
        for frame in 0..3u64 {
            let t = 100 + frame * 1000;
            events.push(marker(t, FRAME));
            for line in 0..4 {
                let start = t + 10 + line * 100;
                events.extend([marker(start, START), photon(start + 5), marker(start + 50, STOP)]);
            }
        }
        let stream = stream_of(&events);

        let topology = scan(&stream, &ClsmSettings::default());
        assert_eq!(topology.frames.len(), 3);
        assert_eq!((topology.n_lines, topology.n_pixel), (4, 4));
        assert!(topology.frames.iter().all(|frame| frame.from_marker));
    }

    #[test]
    fn test_degenerate_streams_give_empty_topology() {
        let settings = ClsmSettings::default();
        assert!(scan(&EventStream::empty(Header::default()), &settings).is_empty());

        let markers_only = stream_of(&[marker(0, FRAME), marker(1, STOP), marker(2, FRAME)]);
        assert!(scan(&markers_only, &settings).is_empty());

        let photons_only = stream_of(&[photon(0), photon(1)]);
        assert_eq!(scan(&photons_only, &settings), ScanTopology::default());
    }
}
