use crate::clsm::arena::VoxelArena;
use crate::clsm::grid::{GridTransform, Shape};
use crate::clsm::scanner::{self, LineTiming, ScanTopology};
use crate::error::{Result, TttrError};
use crate::event_stream::EventStream;
use crate::profile_scope;
use crate::types::ClsmSettings;
use crate::utils::cache::Cached;
use crate::utils::misc::Coordinate;
use bon::Builder;
use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Which photons a fill attributes to the grid.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct FillOptions {
    /// Detection channels; empty selects every photon.
    #[builder(default)]
    pub channels: Vec<u8>,
    /// Inclusive `(first, last)` micro-time windows; empty accepts every micro time.
    #[builder(default)]
    pub micro_time_ranges: Vec<(u16, u16)>,
    /// Drop previously attributed photons before filling.
    #[builder(default = true)]
    pub clear: bool,
}

impl Default for FillOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl FillOptions {
    pub fn for_channels(channels: &[u8]) -> Self {
        Self::builder().channels(channels.to_vec()).build()
    }

    fn accepts(&self, channel: u8, micro_time: u16) -> bool {
        (self.channels.is_empty() || self.channels.contains(&channel))
            && (self.micro_time_ranges.is_empty()
                || self
                    .micro_time_ranges
                    .iter()
                    .any(|&(first, last)| (first..=last).contains(&micro_time)))
    }
}

/// Read-only view of the photons attributed to one voxel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageVoxel<'a> {
    indices: &'a [usize],
}

impl<'a> ImageVoxel<'a> {
    /// Strictly increasing stream indices.
    pub fn indices(&self) -> &'a [usize] {
        self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// First stream index of the voxel.
    pub fn start(&self) -> Option<usize> {
        self.indices.first().copied()
    }

    /// Last stream index of the voxel.
    pub fn stop(&self) -> Option<usize> {
        self.indices.last().copied()
    }
}

/// A confocal laser-scanning image reconstructed from a marker-annotated stream.
///
/// The image keeps, for every `(frame, line, pixel)` voxel, the indices of
/// the photons attributed to it. Line timing is recovered once at
/// construction; fills attribute photons against that timing and can be
/// repeated with other channel selections.
#[derive(Debug, Clone)]
pub struct ClsmImage {
    settings: ClsmSettings,
    topology: ScanTopology,
    transform: GridTransform,
    /// Offset (ticks) added to every line start during attribution.
    line_shift: f64,
    stream_len: usize,
    fill_options: FillOptions,
    arena: VoxelArena,
    intensity: Cached<Array3<u32>>,
}

impl ClsmImage {
    /// Scans `stream` for frame and line markers; the grid starts out empty.
    pub fn new(stream: &EventStream, settings: ClsmSettings) -> Result<Self> {
        settings.validate()?;
        profile_scope!("clsm scan");
        let topology = scanner::scan(stream, &settings);
        let shape = Shape::new(topology.frames.len(), topology.n_lines, topology.n_pixel);
        Ok(Self {
            settings,
            topology,
            transform: GridTransform::identity(shape),
            line_shift: 0.0,
            stream_len: stream.len(),
            fill_options: FillOptions::default(),
            arena: VoxelArena::empty(shape.len()),
            intensity: Cached::new(),
        })
    }

    /// Scans `stream` and fills the grid with photons of `channels`.
    pub fn with_channels(
        stream: &EventStream,
        settings: ClsmSettings,
        channels: &[u8],
    ) -> Result<Self> {
        let mut image = Self::new(stream, settings)?;
        image.fill(stream, FillOptions::for_channels(channels))?;
        Ok(image)
    }

    /// Copies the frame, line and pixel structure of `source` without its photons.
    ///
    /// The copy can be filled from another channel selection of the same
    /// stream, giving a registered image.
    pub fn from_source(source: &ClsmImage) -> Self {
        Self {
            settings: source.settings.clone(),
            topology: source.topology.clone(),
            transform: source.transform.clone(),
            line_shift: source.line_shift,
            stream_len: source.stream_len,
            fill_options: FillOptions::default(),
            arena: VoxelArena::empty(source.shape().len()),
            intensity: Cached::new(),
        }
    }

    pub fn settings(&self) -> &ClsmSettings {
        &self.settings
    }

    pub fn topology(&self) -> &ScanTopology {
        &self.topology
    }

    pub fn shape(&self) -> Shape {
        self.transform.shape()
    }

    pub fn fill_options(&self) -> &FillOptions {
        &self.fill_options
    }

    pub fn line_shift(&self) -> f64 {
        self.line_shift
    }

    pub(crate) fn arena(&self) -> &VoxelArena {
        &self.arena
    }

    /// Total number of attributed photons.
    pub fn n_photons(&self) -> usize {
        self.arena.n_indices()
    }

    pub(crate) fn check_stream(&self, stream: &EventStream) -> Result<()> {
        if stream.len() != self.stream_len {
            return Err(TttrError::LengthMismatch {
                what: "event stream",
                expected: self.stream_len,
                actual: stream.len(),
            });
        }
        Ok(())
    }

    /// Attributes the photons selected by `options` to their voxels.
    ///
    /// `stream` must be the stream the image was scanned from.
    pub fn fill(&mut self, stream: &EventStream, options: FillOptions) -> Result<()> {
        self.check_stream(stream)?;
        profile_scope!(format!("clsm fill {:?}", options.channels));
        let shape = self.shape();
        let n_pixel = self.topology.n_pixel;
        let frames = self.transform.frames();
        let lines = self.transform.lines();
        let macro_times = stream.macro_times();
        let micro_times = stream.micro_times();
        let channels = stream.channels();
        let event_types = stream.event_types();

        let mut assignments = Vec::new();
        for (frame, timing) in self.topology.frames.iter().enumerate() {
            if !frames.contains(&frame) {
                continue;
            }
            for (line, line_timing) in timing.lines.iter().enumerate() {
                if !lines.contains(&line) {
                    continue;
                }
                for index in line_timing.candidates(self.settings.mask_invalid) {
                    if !event_types[index].is_photon()
                        || !options.accepts(channels[index], micro_times[index])
                    {
                        continue;
                    }
                    let Some(pixel) =
                        pixel_position(macro_times[index], line_timing, n_pixel, self.line_shift)
                    else {
                        continue;
                    };
                    if let Some(current) = self.transform.map(Coordinate { frame, line, pixel }) {
                        assignments.push((shape.to_1d(current)?, index));
                    }
                }
            }
        }

        let filled = VoxelArena::from_assignments(shape.len(), &assignments);
        self.arena = if options.clear {
            filled
        } else {
            self.arena.merge(&filled)
        };
        log::debug!(
            "attributed {} photons to {} voxels",
            assignments.len(),
            shape.len()
        );
        self.fill_options = options;
        self.intensity.invalidate();
        Ok(())
    }

    /// Clears the grid and repeats the last fill, picking up line shifts.
    pub fn refill(&mut self, stream: &EventStream) -> Result<()> {
        let options = FillOptions {
            clear: true,
            ..self.fill_options.clone()
        };
        self.fill(stream, options)
    }

    /// Removes every attributed photon, keeping the grid.
    pub fn clear(&mut self) {
        self.arena = VoxelArena::empty(self.shape().len());
        self.intensity.invalidate();
    }

    /// Removes the given stream indices from every voxel holding them.
    pub fn strip(&mut self, indices: &[usize]) {
        let mut removed = indices.to_vec();
        removed.sort_unstable();
        let before = self.arena.n_indices();
        self.arena.retain(|index| removed.binary_search(&index).is_err());
        log::debug!("stripped {} photons", before - self.arena.n_indices());
        self.intensity.invalidate();
    }

    /// Restricts the grid to half-open ranges of the current coordinates.
    ///
    /// Retained voxels keep their photon lists unchanged.
    pub fn crop(
        &mut self,
        frames: Range<usize>,
        lines: Range<usize>,
        pixels: Range<usize>,
    ) -> Result<()> {
        let transform = self.transform.crop(frames.clone(), lines.clone(), pixels.clone())?;
        let old_shape = self.shape();
        let new_shape = transform.shape();
        self.arena = self.arena.remap(new_shape.len(), |voxel| {
            let c = old_shape.to_3d(voxel).ok()?;
            if !(frames.contains(&c.frame) && lines.contains(&c.line) && pixels.contains(&c.pixel))
            {
                return None;
            }
            new_shape
                .to_1d(Coordinate {
                    frame: c.frame - frames.start,
                    line: c.line - lines.start,
                    pixel: c.pixel - pixels.start,
                })
                .ok()
        });
        self.transform = transform;
        self.intensity.invalidate();
        Ok(())
    }

    /// Merges groups of `line_factor` lines and `pixel_factor` pixels.
    ///
    /// A merged voxel holds the union of its constituents' photons, so its
    /// intensity is their exact sum. Partial groups at the edges are kept.
    pub fn rebin(&mut self, line_factor: usize, pixel_factor: usize) -> Result<()> {
        let transform = self.transform.rebin(line_factor, pixel_factor)?;
        let old_shape = self.shape();
        let new_shape = transform.shape();
        self.arena = self.arena.remap(new_shape.len(), |voxel| {
            let c = old_shape.to_3d(voxel).ok()?;
            new_shape
                .to_1d(Coordinate {
                    frame: c.frame,
                    line: c.line / line_factor,
                    pixel: c.pixel / pixel_factor,
                })
                .ok()
        });
        self.transform = transform;
        self.intensity.invalidate();
        Ok(())
    }

    /// Offsets every line start by `delta` ticks.
    ///
    /// Already attributed photons stay where they are until the next
    /// [`ClsmImage::refill`].
    pub fn shift_line_start(&mut self, delta: f64) -> Result<()> {
        if !delta.is_finite() {
            return Err(TttrError::config(format!(
                "line shift must be finite, got {delta}"
            )));
        }
        self.line_shift += delta;
        Ok(())
    }

    pub fn to_1d(&self, frame: usize, line: usize, pixel: usize) -> Result<usize> {
        self.shape().to_1d(Coordinate { frame, line, pixel })
    }

    pub fn to_3d(&self, index: usize) -> Result<Coordinate> {
        self.shape().to_3d(index)
    }

    pub fn voxel(&self, frame: usize, line: usize, pixel: usize) -> Result<ImageVoxel<'_>> {
        let index = self.to_1d(frame, line, pixel)?;
        Ok(ImageVoxel {
            indices: self.arena.voxel(index),
        })
    }

    /// Line start times (ticks, shift applied) of the retained acquisition
    /// lines, as `[frame, line]`.
    pub fn line_start_times(&self) -> Array2<f64> {
        self.line_table(|line| line.start_time as f64 + self.line_shift)
    }

    /// Pixel durations (ticks) of the retained acquisition lines at
    /// acquisition resolution, as `[frame, line]`.
    pub fn pixel_durations(&self) -> Array2<f64> {
        let n_pixel = self.topology.n_pixel.max(1) as f64;
        self.line_table(|line| line.duration() as f64 / n_pixel)
    }

    fn line_table(&self, value: impl Fn(&LineTiming) -> f64) -> Array2<f64> {
        let frames = self.transform.frames();
        let lines = self.transform.lines();
        Array2::from_shape_fn((frames.len(), lines.len()), |(f, l)| {
            value(&self.topology.frames[frames.start + f].lines[lines.start + l])
        })
    }

    /// Photon count per voxel, as `[frame, line, pixel]`.
    pub fn intensity(&self) -> &Array3<u32> {
        self.intensity.get_or_compute(|| {
            let shape = self.shape();
            Array3::from_shape_fn(shape.as_tuple(), |(frame, line, pixel)| {
                let index = (frame * shape.n_lines + line) * shape.n_pixel + pixel;
                self.arena.count(index) as u32
            })
        })
    }
}

/// Pixel of a photon recorded at `time` within `line`, `None` when it falls
/// outside the line.
fn pixel_position(time: u64, line: &LineTiming, n_pixel: usize, shift: f64) -> Option<usize> {
    let duration = line.duration();
    if duration == 0 || n_pixel == 0 {
        return None;
    }
    let offset = time.saturating_sub(line.start_time) as f64 - shift;
    let position = (offset * n_pixel as f64 / duration as f64).floor();
    (position >= 0.0 && position < n_pixel as f64).then_some(position as usize)
}
