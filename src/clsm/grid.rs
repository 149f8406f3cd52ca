//! Voxel grid geometry and the mapping from acquisition to current coordinates

use crate::error::{Result, TttrError};
use crate::utils::misc::{Coordinate, coarsened_len};
use serde::Serialize;
use std::ops::Range;

/// Extent of a voxel grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Shape {
    pub n_frames: usize,
    pub n_lines: usize,
    pub n_pixel: usize,
}

impl Shape {
    pub fn new(n_frames: usize, n_lines: usize, n_pixel: usize) -> Self {
        Self {
            n_frames,
            n_lines,
            n_pixel,
        }
    }

    /// Total number of voxels.
    pub fn len(&self) -> usize {
        self.n_frames * self.n_lines * self.n_pixel
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_tuple(&self) -> (usize, usize, usize) {
        (self.n_frames, self.n_lines, self.n_pixel)
    }

    /// Row-major flat index of a voxel.
    pub fn to_1d(&self, coordinate: Coordinate) -> Result<usize> {
        let Coordinate { frame, line, pixel } = coordinate;
        for (index, len) in [
            (frame, self.n_frames),
            (line, self.n_lines),
            (pixel, self.n_pixel),
        ] {
            if index >= len {
                return Err(TttrError::IndexOutOfBounds { index, len });
            }
        }
        Ok((frame * self.n_lines + line) * self.n_pixel + pixel)
    }

    /// Inverse of [`Shape::to_1d`].
    pub fn to_3d(&self, index: usize) -> Result<Coordinate> {
        if index >= self.len() {
            return Err(TttrError::IndexOutOfBounds {
                index,
                len: self.len(),
            });
        }
        let pixel = index % self.n_pixel;
        let line = (index / self.n_pixel) % self.n_lines;
        let frame = index / (self.n_pixel * self.n_lines);
        Ok(Coordinate { frame, line, pixel })
    }
}

/// Maps acquisition coordinates onto the current (cropped, rebinned) grid.
///
/// Keeping the mapping lets a refill attribute photons straight into the
/// current grid instead of replaying every structural operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GridTransform {
    frames: Range<usize>,
    lines: Range<usize>,
    pixels: Range<usize>,
    line_factor: usize,
    pixel_factor: usize,
}

impl GridTransform {
    pub fn identity(shape: Shape) -> Self {
        Self {
            frames: 0..shape.n_frames,
            lines: 0..shape.n_lines,
            pixels: 0..shape.n_pixel,
            line_factor: 1,
            pixel_factor: 1,
        }
    }

    pub fn shape(&self) -> Shape {
        Shape::new(
            self.frames.len(),
            coarsened_len(self.lines.len(), self.line_factor),
            coarsened_len(self.pixels.len(), self.pixel_factor),
        )
    }

    /// Acquisition frames still present in the grid.
    pub fn frames(&self) -> Range<usize> {
        self.frames.clone()
    }

    /// Acquisition lines still present in the grid.
    pub fn lines(&self) -> Range<usize> {
        self.lines.clone()
    }

    pub fn line_factor(&self) -> usize {
        self.line_factor
    }

    pub fn pixel_factor(&self) -> usize {
        self.pixel_factor
    }

    /// Current coordinate of an acquisition voxel, `None` when cropped away.
    pub fn map(&self, raw: Coordinate) -> Option<Coordinate> {
        if !(self.frames.contains(&raw.frame)
            && self.lines.contains(&raw.line)
            && self.pixels.contains(&raw.pixel))
        {
            return None;
        }
        Some(Coordinate {
            frame: raw.frame - self.frames.start,
            line: (raw.line - self.lines.start) / self.line_factor,
            pixel: (raw.pixel - self.pixels.start) / self.pixel_factor,
        })
    }

    /// Restricts the grid to the given ranges of current coordinates.
    pub fn crop(
        &self,
        frames: Range<usize>,
        lines: Range<usize>,
        pixels: Range<usize>,
    ) -> Result<Self> {
        let shape = self.shape();
        for (axis, range, len) in [
            ("frame", &frames, shape.n_frames),
            ("line", &lines, shape.n_lines),
            ("pixel", &pixels, shape.n_pixel),
        ] {
            if range.start > range.end || range.end > len {
                return Err(TttrError::RangeOutOfBounds {
                    axis,
                    start: range.start,
                    stop: range.end,
                    len,
                });
            }
        }
        let narrow = |raw: &Range<usize>, current: &Range<usize>, factor: usize| {
            let start = raw.start + current.start * factor;
            let end = (raw.start + current.end * factor).min(raw.end);
            start..end.max(start)
        };
        Ok(Self {
            frames: self.frames.start + frames.start..self.frames.start + frames.end,
            lines: narrow(&self.lines, &lines, self.line_factor),
            pixels: narrow(&self.pixels, &pixels, self.pixel_factor),
            line_factor: self.line_factor,
            pixel_factor: self.pixel_factor,
        })
    }

    /// Merges `line_factor` lines and `pixel_factor` pixels of the current grid.
    pub fn rebin(&self, line_factor: usize, pixel_factor: usize) -> Result<Self> {
        if line_factor == 0 || pixel_factor == 0 {
            return Err(TttrError::config(format!(
                "rebin factors must be positive, got ({line_factor}, {pixel_factor})"
            )));
        }
        Ok(Self {
            line_factor: self.line_factor * line_factor,
            pixel_factor: self.pixel_factor * pixel_factor,
            ..self.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_coordinate_round_trip(
            n_frames in 1usize..5,
            n_lines in 1usize..9,
            n_pixel in 1usize..9,
            seed in any::<usize>(),
        ) {
            let shape = Shape::new(n_frames, n_lines, n_pixel);
            let index = seed % shape.len();
            let coordinate = shape.to_3d(index).unwrap();
            prop_assert_eq!(shape.to_1d(coordinate).unwrap(), index);
        }
    }

    #[test]
    fn test_round_trip_covers_every_voxel() {
        let shape = Shape::new(2, 3, 4);
        for frame in 0..2 {
            for line in 0..3 {
                for pixel in 0..4 {
                    let coordinate = Coordinate { frame, line, pixel };
                    let index = shape.to_1d(coordinate).unwrap();
                    assert_eq!(shape.to_3d(index).unwrap(), coordinate);
                }
            }
        }
        assert!(shape.to_3d(24).is_err());
        assert!(shape.to_1d((0, 3, 0).into()).is_err());
    }

    #[test]
    fn test_crop_after_rebin_composes() -> Result<()> {
        let transform = GridTransform::identity(Shape::new(2, 8, 6));
        let rebinned = transform.rebin(2, 3)?;
        assert_eq!(rebinned.shape().as_tuple(), (2, 4, 2));

        let cropped = rebinned.crop(1..2, 1..3, 0..1)?;
        assert_eq!(cropped.shape().as_tuple(), (1, 2, 1));
        assert_eq!(cropped.lines(), 2..6);
        assert_eq!(cropped.map((1, 5, 2).into()), Some((0, 1, 0).into()));
        assert_eq!(cropped.map((0, 5, 2).into()), None);
        assert_eq!(cropped.map((1, 6, 2).into()), None);

        assert!(rebinned.crop(0..3, 0..1, 0..1).is_err());
        assert!(transform.rebin(0, 1).is_err());
        Ok(())
    }

    #[test]
    fn test_rebin_keeps_partial_groups() {
        let transform = GridTransform::identity(Shape::new(1, 5, 5));
        let rebinned = transform.rebin(2, 2).unwrap();
        assert_eq!(rebinned.shape().as_tuple(), (1, 3, 3));
        assert_eq!(rebinned.map((0, 4, 4).into()), Some((0, 2, 2).into()));
    }
}
