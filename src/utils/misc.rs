use bon::Builder;
use serde::{Deserialize, Serialize};

/// Position of a voxel in a CLSM image.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Builder, Serialize, Deserialize)]
pub struct Coordinate {
    pub frame: usize,
    pub line: usize,
    pub pixel: usize,
}

impl From<(usize, usize, usize)> for Coordinate {
    fn from((frame, line, pixel): (usize, usize, usize)) -> Self {
        Self { frame, line, pixel }
    }
}

impl From<Coordinate> for (usize, usize, usize) {
    fn from(c: Coordinate) -> Self {
        (c.frame, c.line, c.pixel)
    }
}

/// Number of bins needed to cover `n` channels when `factor` channels share a bin.
pub fn coarsened_len(n: usize, factor: usize) -> usize {
    n.div_ceil(factor.max(1))
}
