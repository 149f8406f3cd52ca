//! Scanning-image reconstruction from marker-annotated photon streams
//!
//! A [`ClsmImage`] is built in two passes: [`scanner::scan`] recovers frame
//! and line timing from the markers once, then fills attribute photons of
//! selected channels to `(frame, line, pixel)` voxels. Voxels keep photon
//! indices rather than counts so any derived image can be computed later.

pub mod arena;
pub mod derived;
pub mod grid;
pub mod image;
pub mod scanner;

pub use arena::VoxelArena;
pub use derived::INSUFFICIENT_PHOTONS;
pub use grid::{GridTransform, Shape};
pub use image::{ClsmImage, FillOptions, ImageVoxel};
pub use scanner::{FrameTiming, LineTiming, ScanTopology};
