//! Caching, profiling, geometry helpers and table export

pub mod cache;
pub mod misc;
pub mod profiling;
pub mod tables;

pub use cache::Cached;
pub use misc::{Coordinate, coarsened_len};
pub use tables::{bursts_to_dataframe, curve_to_dataframe};
