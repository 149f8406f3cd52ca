//! Analysis of time-tagged photon event streams.
//!
//! An [`EventStream`] holds the events of a TTTR acquisition column-wise.
//! On top of it the crate provides
//!
//! * count-rate and burst selections ([`processing::selection`]),
//! * multi-tau correlation of weighted time streams ([`Correlator`]),
//! * reconstruction of confocal laser-scanning images ([`ClsmImage`]) with
//!   per-voxel photon indices and derived intensity, mean micro-time and
//!   decay images.
//!
//! The library logs through the `log` facade and never installs a logger.

pub mod clsm;
pub mod error;
pub mod event_stream;
pub mod processing;
pub mod types;
pub mod utils;

pub use clsm::{ClsmImage, FillOptions, ImageVoxel, Shape};
pub use error::{Result, TttrError};
pub use event_stream::EventStream;
pub use processing::{BurstCriteria, Correlator};
pub use types::{
    ClsmSettings, CorrelationCurve, CorrelationMethod, CorrelatorSettings, EventType, Header,
    MarkerConfig, PhotonEvent, ReadingRoutine, TimeStream,
};
pub use utils::Coordinate;
