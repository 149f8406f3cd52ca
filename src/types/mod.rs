//! Type definitions shared by the stream view, the correlator and the CLSM engine

pub mod curve;
pub mod event;
pub mod header;
pub mod settings;
pub mod time_stream;

// Re-export the main types for convenience
pub use curve::CorrelationCurve;
pub use event::{EventType, PhotonEvent};
pub use header::Header;
pub use settings::{
    ClsmSettings, CorrelationMethod, CorrelatorSettings, MarkerConfig, ReadingRoutine,
};
pub use time_stream::TimeStream;
