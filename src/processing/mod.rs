//! Stream selection and multi-tau correlation

pub mod cascade;
pub mod correlator;
pub mod selection;

pub use cascade::{CascadeStrategy, MergedCascade, RunLengthCascade, lag_axis};
pub use correlator::Correlator;
pub use selection::{BurstCriteria, ranges_by_time_window, selection_by_count_rate};
