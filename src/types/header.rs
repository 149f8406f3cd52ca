use bon::Builder;
use serde::{Deserialize, Serialize};

/// Calibration of an acquisition: how to turn ticks into seconds.
#[derive(Debug, Clone, Copy, PartialEq, Builder, Serialize, Deserialize)]
pub struct Header {
    /// Seconds per macro-time tick.
    pub macro_time_resolution: f64,
    /// Seconds per micro-time channel.
    pub micro_time_resolution: f64,
    /// Number of micro-time channels per macro-time tick. Zero means unknown.
    #[builder(default)]
    pub n_micro_time_channels: u32,
}

impl Header {
    /// Seconds per unit of the fine time axis (`macro * n_channels + micro`).
    ///
    /// Falls back to the macro-time resolution when the number of micro-time
    /// channels is unknown.
    pub fn fine_time_resolution(&self) -> f64 {
        if self.n_micro_time_channels > 0 {
            self.macro_time_resolution / self.n_micro_time_channels as f64
        } else {
            self.macro_time_resolution
        }
    }
}

impl Default for Header {
    fn default() -> Self {
        Self {
            macro_time_resolution: 1.0,
            micro_time_resolution: 1.0,
            n_micro_time_channels: 0,
        }
    }
}
