//! Types for representing single photon / marker events

use bon::Builder;
use serde::{Deserialize, Serialize};

/// Distinguishes detected photons from instrument markers (frame/line clocks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum EventType {
    #[default]
    Photon = 0,
    Marker = 1,
}

impl EventType {
    pub fn is_photon(self) -> bool {
        matches!(self, Self::Photon)
    }
}

/// One time-tagged event. Streams store these column-wise; a `PhotonEvent` is
/// only materialized on indexed access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Builder)]
pub struct PhotonEvent {
    pub macro_time: u64,
    #[builder(default)]
    pub micro_time: u16,
    pub channel: u8,
    #[builder(default)]
    pub event_type: EventType,
}

impl PhotonEvent {
    /// Position on the fine time axis: `macro_time * n_micro_time_channels + micro_time`.
    ///
    /// Without a known channel count the macro time is returned unchanged.
    /// `None` when the composed time does not fit in 64 bits.
    pub fn fine_time(&self, n_micro_time_channels: u32) -> Option<u64> {
        match n_micro_time_channels {
            0 => Some(self.macro_time),
            n => self
                .macro_time
                .checked_mul(n as u64)?
                .checked_add(self.micro_time as u64),
        }
    }
}
