//! Configuration for the correlator and the CLSM reconstructor
//!
//! All settings are plain data: they validate eagerly and serialize with
//! serde so callers can persist them alongside their results.

use crate::error::{Result, TttrError};
use crate::types::event::EventType;
use bon::Builder;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Which cascade implementation the correlator runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationMethod {
    /// Coarsening merges events sharing a time bin.
    #[default]
    Default,
    /// Coarsening keeps every event; cascades multiply runs of equal times.
    Alternate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelatorSettings {
    /// Lags per cascade (B).
    #[builder(default = 17)]
    pub n_bins: usize,
    /// Number of cascades.
    #[builder(default = 25)]
    pub n_casc: usize,
    #[builder(default)]
    pub method: CorrelationMethod,
    /// Correlate on the fine axis (`macro * n_micro_channels + micro`).
    #[builder(default)]
    pub make_fine: bool,
}

impl Default for CorrelatorSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl CorrelatorSettings {
    pub fn validate(&self) -> Result<()> {
        if self.n_bins == 0 {
            return Err(TttrError::config("n_bins must be at least 1"));
        }
        if self.n_casc == 0 || self.n_casc > 63 {
            return Err(TttrError::config(format!(
                "n_casc must be within 1..=63, got {}",
                self.n_casc
            )));
        }
        // The largest lag is n_bins * (2^n_casc - 1).
        let span = (1u64 << self.n_casc) - 1;
        if (self.n_bins as u64).checked_mul(span).is_none() {
            return Err(TttrError::config(format!(
                "lag axis for n_bins={} and n_casc={} exceeds the 64-bit time range",
                self.n_bins, self.n_casc
            )));
        }
        Ok(())
    }
}

/// Marker identities recognized by the scan state machine.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
pub struct MarkerConfig {
    /// Routing channels of frame-start markers.
    pub frame_start: Vec<u8>,
    pub line_start: u8,
    pub line_stop: u8,
    /// Event type carrying the markers.
    #[builder(default = EventType::Marker)]
    #[serde(default = "marker_event_type")]
    pub event_type: EventType,
}

fn marker_event_type() -> EventType {
    EventType::Marker
}

impl MarkerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.frame_start.is_empty() {
            return Err(TttrError::config("at least one frame marker is required"));
        }
        if self.line_start == self.line_stop {
            return Err(TttrError::config(format!(
                "line start and line stop share marker channel {}",
                self.line_start
            )));
        }
        if let Some(clash) = self
            .frame_start
            .iter()
            .find(|&&c| c == self.line_start || c == self.line_stop)
        {
            return Err(TttrError::config(format!(
                "marker channel {clash} is used for both frames and lines"
            )));
        }
        if !self.frame_start.iter().all_unique() {
            return Err(TttrError::config("frame markers contain duplicates"));
        }
        Ok(())
    }

    pub fn is_frame_marker(&self, channel: u8) -> bool {
        self.frame_start.contains(&channel)
    }
}

/// Named marker conventions of common scanner/TCSPC combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingRoutine {
    #[default]
    PicoQuant,
    LeicaSp5,
    LeicaSp8,
}

impl ReadingRoutine {
    pub fn markers(self) -> MarkerConfig {
        let (frame_start, line_start, line_stop) = match self {
            Self::PicoQuant => (vec![4], 1, 2),
            Self::LeicaSp5 => (vec![4, 6], 1, 2),
            Self::LeicaSp8 => (vec![4, 8], 1, 2),
        };
        MarkerConfig {
            frame_start,
            line_start,
            line_stop,
            event_type: EventType::Marker,
        }
    }
}

impl From<ReadingRoutine> for MarkerConfig {
    fn from(routine: ReadingRoutine) -> Self {
        routine.markers()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct ClsmSettings {
    #[builder(into, default = ReadingRoutine::default().markers())]
    pub markers: MarkerConfig,
    /// Pixels per line; `None` makes the image square (pixels = lines).
    pub n_pixel_per_line: Option<usize>,
    /// Only attribute photons recorded between a line's start and stop markers.
    #[builder(default = true)]
    pub mask_invalid: bool,
    /// Stop the scan after this many frames.
    pub n_frames_max: Option<usize>,
    /// Ignore line markers preceding the first frame marker.
    #[builder(default)]
    pub skip_before_first_frame_marker: bool,
    /// Drop the (usually incomplete) frame after the last frame marker.
    #[builder(default)]
    pub skip_after_last_frame_marker: bool,
}

impl Default for ClsmSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ClsmSettings {
    pub fn validate(&self) -> Result<()> {
        self.markers.validate()?;
        if self.n_pixel_per_line == Some(0) {
            return Err(TttrError::config("n_pixel_per_line must be positive"));
        }
        if self.n_frames_max == Some(0) {
            return Err(TttrError::config("n_frames_max must be positive"));
        }
        Ok(())
    }

    /// Parses and validates settings stored as JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        for routine in [
            ReadingRoutine::PicoQuant,
            ReadingRoutine::LeicaSp5,
            ReadingRoutine::LeicaSp8,
        ] {
            routine.markers().validate().unwrap();
        }
    }

    #[test]
    fn test_rejects_marker_clash() {
        let markers = MarkerConfig::builder()
            .frame_start(vec![1])
            .line_start(1)
            .line_stop(2)
            .build();
        assert!(markers.validate().is_err());

        let markers = MarkerConfig::builder()
            .frame_start(vec![4])
            .line_start(3)
            .line_stop(3)
            .build();
        assert!(markers.validate().is_err());
    }

    #[test]
    fn test_clsm_settings_json() -> Result<()> {
        let settings = ClsmSettings::builder()
            .markers(ReadingRoutine::LeicaSp5)
            .n_pixel_per_line(256)
            .build();
        let restored = ClsmSettings::from_json(&settings.to_json()?)?;
        assert_eq!(restored, settings);

        // Missing fields fall back to the defaults.
        let partial = ClsmSettings::from_json(r#"{"n_pixel_per_line": 64}"#)?;
        assert_eq!(partial.markers, ReadingRoutine::PicoQuant.markers());
        assert!(partial.mask_invalid);

        assert!(ClsmSettings::from_json(r#"{"n_pixel_per_line": 0}"#).is_err());
        Ok(())
    }

    #[test]
    fn test_correlator_settings_validation() {
        assert!(CorrelatorSettings::default().validate().is_ok());
        assert!(
            CorrelatorSettings::builder()
                .n_bins(0)
                .build()
                .validate()
                .is_err()
        );
        assert!(
            CorrelatorSettings::builder()
                .n_casc(64)
                .build()
                .validate()
                .is_err()
        );
        assert!(
            CorrelatorSettings::builder()
                .n_bins(usize::MAX / 2)
                .n_casc(40)
                .build()
                .validate()
                .is_err()
        );
    }
}
