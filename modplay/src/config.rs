//! Player configuration (TOML)
//!
//! Holds the initial value of every writable parameter plus engine limits.
//! Values are checked against the same table `Context::set_parameter` uses.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::params::{DSP_LOWPASS, Parameter, Parameters};

/// Configuration loading error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Malformed TOML or wrong field types
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field is outside its parameter range
    #[error("invalid value {value} for {parameter:?}")]
    Invalid { parameter: Parameter, value: i32 },

    /// Engine limit out of range
    #[error("invalid {field}: {reason}")]
    Limit { field: &'static str, reason: String },

    /// Reading the config file failed
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
}

/// Player configuration.
///
/// Every field is optional in the TOML source; missing fields take the
/// engine defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Amplification factor (default: 1, range: 0-3)
    #[serde(default = "default_amplification")]
    pub amplification: i32,
    /// Stereo separation percent (default: 70, range: 0-100)
    #[serde(default = "default_stereo_mixing")]
    pub stereo_mixing: i32,
    /// Interpolation: 0 nearest, 1 linear, 2 spline (default: 1)
    #[serde(default = "default_interpolation")]
    pub interpolation: i32,
    /// DSP mask (default: lowpass on)
    #[serde(default = "default_dsp")]
    pub dsp: i32,
    /// Player flags mask (default: 0)
    #[serde(default)]
    pub player_flags: i32,
    /// Sample control mask (default: 0)
    #[serde(default)]
    pub sample_control: i32,
    /// Master volume percent (default: 100, range: 0-200)
    #[serde(default = "default_percent")]
    pub volume: i32,
    /// Injected voice volume percent (default: 100, range: 0-200)
    #[serde(default = "default_percent")]
    pub secondary_volume: i32,
    /// Default pan spread percent (default: 100, range: 0-100)
    #[serde(default = "default_percent")]
    pub default_pan: i32,
    /// Loops `play_frame` plays before reporting the end, 0 = forever (default: 1)
    #[serde(default = "default_max_loops")]
    pub max_loops: u32,
    /// Background voices for new-note actions (default: 64, range: 0-256)
    #[serde(default = "default_virtual_voices")]
    pub virtual_voices: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            amplification: default_amplification(),
            stereo_mixing: default_stereo_mixing(),
            interpolation: default_interpolation(),
            dsp: default_dsp(),
            player_flags: 0,
            sample_control: 0,
            volume: default_percent(),
            secondary_volume: default_percent(),
            default_pan: default_percent(),
            max_loops: default_max_loops(),
            virtual_voices: default_virtual_voices(),
        }
    }
}

fn default_amplification() -> i32 {
    1
}
fn default_stereo_mixing() -> i32 {
    70
}
fn default_interpolation() -> i32 {
    1
}
fn default_dsp() -> i32 {
    DSP_LOWPASS
}
fn default_percent() -> i32 {
    100
}
fn default_max_loops() -> u32 {
    1
}
fn default_virtual_voices() -> usize {
    64
}

/// Upper bound on background voices
pub const MAX_VIRTUAL_VOICES: usize = 256;

impl PlayerConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: PlayerConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    fn entries(&self) -> [(Parameter, i32); 9] {
        [
            (Parameter::Amplification, self.amplification),
            (Parameter::StereoMixing, self.stereo_mixing),
            (Parameter::Interpolation, self.interpolation),
            (Parameter::DspEffects, self.dsp),
            (Parameter::PlayerFlags, self.player_flags),
            (Parameter::SampleControl, self.sample_control),
            (Parameter::Volume, self.volume),
            (Parameter::SecondaryVolume, self.secondary_volume),
            (Parameter::DefaultPan, self.default_pan),
        ]
    }

    /// Check every field against its range
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.parameters().map(|_| ())
    }

    /// Build the parameter set this config describes
    pub(crate) fn parameters(&self) -> Result<Parameters, ConfigError> {
        if self.virtual_voices > MAX_VIRTUAL_VOICES {
            return Err(ConfigError::Limit {
                field: "virtual_voices",
                reason: format!("{} exceeds {MAX_VIRTUAL_VOICES}", self.virtual_voices),
            });
        }
        let mut params = Parameters::default();
        for (parameter, value) in self.entries() {
            params
                .set(parameter, value)
                .map_err(|_| ConfigError::Invalid { parameter, value })?;
        }
        Ok(params)
    }
}
