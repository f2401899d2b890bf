//! Player parameters
//!
//! Every tunable is a [`Parameter`] with a fixed numeric code and an entry in
//! a static table giving its range and whether it can be written.

use modplay_module::PlayerFlags;

use crate::error::{PlayerError, Result};

/// DSP mask bit: resonant lowpass filters
pub const DSP_LOWPASS: i32 = 0x01;

/// Sample control bit: load sample headers only
pub const SMPCTL_SKIP: i32 = 0x01;

/// Player parameter identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Parameter {
    /// Amplification factor (0-3)
    Amplification = 0,
    /// Stereo separation in percent
    StereoMixing = 1,
    /// Resampling algorithm, see [`Interpolation`]
    Interpolation = 2,
    /// DSP effect mask
    DspEffects = 3,
    /// Player behavior flags
    PlayerFlags = 4,
    /// Quirk flags of the loaded module (read-only)
    ModuleFlags = 5,
    /// Sample loading control mask
    SampleControl = 6,
    /// Master volume in percent
    Volume = 7,
    /// Playback state (read-only)
    State = 8,
    /// Volume of injected voices in percent
    SecondaryVolume = 9,
    /// Default channel pan spread in percent
    DefaultPan = 10,
}

/// Range and access of one parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterSpec {
    pub min: i32,
    pub max: i32,
    pub writable: bool,
}

const fn rw(min: i32, max: i32) -> ParameterSpec {
    ParameterSpec {
        min,
        max,
        writable: true,
    }
}

const fn ro() -> ParameterSpec {
    ParameterSpec {
        min: 0,
        max: i32::MAX,
        writable: false,
    }
}

/// Indexed by parameter code
const TABLE: [ParameterSpec; 11] = [
    rw(0, 3),
    rw(0, 100),
    rw(0, 2),
    rw(0, DSP_LOWPASS),
    rw(0, PlayerFlags::ALL.bits() as i32),
    ro(),
    rw(0, SMPCTL_SKIP),
    rw(0, 200),
    ro(),
    rw(0, 200),
    rw(0, 100),
];

impl Parameter {
    /// Every parameter in code order
    pub const ALL: [Parameter; 11] = [
        Parameter::Amplification,
        Parameter::StereoMixing,
        Parameter::Interpolation,
        Parameter::DspEffects,
        Parameter::PlayerFlags,
        Parameter::ModuleFlags,
        Parameter::SampleControl,
        Parameter::Volume,
        Parameter::State,
        Parameter::SecondaryVolume,
        Parameter::DefaultPan,
    ];

    /// Look up a parameter by numeric code
    pub fn from_code(code: i32) -> Option<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|idx| Self::ALL.get(idx).copied())
    }

    pub fn code(&self) -> i32 {
        *self as i32
    }

    /// Range and access of this parameter
    pub fn spec(&self) -> ParameterSpec {
        TABLE[*self as usize]
    }

    pub fn is_writable(&self) -> bool {
        self.spec().writable
    }

    /// Check a value against the table
    pub fn validate(&self, value: i32) -> Result<()> {
        let spec = self.spec();
        if !spec.writable {
            return Err(PlayerError::invalid(format!("{self:?} is read-only")));
        }
        if value < spec.min || value > spec.max {
            return Err(PlayerError::invalid(format!(
                "{self:?} value {value} outside {}..={}",
                spec.min, spec.max
            )));
        }
        // Mask parameters reject unknown bits even when numerically in range
        if matches!(
            self,
            Parameter::DspEffects | Parameter::PlayerFlags | Parameter::SampleControl
        ) && value & !spec.max != 0
        {
            return Err(PlayerError::invalid(format!(
                "{self:?} has unknown bits in {value:#x}"
            )));
        }
        Ok(())
    }
}

/// Resampling algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Interpolation {
    /// Nearest neighbour
    Nearest = 0,
    /// Linear
    #[default]
    Linear = 1,
    /// Cubic (Catmull-Rom) spline
    Spline = 2,
}

impl Interpolation {
    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            0 => Some(Interpolation::Nearest),
            1 => Some(Interpolation::Linear),
            2 => Some(Interpolation::Spline),
            _ => None,
        }
    }
}

/// Current values of the writable parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Parameters {
    pub amplification: i32,
    pub stereo_mixing: i32,
    pub interpolation: Interpolation,
    pub dsp: i32,
    pub player_flags: PlayerFlags,
    pub sample_control: i32,
    pub volume: i32,
    pub secondary_volume: i32,
    pub default_pan: i32,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            amplification: 1,
            stereo_mixing: 70,
            interpolation: Interpolation::Linear,
            dsp: DSP_LOWPASS,
            player_flags: PlayerFlags::empty(),
            sample_control: 0,
            volume: 100,
            secondary_volume: 100,
            default_pan: 100,
        }
    }
}

impl Parameters {
    /// Set a writable parameter after validating it against the table
    pub fn set(&mut self, param: Parameter, value: i32) -> Result<()> {
        param.validate(value)?;
        match param {
            Parameter::Amplification => self.amplification = value,
            Parameter::StereoMixing => self.stereo_mixing = value,
            Parameter::Interpolation => {
                self.interpolation = Interpolation::from_value(value)
                    .ok_or_else(|| PlayerError::invalid("interpolation"))?
            }
            Parameter::DspEffects => self.dsp = value,
            Parameter::PlayerFlags => self.player_flags = PlayerFlags::from_bits(value as u32),
            Parameter::SampleControl => self.sample_control = value,
            Parameter::Volume => self.volume = value,
            Parameter::SecondaryVolume => self.secondary_volume = value,
            Parameter::DefaultPan => self.default_pan = value,
            Parameter::ModuleFlags | Parameter::State => {
                return Err(PlayerError::Internal(format!(
                    "{param:?} passed validation but is read-only"
                )));
            }
        }
        Ok(())
    }

    /// Value of a writable parameter, `None` for read-only ones
    pub fn get(&self, param: Parameter) -> Option<i32> {
        Some(match param {
            Parameter::Amplification => self.amplification,
            Parameter::StereoMixing => self.stereo_mixing,
            Parameter::Interpolation => self.interpolation as i32,
            Parameter::DspEffects => self.dsp,
            Parameter::PlayerFlags => self.player_flags.bits() as i32,
            Parameter::SampleControl => self.sample_control,
            Parameter::Volume => self.volume,
            Parameter::SecondaryVolume => self.secondary_volume,
            Parameter::DefaultPan => self.default_pan,
            Parameter::ModuleFlags | Parameter::State => return None,
        })
    }

    pub fn lowpass(&self) -> bool {
        self.dsp & DSP_LOWPASS != 0
    }

    pub fn skip_samples(&self) -> bool {
        self.sample_control & SMPCTL_SKIP != 0
    }

    /// Linear gain of the amplification setting (1.0 at the default)
    pub fn amplification_gain(&self) -> f32 {
        (1u32 << self.amplification) as f32 * 0.5
    }
}
