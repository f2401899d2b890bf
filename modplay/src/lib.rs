//! Tracker module playback engine
//!
//! Loads pattern-based music modules and renders them tick by tick into PCM.
//!
//! # Architecture
//!
//! - **Module** (from `modplay-module`) - immutable normalized song data
//! - **Sequencer** - timing-only cursor (order/row/frame, speed, tempo, loops)
//! - **Mixer** - voices, effects, envelopes, resampling and output encoding
//! - **Context** - owns one module plus cursor and mixer, exposes transport
//!   controls and the Unloaded/Loaded/Playing state machine
//! - **FrameInfo / ModuleInfo** - value snapshots copied out of the context
//!
//! The sequencer never touches audio, so the same code drives playback and
//! the scan that measures sequence durations and builds the seek table.
//!
//! # Example
//!
//! ```ignore
//! use modplay::{Context, OutputFormat};
//!
//! let mut ctx = Context::new();
//! ctx.load_file("song.mod")?;
//! ctx.start(44100, OutputFormat::default())?;
//! while ctx.play_frame()? {
//!     sink.write(ctx.frame_buffer());
//! }
//! ```

mod config;
mod context;
mod error;
mod info;
mod mixer;
mod output;
mod params;
mod scan;
mod sequencer;
mod utils;

#[cfg(test)]
mod fixtures;

pub use config::{ConfigError, PlayerConfig};
pub use context::Context;
pub use error::{PlayerError, Result};
pub use info::{ChannelInfo, ChannelInfoFlags, FrameInfo, ModuleInfo, SequenceInfo};
pub use params::{DSP_LOWPASS, Interpolation, Parameter, ParameterSpec, SMPCTL_SKIP};

pub use modplay_module::{
    ChannelFlags, ChannelSettings, Effect, Event, FormatLoader, LoadError, Module, PlayerFlags,
    TestInfo,
};

/// Lowest accepted output sample rate (Hz)
pub const MIN_SAMPLE_RATE: u32 = 4000;

/// Highest accepted output sample rate (Hz)
pub const MAX_SAMPLE_RATE: u32 = 49170;

/// Maximum number of independent sequences found by a scan
pub const MAX_SEQUENCES: usize = 16;

/// Output sample format flags
///
/// The default is signed 16-bit interleaved stereo in native byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputFormat(u8);

impl OutputFormat {
    /// 8-bit samples
    pub const EIGHT_BIT: Self = Self(0x01);
    /// Unsigned samples
    pub const UNSIGNED: Self = Self(0x02);
    /// Single output channel
    pub const MONO: Self = Self(0x04);

    pub const fn empty() -> Self {
        Self(0)
    }

    /// Build from raw flag bits, ignoring unknown bits
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0x07)
    }

    pub const fn bits(&self) -> u8 {
        self.0
    }

    pub const fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Number of interleaved output channels
    pub const fn channels(&self) -> usize {
        if self.contains(Self::MONO) { 1 } else { 2 }
    }

    /// Bytes per sample value
    pub const fn bytes_per_sample(&self) -> usize {
        if self.contains(Self::EIGHT_BIT) { 1 } else { 2 }
    }

    /// Bytes per output frame (one value per channel)
    pub const fn frame_bytes(&self) -> usize {
        self.channels() * self.bytes_per_sample()
    }
}

impl std::ops::BitOr for OutputFormat {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Playback context state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum PlayerState {
    /// No module loaded
    #[default]
    Unloaded = 0,
    /// Module loaded, mixer not running
    Loaded = 1,
    /// Mixer running, frames can be rendered
    Playing = 2,
}

impl PlayerState {
    pub fn name(&self) -> &'static str {
        match self {
            PlayerState::Unloaded => "unloaded",
            PlayerState::Loaded => "loaded",
            PlayerState::Playing => "playing",
        }
    }
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
