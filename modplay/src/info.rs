//! Value snapshots of playback and module state
//!
//! Snapshots are copied out of the context when requested. They never alias
//! engine memory, so they stay valid after the context moves on, reloads or
//! is closed.

use modplay_module::{ChannelSettings, Event, Module, PlayerFlags, VOLUME_BASE};

use crate::mixer::{ChannelControl, Voice};
use crate::utils::pan_to_u8;

/// State of one pattern channel
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChannelInfo {
    /// Current period (linear, 64 units per semitone)
    pub period: f32,
    /// Play position in sample frames
    pub position: usize,
    /// Period offset from the played note, positive is higher
    pub pitch_bend: i32,
    /// 0-based key of the playing note
    pub key: Option<u8>,
    pub instrument: Option<usize>,
    pub sample: Option<usize>,
    /// Note volume (0-64)
    pub volume: u8,
    /// Pan (0 = left, 0x80 = center, 0xFF = right)
    pub pan: u8,
    /// Last event applied to the channel
    pub event: Event,
    pub flags: ChannelInfoFlags,
}

impl ChannelInfo {
    pub(crate) fn from_voice(voice: &Voice, control: ChannelControl) -> Self {
        let mut flags = ChannelInfoFlags::empty();
        if control.muted {
            flags = flags | ChannelInfoFlags::MUTE;
        }
        if voice.surround {
            flags = flags | ChannelInfoFlags::SURROUND;
        }
        Self {
            period: voice.period,
            position: voice.pos.max(0.0) as usize,
            pitch_bend: (voice.note_period - voice.period).round() as i32,
            key: voice.key,
            instrument: voice.instrument,
            sample: voice.sample,
            volume: (voice.volume * 64.0).round().clamp(0.0, 64.0) as u8,
            pan: pan_to_u8(voice.panning),
            event: voice.event,
            flags,
        }
    }

    /// Channel with no voice state (playback not started)
    pub(crate) fn idle(control: ChannelControl) -> Self {
        let flags = if control.muted {
            ChannelInfoFlags::MUTE
        } else {
            ChannelInfoFlags::empty()
        };
        Self {
            flags,
            ..Default::default()
        }
    }
}

/// Channel state flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelInfoFlags(u8);

impl ChannelInfoFlags {
    /// Channel is muted by the caller
    pub const MUTE: Self = Self(0x02);
    /// Voice plays in surround
    pub const SURROUND: Self = Self(0x10);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(&self) -> u8 {
        self.0
    }

    pub const fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for ChannelInfoFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Playback state at the last rendered tick
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrameInfo {
    /// Order position
    pub position: usize,
    pub pattern: usize,
    pub row: usize,
    /// Rows in the current pattern
    pub num_rows: usize,
    /// Tick within the row
    pub frame: usize,
    pub speed: u8,
    pub bpm: u8,
    /// Playback time at the start of the current tick
    pub time_ms: f64,
    /// Duration of the active sequence
    pub total_time_ms: f64,
    /// Length of one tick in microseconds
    pub frame_time_us: u64,
    /// Bytes rendered for the current tick
    pub buffer_bytes: usize,
    /// Bytes a tick takes at the current tempo
    pub buffer_size: usize,
    /// Bytes of the longest possible tick
    pub total_buffer_size: usize,
    /// Master volume in percent
    pub volume: i32,
    pub loop_count: u32,
    /// Voices available for playback, background voices included
    pub virtual_channels: usize,
    /// Voices currently sounding
    pub virtual_used: usize,
    /// Active sequence
    pub sequence: usize,
    pub channels: Vec<ChannelInfo>,
}

/// One independent song inside a module
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SequenceInfo {
    /// First order of the sequence
    pub entry: usize,
    /// Ticks in one pass
    pub duration_frames: u64,
    /// Length of one pass
    pub duration_ms: f64,
}

/// Summary of the loaded module
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleInfo {
    /// xxh3-128 of the loaded bytes (zero for modules passed in directly)
    pub digest: [u8; 16],
    pub name: String,
    pub format: String,
    pub channels: usize,
    pub num_patterns: usize,
    pub num_tracks: usize,
    pub num_instruments: usize,
    pub num_samples: usize,
    pub speed: u8,
    pub bpm: u8,
    pub restart: usize,
    pub global_volume: u8,
    /// Scale of volumes in events and channel settings
    pub volume_base: u8,
    pub orders: Vec<u8>,
    pub channel_settings: Vec<ChannelSettings>,
    pub instrument_names: Vec<String>,
    pub sample_names: Vec<String>,
    pub flags: PlayerFlags,
    pub comment: Option<String>,
    pub sequences: Vec<SequenceInfo>,
}

impl ModuleInfo {
    pub(crate) fn new(module: &Module, digest: [u8; 16], sequences: Vec<SequenceInfo>) -> Self {
        Self {
            digest,
            name: module.name.clone(),
            format: module.format.clone(),
            channels: module.channels,
            num_patterns: module.num_patterns(),
            num_tracks: module.num_tracks(),
            num_instruments: module.num_instruments(),
            num_samples: module.num_samples(),
            speed: module.speed,
            bpm: module.bpm,
            restart: module.restart,
            global_volume: module.global_volume,
            volume_base: VOLUME_BASE,
            orders: module.orders.clone(),
            channel_settings: module.channel_settings.clone(),
            instrument_names: module.instruments.iter().map(|i| i.name.clone()).collect(),
            sample_names: module.samples.iter().map(|s| s.name.clone()).collect(),
            flags: module.flags,
            comment: module.comment.clone(),
            sequences,
        }
    }

    /// Module length in orders
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}
