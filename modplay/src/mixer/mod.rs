//! Voice mixer
//!
//! Applies row events and per-tick effects to the voices, renders one tick
//! of audio into a float mix buffer and encodes it to the output format.
//!
//! Submodules:
//! - `events` - row events, new note actions and duplicate checks
//! - `effects` - effect processing at tick 0 and on later ticks
//! - `render` - resampling, loops, volume/pan and envelope advance

mod effects;
mod events;
mod render;
mod voice;

#[cfg(test)]
mod tests;

use modplay_module::{ChannelFlags, Event, Module, PlayerFlags};
use tracing::trace;

use crate::OutputFormat;
use crate::error::{PlayerError, Result};
use crate::output::encode;
use crate::params::Parameters;
use crate::sequencer::Sequencer;
use crate::utils::{pan_to_f32, samples_per_tick};

pub(crate) use voice::Voice;

/// Slowest tempo a module can select, sizes the largest tick buffer
const MIN_BPM: u8 = 32;

/// Caller-side state of one pattern channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ChannelControl {
    pub muted: bool,
    /// Channel volume (0.0-1.0)
    pub volume: f32,
}

impl Default for ChannelControl {
    fn default() -> Self {
        Self {
            muted: false,
            volume: 1.0,
        }
    }
}

/// Everything outside the mixer that shapes one tick
pub(crate) struct MixEnv<'a> {
    pub params: &'a Parameters,
    /// Player flags combined with the module's own flags
    pub flags: PlayerFlags,
    pub controls: &'a [ChannelControl],
}

/// Voice state plus output buffers for one playing module
#[derive(Debug)]
pub(crate) struct Mixer {
    rate: u32,
    format: OutputFormat,
    /// Frames of the longest possible tick
    max_frames: usize,
    /// Pattern channels; voices past this index are background voices
    channels: usize,
    voices: Vec<Voice>,
    /// Module global volume (0.0-1.0)
    global_volume: f32,
    last_global_slide: u8,
    global_slide_active: bool,
    /// Interleaved stereo mix of the current tick
    mix: Vec<f32>,
    scratch: Vec<i16>,
    buffer: Vec<u8>,
    /// Events waiting for the next tick
    pending: Vec<(usize, Event)>,
}

impl Mixer {
    /// Allocate voices and buffers for a module at the given output rate
    pub fn new(
        module: &Module,
        rate: u32,
        format: OutputFormat,
        params: &Parameters,
        virtual_voices: usize,
    ) -> Result<Self> {
        let max_frames = samples_per_tick(rate, MIN_BPM.min(module.bpm.max(1)));
        let total_voices = module.channels + virtual_voices;

        let mut voices = Vec::new();
        let mut mix = Vec::new();
        let mut buffer = Vec::new();
        voices
            .try_reserve_exact(total_voices)
            .and_then(|_| mix.try_reserve_exact(max_frames * 2))
            .and_then(|_| buffer.try_reserve_exact(max_frames * format.frame_bytes()))
            .map_err(|e| PlayerError::System(format!("mixer allocation failed: {e}")))?;

        voices.extend((0..module.channels).map(Voice::new));
        voices.extend((0..virtual_voices).map(|_| Voice::background()));

        let mut mixer = Self {
            rate,
            format,
            max_frames,
            channels: module.channels,
            voices,
            global_volume: 1.0,
            last_global_slide: 0,
            global_slide_active: false,
            mix,
            scratch: Vec::new(),
            buffer,
            pending: Vec::new(),
        };
        mixer.reset_channels(module, params);
        Ok(mixer)
    }

    /// Put every voice back to the module's channel defaults
    pub fn reset_channels(&mut self, module: &Module, params: &Parameters) {
        let spread = params.default_pan as f32 / 100.0;
        for (ch, voice) in self.voices.iter_mut().enumerate() {
            if ch >= self.channels {
                *voice = Voice::background();
                continue;
            }
            *voice = Voice::new(ch);
            if let Some(settings) = module.channel_settings.get(ch) {
                voice.panning = pan_to_f32(settings.pan) * spread;
                voice.surround = settings.flags.contains(ChannelFlags::SURROUND);
                voice.channel_volume = settings.volume.min(64) as f32 / 64.0;
            }
        }
        self.global_volume = module.global_volume.min(64) as f32 / 64.0;
        self.last_global_slide = 0;
        self.global_slide_active = false;
        self.pending.clear();
        self.buffer.clear();
    }

    /// Stop every sounding voice, keeping channel settings and effect memory
    pub fn silence(&mut self) {
        for voice in &mut self.voices {
            voice.active = false;
            voice.delayed = None;
        }
        self.pending.clear();
    }

    /// Queue an event for `channel` on the next tick
    pub fn inject(&mut self, channel: usize, event: Event) {
        self.pending.push((channel, event));
    }

    /// Process and render one tick
    ///
    /// `row_start` is true on the first tick of a freshly fetched row.
    pub fn play_tick(&mut self, module: &Module, seq: &Sequencer, row_start: bool, env: &MixEnv) {
        if row_start {
            self.process_row(module, seq, env.flags);
        } else {
            self.process_tick(module, seq.frame.min(u8::MAX as usize) as u8, env.flags);
        }

        for (channel, event) in std::mem::take(&mut self.pending) {
            if let Some(voice) = self.voices.get_mut(channel) {
                voice.event = event;
                trace!(channel, note = event.note, "injected event");
                self.apply_event(module, channel, &event, env.flags, true);
            }
        }

        let frames = samples_per_tick(self.rate, seq.tick_bpm());
        self.render(module, frames, env);
        self.advance_envelopes(module);
        encode(&self.mix, self.format, &mut self.scratch, &mut self.buffer);
    }

    /// Encoded audio of the last tick
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Bytes of the longest possible tick
    pub fn max_buffer_bytes(&self) -> usize {
        self.max_frames * self.format.frame_bytes()
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    /// Foreground voice of a pattern channel
    pub fn voice(&self, channel: usize) -> Option<&Voice> {
        self.voices[..self.channels].get(channel)
    }

    /// Total voices (pattern channels plus background voices)
    pub fn virtual_channels(&self) -> usize {
        self.voices.len()
    }

    /// Voices currently producing sound
    pub fn virtual_used(&self) -> usize {
        self.voices.iter().filter(|v| v.is_audible()).count()
    }

    pub fn global_volume(&self) -> f32 {
        self.global_volume
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }
}
