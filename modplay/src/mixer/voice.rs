//! Voice state
//!
//! A voice renders one sounding note. Voices `0..channels` follow the pattern
//! channels one to one; the rest are background voices holding notes that a
//! new-note action moved off their channel.

mod filter;
mod nna;


use modplay_module::{
    AutoVibrato, DuplicateCheckAction, DuplicateCheckType, Envelope, Event, Instrument,
    NewNoteAction, SubInstrument,
};

use crate::utils::note_to_period;

/// Fadeout value of a voice that has not started fading
pub(crate) const FADEOUT_MAX: u16 = 65535;

/// Fadeout rate used when a fade is requested but the instrument has none
pub(crate) const DEFAULT_FADE_RATE: u16 = 1024;

/// Per-voice playback state
#[derive(Clone, Default, Debug)]
pub(crate) struct Voice {
    // Sample playback
    /// Voice is producing (or may produce) sound
    pub active: bool,
    /// Sample index in the module
    pub sample: Option<usize>,
    /// Fractional frame position
    pub pos: f64,
    /// Playback direction for bidirectional and reverse loops (1 or -1)
    pub direction: i8,
    /// Full-loop samples: first pass done, looping region engaged
    pub in_loop: bool,

    // Ownership
    /// Pattern channel this voice plays for (parent channel for background voices)
    pub channel: usize,
    pub is_background: bool,
    /// Started by an injected event
    pub injected: bool,

    // Note
    pub instrument: Option<usize>,
    pub key: Option<u8>,
    /// Period of the played key with transpose and finetune, before slides
    pub note_period: f32,

    // Volume
    /// Note volume (0.0-1.0)
    pub volume: f32,
    /// Tremolo offset added to `volume`
    pub tremolo_delta: f32,
    /// Sub-instrument global volume (0.0-1.0)
    pub sub_volume: f32,
    /// Channel default volume (0.0-1.0)
    pub channel_volume: f32,
    /// Fadeout value (0-65535)
    pub fadeout: u16,
    /// Subtracted from `fadeout` per tick once released
    pub fadeout_rate: u16,
    /// Key released, envelopes leave sustain
    pub key_off: bool,
    pub volume_env_pos: u16,
    pub pan_env_pos: u16,
    pub pitch_env_pos: u16,

    // Panning
    /// -1.0 (left) to 1.0 (right)
    pub panning: f32,
    pub surround: bool,

    // Pitch
    /// Current period including slides
    pub period: f32,
    /// Tone portamento target
    pub target_period: f32,
    pub porta_speed: u8,
    /// Finetune in 1/128 semitone
    pub finetune: i8,
    /// Vibrato offset added to `period`
    pub vibrato_delta: f32,
    /// Arpeggio semitones for the current tick
    pub arpeggio_offset: u8,
    pub arpeggio: (u8, u8),

    // Vibrato / tremolo
    pub vibrato_pos: u8,
    pub vibrato_speed: u8,
    pub vibrato_depth: u8,
    pub vibrato_waveform: u8,
    pub tremolo_pos: u8,
    pub tremolo_speed: u8,
    pub tremolo_depth: u8,
    pub tremolo_waveform: u8,

    // Instrument auto-vibrato
    pub auto_vibrato: AutoVibrato,
    pub auto_vibrato_pos: u8,
    pub auto_vibrato_ticks: u16,

    // Effect memory
    pub last_porta_up: u8,
    pub last_porta_down: u8,
    pub last_volume_slide: u8,
    pub last_sample_offset: u8,
    pub last_pan_slide: u8,

    // Per-row effect activity (reset at row start)
    pub volume_slide_active: bool,
    pub porta_up_active: bool,
    pub porta_down_active: bool,
    pub tone_porta_active: bool,
    pub vibrato_active: bool,
    pub tremolo_active: bool,
    pub arpeggio_active: bool,
    pub pan_slide_active: bool,
    pub note_cut_tick: u8,
    pub key_off_tick: u8,
    pub retrigger_tick: u8,
    /// Event waiting for its note delay tick
    pub delayed: Option<(u8, Event)>,

    // New note action
    pub nna: NewNoteAction,
    pub dct: DuplicateCheckType,
    pub dca: DuplicateCheckAction,

    // Resonant lowpass
    /// Cutoff (0.0-1.0, 1.0 = open)
    pub filter_cutoff: f32,
    /// Filter envelope scale applied to the cutoff
    pub filter_env: f32,
    /// Resonance (0.0-1.0)
    pub filter_resonance: f32,
    pub filter_a1: f32,
    pub filter_a2: f32,
    pub filter_b0: f32,
    pub filter_b1: f32,
    pub filter_b2: f32,
    pub filter_z1: f32,
    pub filter_z2: f32,
    pub filter_dirty: bool,
    /// Output rate the coefficients were computed for
    pub filter_rate: u32,

    // Snapshot data
    /// Last event applied to the channel
    pub event: Event,
    /// Final linear gain of the last rendered tick
    pub final_volume: f32,
    /// Final pan of the last rendered tick
    pub final_pan: f32,
}

impl Voice {
    /// Idle foreground voice for a pattern channel
    pub fn new(channel: usize) -> Self {
        Self {
            channel,
            direction: 1,
            fadeout: FADEOUT_MAX,
            sub_volume: 1.0,
            channel_volume: 1.0,
            filter_cutoff: 1.0,
            filter_env: 1.0,
            filter_b0: 1.0,
            ..Default::default()
        }
    }

    /// Idle background voice
    pub fn background() -> Self {
        Self {
            is_background: true,
            ..Self::new(0)
        }
    }

    /// Start a note
    ///
    /// `key` is the played key before transposition. Channel-level state
    /// (volume, pan, effect memory) is left alone.
    pub fn trigger(
        &mut self,
        key: u8,
        instrument_idx: usize,
        instrument: &Instrument,
        sub: &SubInstrument,
        transpose: i8,
    ) {
        self.active = true;
        self.sample = Some(sub.sample);
        self.pos = 0.0;
        self.direction = 1;
        self.in_loop = false;

        self.instrument = Some(instrument_idx);
        self.key = Some(key);

        let effective = key as i16 + transpose as i16 + sub.transpose as i16;
        self.finetune = sub.finetune;
        self.note_period = note_to_period(effective, sub.finetune);
        self.period = self.note_period;
        self.target_period = self.note_period;
        self.vibrato_delta = 0.0;
        self.arpeggio_offset = 0;

        self.key_off = false;
        self.fadeout = FADEOUT_MAX;
        self.fadeout_rate = instrument.fadeout;
        self.sub_volume = sub.global_volume.min(64) as f32 / 64.0;

        let carries = |env: &Option<Envelope>| env.as_ref().is_some_and(|e| e.carries());
        if !carries(&instrument.volume_envelope) {
            self.volume_env_pos = 0;
        }
        if !carries(&instrument.pan_envelope) {
            self.pan_env_pos = 0;
        }
        if !carries(&instrument.pitch_envelope) {
            self.pitch_env_pos = 0;
        }

        // Waveforms with bit 2 set keep their phase across notes
        if self.vibrato_waveform < 4 {
            self.vibrato_pos = 0;
        }
        if self.tremolo_waveform < 4 {
            self.tremolo_pos = 0;
        }
        self.tremolo_delta = 0.0;

        self.auto_vibrato = sub.vibrato;
        self.auto_vibrato_pos = 0;
        self.auto_vibrato_ticks = 0;

        self.nna = sub.nna;
        self.dct = sub.dct;
        self.dca = sub.dca;

        self.filter_cutoff = sub.filter_cutoff.map_or(1.0, |c| c.min(127) as f32 / 127.0);
        self.filter_resonance = sub.filter_resonance.map_or(0.0, |r| r.min(127) as f32 / 127.0);
        self.filter_env = 1.0;
        self.filter_z1 = 0.0;
        self.filter_z2 = 0.0;
        self.filter_dirty = true;
    }

    /// Stop producing sound
    pub fn cut(&mut self) {
        self.active = false;
        self.volume = 0.0;
    }

    /// Release the key, fading with the default rate when the instrument has none
    pub fn fade(&mut self) {
        self.key_off = true;
        if self.fadeout_rate == 0 {
            self.fadeout_rate = DEFAULT_FADE_RATE;
        }
    }

    /// Clear per-row effect state (called at the start of each row)
    ///
    /// Effect memory persists; the effects themselves only run on rows that
    /// carry them.
    pub fn reset_row_effects(&mut self) {
        self.volume_slide_active = false;
        self.porta_up_active = false;
        self.porta_down_active = false;
        self.tone_porta_active = false;
        self.vibrato_active = false;
        self.tremolo_active = false;
        self.arpeggio_active = false;
        self.pan_slide_active = false;

        self.note_cut_tick = 0;
        self.key_off_tick = 0;
        self.retrigger_tick = 0;
        self.delayed = None;

        self.vibrato_delta = 0.0;
        self.tremolo_delta = 0.0;
        self.arpeggio_offset = 0;
    }
}
