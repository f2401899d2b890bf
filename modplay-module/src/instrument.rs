//! Instrument data structures and envelopes

use crate::MAX_KEYS;

/// Tracker instrument
///
/// An instrument maps each of the 121 keys to one of its sub-instruments. A
/// sub-instrument names the sample to play and carries the per-sample
/// playback parameters (pan, finetune, vibrato, NNA, filter).
#[derive(Debug, Clone)]
pub struct Instrument {
    /// Instrument name
    pub name: String,
    /// Default volume (0-64)
    pub volume: u8,
    /// Fadeout speed subtracted per tick after release (0-65535 scale)
    pub fadeout: u16,
    /// Amplitude envelope
    pub volume_envelope: Option<Envelope>,
    /// Pan envelope (center 32)
    pub pan_envelope: Option<Envelope>,
    /// Frequency envelope, or filter envelope when flagged `FILTER`
    pub pitch_envelope: Option<Envelope>,
    /// Key map (one entry per key)
    pub keys: [KeyMapping; MAX_KEYS],
    /// Sub-instruments
    pub subs: Vec<SubInstrument>,
}

impl Default for Instrument {
    fn default() -> Self {
        Self {
            name: String::new(),
            volume: 64,
            fadeout: 0,
            volume_envelope: None,
            pan_envelope: None,
            pitch_envelope: None,
            keys: [KeyMapping::default(); MAX_KEYS],
            subs: Vec::new(),
        }
    }
}

impl Instrument {
    /// Single-sample instrument where every key plays `sample`
    pub fn with_sample(name: impl Into<String>, sample: usize, volume: u8) -> Self {
        Self {
            name: name.into(),
            volume,
            keys: [KeyMapping {
                sub: Some(0),
                transpose: 0,
            }; MAX_KEYS],
            subs: vec![SubInstrument {
                sample,
                volume,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    /// Number of sub-instruments
    pub fn num_subs(&self) -> usize {
        self.subs.len()
    }

    /// Resolve the sub-instrument and key transpose for a key
    pub fn mapping(&self, key: u8) -> Option<(&SubInstrument, i8)> {
        let map = self.keys.get(key as usize)?;
        let sub = self.subs.get(map.sub? as usize)?;
        Some((sub, map.transpose))
    }

    /// Get the sample number for a given key
    pub fn sample_for_key(&self, key: u8) -> Option<usize> {
        self.mapping(key).map(|(sub, _)| sub.sample)
    }
}

/// One key map entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyMapping {
    /// Sub-instrument index, `None` if the key is silent
    pub sub: Option<u8>,
    /// Semitones added to the played key
    pub transpose: i8,
}

/// Per-sample parameters of an instrument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubInstrument {
    /// Sample index in the module
    pub sample: usize,
    /// Default volume (0-64)
    pub volume: u8,
    /// Global volume (0-64)
    pub global_volume: u8,
    /// Default pan (0-255), `None` keeps the channel pan
    pub pan: Option<u8>,
    /// Semitone transpose
    pub transpose: i8,
    /// Finetune (1/128 semitone)
    pub finetune: i8,
    /// Automatic vibrato
    pub vibrato: AutoVibrato,
    /// New Note Action
    pub nna: NewNoteAction,
    /// Duplicate Check Type
    pub dct: DuplicateCheckType,
    /// Duplicate Check Action
    pub dca: DuplicateCheckAction,
    /// Initial filter cutoff (0-127)
    pub filter_cutoff: Option<u8>,
    /// Initial filter resonance (0-127)
    pub filter_resonance: Option<u8>,
}

impl Default for SubInstrument {
    fn default() -> Self {
        Self {
            sample: 0,
            volume: 64,
            global_volume: 64,
            pan: None,
            transpose: 0,
            finetune: 0,
            vibrato: AutoVibrato::default(),
            nna: NewNoteAction::Cut,
            dct: DuplicateCheckType::Off,
            dca: DuplicateCheckAction::Cut,
            filter_cutoff: None,
            filter_resonance: None,
        }
    }
}

/// Instrument auto-vibrato settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutoVibrato {
    /// Waveform (0=sine, 1=ramp down, 2=square, 3=random)
    pub waveform: u8,
    /// Depth
    pub depth: u8,
    /// Rate (position step per tick)
    pub rate: u8,
    /// Ticks to reach full depth
    pub sweep: u8,
}

/// New Note Action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum NewNoteAction {
    /// Cut the previous note immediately
    #[default]
    Cut = 0,
    /// Continue playing in background
    Continue = 1,
    /// Release the previous note
    NoteOff = 2,
    /// Fade out the previous note
    NoteFade = 3,
}

/// Duplicate Check Type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DuplicateCheckType {
    /// No duplicate checking
    #[default]
    Off = 0,
    /// Check for same note
    Note = 1,
    /// Check for same sample
    Sample = 2,
    /// Check for same instrument
    Instrument = 3,
}

/// Duplicate Check Action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DuplicateCheckAction {
    /// Cut the duplicate note
    #[default]
    Cut = 0,
    /// Release the duplicate note
    NoteOff = 1,
    /// Fade out the duplicate note
    NoteFade = 2,
}

/// One envelope node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopePoint {
    pub tick: u16,
    pub value: i16,
}

/// Instrument envelope
///
/// Value range depends on the envelope:
/// - Volume: 0-64
/// - Pan: 0-64, center 32
/// - Pitch: -32 to +32 half-semitones
/// - Filter: 0-64, scaling the cutoff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub points: Vec<EnvelopePoint>,
    /// Sustain point index (sustain loop start when `SUSTAIN_LOOP`)
    pub sustain_start: usize,
    /// Sustain loop end point index
    pub sustain_end: usize,
    /// Loop start point index
    pub loop_start: usize,
    /// Loop end point index
    pub loop_end: usize,
    pub flags: EnvelopeFlags,
}

impl Default for Envelope {
    fn default() -> Self {
        Self {
            points: vec![
                EnvelopePoint { tick: 0, value: 64 },
                EnvelopePoint {
                    tick: 100,
                    value: 64,
                },
            ],
            sustain_start: 0,
            sustain_end: 0,
            loop_start: 0,
            loop_end: 0,
            flags: EnvelopeFlags::ON,
        }
    }
}

impl Envelope {
    pub fn is_enabled(&self) -> bool {
        self.flags.contains(EnvelopeFlags::ON) && !self.points.is_empty()
    }

    pub fn has_loop(&self) -> bool {
        self.flags.contains(EnvelopeFlags::LOOP)
    }

    pub fn has_sustain(&self) -> bool {
        self.flags.contains(EnvelopeFlags::SUSTAIN)
    }

    pub fn has_sustain_loop(&self) -> bool {
        self.flags.contains(EnvelopeFlags::SUSTAIN_LOOP)
    }

    /// Check if this frequency envelope drives the filter instead
    pub fn is_filter(&self) -> bool {
        self.flags.contains(EnvelopeFlags::FILTER)
    }

    /// Check if position carries over to the next note
    pub fn carries(&self) -> bool {
        self.flags.contains(EnvelopeFlags::CARRY)
    }

    fn tick_of(&self, point: usize) -> Option<u16> {
        self.points.get(point).map(|p| p.tick)
    }

    /// Tick of the last node
    pub fn end_tick(&self) -> u16 {
        self.points.last().map(|p| p.tick).unwrap_or(0)
    }

    /// Get interpolated value at a given tick
    pub fn value_at(&self, tick: u16) -> i16 {
        let Some(last) = self.points.last() else {
            return 64;
        };

        for pair in self.points.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if tick >= a.tick && tick < b.tick {
                let dx = (b.tick - a.tick) as i32;
                let dy = b.value as i32 - a.value as i32;
                let t = (tick - a.tick) as i32;
                return (a.value as i32 + dy * t / dx) as i16;
            }
        }

        if tick < self.points[0].tick {
            return self.points[0].value;
        }
        last.value
    }

    /// Position after one more tick
    ///
    /// Holds at the sustain point (or cycles the sustain loop) until the key
    /// is released, then honours the regular loop.
    pub fn advance(&self, pos: u16, released: bool) -> u16 {
        if !self.is_enabled() {
            return pos;
        }

        if self.has_sustain() && !released {
            if self.has_sustain_loop() {
                if let (Some(start), Some(end)) =
                    (self.tick_of(self.sustain_start), self.tick_of(self.sustain_end))
                    && pos >= end
                {
                    return start;
                }
            } else if let Some(sus) = self.tick_of(self.sustain_start)
                && pos >= sus
            {
                return sus;
            }
        }

        if self.has_loop()
            && let (Some(start), Some(end)) =
                (self.tick_of(self.loop_start), self.tick_of(self.loop_end))
            && pos >= end
        {
            return start;
        }

        pos.saturating_add(1).min(self.end_tick().saturating_add(1))
    }

    /// Check if playback ran past the last node with no loop to return to
    pub fn finished(&self, pos: u16) -> bool {
        pos > self.end_tick()
    }
}

/// Envelope flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnvelopeFlags(u8);

impl EnvelopeFlags {
    pub const ON: Self = Self(0x01);
    pub const SUSTAIN: Self = Self(0x02);
    pub const LOOP: Self = Self(0x04);
    pub const FILTER: Self = Self(0x08);
    pub const SUSTAIN_LOOP: Self = Self(0x10);
    pub const CARRY: Self = Self(0x20);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u8 {
        self.0
    }

    pub const fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for EnvelopeFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}
