//! Pattern, track and event data structures

use crate::effects::Effect;

/// Note value: release the key (envelopes leave sustain)
pub const KEY_OFF: u8 = 0x81;
/// Note value: cut the note immediately
pub const KEY_CUT: u8 = 0x82;
/// Note value: start fading the note out
pub const KEY_FADE: u8 = 0x83;

/// Tracker pattern
///
/// A pattern owns no events; `tracks[channel]` indexes the module's track arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    /// Number of rows (1-256)
    pub rows: usize,
    /// Track index per channel
    pub tracks: Vec<usize>,
}

/// One channel column of events
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Track {
    pub events: Vec<Event>,
}

/// Single event in a track row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Event {
    /// Note value (0 = none, 1-121 = key 0-120, or KEY_OFF/KEY_CUT/KEY_FADE)
    pub note: u8,
    /// Instrument number (1-based, 0 = none)
    pub instrument: u8,
    /// Volume column (0 = none, otherwise volume + 1)
    pub volume: u8,
    /// First effect column
    pub effect: Effect,
    /// Second effect column
    pub effect2: Effect,
}

impl Event {
    /// Highest valid note value
    pub const NOTE_MAX: u8 = 121;

    /// Build an event from raw effect type/parameter bytes
    ///
    /// Effect numbering follows ProTracker (0x0-0xF) plus the extended codes
    /// understood by [`Effect::from_raw`].
    pub fn from_raw(note: u8, instrument: u8, volume: u8, fxt: u8, fxp: u8, f2t: u8, f2p: u8) -> Self {
        Self {
            note,
            instrument,
            volume,
            effect: Effect::from_raw(fxt, fxp),
            effect2: Effect::from_raw(f2t, f2p),
        }
    }

    /// Event that plays `key` with `instrument` (both 0-based)
    pub fn note_on(key: u8, instrument: u8) -> Self {
        Self {
            note: key + 1,
            instrument: instrument + 1,
            ..Default::default()
        }
    }

    /// Check if this has a playable note
    pub fn has_note(&self) -> bool {
        self.note > 0 && self.note <= Self::NOTE_MAX
    }

    /// The 0-based key, if this event plays one
    pub fn key(&self) -> Option<u8> {
        self.has_note().then(|| self.note - 1)
    }

    pub fn is_key_off(&self) -> bool {
        self.note == KEY_OFF
    }

    pub fn is_key_cut(&self) -> bool {
        self.note == KEY_CUT
    }

    pub fn is_key_fade(&self) -> bool {
        self.note == KEY_FADE
    }

    /// Check if this has an instrument
    pub fn has_instrument(&self) -> bool {
        self.instrument > 0
    }

    /// Volume column value (0-64), if set
    pub fn volume(&self) -> Option<u8> {
        (self.volume > 0).then(|| (self.volume - 1).min(64))
    }

    /// Both effect columns
    pub fn effects(&self) -> [Effect; 2] {
        [self.effect, self.effect2]
    }

    /// Check if any effect column is set
    pub fn has_effect(&self) -> bool {
        self.effects().iter().any(|e| !matches!(e, Effect::None))
    }

    /// Check if nothing at all is set
    pub fn is_empty(&self) -> bool {
        self.note == 0 && self.instrument == 0 && self.volume == 0 && !self.has_effect()
    }
}
