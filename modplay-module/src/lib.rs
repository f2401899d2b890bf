//! modplay-module: normalized tracker module representation
//!
//! Every supported file format is converted into a single [`Module`] model
//! that the playback engine consumes read-only. Format front-ends implement
//! [`FormatLoader`] and are dispatched by [`LoaderRegistry`], which sniffs the
//! input, optionally unpacks it through a [`Depacker`], and validates the
//! resulting module before handing it out.
//!
//! # Layout
//!
//! ```text
//! ┌──────────────┐   probe/load   ┌──────────────────────────────────┐
//! │  raw bytes   │ ─────────────▶ │ Module                           │
//! └──────────────┘                │  - orders: Vec<u8>               │
//!                                 │  - patterns: Vec<Pattern>  ──┐   │
//!                                 │  - tracks: Vec<Track>  ◀─────┘   │
//!                                 │  - instruments / samples         │
//!                                 └──────────────────────────────────┘
//! ```
//!
//! Patterns do not own their rows: each pattern holds one index per channel
//! into the module's track arena, and tracks hold the event rows.

mod effects;
mod instrument;
mod loader;
mod pattern;
mod protracker;
mod sample;

#[cfg(test)]
mod tests;

pub use effects::Effect;
pub use instrument::{
    AutoVibrato, DuplicateCheckAction, DuplicateCheckType, Envelope, EnvelopeFlags,
    EnvelopePoint, Instrument, KeyMapping, NewNoteAction, SubInstrument,
};
pub use loader::{Depacker, FormatLoader, LoadError, LoadOptions, LoaderRegistry, TestInfo};
pub use pattern::{Event, KEY_CUT, KEY_FADE, KEY_OFF, Pattern, Track};
pub use protracker::ProTrackerLoader;
pub use sample::{Sample, SampleData, SampleFlags};

/// Number of playable keys (C-0 to C-10)
pub const MAX_KEYS: usize = 121;

/// Maximum number of pattern channels in a module
pub const MAX_CHANNELS: usize = 64;

/// Maximum number of points in one envelope
pub const MAX_ENVELOPE_POINTS: usize = 32;

/// Maximum order list length
pub const MAX_ORDERS: usize = 256;

/// Order list marker: skip to the next entry
pub const ORDER_SKIP: u8 = 0xFE;

/// Order list marker: end of song
pub const ORDER_END: u8 = 0xFF;

/// Volume scale used by module, instrument and channel volumes
pub const VOLUME_BASE: u8 = 64;

/// Center pan position
pub const PAN_CENTER: u8 = 0x80;

// =============================================================================
// Module
// =============================================================================

/// A loaded tracker module, immutable once built
#[derive(Debug, Clone)]
pub struct Module {
    /// Module title
    pub name: String,
    /// Format description (e.g. "ProTracker M.K.")
    pub format: String,
    /// Pattern channel count (1-64)
    pub channels: usize,
    /// Initial speed (ticks per row)
    pub speed: u8,
    /// Initial tempo (BPM)
    pub bpm: u8,
    /// Order index playback returns to after the last order
    pub restart: usize,
    /// Initial global volume (0-64)
    pub global_volume: u8,
    /// Order list (pattern indices, or [`ORDER_SKIP`] / [`ORDER_END`])
    pub orders: Vec<u8>,
    /// Patterns referencing the track arena
    pub patterns: Vec<Pattern>,
    /// Track arena
    pub tracks: Vec<Track>,
    /// Per-channel defaults
    pub channel_settings: Vec<ChannelSettings>,
    /// Instruments
    pub instruments: Vec<Instrument>,
    /// Samples
    pub samples: Vec<Sample>,
    /// Playback quirks this module requires
    pub flags: PlayerFlags,
    /// Song message, if the format carries one
    pub comment: Option<String>,
}

impl Module {
    /// Create an empty module with the given channel count and defaults
    pub fn new(name: impl Into<String>, format: impl Into<String>, channels: usize) -> Self {
        Self {
            name: name.into(),
            format: format.into(),
            channels,
            speed: 6,
            bpm: 125,
            restart: 0,
            global_volume: VOLUME_BASE,
            orders: Vec::new(),
            patterns: Vec::new(),
            tracks: Vec::new(),
            channel_settings: vec![ChannelSettings::default(); channels],
            instruments: Vec::new(),
            samples: Vec::new(),
            flags: PlayerFlags::empty(),
            comment: None,
        }
    }

    /// Number of entries in the order list
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    /// Whether the order list is empty
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn num_patterns(&self) -> usize {
        self.patterns.len()
    }

    pub fn num_tracks(&self) -> usize {
        self.tracks.len()
    }

    pub fn num_instruments(&self) -> usize {
        self.instruments.len()
    }

    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    /// Get the pattern index at the given order position
    ///
    /// Returns `None` for marker entries and positions past the end.
    pub fn pattern_index_at(&self, order: usize) -> Option<usize> {
        let idx = *self.orders.get(order)?;
        if idx == ORDER_SKIP || idx == ORDER_END {
            return None;
        }
        Some(idx as usize)
    }

    /// Get the pattern at the given order position
    pub fn pattern_at(&self, order: usize) -> Option<&Pattern> {
        self.patterns.get(self.pattern_index_at(order)?)
    }

    /// Look up the event at a pattern position
    pub fn event(&self, pattern: usize, row: usize, channel: usize) -> Option<&Event> {
        let pattern = self.patterns.get(pattern)?;
        if row >= pattern.rows {
            return None;
        }
        let track = self.tracks.get(*pattern.tracks.get(channel)?)?;
        track.events.get(row)
    }

    /// Append a pattern built from per-channel event columns
    ///
    /// Each column becomes a new track in the arena. Returns the pattern index.
    pub fn push_pattern(&mut self, rows: usize, columns: Vec<Vec<Event>>) -> usize {
        let mut tracks = Vec::with_capacity(columns.len());
        for mut events in columns {
            events.resize(rows, Event::default());
            tracks.push(self.tracks.len());
            self.tracks.push(Track { events });
        }
        self.patterns.push(Pattern { rows, tracks });
        self.patterns.len() - 1
    }

    /// Check the structural invariants the engine relies on
    pub fn validate(&self) -> Result<(), LoadError> {
        let invalid = |reason: String| Err(LoadError::Format(reason));

        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return invalid(format!("channel count {} out of range", self.channels));
        }
        if self.orders.is_empty() || self.orders.len() > MAX_ORDERS {
            return invalid(format!("order list length {} out of range", self.orders.len()));
        }
        if self.channel_settings.len() != self.channels {
            return invalid("channel settings do not match channel count".into());
        }
        if self.restart >= self.orders.len() {
            return invalid(format!("restart position {} past order list", self.restart));
        }
        if self.speed == 0 || self.bpm == 0 {
            return invalid("initial speed or tempo is zero".into());
        }
        for (pos, &entry) in self.orders.iter().enumerate() {
            if entry != ORDER_SKIP && entry != ORDER_END && entry as usize >= self.patterns.len()
            {
                return invalid(format!("order {pos} references missing pattern {entry}"));
            }
        }
        if self.pattern_index_at_any().is_none() {
            return invalid("order list contains no playable pattern".into());
        }
        for (idx, pattern) in self.patterns.iter().enumerate() {
            if pattern.rows == 0 || pattern.rows > 256 {
                return invalid(format!("pattern {idx} has {} rows", pattern.rows));
            }
            if pattern.tracks.len() != self.channels {
                return invalid(format!("pattern {idx} has wrong track count"));
            }
            for &track in &pattern.tracks {
                match self.tracks.get(track) {
                    Some(t) if t.events.len() >= pattern.rows => {}
                    _ => return invalid(format!("pattern {idx} references bad track {track}")),
                }
            }
        }
        for (idx, instrument) in self.instruments.iter().enumerate() {
            for sub in &instrument.subs {
                if sub.sample >= self.samples.len() {
                    return invalid(format!("instrument {idx} references missing sample"));
                }
            }
            for key in &instrument.keys {
                if let Some(sub) = key.sub
                    && sub as usize >= instrument.subs.len()
                {
                    return invalid(format!("instrument {idx} key map references bad sub"));
                }
            }
        }
        for (idx, sample) in self.samples.iter().enumerate() {
            if !sample.data.is_empty() && sample.data.len() < sample.len {
                return invalid(format!("sample {idx} data shorter than its length"));
            }
        }
        Ok(())
    }

    fn pattern_index_at_any(&self) -> Option<usize> {
        (0..self.orders.len()).find_map(|order| self.pattern_index_at(order))
    }
}

// =============================================================================
// Channel settings
// =============================================================================

/// Default settings of one pattern channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSettings {
    /// Pan position (0 = left, 0x80 = center, 0xFF = right)
    pub pan: u8,
    /// Channel volume (0-64)
    pub volume: u8,
    /// Channel flags
    pub flags: ChannelFlags,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            pan: PAN_CENTER,
            volume: VOLUME_BASE,
            flags: ChannelFlags::empty(),
        }
    }
}

/// Channel flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelFlags(u8);

impl ChannelFlags {
    /// Channel is driven by a synthesizer
    pub const SYNTH: Self = Self(0x01);
    /// Channel starts muted
    pub const MUTE: Self = Self(0x02);
    /// Split channel (paired with a neighbour)
    pub const SPLIT: Self = Self(0x04);
    /// Surround: right output is phase-inverted
    pub const SURROUND: Self = Self(0x10);

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

impl std::ops::BitOr for ChannelFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

// =============================================================================
// Player flags
// =============================================================================

/// Playback quirk flags
///
/// Used both for the user-selected player flags and for the quirks a module
/// declares; the engine honours the union of the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlayerFlags(u32);

impl PlayerFlags {
    /// Ticks run at a fixed 50 Hz, tempo commands set speed
    pub const VBLANK: Self = Self(0x01);
    /// ProTracker 2 sample offset bug (offset applied twice)
    pub const FX9BUG: Self = Self(0x02);
    /// Loop start is stored in bytes and must be halved
    pub const FIXLOOP: Self = Self(0x04);
    /// All defined bits
    pub const ALL: Self = Self(0x07);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl std::ops::BitOr for PlayerFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}
