//! Sample data structures

/// Tracker sample
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Sample name
    pub name: String,
    /// Length in frames
    pub len: usize,
    /// Loop start (frames)
    pub loop_start: usize,
    /// Loop end (frames, exclusive)
    pub loop_end: usize,
    pub flags: SampleFlags,
    /// PCM payload, empty when sample loading was skipped
    pub data: SampleData,
}

impl Default for Sample {
    fn default() -> Self {
        Self {
            name: String::new(),
            len: 0,
            loop_start: 0,
            loop_end: 0,
            flags: SampleFlags::empty(),
            data: SampleData::Empty,
        }
    }
}

impl Sample {
    /// 8-bit sample from signed PCM
    pub fn from_i8(name: impl Into<String>, data: Vec<i8>) -> Self {
        Self {
            name: name.into(),
            len: data.len(),
            data: SampleData::Bits8(data),
            ..Default::default()
        }
    }

    /// 16-bit sample from signed PCM
    pub fn from_i16(name: impl Into<String>, data: Vec<i16>) -> Self {
        Self {
            name: name.into(),
            len: data.len(),
            flags: SampleFlags::BITS16,
            data: SampleData::Bits16(data),
            ..Default::default()
        }
    }

    /// Set a forward loop over `start..end`
    pub fn looped(mut self, start: usize, end: usize) -> Self {
        self.loop_start = start;
        self.loop_end = end;
        self.flags = self.flags | SampleFlags::LOOP;
        self
    }

    /// Check if the sample loops over a non-empty range
    pub fn has_loop(&self) -> bool {
        self.flags.contains(SampleFlags::LOOP) && self.loop_end > self.loop_start
    }

    pub fn is_16bit(&self) -> bool {
        self.flags.contains(SampleFlags::BITS16)
    }

    /// Check if the sample is a synth patch rather than PCM
    pub fn is_synth(&self) -> bool {
        self.flags.contains(SampleFlags::SYNTH)
    }

    /// Frame value normalized to -1.0..1.0 (0.0 outside the payload)
    #[inline]
    pub fn frame(&self, index: usize) -> f32 {
        self.data.get(index)
    }
}

/// Sample PCM payload
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SampleData {
    #[default]
    Empty,
    Bits8(Vec<i8>),
    Bits16(Vec<i16>),
}

impl SampleData {
    pub fn len(&self) -> usize {
        match self {
            SampleData::Empty => 0,
            SampleData::Bits8(d) => d.len(),
            SampleData::Bits16(d) => d.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Normalized frame value, 0.0 when out of range
    #[inline]
    pub fn get(&self, index: usize) -> f32 {
        match self {
            SampleData::Empty => 0.0,
            SampleData::Bits8(d) => d.get(index).map_or(0.0, |&v| v as f32 / 128.0),
            SampleData::Bits16(d) => d.get(index).map_or(0.0, |&v| v as f32 / 32768.0),
        }
    }
}

/// Sample flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SampleFlags(u16);

impl SampleFlags {
    /// 16-bit payload
    pub const BITS16: Self = Self(0x0001);
    /// Loop enabled
    pub const LOOP: Self = Self(0x0002);
    /// Bidirectional (ping-pong) loop
    pub const BIDIR: Self = Self(0x0004);
    /// Run the loop backwards once the attack reaches the loop end
    pub const REVERSE: Self = Self(0x0008);
    /// Play the whole sample once before entering the loop
    pub const FULL: Self = Self(0x0010);
    /// Synth patch, no PCM data
    pub const SYNTH: Self = Self(0x8000);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u16 {
        self.0
    }

    pub const fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for SampleFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}
