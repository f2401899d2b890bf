//! Tracker effect model
//!
//! Raw effect bytes are decoded once at load time into [`Effect`]. Numbering
//! follows ProTracker for 0x0-0xF (with 0xE split into its sub-commands) and
//! adds a few extended codes used by richer formats.

/// Decoded tracker effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Effect {
    /// No effect
    #[default]
    None,

    // =========================================================================
    // Speed and Tempo
    // =========================================================================
    /// Set speed (ticks per row)
    /// Fxx with xx < 0x20
    SetSpeed(u8),

    /// Set tempo (BPM)
    /// Fxx with xx >= 0x20
    SetTempo(u8),

    // =========================================================================
    // Pattern Flow Control
    // =========================================================================
    /// Jump to order position
    /// Bxx
    PositionJump(u8),

    /// Break to row in next pattern (row already decoded from BCD)
    /// Dxx
    PatternBreak(u8),

    /// Pattern loop (0 sets the loop start)
    /// E6x
    PatternLoop(u8),

    /// Repeat the current row x more times
    /// EEx
    PatternDelay(u8),

    // =========================================================================
    // Volume Effects
    // =========================================================================
    /// Set volume (0-64)
    /// Cxx
    SetVolume(u8),

    /// Volume slide, high nibble up, low nibble down
    /// Axy
    VolumeSlide(u8),

    /// Fine volume slide up
    /// EAx
    FineVolumeUp(u8),

    /// Fine volume slide down
    /// EBx
    FineVolumeDown(u8),

    /// Set global volume (0-64)
    /// extended 0x10
    SetGlobalVolume(u8),

    /// Global volume slide, high nibble up, low nibble down
    /// extended 0x11
    GlobalVolumeSlide(u8),

    // =========================================================================
    // Pitch Effects
    // =========================================================================
    /// Portamento up
    /// 1xx
    PortaUp(u8),

    /// Portamento down
    /// 2xx
    PortaDown(u8),

    /// Fine portamento up
    /// E1x
    FinePortaUp(u8),

    /// Fine portamento down
    /// E2x
    FinePortaDown(u8),

    /// Tone portamento (slide to note)
    /// 3xx
    TonePorta(u8),

    /// Tone portamento + volume slide
    /// 5xy
    TonePortaVolSlide(u8),

    /// Set finetune (-8..7 in 1/8 semitones)
    /// E5x
    SetFinetune(i8),

    // =========================================================================
    // Modulation Effects
    // =========================================================================
    /// Arpeggio
    /// 0xy
    Arpeggio { x: u8, y: u8 },

    /// Vibrato
    /// 4xy
    Vibrato { speed: u8, depth: u8 },

    /// Vibrato + volume slide
    /// 6xy
    VibratoVolSlide(u8),

    /// Tremolo
    /// 7xy
    Tremolo { speed: u8, depth: u8 },

    /// Vibrato waveform
    /// E4x
    VibratoWaveform(u8),

    /// Tremolo waveform
    /// E7x
    TremoloWaveform(u8),

    // =========================================================================
    // Panning Effects
    // =========================================================================
    /// Set pan (0-255)
    /// 8xx, E8x (coarse)
    SetPan(u8),

    /// Pan slide, high nibble right, low nibble left
    /// extended 0x19
    PanSlide(u8),

    /// Surround on/off
    /// extended 0x84
    Surround(bool),

    // =========================================================================
    // Sample and Note Effects
    // =========================================================================
    /// Sample offset in units of 256 frames
    /// 9xx
    SampleOffset(u8),

    /// Retrigger every x ticks
    /// E9x
    Retrigger(u8),

    /// Cut note after x ticks
    /// ECx
    NoteCut(u8),

    /// Delay note by x ticks
    /// EDx
    NoteDelay(u8),

    /// Release the key after x ticks
    /// extended 0x14
    KeyOff(u8),

    /// Set envelope position
    /// extended 0x15
    SetEnvelopePosition(u8),

    // =========================================================================
    // Filter Effects
    // =========================================================================
    /// Set filter cutoff (0-127)
    /// extended 0x85
    FilterCutoff(u8),

    /// Set filter resonance (0-127)
    /// extended 0x86
    FilterResonance(u8),
}

impl Effect {
    /// Decode a raw effect type/parameter pair
    ///
    /// Unknown effect types decode to [`Effect::None`].
    pub fn from_raw(fxt: u8, fxp: u8) -> Self {
        let hi = fxp >> 4;
        let lo = fxp & 0x0F;
        match fxt {
            0x0 if fxp == 0 => Effect::None,
            0x0 => Effect::Arpeggio { x: hi, y: lo },
            0x1 => Effect::PortaUp(fxp),
            0x2 => Effect::PortaDown(fxp),
            0x3 => Effect::TonePorta(fxp),
            0x4 => Effect::Vibrato {
                speed: hi,
                depth: lo,
            },
            0x5 => Effect::TonePortaVolSlide(fxp),
            0x6 => Effect::VibratoVolSlide(fxp),
            0x7 => Effect::Tremolo {
                speed: hi,
                depth: lo,
            },
            0x8 => Effect::SetPan(fxp),
            0x9 => Effect::SampleOffset(fxp),
            0xA => Effect::VolumeSlide(fxp),
            0xB => Effect::PositionJump(fxp),
            0xC => Effect::SetVolume(fxp.min(64)),
            0xD => Effect::PatternBreak(hi * 10 + lo),
            0xE => Self::from_extended(hi, lo),
            0xF if fxp < 0x20 => Effect::SetSpeed(fxp),
            0xF => Effect::SetTempo(fxp),
            0x10 => Effect::SetGlobalVolume(fxp.min(64)),
            0x11 => Effect::GlobalVolumeSlide(fxp),
            0x14 => Effect::KeyOff(fxp),
            0x15 => Effect::SetEnvelopePosition(fxp),
            0x19 => Effect::PanSlide(fxp),
            0x84 => Effect::Surround(fxp != 0),
            0x85 => Effect::FilterCutoff(fxp.min(127)),
            0x86 => Effect::FilterResonance(fxp.min(127)),
            _ => Effect::None,
        }
    }

    fn from_extended(cmd: u8, x: u8) -> Self {
        match cmd {
            0x1 => Effect::FinePortaUp(x),
            0x2 => Effect::FinePortaDown(x),
            0x4 => Effect::VibratoWaveform(x),
            0x5 => Effect::SetFinetune(((x << 4) as i8) >> 4),
            0x6 => Effect::PatternLoop(x),
            0x7 => Effect::TremoloWaveform(x),
            0x8 => Effect::SetPan(x * 17),
            0x9 => Effect::Retrigger(x),
            0xA => Effect::FineVolumeUp(x),
            0xB => Effect::FineVolumeDown(x),
            0xC => Effect::NoteCut(x),
            0xD => Effect::NoteDelay(x),
            0xE => Effect::PatternDelay(x),
            _ => Effect::None,
        }
    }

    /// Check if this effect changes the playback cursor or tick timing
    pub fn affects_timing(&self) -> bool {
        matches!(
            self,
            Effect::SetSpeed(_)
                | Effect::SetTempo(_)
                | Effect::PositionJump(_)
                | Effect::PatternBreak(_)
                | Effect::PatternLoop(_)
                | Effect::PatternDelay(_)
        )
    }

    /// Check if this effect modulates pitch
    pub fn affects_pitch(&self) -> bool {
        matches!(
            self,
            Effect::PortaUp(_)
                | Effect::PortaDown(_)
                | Effect::FinePortaUp(_)
                | Effect::FinePortaDown(_)
                | Effect::TonePorta(_)
                | Effect::TonePortaVolSlide(_)
                | Effect::Vibrato { .. }
                | Effect::VibratoVolSlide(_)
                | Effect::Arpeggio { .. }
        )
    }

    /// Check if this is a tone portamento, which slides instead of retriggering
    pub fn is_tone_porta(&self) -> bool {
        matches!(self, Effect::TonePorta(_) | Effect::TonePortaVolSlide(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_tempo_split() {
        assert_eq!(Effect::from_raw(0xF, 0x06), Effect::SetSpeed(6));
        assert_eq!(Effect::from_raw(0xF, 0x1F), Effect::SetSpeed(0x1F));
        assert_eq!(Effect::from_raw(0xF, 0x20), Effect::SetTempo(0x20));
        assert_eq!(Effect::from_raw(0xF, 0x7D), Effect::SetTempo(125));
    }

    #[test]
    fn test_pattern_break_is_bcd() {
        assert_eq!(Effect::from_raw(0xD, 0x00), Effect::PatternBreak(0));
        assert_eq!(Effect::from_raw(0xD, 0x16), Effect::PatternBreak(16));
        assert_eq!(Effect::from_raw(0xD, 0x32), Effect::PatternBreak(32));
    }

    #[test]
    fn test_extended_commands() {
        assert_eq!(Effect::from_raw(0xE, 0x60), Effect::PatternLoop(0));
        assert_eq!(Effect::from_raw(0xE, 0x63), Effect::PatternLoop(3));
        assert_eq!(Effect::from_raw(0xE, 0xE2), Effect::PatternDelay(2));
        assert_eq!(Effect::from_raw(0xE, 0xC3), Effect::NoteCut(3));
        assert_eq!(Effect::from_raw(0xE, 0x5F), Effect::SetFinetune(-1));
        assert_eq!(Effect::from_raw(0xE, 0x57), Effect::SetFinetune(7));
        assert_eq!(Effect::from_raw(0xE, 0x8F), Effect::SetPan(255));
    }

    #[test]
    fn test_zero_arpeggio_is_none() {
        assert_eq!(Effect::from_raw(0x0, 0x00), Effect::None);
        assert_eq!(Effect::from_raw(0x0, 0x37), Effect::Arpeggio { x: 3, y: 7 });
    }

    #[test]
    fn test_volume_is_clamped() {
        assert_eq!(Effect::from_raw(0xC, 0x50), Effect::SetVolume(64));
        assert_eq!(Effect::from_raw(0x10, 0xFF), Effect::SetGlobalVolume(64));
    }

    #[test]
    fn test_categories() {
        assert!(Effect::SetSpeed(3).affects_timing());
        assert!(Effect::PatternLoop(1).affects_timing());
        assert!(!Effect::SetVolume(3).affects_timing());
        assert!(Effect::Vibrato { speed: 1, depth: 1 }.affects_pitch());
        assert!(Effect::TonePortaVolSlide(4).is_tone_porta());
        assert!(!Effect::PortaUp(4).is_tone_porta());
    }

    #[test]
    fn test_unknown_effect_is_none() {
        assert_eq!(Effect::from_raw(0x42, 0x10), Effect::None);
        assert_eq!(Effect::from_raw(0xE, 0xF1), Effect::None);
    }
}
