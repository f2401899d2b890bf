//! Effect processing
//!
//! Tick 0 stores parameters (with effect memory) and applies the one-shot
//! effects. Later ticks run the continuous effects that the row enabled.

use modplay_module::{Effect, Module, PlayerFlags};

use super::Mixer;
use super::voice::Voice;
use crate::utils::{PERIOD_SEMITONE, get_waveform_value, pan_to_f32};

/// Longest period a downward slide can reach
const MAX_PERIOD: f32 = 32000.0;

impl Mixer {
    /// Apply one effect on the first tick of a row
    ///
    /// `triggered` is true if the event started a new note.
    pub(super) fn apply_tick0_effect(
        &mut self,
        module: &Module,
        ch: usize,
        effect: Effect,
        triggered: bool,
        flags: PlayerFlags,
    ) {
        let voice = &mut self.voices[ch];

        match effect {
            // Volume
            Effect::SetVolume(vol) => voice.volume = vol.min(64) as f32 / 64.0,
            Effect::VolumeSlide(param) => {
                voice.volume_slide_active = true;
                if param != 0 {
                    voice.last_volume_slide = param;
                }
            }
            Effect::FineVolumeUp(x) => voice.volume = (voice.volume + x as f32 / 64.0).min(1.0),
            Effect::FineVolumeDown(x) => voice.volume = (voice.volume - x as f32 / 64.0).max(0.0),
            Effect::SetGlobalVolume(vol) => self.global_volume = vol.min(64) as f32 / 64.0,
            Effect::GlobalVolumeSlide(param) => {
                self.global_slide_active = true;
                if param != 0 {
                    self.last_global_slide = param;
                }
            }

            // Pitch
            Effect::PortaUp(x) => {
                voice.porta_up_active = true;
                if x != 0 {
                    voice.last_porta_up = x;
                }
            }
            Effect::PortaDown(x) => {
                voice.porta_down_active = true;
                if x != 0 {
                    voice.last_porta_down = x;
                }
            }
            Effect::FinePortaUp(x) => voice.period = (voice.period - x as f32 * 4.0).max(1.0),
            Effect::FinePortaDown(x) => {
                voice.period = (voice.period + x as f32 * 4.0).min(MAX_PERIOD)
            }
            Effect::TonePorta(speed) => {
                voice.tone_porta_active = true;
                if speed != 0 {
                    voice.porta_speed = speed;
                }
            }
            Effect::TonePortaVolSlide(param) => {
                voice.tone_porta_active = true;
                voice.volume_slide_active = true;
                if param != 0 {
                    voice.last_volume_slide = param;
                }
            }
            Effect::SetFinetune(fine) => set_finetune(voice, fine),

            // Modulation
            Effect::Arpeggio { x, y } => {
                voice.arpeggio_active = true;
                voice.arpeggio = (x, y);
            }
            Effect::Vibrato { speed, depth } => {
                voice.vibrato_active = true;
                if speed != 0 {
                    voice.vibrato_speed = speed;
                }
                if depth != 0 {
                    voice.vibrato_depth = depth;
                }
            }
            Effect::VibratoVolSlide(param) => {
                voice.vibrato_active = true;
                voice.volume_slide_active = true;
                if param != 0 {
                    voice.last_volume_slide = param;
                }
            }
            Effect::Tremolo { speed, depth } => {
                voice.tremolo_active = true;
                if speed != 0 {
                    voice.tremolo_speed = speed;
                }
                if depth != 0 {
                    voice.tremolo_depth = depth;
                }
            }
            Effect::VibratoWaveform(wave) => voice.vibrato_waveform = wave & 0x07,
            Effect::TremoloWaveform(wave) => voice.tremolo_waveform = wave & 0x07,

            // Panning
            Effect::SetPan(pan) => voice.panning = pan_to_f32(pan),
            Effect::PanSlide(param) => {
                voice.pan_slide_active = true;
                if param != 0 {
                    voice.last_pan_slide = param;
                }
            }
            Effect::Surround(on) => voice.surround = on,

            // Sample and note
            Effect::SampleOffset(x) => {
                if x != 0 {
                    voice.last_sample_offset = x;
                }
                if triggered {
                    let mut offset = voice.last_sample_offset as usize * 256;
                    if flags.contains(PlayerFlags::FX9BUG) {
                        offset *= 2;
                    }
                    let len = voice
                        .sample
                        .and_then(|s| module.samples.get(s))
                        .map_or(0, |s| s.len);
                    if offset >= len {
                        voice.cut();
                    } else {
                        voice.pos = offset as f64;
                    }
                }
            }
            Effect::Retrigger(x) => voice.retrigger_tick = x,
            Effect::NoteCut(0) => voice.volume = 0.0,
            Effect::NoteCut(x) => voice.note_cut_tick = x,
            Effect::KeyOff(0) => voice.key_off = true,
            Effect::KeyOff(x) => voice.key_off_tick = x,
            Effect::SetEnvelopePosition(pos) => {
                voice.volume_env_pos = pos as u16;
                voice.pan_env_pos = pos as u16;
                voice.pitch_env_pos = pos as u16;
            }

            // Filter
            Effect::FilterCutoff(cutoff) => voice.set_filter(Some(cutoff), None),
            Effect::FilterResonance(res) => voice.set_filter(None, Some(res)),

            // Timing effects belong to the sequencer, note delay to the row
            Effect::None
            | Effect::SetSpeed(_)
            | Effect::SetTempo(_)
            | Effect::PositionJump(_)
            | Effect::PatternBreak(_)
            | Effect::PatternLoop(_)
            | Effect::PatternDelay(_)
            | Effect::NoteDelay(_) => {}
        }
    }

    /// Run continuous effects on a tick after the first
    pub(super) fn process_tick(&mut self, module: &Module, tick: u8, flags: PlayerFlags) {
        for ch in 0..self.channels {
            if let Some((delay, event)) = self.voices[ch].delayed
                && delay == tick
            {
                self.voices[ch].delayed = None;
                self.apply_event(module, ch, &event, flags, false);
            }

            let voice = &mut self.voices[ch];
            if voice.active {
                tick_voice(voice, tick);
            }
        }

        if self.global_slide_active {
            let (up, down) = nibbles(self.last_global_slide);
            self.global_volume = if up > 0 {
                (self.global_volume + up as f32 / 64.0).min(1.0)
            } else {
                (self.global_volume - down as f32 / 64.0).max(0.0)
            };
        }
    }
}

/// High and low nibble of an effect parameter
fn nibbles(param: u8) -> (u8, u8) {
    (param >> 4, param & 0x0F)
}

/// Change finetune (in 1/8 semitone) and move the playing pitch with it
fn set_finetune(voice: &mut Voice, fine: i8) {
    let finetune = (fine as i16 * 16).clamp(i8::MIN as i16, i8::MAX as i16) as i8;
    let shift = (voice.finetune as f32 - finetune as f32) / 2.0;
    voice.finetune = finetune;
    voice.note_period = (voice.note_period + shift).max(1.0);
    voice.period = (voice.period + shift).max(1.0);
    voice.target_period = (voice.target_period + shift).max(1.0);
}

fn tick_voice(voice: &mut Voice, tick: u8) {
    // Arpeggio
    if voice.arpeggio_active {
        let (x, y) = voice.arpeggio;
        voice.arpeggio_offset = match tick % 3 {
            0 => 0,
            1 => x,
            _ => y,
        };
    }

    // Volume slide (up takes priority)
    if voice.volume_slide_active {
        let (up, down) = nibbles(voice.last_volume_slide);
        voice.volume = if up > 0 {
            (voice.volume + up as f32 / 64.0).min(1.0)
        } else {
            (voice.volume - down as f32 / 64.0).max(0.0)
        };
    }

    // Portamento
    if voice.porta_up_active && voice.last_porta_up != 0 {
        voice.period = (voice.period - voice.last_porta_up as f32 * 4.0).max(1.0);
    }
    if voice.porta_down_active && voice.last_porta_down != 0 {
        voice.period = (voice.period + voice.last_porta_down as f32 * 4.0).min(MAX_PERIOD);
    }

    // Tone portamento
    if voice.tone_porta_active && voice.target_period > 0.0 && voice.porta_speed > 0 {
        let speed = voice.porta_speed as f32 * 4.0;
        let diff = voice.target_period - voice.period;
        if diff.abs() <= speed {
            voice.period = voice.target_period;
        } else if diff > 0.0 {
            voice.period += speed;
        } else {
            voice.period -= speed;
        }
    }

    // Vibrato
    if voice.vibrato_active && voice.vibrato_depth > 0 {
        let wave = get_waveform_value(voice.vibrato_waveform, voice.vibrato_pos);
        voice.vibrato_delta = wave * voice.vibrato_depth as f32 * 4.0;
        voice.vibrato_pos = voice.vibrato_pos.wrapping_add(voice.vibrato_speed << 2);
    }

    // Tremolo
    if voice.tremolo_active && voice.tremolo_depth > 0 {
        let wave = get_waveform_value(voice.tremolo_waveform, voice.tremolo_pos);
        voice.tremolo_delta = wave * voice.tremolo_depth as f32 * 4.0 / 128.0;
        voice.tremolo_pos = voice.tremolo_pos.wrapping_add(voice.tremolo_speed << 2);
    }

    // Retrigger
    if voice.retrigger_tick > 0 && tick > 0 && tick.is_multiple_of(voice.retrigger_tick) {
        voice.pos = 0.0;
        voice.direction = 1;
        voice.in_loop = false;
    }

    // Panning slide, high nibble right
    if voice.pan_slide_active {
        let (right, left) = nibbles(voice.last_pan_slide);
        let delta = (right as f32 - left as f32) * 2.0 / 255.0;
        voice.panning = (voice.panning + delta).clamp(-1.0, 1.0);
    }

    if voice.note_cut_tick > 0 && voice.note_cut_tick == tick {
        voice.volume = 0.0;
    }
    if voice.key_off_tick > 0 && voice.key_off_tick == tick {
        voice.key_off = true;
    }
}

/// Period offset of the current arpeggio step
pub(super) fn arpeggio_shift(voice: &Voice) -> f32 {
    voice.arpeggio_offset as f32 * PERIOD_SEMITONE
}
