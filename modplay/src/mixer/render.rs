//! Tick rendering and envelope advance

use modplay_module::{Envelope, Instrument, Module, PlayerFlags, Sample, SampleFlags};

use super::effects::arpeggio_shift;
use super::voice::{FADEOUT_MAX, Voice};
use super::{ChannelControl, MixEnv, Mixer};
use crate::params::{Interpolation, Parameters};
use crate::utils::{cubic, fast_pan_gains, get_waveform_value, period_to_frequency};

/// Volume envelope scale
const ENVELOPE_MAX: f32 = 64.0;

/// Pan envelope center
const PAN_ENVELOPE_CENTER: f32 = 32.0;

/// Period units per pitch envelope step (half a semitone)
const PITCH_ENVELOPE_UNIT: f32 = 32.0;

/// Playable region of a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct LoopBounds {
    pub start: usize,
    pub end: usize,
    /// Frames of PCM actually present
    pub len: usize,
    pub looped: bool,
    pub bidir: bool,
    /// Loop runs backwards, wrapping from its start to its end
    pub reverse: bool,
    /// Play the whole sample once before entering the loop
    pub full: bool,
}

impl LoopBounds {
    pub fn of(sample: &Sample, flags: PlayerFlags) -> Self {
        let len = sample.len.min(sample.data.len());
        let start = if flags.contains(PlayerFlags::FIXLOOP) {
            sample.loop_start / 2
        } else {
            sample.loop_start
        };
        let end = sample.loop_end.min(len);
        Self {
            start,
            end,
            len,
            looped: sample.has_loop() && end > start,
            bidir: sample.flags.contains(SampleFlags::BIDIR),
            reverse: sample.flags.contains(SampleFlags::REVERSE),
            full: sample.flags.contains(SampleFlags::FULL),
        }
    }

    fn span(&self) -> usize {
        self.end - self.start
    }

    /// Frame at `index`, following the loop past its end
    fn frame_at(&self, sample: &Sample, index: usize) -> f32 {
        if self.looped && index >= self.end {
            if self.bidir {
                let back = index - self.end;
                return sample.frame(self.end.saturating_sub(1 + back).max(self.start));
            }
            return sample.frame(self.start + (index - self.end) % self.span());
        }
        sample.frame(index)
    }

    /// Interpolated value at a fractional position
    pub fn interpolate(&self, sample: &Sample, pos: f64, mode: Interpolation) -> f32 {
        let idx = pos.max(0.0) as usize;
        let t = (pos - idx as f64) as f32;
        match mode {
            Interpolation::Nearest => self.frame_at(sample, idx),
            Interpolation::Linear => {
                let a = self.frame_at(sample, idx);
                let b = self.frame_at(sample, idx + 1);
                a + (b - a) * t
            }
            Interpolation::Spline => cubic(
                self.frame_at(sample, idx.saturating_sub(1)),
                self.frame_at(sample, idx),
                self.frame_at(sample, idx + 1),
                self.frame_at(sample, idx + 2),
                t,
            ),
        }
    }

    /// Move the play position by `step` frames, handling loops
    pub fn advance(&self, voice: &mut Voice, step: f64) {
        if voice.direction < 0 {
            voice.pos -= step;
        } else {
            voice.pos += step;
        }

        if !self.looped || (self.full && !voice.in_loop) {
            if voice.pos >= self.len as f64 {
                if self.looped {
                    // Full-loop sample finished its first pass
                    voice.in_loop = true;
                    let over = (voice.pos - self.len as f64) % self.span() as f64;
                    if self.reverse && !self.bidir {
                        voice.direction = -1;
                        voice.pos = (self.end as f64 - over).min(self.end as f64 - 1.0);
                    } else {
                        voice.pos = self.start as f64 + over;
                    }
                } else {
                    voice.active = false;
                }
            }
            return;
        }

        let start = self.start as f64;
        let end = self.end as f64;
        if self.bidir {
            if voice.direction > 0 && voice.pos >= end {
                voice.pos = end - (voice.pos - end);
                voice.direction = -1;
            } else if voice.direction < 0 && voice.pos < start {
                voice.pos = start + (start - voice.pos);
                voice.direction = 1;
            }
            voice.pos = voice.pos.clamp(start, (end - 1.0).max(start));
        } else if self.reverse {
            if voice.direction > 0 && voice.pos >= end {
                voice.pos = end - (voice.pos - end) % (end - start);
                voice.direction = -1;
            }
            if voice.pos < start {
                voice.pos = end - (start - voice.pos) % (end - start);
            }
            voice.pos = voice.pos.min((end - 1.0).max(start));
        } else if voice.pos >= end {
            voice.pos = start + (voice.pos - end) % (end - start);
        }
    }
}

fn enabled(env: &Option<Envelope>) -> Option<&Envelope> {
    env.as_ref().filter(|e| e.is_enabled())
}

/// Period played this tick, after every pitch modulation
pub(super) fn output_period(voice: &Voice, instrument: Option<&Instrument>) -> f32 {
    let mut period = voice.period + voice.vibrato_delta - arpeggio_shift(voice);

    let vib = voice.auto_vibrato;
    if vib.depth > 0 {
        let sweep = if vib.sweep > 0 {
            (voice.auto_vibrato_ticks as f32 / vib.sweep as f32).min(1.0)
        } else {
            1.0
        };
        let wave = get_waveform_value(vib.waveform, voice.auto_vibrato_pos);
        period += wave * vib.depth as f32 * sweep * 4.0;
    }

    if let Some(env) = instrument.and_then(|ins| enabled(&ins.pitch_envelope))
        && !env.is_filter()
    {
        period -= env.value_at(voice.pitch_env_pos) as f32 * PITCH_ENVELOPE_UNIT;
    }

    period.max(1.0)
}

/// Linear gain of a voice before panning
pub(super) fn voice_gain(
    voice: &Voice,
    instrument: Option<&Instrument>,
    control: ChannelControl,
    global_volume: f32,
    params: &Parameters,
) -> f32 {
    let mut gain = (voice.volume + voice.tremolo_delta).clamp(0.0, 1.0);
    gain *= voice.sub_volume * voice.channel_volume * control.volume * global_volume;

    if let Some(env) = instrument.and_then(|ins| enabled(&ins.volume_envelope)) {
        gain *= (env.value_at(voice.volume_env_pos) as f32 / ENVELOPE_MAX).clamp(0.0, 1.0);
    }
    gain *= voice.fadeout as f32 / FADEOUT_MAX as f32;

    gain *= params.volume as f32 / 100.0 * params.amplification_gain();
    if voice.injected {
        gain *= params.secondary_volume as f32 / 100.0;
    }
    gain
}

/// Pan of a voice in -1.0..=1.0 after the pan envelope and stereo width
pub(super) fn voice_pan(voice: &Voice, instrument: Option<&Instrument>, params: &Parameters) -> f32 {
    let mut pan = voice.panning;
    if let Some(env) = instrument.and_then(|ins| enabled(&ins.pan_envelope)) {
        let offset = (env.value_at(voice.pan_env_pos) as f32 - PAN_ENVELOPE_CENTER)
            / PAN_ENVELOPE_CENTER;
        pan += offset * (1.0 - pan.abs());
    }
    (pan * params.stereo_mixing as f32 / 100.0).clamp(-1.0, 1.0)
}

impl Mixer {
    /// Mix every sounding voice into `frames` stereo frames
    pub(super) fn render(&mut self, module: &Module, frames: usize, env: &MixEnv) {
        self.mix.clear();
        self.mix.resize(frames * 2, 0.0);

        let lowpass = env.params.lowpass();
        let rate = self.rate;
        let global_volume = self.global_volume;

        for voice in &mut self.voices {
            if !voice.active {
                continue;
            }
            let Some(sample) = voice.sample.and_then(|s| module.samples.get(s)) else {
                continue;
            };
            let instrument = voice.instrument.and_then(|i| module.instruments.get(i));
            let control = env.controls.get(voice.channel).copied().unwrap_or_default();

            let gain = voice_gain(voice, instrument, control, global_volume, env.params);
            let pan = voice_pan(voice, instrument, env.params);
            voice.final_volume = gain;
            voice.final_pan = pan;

            let bounds = LoopBounds::of(sample, env.flags);
            if bounds.len == 0 {
                continue;
            }

            let (mut left, mut right) = fast_pan_gains(pan);
            if voice.surround {
                right = -right;
            }
            // Muted channels keep advancing so they stay in time
            let audible = if control.muted { 0.0 } else { gain };
            left *= audible;
            right *= audible;

            let step = period_to_frequency(output_period(voice, instrument)) as f64 / rate as f64;
            let filtered = lowpass && voice.filter_engaged();

            for out in self.mix.chunks_exact_mut(2) {
                let mut value = bounds.interpolate(sample, voice.pos, env.params.interpolation);
                if filtered {
                    value = voice.apply_filter(value, rate);
                }
                out[0] += value * left;
                out[1] += value * right;

                bounds.advance(voice, step);
                if !voice.active {
                    break;
                }
            }
        }
    }

    /// Step envelopes, fadeout and auto-vibrato by one tick
    pub(super) fn advance_envelopes(&mut self, module: &Module) {
        for voice in &mut self.voices {
            if !voice.active {
                continue;
            }
            let instrument = voice.instrument.and_then(|i| module.instruments.get(i));

            match instrument.and_then(|ins| enabled(&ins.volume_envelope)) {
                Some(env) => {
                    voice.volume_env_pos = env.advance(voice.volume_env_pos, voice.key_off);
                    if env.finished(voice.volume_env_pos) && env.value_at(env.end_tick()) == 0 {
                        voice.active = false;
                    }
                }
                // Released without envelope or fadeout: silence at once
                None if voice.key_off && voice.fadeout_rate == 0 => voice.active = false,
                None => {}
            }

            if voice.key_off && voice.fadeout_rate > 0 {
                voice.fadeout = voice.fadeout.saturating_sub(voice.fadeout_rate);
                if voice.fadeout == 0 {
                    voice.active = false;
                }
            }

            if let Some(env) = instrument.and_then(|ins| enabled(&ins.pan_envelope)) {
                voice.pan_env_pos = env.advance(voice.pan_env_pos, voice.key_off);
            }

            if let Some(env) = instrument.and_then(|ins| enabled(&ins.pitch_envelope)) {
                voice.pitch_env_pos = env.advance(voice.pitch_env_pos, voice.key_off);
                if env.is_filter() {
                    let value = env.value_at(voice.pitch_env_pos) as f32 / ENVELOPE_MAX;
                    voice.filter_env = value.clamp(0.0, 1.0);
                    voice.filter_dirty = true;
                }
            }

            voice.auto_vibrato_pos = voice.auto_vibrato_pos.wrapping_add(voice.auto_vibrato.rate);
            voice.auto_vibrato_ticks = voice.auto_vibrato_ticks.saturating_add(1);
        }
    }
}
