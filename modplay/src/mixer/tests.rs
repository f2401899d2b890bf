//! Mixer tests, driven tick by tick through the sequencer

use modplay_module::{
    DuplicateCheckAction, DuplicateCheckType, Effect, Instrument, KEY_OFF, NewNoteAction, Sample,
    SampleFlags,
};

use super::*;
use crate::fixtures::{set, song, song_with_square};
use crate::sequencer::Step;

const RATE: u32 = 8000;

/// Frames per tick at 125 BPM and [`RATE`]
const TICK_FRAMES: usize = 160;

struct Harness {
    module: Module,
    seq: Sequencer,
    mixer: Mixer,
    params: Parameters,
    controls: Vec<ChannelControl>,
}

impl Harness {
    fn new(module: Module) -> Self {
        Self::with_params(module, Parameters::default())
    }

    fn with_params(module: Module, params: Parameters) -> Self {
        let mixer = Mixer::new(&module, RATE, OutputFormat::default(), &params, 8).unwrap();
        let seq = Sequencer::new(&module, 0, 0);
        let controls = vec![ChannelControl::default(); module.channels];
        Self {
            module,
            seq,
            mixer,
            params,
            controls,
        }
    }

    fn tick(&mut self) {
        let flags = self.params.player_flags | self.module.flags;
        let Step::Tick { row_start, .. } = self.seq.next_tick(&self.module, flags, 0) else {
            panic!("sequence ended");
        };
        let env = MixEnv {
            params: &self.params,
            flags,
            controls: &self.controls,
        };
        self.mixer.play_tick(&self.module, &self.seq, row_start, &env);
    }

    fn ticks(&mut self, n: usize) {
        for _ in 0..n {
            self.tick();
        }
    }

    fn voice(&self) -> &Voice {
        self.mixer.voice(0).unwrap()
    }

    fn peak(&self) -> i32 {
        self.mixer
            .buffer()
            .chunks_exact(2)
            .map(|b| (i16::from_ne_bytes([b[0], b[1]]) as i32).abs())
            .max()
            .unwrap_or(0)
    }

    /// Sum of the left output channel over the last tick
    fn left_sum(&self) -> i64 {
        self.mixer
            .buffer()
            .chunks_exact(4)
            .map(|b| i16::from_ne_bytes([b[0], b[1]]) as i64)
            .sum()
    }
}

/// One channel song whose only instrument plays `sample`
fn song_with_sample(sample: Sample) -> Module {
    let mut module = song(1, 8, 1, &[0]);
    module.samples.push(sample);
    module.instruments.push(Instrument::with_sample("ins", 0, 64));
    module
}

fn note(key: u8, effect: Effect) -> Event {
    Event {
        effect,
        ..Event::note_on(key, 0)
    }
}

// =============================================================================
// Rendering
// =============================================================================

#[test]
fn test_note_renders_audio() {
    let mut module = song_with_square(1, 4, 1, &[0]);
    set(&mut module, 0, 0, 0, Event::note_on(60, 0));
    let mut h = Harness::new(module);
    h.tick();

    assert_eq!(h.mixer.buffer().len(), TICK_FRAMES * 4);
    assert!(h.voice().active);
    assert!(h.peak() > 8000, "peak {}", h.peak());
    assert_eq!(h.mixer.virtual_used(), 1);
}

#[test]
fn test_empty_row_is_silent() {
    let mut h = Harness::new(song_with_square(2, 4, 1, &[0]));
    h.tick();
    assert_eq!(h.mixer.buffer().len(), TICK_FRAMES * 4);
    assert_eq!(h.peak(), 0);
    assert_eq!(h.mixer.virtual_used(), 0);
}

#[test]
fn test_buffer_sizes_follow_format() {
    let module = song_with_square(1, 4, 1, &[0]);
    let params = Parameters::default();
    let format = OutputFormat::MONO | OutputFormat::EIGHT_BIT;
    let mixer = Mixer::new(&module, RATE, format, &params, 0).unwrap();
    assert_eq!(mixer.max_buffer_bytes(), samples_per_tick(RATE, MIN_BPM));
    assert_eq!(mixer.virtual_channels(), 1);

    let mixer = Mixer::new(&module, RATE, OutputFormat::default(), &params, 4).unwrap();
    assert_eq!(mixer.max_buffer_bytes(), samples_per_tick(RATE, MIN_BPM) * 4);
    assert_eq!(mixer.virtual_channels(), 5);
    assert!(mixer.voice(1).is_none());
}

#[test]
fn test_slow_module_grows_max_buffer() {
    let mut module = song_with_square(1, 4, 1, &[0]);
    module.bpm = 20;
    let mixer = Mixer::new(&module, RATE, OutputFormat::default(), &Parameters::default(), 0).unwrap();
    assert_eq!(mixer.max_buffer_bytes(), samples_per_tick(RATE, 20) * 4);

    let mut h = Harness::new(module);
    h.tick();
    assert_eq!(h.mixer.buffer().len(), h.mixer.max_buffer_bytes());
}

#[test]
fn test_muted_channel_keeps_advancing() {
    let mut module = song_with_sample(Sample::from_i8("long", vec![64; 4096]));
    set(&mut module, 0, 0, 0, Event::note_on(60, 0));
    let mut h = Harness::new(module);
    h.controls[0].muted = true;
    h.tick();

    assert_eq!(h.peak(), 0);
    assert!(h.voice().active);
    assert!(h.voice().pos > 150.0);
}

#[test]
fn test_channel_volume_scales_output() {
    let mut module = song_with_square(1, 4, 1, &[0]);
    set(&mut module, 0, 0, 0, Event::note_on(60, 0));

    let mut full = Harness::new(module.clone());
    full.tick();
    let mut half = Harness::new(module);
    half.controls[0].volume = 0.5;
    half.tick();

    assert!((full.peak() - 2 * half.peak()).abs() <= 2);
}

#[test]
fn test_reset_channels_applies_settings() {
    let mut module = song_with_square(2, 4, 1, &[0]);
    module.channel_settings[0].pan = 0;
    module.channel_settings[0].volume = 32;
    module.channel_settings[1].flags = ChannelFlags::SURROUND;
    module.global_volume = 32;

    let mixer = Mixer::new(&module, RATE, OutputFormat::default(), &Parameters::default(), 0)
        .unwrap();
    assert_eq!(mixer.voice(0).unwrap().panning, -1.0);
    assert_eq!(mixer.voice(0).unwrap().channel_volume, 0.5);
    assert!(mixer.voice(1).unwrap().surround);
    assert_eq!(mixer.global_volume(), 0.5);

    let params = Parameters {
        default_pan: 50,
        ..Default::default()
    };
    let mixer = Mixer::new(&module, RATE, OutputFormat::default(), &params, 0).unwrap();
    assert_eq!(mixer.voice(0).unwrap().panning, pan_to_f32(0) * 0.5);
}

// =============================================================================
// Sample playback
// =============================================================================

#[test]
fn test_one_shot_sample_stops() {
    let mut module = song_with_sample(Sample::from_i8("hit", vec![80; 64]));
    set(&mut module, 0, 0, 0, Event::note_on(60, 0));
    let mut h = Harness::new(module);
    h.tick();
    assert!(!h.voice().active);
    assert!(h.peak() > 0);
}

#[test]
fn test_forward_loop_wraps() {
    let mut module = song_with_square(1, 4, 1, &[0]);
    set(&mut module, 0, 0, 0, Event::note_on(60, 0));
    let mut h = Harness::new(module);
    h.ticks(5);
    assert!(h.voice().active);
    assert!(h.voice().pos < 64.0);
}

#[test]
fn test_bidirectional_loop_reverses() {
    let mut sample = Sample::from_i8("pingpong", (0..64).map(|i| i as i8).collect()).looped(0, 64);
    sample.flags = sample.flags | SampleFlags::BIDIR;
    let mut module = song_with_sample(sample);
    set(&mut module, 0, 0, 0, Event::note_on(60, 0));
    let mut h = Harness::new(module);

    let mut reversed = false;
    for _ in 0..4 {
        h.tick();
        let voice = h.voice();
        assert!(voice.active);
        assert!((0.0..64.0).contains(&voice.pos));
        reversed |= voice.direction < 0;
    }
    assert!(reversed);
}

#[test]
fn test_reverse_loop_runs_backwards_after_attack() {
    // Attack region is positive, loop region negative
    let data = (0..4096).map(|i| if i < 2048 { 100 } else { -100 }).collect();
    let mut sample = Sample::from_i8("reverse", data).looped(2048, 4096);
    sample.flags = sample.flags | SampleFlags::REVERSE;
    let mut module = song_with_sample(sample);
    set(&mut module, 0, 0, 0, Event::note_on(60, 0));
    let mut h = Harness::new(module);

    h.tick();
    assert_eq!(h.voice().direction, 1);
    assert!(h.voice().pos < 2048.0);
    assert!(h.left_sum() > 0);

    // About 167 sample frames per tick, so the attack ends within 13 ticks
    h.ticks(19);
    let voice = h.voice();
    assert!(voice.active);
    assert_eq!(voice.direction, -1);
    assert!((2048.0..4096.0).contains(&voice.pos));
    assert!(h.left_sum() < 0);

    let mut last = h.voice().pos;
    let mut wrapped = false;
    // Stays inside the first pass of the 48-tick pattern
    for _ in 0..25 {
        h.tick();
        let voice = h.voice();
        assert_eq!(voice.direction, -1);
        assert!((2048.0..4096.0).contains(&voice.pos), "pos {}", voice.pos);
        assert!(h.left_sum() < 0);
        wrapped |= voice.pos > last;
        last = voice.pos;
    }
    assert!(wrapped);
}

#[test]
fn test_full_sample_plays_before_loop() {
    let mut sample = Sample::from_i8("intro", vec![50; 128]).looped(0, 32);
    sample.flags = sample.flags | SampleFlags::FULL;
    let mut module = song_with_sample(sample);
    set(&mut module, 0, 0, 0, Event::note_on(60, 0));
    let mut h = Harness::new(module);

    h.tick();
    assert!(h.voice().in_loop);
    assert!(h.voice().pos < 32.0);
}

#[test]
fn test_sample_offset() {
    let mut module = song_with_sample(Sample::from_i8("long", vec![64; 1024]));
    set(&mut module, 0, 0, 0, note(60, Effect::SampleOffset(2)));
    let mut h = Harness::new(module);
    h.tick();
    let pos = h.voice().pos;
    assert!((512.0..720.0).contains(&pos), "pos {pos}");
}

#[test]
fn test_sample_offset_bug_doubles_offset() {
    let mut module = song_with_sample(Sample::from_i8("long", vec![64; 1024]));
    module.flags = PlayerFlags::FX9BUG;
    set(&mut module, 0, 0, 0, note(60, Effect::SampleOffset(2)));
    let mut h = Harness::new(module);
    h.tick();
    // 2 * 512 frames is past the end of the sample
    assert!(!h.voice().active);
    assert_eq!(h.peak(), 0);
}

// =============================================================================
// Row events
// =============================================================================

#[test]
fn test_note_delay() {
    let mut module = song_with_square(1, 4, 1, &[0]);
    set(&mut module, 0, 0, 0, note(60, Effect::NoteDelay(2)));
    let mut h = Harness::new(module);

    h.tick();
    assert!(!h.voice().active);
    h.tick();
    assert!(!h.voice().active);
    h.tick();
    assert!(h.voice().active);
    assert_eq!(h.voice().key, Some(60));
}

#[test]
fn test_note_delay_past_row_is_dropped() {
    let mut module = song_with_square(1, 4, 1, &[0]);
    set(&mut module, 0, 0, 0, note(60, Effect::NoteDelay(6)));
    let mut h = Harness::new(module);
    h.ticks(7);
    assert!(!h.voice().active);
}

#[test]
fn test_key_off_without_envelope_stops() {
    let mut module = song_with_square(1, 4, 1, &[0]);
    set(&mut module, 0, 0, 0, Event::note_on(60, 0));
    set(
        &mut module,
        0,
        1,
        0,
        Event {
            note: KEY_OFF,
            ..Default::default()
        },
    );
    let mut h = Harness::new(module);
    h.ticks(6);
    assert!(h.voice().active);
    h.tick();
    assert!(!h.voice().active);
}

#[test]
fn test_key_off_fades_out() {
    let mut module = song_with_square(1, 4, 1, &[0]);
    module.instruments[0].fadeout = 16384;
    set(&mut module, 0, 0, 0, Event::note_on(60, 0));
    set(
        &mut module,
        0,
        1,
        0,
        Event {
            note: KEY_OFF,
            ..Default::default()
        },
    );
    let mut h = Harness::new(module);
    h.ticks(7);
    assert!(h.voice().active);
    assert_eq!(h.voice().fadeout, 65535 - 16384);
    h.ticks(3);
    assert!(!h.voice().active);
}

#[test]
fn test_volume_column_overrides_instrument() {
    let mut module = song_with_square(1, 4, 1, &[0]);
    set(
        &mut module,
        0,
        0,
        0,
        Event {
            volume: 33,
            ..Event::note_on(60, 0)
        },
    );
    let mut h = Harness::new(module);
    h.tick();
    assert_eq!(h.voice().volume, 0.5);
}

#[test]
fn test_nna_continue_moves_note_to_background() {
    let mut module = song_with_square(1, 4, 1, &[0]);
    module.instruments[0].subs[0].nna = NewNoteAction::Continue;
    set(&mut module, 0, 0, 0, Event::note_on(60, 0));
    set(&mut module, 0, 1, 0, Event::note_on(64, 0));
    let mut h = Harness::new(module);
    h.ticks(7);

    assert_eq!(h.voice().key, Some(64));
    let background: Vec<&Voice> = h.mixer.voices()[1..].iter().filter(|v| v.active).collect();
    assert_eq!(background.len(), 1);
    assert_eq!(background[0].key, Some(60));
    assert_eq!(background[0].channel, 0);
    assert!(background[0].is_background);
    assert_eq!(h.mixer.virtual_used(), 2);
}

#[test]
fn test_nna_cut_replaces_note() {
    let mut module = song_with_square(1, 4, 1, &[0]);
    set(&mut module, 0, 0, 0, Event::note_on(60, 0));
    set(&mut module, 0, 1, 0, Event::note_on(64, 0));
    let mut h = Harness::new(module);
    h.ticks(7);
    assert_eq!(h.voice().key, Some(64));
    assert_eq!(h.mixer.virtual_used(), 1);
}

#[test]
fn test_duplicate_check_cuts_background_note() {
    let build = |dct| {
        let mut module = song_with_square(1, 4, 1, &[0]);
        let sub = &mut module.instruments[0].subs[0];
        sub.nna = NewNoteAction::Continue;
        sub.dct = dct;
        sub.dca = DuplicateCheckAction::Cut;
        for row in 0..3 {
            set(&mut module, 0, row, 0, Event::note_on(60, 0));
        }
        let mut h = Harness::new(module);
        h.ticks(13);
        h.mixer.virtual_used()
    };

    assert_eq!(build(DuplicateCheckType::Off), 3);
    assert_eq!(build(DuplicateCheckType::Note), 2);
}

#[test]
fn test_injected_note_uses_secondary_volume() {
    let params = Parameters {
        secondary_volume: 50,
        ..Default::default()
    };

    let mut module = song_with_square(1, 4, 1, &[0]);
    let mut injected = Harness::with_params(module.clone(), params);
    injected.mixer.inject(0, Event::note_on(60, 0));
    injected.tick();
    assert!(injected.voice().injected);

    set(&mut module, 0, 0, 0, Event::note_on(60, 0));
    let mut pattern = Harness::with_params(module, params);
    pattern.tick();
    assert!(!pattern.voice().injected);

    assert!(injected.peak() > 0);
    assert!((pattern.peak() - 2 * injected.peak()).abs() <= 2);
}

#[test]
fn test_silence_stops_every_voice() {
    let mut module = song_with_square(2, 4, 1, &[0]);
    set(&mut module, 0, 0, 0, Event::note_on(60, 0));
    set(&mut module, 0, 0, 1, Event::note_on(67, 0));
    let mut h = Harness::new(module);
    h.tick();
    assert_eq!(h.mixer.virtual_used(), 2);

    h.mixer.inject(0, Event::note_on(60, 0));
    h.mixer.silence();
    assert_eq!(h.mixer.virtual_used(), 0);
    h.tick();
    assert_eq!(h.peak(), 0);
}

// =============================================================================
// Effects
// =============================================================================

#[test]
fn test_volume_slide_down() {
    let mut module = song_with_square(1, 4, 1, &[0]);
    set(&mut module, 0, 0, 0, note(60, Effect::VolumeSlide(0x04)));
    let mut h = Harness::new(module);
    h.ticks(4);
    assert!((h.voice().volume - (1.0 - 3.0 * 4.0 / 64.0)).abs() < 1e-6);
}

#[test]
fn test_volume_slide_up_takes_priority() {
    let mut module = song_with_square(1, 4, 1, &[0]);
    set(
        &mut module,
        0,
        0,
        0,
        Event {
            volume: 33,
            ..note(60, Effect::VolumeSlide(0x41))
        },
    );
    let mut h = Harness::new(module);
    h.ticks(2);
    assert!((h.voice().volume - (0.5 + 4.0 / 64.0)).abs() < 1e-6);
}

#[test]
fn test_porta_up_lowers_period() {
    let mut module = song_with_square(1, 4, 1, &[0]);
    set(&mut module, 0, 0, 0, note(60, Effect::PortaUp(2)));
    let mut h = Harness::new(module);
    h.ticks(6);
    assert_eq!(h.voice().period, 3840.0 - 5.0 * 8.0);
}

#[test]
fn test_tone_porta_slides_without_retrigger() {
    let mut module = song_with_square(1, 4, 1, &[0]);
    set(&mut module, 0, 0, 0, Event::note_on(60, 0));
    set(
        &mut module,
        0,
        1,
        0,
        Event {
            note: 73,
            effect: Effect::TonePorta(16),
            ..Default::default()
        },
    );
    let mut h = Harness::new(module);
    h.ticks(7);
    assert_eq!(h.voice().period, 3840.0);
    assert_eq!(h.voice().target_period, 3072.0);
    assert_eq!(h.voice().key, Some(72));
    assert!(h.voice().pos > 0.0);

    h.ticks(5);
    assert_eq!(h.voice().period, 3840.0 - 5.0 * 64.0);
}

#[test]
fn test_arpeggio_cycles() {
    let mut module = song_with_square(1, 4, 1, &[0]);
    set(&mut module, 0, 0, 0, note(60, Effect::Arpeggio { x: 4, y: 7 }));
    let mut h = Harness::new(module);

    let mut offsets = Vec::new();
    for _ in 0..4 {
        h.tick();
        offsets.push(h.voice().arpeggio_offset);
    }
    assert_eq!(offsets, vec![0, 4, 7, 0]);
}

#[test]
fn test_vibrato_modulates_then_resets() {
    let mut module = song_with_square(1, 4, 1, &[0]);
    set(
        &mut module,
        0,
        0,
        0,
        note(60, Effect::Vibrato { speed: 8, depth: 4 }),
    );
    let mut h = Harness::new(module);
    h.ticks(3);
    assert!(h.voice().vibrato_delta.abs() > 0.0);

    // Next row carries no vibrato
    h.ticks(4);
    assert_eq!(h.voice().vibrato_delta, 0.0);
}

#[test]
fn test_retrigger_restarts_sample() {
    let mut module = song_with_sample(Sample::from_i8("long", vec![64; 4096]));
    set(&mut module, 0, 0, 0, note(60, Effect::Retrigger(2)));
    let mut h = Harness::new(module);
    h.ticks(2);
    assert!(h.voice().pos > 300.0);
    h.tick();
    assert!(h.voice().pos < 200.0);
}

#[test]
fn test_note_cut_effect() {
    let mut module = song_with_square(1, 4, 1, &[0]);
    set(&mut module, 0, 0, 0, note(60, Effect::NoteCut(2)));
    let mut h = Harness::new(module);
    h.ticks(2);
    assert_eq!(h.voice().volume, 1.0);
    h.tick();
    assert_eq!(h.voice().volume, 0.0);
    assert_eq!(h.peak(), 0);
}

#[test]
fn test_global_volume_set_and_slide() {
    let mut module = song_with_square(1, 4, 1, &[0]);
    set(
        &mut module,
        0,
        0,
        0,
        Event {
            effect: Effect::SetGlobalVolume(32),
            effect2: Effect::GlobalVolumeSlide(0x02),
            ..Default::default()
        },
    );
    let mut h = Harness::new(module);
    h.tick();
    assert_eq!(h.mixer.global_volume(), 0.5);
    h.ticks(5);
    assert!((h.mixer.global_volume() - (0.5 - 5.0 * 2.0 / 64.0)).abs() < 1e-6);
}

#[test]
fn test_set_pan_and_surround() {
    let mut module = song_with_square(1, 4, 1, &[0]);
    set(
        &mut module,
        0,
        0,
        0,
        Event {
            effect: Effect::SetPan(0xFF),
            effect2: Effect::Surround(true),
            ..Event::note_on(60, 0)
        },
    );
    let mut h = Harness::new(module);
    h.tick();
    assert_eq!(h.voice().panning, pan_to_f32(0xFF));
    assert!(h.voice().surround);
}

#[test]
fn test_unknown_instrument_is_ignored() {
    let mut module = song_with_square(1, 4, 1, &[0]);
    set(&mut module, 0, 0, 0, Event::note_on(60, 0));
    set(
        &mut module,
        0,
        1,
        0,
        Event {
            instrument: 9,
            ..Default::default()
        },
    );
    let mut h = Harness::new(module);
    h.ticks(7);
    assert!(h.voice().active);
    assert_eq!(h.voice().instrument, Some(0));
}
