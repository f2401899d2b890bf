//! Tests for modplay-module types and loading

use crate::instrument::EnvelopeFlags;
use crate::{
    Depacker, Effect, Envelope, EnvelopePoint, Event, Instrument, LoadError, LoadOptions,
    LoaderRegistry, Module, ORDER_END, ORDER_SKIP, Sample, SampleData, SampleFlags,
};

/// Minimal 4-channel M.K. module: one pattern, one 32-frame looped sample
fn build_mod(magic: &[u8; 4], channels: usize, orders: &[u8]) -> Vec<u8> {
    let mut data = vec![0u8; 1084];
    data[..9].copy_from_slice(b"test song");

    // Sample 1: name, 16 words, finetune -1, volume 48, loop 8..24
    let hdr = 20;
    data[hdr..hdr + 6].copy_from_slice(b"square");
    data[hdr + 22..hdr + 24].copy_from_slice(&16u16.to_be_bytes());
    data[hdr + 24] = 0x0F;
    data[hdr + 25] = 48;
    data[hdr + 26..hdr + 28].copy_from_slice(&4u16.to_be_bytes());
    data[hdr + 28..hdr + 30].copy_from_slice(&8u16.to_be_bytes());

    data[950] = orders.len() as u8;
    data[951] = 0x7F;
    data[952..952 + orders.len()].copy_from_slice(orders);
    data[1080..1084].copy_from_slice(magic);

    let num_patterns = orders.iter().copied().max().unwrap_or(0) as usize + 1;
    for pat in 0..num_patterns {
        let mut cells = vec![0u8; 64 * channels * 4];
        // Row 0, channel 0: C-5 (period 428), sample 1, speed 3
        cells[0..4].copy_from_slice(&[0x01, 0xAC, 0x1F, 0x03]);
        // Row 1, channel 1: effect C20 only
        let off = channels * 4 + 4;
        cells[off..off + 4].copy_from_slice(&[0x00, 0x00, 0x0C, 0x20]);
        // Last row of pattern 0 breaks to row 16
        if pat == 0 {
            let off = 63 * channels * 4;
            cells[off..off + 4].copy_from_slice(&[0x00, 0x00, 0x0D, 0x16]);
        }
        data.extend_from_slice(&cells);
    }

    data.extend((0..32).map(|i| if i < 16 { 0x40u8 } else { 0xC0 }));
    data
}

#[test]
fn test_event_methods() {
    let event = Event::note_on(48, 0);
    assert!(event.has_note());
    assert!(event.has_instrument());
    assert_eq!(event.key(), Some(48));
    assert_eq!(event.instrument, 1);
    assert!(!event.is_key_off());

    let off = Event {
        note: crate::KEY_OFF,
        ..Default::default()
    };
    assert!(off.is_key_off());
    assert!(!off.has_note());
    assert_eq!(off.key(), None);

    assert!(Event::default().is_empty());
    assert_eq!(Event::default().volume(), None);
    let vol = Event {
        volume: 33,
        ..Default::default()
    };
    assert_eq!(vol.volume(), Some(32));
}

#[test]
fn test_event_from_raw_decodes_both_columns() {
    let event = Event::from_raw(61, 2, 0, 0xF, 0x7D, 0xA, 0x0F);
    assert_eq!(event.effect, Effect::SetTempo(125));
    assert_eq!(event.effect2, Effect::VolumeSlide(0x0F));
    assert!(event.has_effect());
}

#[test]
fn test_envelope_interpolation() {
    let env = Envelope {
        points: vec![
            EnvelopePoint { tick: 0, value: 64 },
            EnvelopePoint { tick: 10, value: 32 },
            EnvelopePoint { tick: 20, value: 0 },
        ],
        ..Default::default()
    };

    assert_eq!(env.value_at(0), 64);
    assert_eq!(env.value_at(5), 48);
    assert_eq!(env.value_at(10), 32);
    assert_eq!(env.value_at(15), 16);
    assert_eq!(env.value_at(20), 0);
    assert_eq!(env.value_at(30), 0);
}

#[test]
fn test_envelope_sustain_holds_until_release() {
    let env = Envelope {
        points: vec![
            EnvelopePoint { tick: 0, value: 64 },
            EnvelopePoint { tick: 10, value: 32 },
            EnvelopePoint { tick: 20, value: 0 },
        ],
        sustain_start: 1,
        flags: EnvelopeFlags::ON | EnvelopeFlags::SUSTAIN,
        ..Default::default()
    };

    assert_eq!(env.advance(9, false), 10);
    assert_eq!(env.advance(10, false), 10);
    assert_eq!(env.advance(10, true), 11);
    assert_eq!(env.advance(20, true), 21);
    assert_eq!(env.advance(21, true), 21);
    assert!(env.finished(21));
    assert!(!env.finished(20));
}

#[test]
fn test_envelope_loop() {
    let env = Envelope {
        points: vec![
            EnvelopePoint { tick: 0, value: 0 },
            EnvelopePoint { tick: 4, value: 64 },
            EnvelopePoint { tick: 8, value: 0 },
        ],
        loop_start: 1,
        loop_end: 2,
        flags: EnvelopeFlags::ON | EnvelopeFlags::LOOP,
        ..Default::default()
    };

    assert_eq!(env.advance(7, false), 8);
    assert_eq!(env.advance(8, false), 4);
    assert!(!env.finished(env.advance(8, true)));
}

#[test]
fn test_disabled_envelope_does_not_move() {
    let env = Envelope {
        flags: EnvelopeFlags::empty(),
        ..Default::default()
    };
    assert!(!env.is_enabled());
    assert_eq!(env.advance(3, false), 3);
}

#[test]
fn test_instrument_key_mapping() {
    let mut ins = Instrument::with_sample("lead", 2, 40);
    assert_eq!(ins.num_subs(), 1);
    assert_eq!(ins.sample_for_key(60), Some(2));
    assert_eq!(ins.sample_for_key(121), None);

    ins.keys[10].sub = None;
    assert_eq!(ins.sample_for_key(10), None);
    ins.keys[11].transpose = 12;
    let (sub, transpose) = ins.mapping(11).expect("mapped key");
    assert_eq!(sub.volume, 40);
    assert_eq!(transpose, 12);
}

#[test]
fn test_sample_frames() {
    let sample = Sample::from_i8("ramp", vec![0, 64, -128]);
    assert_eq!(sample.len, 3);
    assert_eq!(sample.frame(1), 0.5);
    assert_eq!(sample.frame(2), -1.0);
    assert_eq!(sample.frame(3), 0.0);

    // Loop direction does not change how the payload is read
    let reversed = Sample {
        flags: SampleFlags::REVERSE,
        ..sample.clone()
    };
    assert_eq!(reversed.frame(0), 0.0);
    assert_eq!(reversed.frame(2), -1.0);

    let wide = Sample::from_i16("wide", vec![16384]);
    assert!(wide.is_16bit());
    assert_eq!(wide.frame(0), 0.5);

    let looped = Sample::from_i8("l", vec![0; 8]).looped(2, 6);
    assert!(looped.has_loop());
    assert!(!Sample::from_i8("l", vec![0; 8]).looped(4, 4).has_loop());
}

fn simple_module() -> Module {
    let mut module = Module::new("simple", "test", 2);
    module.push_pattern(4, vec![vec![Event::note_on(60, 0)], vec![]]);
    module.orders = vec![0];
    module.instruments.push(Instrument::with_sample("i", 0, 64));
    module.samples.push(Sample::from_i8("s", vec![0; 16]));
    module
}

#[test]
fn test_push_pattern_pads_tracks() {
    let module = simple_module();
    assert_eq!(module.num_patterns(), 1);
    assert_eq!(module.num_tracks(), 2);
    assert_eq!(module.tracks[1].events.len(), 4);
    assert_eq!(module.event(0, 0, 0).and_then(|e| e.key()), Some(60));
    assert!(module.event(0, 3, 1).is_some_and(|e| e.is_empty()));
    assert!(module.event(0, 4, 0).is_none());
    assert!(module.event(0, 0, 2).is_none());
}

#[test]
fn test_validate_accepts_simple_module() {
    assert!(simple_module().validate().is_ok());
}

#[test]
fn test_validate_rejects_broken_modules() {
    let mut module = simple_module();
    module.orders.clear();
    assert!(matches!(module.validate(), Err(LoadError::Format(_))));

    let mut module = simple_module();
    module.orders = vec![3];
    assert!(matches!(module.validate(), Err(LoadError::Format(_))));

    let mut module = simple_module();
    module.orders = vec![ORDER_SKIP, ORDER_END];
    assert!(matches!(module.validate(), Err(LoadError::Format(_))));

    let mut module = simple_module();
    module.instruments[0].subs[0].sample = 5;
    assert!(matches!(module.validate(), Err(LoadError::Format(_))));

    let mut module = simple_module();
    module.restart = 1;
    assert!(matches!(module.validate(), Err(LoadError::Format(_))));

    let mut module = simple_module();
    module.samples[0].len = 32;
    assert!(matches!(module.validate(), Err(LoadError::Format(_))));
}

#[test]
fn test_order_markers() {
    let mut module = simple_module();
    module.orders = vec![ORDER_SKIP, 0, ORDER_END];
    assert_eq!(module.pattern_index_at(0), None);
    assert_eq!(module.pattern_index_at(1), Some(0));
    assert_eq!(module.pattern_index_at(2), None);
    assert_eq!(module.pattern_index_at(3), None);
    assert!(module.validate().is_ok());
}

// =============================================================================
// Registry and ProTracker loading
// =============================================================================

#[test]
fn test_load_protracker() {
    let data = build_mod(b"M.K.", 4, &[0, 1, 0]);
    let registry = LoaderRegistry::default();
    let module = registry.load(&data, LoadOptions::default()).expect("load");

    assert_eq!(module.name, "test song");
    assert_eq!(module.format, "ProTracker M.K.");
    assert_eq!(module.channels, 4);
    assert_eq!(module.orders, vec![0, 1, 0]);
    assert_eq!(module.num_patterns(), 2);
    assert_eq!(module.num_samples(), 31);
    assert_eq!(module.num_instruments(), 31);
    assert_eq!(module.restart, 0);

    let pans: Vec<u8> = module.channel_settings.iter().map(|c| c.pan).collect();
    assert_eq!(pans, vec![0x00, 0xFF, 0xFF, 0x00]);

    let event = module.event(0, 0, 0).expect("event");
    assert_eq!(event.key(), Some(60));
    assert_eq!(event.instrument, 1);
    assert_eq!(event.effect, Effect::SetSpeed(3));
    assert_eq!(
        module.event(0, 1, 1).map(|e| e.effect),
        Some(Effect::SetVolume(0x20))
    );
    assert_eq!(
        module.event(0, 63, 0).map(|e| e.effect),
        Some(Effect::PatternBreak(16))
    );

    let sample = &module.samples[0];
    assert_eq!(sample.name, "square");
    assert_eq!(sample.len, 32);
    assert!(sample.has_loop());
    assert_eq!((sample.loop_start, sample.loop_end), (8, 24));
    assert_eq!(sample.frame(0), 0.5);
    assert_eq!(module.instruments[0].volume, 48);
    assert_eq!(module.instruments[0].subs[0].finetune, -16);
    assert!(module.samples[1].data.is_empty());
}

#[test]
fn test_load_multichannel_tags() {
    let registry = LoaderRegistry::default();
    for (magic, channels) in [(b"8CHN", 8), (b"6CHN", 6), (b"12CH", 12), (b"FLT4", 4)] {
        let data = build_mod(magic, channels, &[0]);
        let module = registry.load(&data, LoadOptions::default()).expect("load");
        assert_eq!(module.channels, channels);
        assert_eq!(module.event(0, 0, 0).and_then(|e| e.key()), Some(60));
    }
}

#[test]
fn test_skip_samples_keeps_headers() {
    let data = build_mod(b"M.K.", 4, &[0]);
    let registry = LoaderRegistry::default();
    let module = registry
        .load(&data, LoadOptions { skip_samples: true })
        .expect("load");
    assert_eq!(module.samples[0].len, 32);
    assert_eq!(module.samples[0].data, SampleData::Empty);
    assert_eq!(module.samples[0].name, "square");
}

#[test]
fn test_truncated_sample_data_is_shortened() {
    let mut data = build_mod(b"M.K.", 4, &[0]);
    data.truncate(data.len() - 12);
    let module = LoaderRegistry::default()
        .load(&data, LoadOptions::default())
        .expect("load");
    assert_eq!(module.samples[0].len, 20);
    assert_eq!(module.samples[0].loop_end, 20);
}

#[test]
fn test_truncated_patterns_fail() {
    let mut data = build_mod(b"M.K.", 4, &[0]);
    data.truncate(1084 + 100);
    let err = LoaderRegistry::default()
        .load(&data, LoadOptions::default())
        .unwrap_err();
    assert!(matches!(err, LoadError::Truncated { .. }));
}

#[test]
fn test_bad_song_length_fails() {
    let mut data = build_mod(b"M.K.", 4, &[0]);
    data[950] = 0;
    let err = LoaderRegistry::default()
        .load(&data, LoadOptions::default())
        .unwrap_err();
    assert!(matches!(err, LoadError::Format(_)));
}

#[test]
fn test_unknown_data() {
    let registry = LoaderRegistry::default();
    assert!(matches!(
        registry.load(b"definitely not a module", LoadOptions::default()),
        Err(LoadError::UnknownFormat)
    ));
    assert!(matches!(
        registry.test(&[0u8; 2048]),
        Err(LoadError::UnknownFormat)
    ));
}

#[test]
fn test_probe_module() {
    let data = build_mod(b"M.K.", 4, &[0]);
    let info = LoaderRegistry::default().test(&data).expect("test");
    assert_eq!(info.name, "test song");
    assert_eq!(info.format, "ProTracker");
}

#[test]
fn test_format_list() {
    assert_eq!(LoaderRegistry::default().format_list(), vec!["ProTracker"]);
    assert!(LoaderRegistry::new().format_list().is_empty());
}

/// Prefix-stripping packer used to exercise the depack stage
struct Prefixed;

impl Depacker for Prefixed {
    fn name(&self) -> &'static str {
        "prefixed"
    }

    fn detect(&self, data: &[u8]) -> bool {
        data.starts_with(b"PAK!")
    }

    fn depack(&self, data: &[u8]) -> Result<Vec<u8>, LoadError> {
        if data.len() < 8 {
            return Err(LoadError::Format("short container".into()));
        }
        Ok(data[4..].to_vec())
    }
}

#[test]
fn test_depacker_runs_before_loaders() {
    let mut registry = LoaderRegistry::default();
    registry.register_depacker(Box::new(Prefixed));

    let mut packed = b"PAK!".to_vec();
    packed.extend(build_mod(b"M.K.", 4, &[0]));
    let module = registry.load(&packed, LoadOptions::default()).expect("load");
    assert_eq!(module.name, "test song");

    let err = registry.load(b"PAK!", LoadOptions::default()).unwrap_err();
    assert!(matches!(err, LoadError::Depack { packer: "prefixed", .. }));
}
