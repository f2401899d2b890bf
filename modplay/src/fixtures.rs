//! In-memory modules for unit tests

use modplay_module::{Effect, Event, Instrument, Module, Sample};

/// Module with `patterns` empty patterns of `rows` rows and the given order list
pub fn song(channels: usize, rows: usize, patterns: usize, orders: &[u8]) -> Module {
    let mut module = Module::new("fixture", "test", channels);
    for _ in 0..patterns {
        module.push_pattern(rows, vec![Vec::new(); channels]);
    }
    module.orders = orders.to_vec();
    module
}

/// Same as [`song`] with one looped square-wave instrument
pub fn song_with_square(channels: usize, rows: usize, patterns: usize, orders: &[u8]) -> Module {
    let mut module = song(channels, rows, patterns, orders);
    let data: Vec<i8> = (0..64).map(|i| if i < 32 { 96 } else { -96 }).collect();
    module.samples.push(Sample::from_i8("square", data).looped(0, 64));
    module.instruments.push(Instrument::with_sample("square", 0, 64));
    module
}

/// Overwrite one event
pub fn set(module: &mut Module, pattern: usize, row: usize, channel: usize, event: Event) {
    let track = module.patterns[pattern].tracks[channel];
    module.tracks[track].events[row] = event;
}

/// Event carrying only an effect
pub fn fx(effect: Effect) -> Event {
    Event {
        effect,
        ..Default::default()
    }
}
