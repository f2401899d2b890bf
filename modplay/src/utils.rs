//! Pitch, waveform and panning helpers
//!
//! Pitch runs on a linear period scale: 64 period units per semitone,
//! 768 per octave, with key 60 (C-5) at period 3840 playing at 8363 Hz.

/// 64-point quarter-sine lookup table for vibrato/tremolo
/// Values represent sin(i * π/128) * 127 for i = 0..63
/// This gives 256 effective positions when mirrored across 4 quadrants
pub const SINE_LUT_64: [i8; 64] = [
    0, 2, 4, 6, 8, 10, 12, 14, 16, 18, 20, 22, 24, 26, 28, 30, 32, 34, 36, 38, 40, 42, 44, 46, 48,
    50, 52, 54, 56, 58, 60, 62, 64, 66, 68, 70, 72, 74, 76, 78, 80, 82, 84, 86, 88, 89, 91, 93, 95,
    96, 98, 100, 101, 103, 104, 106, 107, 108, 110, 111, 112, 113, 114, 115,
];

/// 16-point quarter-sine used for constant-power panning
pub const SINE_LUT: [i8; 16] = [
    0, 12, 24, 37, 48, 60, 71, 81, 90, 98, 106, 112, 118, 122, 125, 127,
];

/// 2^(i/768) for one octave of linear periods
///
/// Entry 768 is included for interpolation at the boundary.
pub const LINEAR_FREQ_TABLE: [f32; 769] = {
    let mut table = [0.0f32; 769];
    let mut i = 0;
    while i < 769 {
        // e^(x ln 2) by Taylor series, const-evaluable
        let x = i as f64 / 768.0;
        let ln2 = 0.693147180559945309417232121458176568;
        let t = x * ln2;
        let e_t = 1.0
            + t * (1.0
                + t * (0.5
                    + t * (0.16666666666666666
                        + t * (0.041666666666666664
                            + t * (0.008333333333333333
                                + t * (0.001388888888888889 + t * 0.0001984126984126984))))));
        table[i] = e_t as f32;
        i += 1;
    }
    table
};

/// Period units per semitone
pub const PERIOD_SEMITONE: f32 = 64.0;

/// Period of key 0 with no finetune
const PERIOD_BASE: f32 = 7680.0;

/// Period that plays at [`C5_RATE`]
const PERIOD_C5: f32 = 3840.0;

/// Playback rate of key 60 (C-5)
pub const C5_RATE: f32 = 8363.0;

/// Samples per tick at the given tempo
///
/// Tick length is 2.5 / bpm seconds.
pub fn samples_per_tick(sample_rate: u32, bpm: u8) -> usize {
    if bpm == 0 {
        return sample_rate as usize;
    }
    (sample_rate as usize * 5 / 2) / bpm as usize
}

/// Tick length in milliseconds
pub fn tick_ms(bpm: u8) -> f64 {
    2500.0 / bpm.max(1) as f64
}

/// Convert a 0-based key (plus transpose already applied) to a linear period
///
/// Finetune is in 1/128 semitone.
pub fn note_to_period(key: i16, finetune: i8) -> f32 {
    let key = key.clamp(0, 120);
    let period = PERIOD_BASE - key as f32 * PERIOD_SEMITONE - finetune as f32 / 2.0;
    period.max(1.0)
}

/// Convert a linear period to a playback rate in Hz
///
/// Uses [`LINEAR_FREQ_TABLE`] for the fractional octave, no `powf` per call.
#[inline]
pub fn period_to_frequency(period: f32) -> f32 {
    if period <= 0.0 {
        return 0.0;
    }

    let diff = PERIOD_C5 - period;
    let octaves = (diff / 768.0).floor();
    let frac = diff - (octaves * 768.0);

    let idx = (frac as usize).min(767);
    let t = frac - idx as f32;
    let freq_frac = LINEAR_FREQ_TABLE[idx] * (1.0 - t) + LINEAR_FREQ_TABLE[idx + 1] * t;

    let octave_scale = if octaves >= 0.0 {
        (1u32 << (octaves as u32).min(31)) as f32
    } else {
        1.0 / (1u32 << ((-octaves) as u32).min(31)) as f32
    };

    C5_RATE * freq_frac * octave_scale
}

/// Waveform value for vibrato/tremolo in -1.0..=1.0
///
/// Waveform types:
/// - 0: Sine (quarter table with quadrant mirroring)
/// - 1: Ramp down
/// - 2: Square
/// - 3: Random (deterministic)
pub fn get_waveform_value(waveform: u8, position: u8) -> f32 {
    match waveform & 0x03 {
        0 => {
            let quarter = position >> 6;
            let idx = (position & 0x3F) as usize;
            let val = match quarter {
                0 => SINE_LUT_64[idx],
                1 => SINE_LUT_64[63 - idx],
                2 => -SINE_LUT_64[idx],
                _ => -SINE_LUT_64[63 - idx],
            };
            val as f32 / 115.0
        }
        1 => (128i16 - position as i16) as f32 / 128.0,
        2 => {
            if position < 128 {
                1.0
            } else {
                -1.0
            }
        }
        _ => {
            let x = position.wrapping_mul(0x9E) ^ 0x5C;
            (x as f32 / 127.5) - 1.0
        }
    }
}

/// Constant-power pan gains for pan in -1.0..=1.0
///
/// Right reads the sine table forward, left reads it reversed (cosine).
#[inline]
pub fn fast_pan_gains(pan: f32) -> (f32, f32) {
    let pos = (pan.clamp(-1.0, 1.0) + 1.0) * 7.5;
    let idx = (pos as usize).min(14);
    let frac = pos - idx as f32;

    let sin_val = SINE_LUT[idx] as f32 * (1.0 - frac) + SINE_LUT[idx + 1] as f32 * frac;
    let cos_val = SINE_LUT[15 - idx] as f32 * (1.0 - frac) + SINE_LUT[14 - idx] as f32 * frac;

    (cos_val / 127.0, sin_val / 127.0)
}

/// Map a 0-255 pan byte to -1.0..=1.0
pub fn pan_to_f32(pan: u8) -> f32 {
    (pan as f32 - 128.0) / 128.0
}

/// Map -1.0..=1.0 back to a 0-255 pan byte
pub fn pan_to_u8(pan: f32) -> u8 {
    (pan.clamp(-1.0, 1.0) * 128.0 + 128.0).round().clamp(0.0, 255.0) as u8
}

/// Catmull-Rom interpolation between `p1` and `p2`
#[inline]
pub fn cubic(p0: f32, p1: f32, p2: f32, p3: f32, t: f32) -> f32 {
    let a = -0.5 * p0 + 1.5 * p1 - 1.5 * p2 + 0.5 * p3;
    let b = p0 - 2.5 * p1 + 2.0 * p2 - 0.5 * p3;
    let c = -0.5 * p0 + 0.5 * p2;
    ((a * t + b) * t + c) * t + p1
}
