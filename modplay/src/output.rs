//! PCM output encoding

use crate::OutputFormat;

/// Encode an interleaved stereo float mix into `out`
///
/// Values are clamped to full scale. Mono output averages both sides;
/// 16-bit samples are written in native byte order.
pub(crate) fn encode(mix: &[f32], format: OutputFormat, scratch: &mut Vec<i16>, out: &mut Vec<u8>) {
    out.clear();
    let mono = format.contains(OutputFormat::MONO);
    let unsigned = format.contains(OutputFormat::UNSIGNED);

    let values = mix
        .chunks_exact(2)
        .flat_map(|lr| {
            if mono {
                [Some((lr[0] + lr[1]) * 0.5), None]
            } else {
                [Some(lr[0]), Some(lr[1])]
            }
        })
        .flatten()
        .map(|v| v.clamp(-1.0, 1.0));

    if format.contains(OutputFormat::EIGHT_BIT) {
        out.extend(values.map(|v| {
            let s = (v * 127.0).round() as i8;
            if unsigned { (s as u8) ^ 0x80 } else { s as u8 }
        }));
    } else {
        scratch.clear();
        scratch.extend(values.map(|v| {
            let s = (v * 32767.0).round() as i16;
            if unsigned { ((s as u16) ^ 0x8000) as i16 } else { s }
        }));
        out.extend_from_slice(bytemuck::cast_slice(scratch.as_slice()));
    }
}
