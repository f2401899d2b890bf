//! ProTracker MOD loader (M.K. and multi-channel variants)

use std::io::{Cursor, Read, Seek, SeekFrom};

use tracing::{trace, warn};

use crate::loader::{FormatLoader, LoadError, LoadOptions};
use crate::pattern::Event;
use crate::sample::{Sample, SampleData};
use crate::{ChannelSettings, Instrument, Module};

/// Offset of the format tag
const MAGIC_OFFSET: usize = 1080;

/// Size of the fixed header including the tag
const HEADER_SIZE: usize = 1084;

/// Number of sample slots
const NUM_SAMPLES: usize = 31;

/// Rows per pattern
const ROWS: usize = 64;

/// Amiga period of C-4 scaled to the key numbering (period * 16 at key 0)
const PERIOD_BASE: f64 = 13696.0;

/// Loader for 31-sample ProTracker modules
#[derive(Debug, Clone, Copy, Default)]
pub struct ProTrackerLoader;

/// Channel count announced by the format tag
fn channels_for_magic(magic: &[u8]) -> Option<usize> {
    match magic {
        b"M.K." | b"M!K!" | b"M&K!" | b"FLT4" | b"4CHN" | b"N.T." => Some(4),
        b"6CHN" => Some(6),
        b"8CHN" | b"FLT8" | b"OCTA" | b"CD81" => Some(8),
        [a, b, b'C', b'H'] if a.is_ascii_digit() && b.is_ascii_digit() => {
            let n = ((a - b'0') * 10 + (b - b'0')) as usize;
            (1..=32).contains(&n).then_some(n)
        }
        [a, b'C', b'H', b'N'] if a.is_ascii_digit() => {
            let n = (a - b'0') as usize;
            (1..=9).contains(&n).then_some(n)
        }
        _ => None,
    }
}

/// Convert an Amiga period to a 1-based note value (0 = no note)
pub(crate) fn period_to_note(period: u16) -> u8 {
    if period == 0 {
        return 0;
    }
    let key = (12.0 * (PERIOD_BASE / period as f64).log2()).round() as i32;
    (key.clamp(0, 120) + 1) as u8
}

fn read_string(bytes: &[u8]) -> String {
    let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..len]).trim_end().to_string()
}

fn read_exact(cursor: &mut Cursor<&[u8]>, buf: &mut [u8]) -> Result<(), LoadError> {
    let offset = cursor.position();
    cursor
        .read_exact(buf)
        .map_err(|_| LoadError::Truncated { offset })
}

fn read_u8(cursor: &mut Cursor<&[u8]>) -> Result<u8, LoadError> {
    let mut buf = [0u8; 1];
    read_exact(cursor, &mut buf)?;
    Ok(buf[0])
}

fn read_u16_be(cursor: &mut Cursor<&[u8]>) -> Result<u16, LoadError> {
    let mut buf = [0u8; 2];
    read_exact(cursor, &mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

struct SampleHeader {
    name: String,
    len: usize,
    finetune: i8,
    volume: u8,
    loop_start: usize,
    loop_len: usize,
}

fn read_sample_header(cursor: &mut Cursor<&[u8]>) -> Result<SampleHeader, LoadError> {
    let mut name = [0u8; 22];
    read_exact(cursor, &mut name)?;
    let len = read_u16_be(cursor)? as usize * 2;
    let finetune = ((read_u8(cursor)? << 4) as i8) >> 4;
    let volume = read_u8(cursor)?.min(64);
    let loop_start = read_u16_be(cursor)? as usize * 2;
    let loop_len = read_u16_be(cursor)? as usize * 2;
    Ok(SampleHeader {
        name: read_string(&name),
        len,
        finetune,
        volume,
        loop_start,
        loop_len,
    })
}

fn decode_event(raw: [u8; 4]) -> Event {
    let instrument = (raw[0] & 0xF0) | (raw[2] >> 4);
    let period = (((raw[0] & 0x0F) as u16) << 8) | raw[1] as u16;
    Event::from_raw(
        period_to_note(period),
        instrument,
        0,
        raw[2] & 0x0F,
        raw[3],
        0,
        0,
    )
}

impl FormatLoader for ProTrackerLoader {
    fn name(&self) -> &'static str {
        "ProTracker"
    }

    fn probe(&self, data: &[u8]) -> Option<String> {
        if data.len() < HEADER_SIZE {
            return None;
        }
        channels_for_magic(&data[MAGIC_OFFSET..HEADER_SIZE])?;
        Some(read_string(&data[0..20]))
    }

    fn load(&self, data: &[u8], options: LoadOptions) -> Result<Module, LoadError> {
        if data.len() < HEADER_SIZE {
            return Err(LoadError::Truncated {
                offset: data.len() as u64,
            });
        }
        let magic = &data[MAGIC_OFFSET..HEADER_SIZE];
        let channels = channels_for_magic(magic)
            .ok_or_else(|| LoadError::Format("unknown ProTracker tag".into()))?;

        let mut cursor = Cursor::new(data);
        let mut title = [0u8; 20];
        read_exact(&mut cursor, &mut title)?;

        let mut headers = Vec::with_capacity(NUM_SAMPLES);
        for _ in 0..NUM_SAMPLES {
            headers.push(read_sample_header(&mut cursor)?);
        }

        let length = read_u8(&mut cursor)? as usize;
        let restart = read_u8(&mut cursor)? as usize;
        let mut orders = [0u8; 128];
        read_exact(&mut cursor, &mut orders)?;
        if length == 0 || length > 128 {
            return Err(LoadError::Format(format!("song length {length} out of range")));
        }

        let num_patterns = orders.iter().map(|&o| o as usize).max().unwrap_or(0) + 1;
        let tag = String::from_utf8_lossy(magic).to_string();
        let mut module = Module::new(read_string(&title), format!("ProTracker {tag}"), channels);
        module.orders = orders[..length].to_vec();
        // Old trackers store 0x7F or 0x78 here; anything past the song means "start over"
        module.restart = if restart < length { restart } else { 0 };

        // Amiga hard panning: L R R L
        for (ch, settings) in module.channel_settings.iter_mut().enumerate() {
            *settings = ChannelSettings {
                pan: if matches!(ch % 4, 0 | 3) { 0x00 } else { 0xFF },
                ..Default::default()
            };
        }

        cursor.seek(SeekFrom::Start(HEADER_SIZE as u64))?;
        for _ in 0..num_patterns {
            let mut columns = vec![Vec::with_capacity(ROWS); channels];
            for _ in 0..ROWS {
                for column in columns.iter_mut() {
                    let mut raw = [0u8; 4];
                    read_exact(&mut cursor, &mut raw)?;
                    column.push(decode_event(raw));
                }
            }
            module.push_pattern(ROWS, columns);
        }
        trace!(patterns = num_patterns, channels, "ProTracker patterns read");

        for (idx, header) in headers.into_iter().enumerate() {
            let mut sample = Sample {
                name: header.name.clone(),
                len: header.len,
                ..Default::default()
            };

            if header.len > 0 {
                let start = cursor.position() as usize;
                let available = data.len().saturating_sub(start).min(header.len);
                if available < header.len {
                    warn!(sample = idx, "sample data truncated");
                    sample.len = available;
                }
                if !options.skip_samples {
                    let pcm = data[start..start + available]
                        .iter()
                        .map(|&b| b as i8)
                        .collect();
                    sample.data = SampleData::Bits8(pcm);
                }
                cursor.seek(SeekFrom::Current(available as i64))?;
            }

            if header.loop_len > 2 && header.loop_start < sample.len {
                let end = (header.loop_start + header.loop_len).min(sample.len);
                sample = sample.looped(header.loop_start, end);
            }

            let mut instrument = Instrument::with_sample(header.name, idx, header.volume);
            if let Some(sub) = instrument.subs.first_mut() {
                // 1/8 semitone steps to 1/128
                sub.finetune = header.finetune.saturating_mul(16);
                sub.pan = None;
            }
            module.instruments.push(instrument);
            module.samples.push(sample);
        }

        Ok(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channels_for_magic() {
        assert_eq!(channels_for_magic(b"M.K."), Some(4));
        assert_eq!(channels_for_magic(b"6CHN"), Some(6));
        assert_eq!(channels_for_magic(b"FLT8"), Some(8));
        assert_eq!(channels_for_magic(b"16CH"), Some(16));
        assert_eq!(channels_for_magic(b"99CH"), None);
        assert_eq!(channels_for_magic(b"XM!!"), None);
    }

    #[test]
    fn test_period_to_note() {
        assert_eq!(period_to_note(0), 0);
        // C-2 in ProTracker numbering plays at the C-5 reference rate
        assert_eq!(period_to_note(428), 61);
        assert_eq!(period_to_note(856), 49);
        assert_eq!(period_to_note(214), 73);
        // Finetuned periods round to the nearest key
        assert_eq!(period_to_note(431), 61);
    }

    #[test]
    fn test_decode_event() {
        // Sample 0x13, period 428, effect C20
        let event = decode_event([0x11, 0xAC, 0x3C, 0x20]);
        assert_eq!(event.instrument, 0x13);
        assert_eq!(event.note, 61);
        assert_eq!(event.effect, crate::Effect::SetVolume(0x20));
    }
}
