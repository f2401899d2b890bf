//! ProTracker module images for integration tests

#![allow(dead_code)]

/// Amiga period of C-2 (plays key 60 at the reference rate)
pub const C2: u16 = 428;

/// Period of G-2
pub const G2: u16 = 285;

const HEADER_SIZE: usize = 1084;
const CHANNELS: usize = 4;
const ROWS: usize = 64;

/// Encode one pattern cell
pub fn cell(period: u16, sample: u8, effect: u8, param: u8) -> [u8; 4] {
    [
        (sample & 0xF0) | ((period >> 8) as u8 & 0x0F),
        (period & 0xFF) as u8,
        ((sample & 0x0F) << 4) | (effect & 0x0F),
        param,
    ]
}

/// Builder for 4-channel M.K. modules with one looped square-wave sample
#[derive(Debug, Clone)]
pub struct ModBuilder {
    title: String,
    orders: Vec<u8>,
    patterns: Vec<Vec<u8>>,
}

impl ModBuilder {
    /// Module with `patterns` empty patterns played in `orders`
    pub fn new(patterns: usize, orders: &[u8]) -> Self {
        Self {
            title: "integration".to_string(),
            orders: orders.to_vec(),
            patterns: vec![vec![0u8; ROWS * CHANNELS * 4]; patterns],
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    /// Write a cell at pattern/row/channel
    pub fn cell(mut self, pattern: usize, row: usize, channel: usize, cell: [u8; 4]) -> Self {
        let off = (row * CHANNELS + channel) * 4;
        self.patterns[pattern][off..off + 4].copy_from_slice(&cell);
        self
    }

    /// Play `period` with sample 1 at pattern/row/channel
    pub fn note(self, pattern: usize, row: usize, channel: usize, period: u16) -> Self {
        self.cell(pattern, row, channel, cell(period, 1, 0, 0))
    }

    pub fn build(&self) -> Vec<u8> {
        let mut data = vec![0u8; HEADER_SIZE];
        let title = self.title.as_bytes();
        let n = title.len().min(20);
        data[..n].copy_from_slice(&title[..n]);

        // Sample 1: 32 words, volume 64, loop over all of it
        let hdr = 20;
        data[hdr..hdr + 6].copy_from_slice(b"square");
        data[hdr + 22..hdr + 24].copy_from_slice(&32u16.to_be_bytes());
        data[hdr + 25] = 64;
        data[hdr + 26..hdr + 28].copy_from_slice(&0u16.to_be_bytes());
        data[hdr + 28..hdr + 30].copy_from_slice(&32u16.to_be_bytes());

        data[950] = self.orders.len() as u8;
        data[951] = 0x7F;
        data[952..952 + self.orders.len()].copy_from_slice(&self.orders);
        data[1080..1084].copy_from_slice(b"M.K.");

        let used = self.orders.iter().copied().max().unwrap_or(0) as usize + 1;
        for pattern in self.patterns.iter().take(used) {
            data.extend_from_slice(pattern);
        }
        data.extend((0..64).map(|i| if i < 32 { 0x60u8 } else { 0xA0 }));
        data
    }
}

/// Two patterns, notes on channels 0 and 1 at the start of each
pub fn two_pattern_song() -> Vec<u8> {
    ModBuilder::new(2, &[0, 1])
        .note(0, 0, 0, C2)
        .note(0, 0, 1, G2)
        .note(1, 0, 0, G2)
        .build()
}

/// Frames of one 125 BPM tick
pub fn tick_frames(rate: u32) -> usize {
    rate as usize * 5 / 2 / 125
}

/// Interleaved 16-bit stereo samples of a native-endian buffer
pub fn stereo_samples(buffer: &[u8]) -> Vec<(i16, i16)> {
    buffer
        .chunks_exact(4)
        .map(|b| {
            (
                i16::from_ne_bytes([b[0], b[1]]),
                i16::from_ne_bytes([b[2], b[3]]),
            )
        })
        .collect()
}

pub fn is_silent(buffer: &[u8]) -> bool {
    buffer.iter().all(|&b| b == 0)
}
