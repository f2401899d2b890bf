//! Sequence discovery and per-row timing table
//!
//! A scan drives the timing-only [`Sequencer`] through one pass of every
//! sequence. Each fetched row is recorded with its start time and tempo so
//! that seeking and position changes can resume with the right timing
//! without replaying audio.

use std::collections::BTreeMap;

use hashbrown::HashSet;
use modplay_module::{Module, PlayerFlags};
use tracing::{debug, warn};

use crate::MAX_SEQUENCES;
use crate::info::SequenceInfo;
use crate::sequencer::{Sequencer, Step};

/// Safety net against patterns that never finish a pass
const MAX_SCAN_TICKS: u64 = 1 << 24;

/// Timing of one fetched row
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct RowTiming {
    pub order: usize,
    pub row: usize,
    /// Start time of the row's first tick
    pub time_ms: f64,
    /// Ticks played before the row
    pub frames: u64,
    pub speed: u8,
    pub bpm: u8,
}

/// One pass of a sequence
#[derive(Debug, Clone)]
pub(crate) struct ScannedSequence {
    pub entry: usize,
    /// Where playback continues after running off the order list
    pub wrap_target: usize,
    pub duration_frames: u64,
    pub duration_ms: f64,
    /// Rows in play order
    pub rows: Vec<RowTiming>,
    /// Row start time in whole microseconds -> index into `rows`
    by_time: BTreeMap<u64, usize>,
    orders: HashSet<usize>,
}

impl ScannedSequence {
    fn new(entry: usize, wrap_target: usize) -> Self {
        Self {
            entry,
            wrap_target,
            duration_frames: 0,
            duration_ms: 0.0,
            rows: Vec::new(),
            by_time: BTreeMap::new(),
            orders: HashSet::new(),
        }
    }

    fn record(&mut self, timing: RowTiming) {
        self.by_time
            .insert(time_key(timing.time_ms), self.rows.len());
        self.orders.insert(timing.order);
        self.rows.push(timing);
    }

    /// Last row starting at or before `ms`, the first row for earlier times
    pub fn row_at_time(&self, ms: f64) -> Option<(usize, &RowTiming)> {
        let idx = self
            .by_time
            .range(..=time_key(ms.max(0.0)))
            .next_back()
            .map(|(_, &idx)| idx)
            .unwrap_or(0);
        self.rows.get(idx).map(|row| (idx, row))
    }

    /// First time the pass enters `order`
    pub fn first_row_of(&self, order: usize) -> Option<(usize, &RowTiming)> {
        self.rows.iter().enumerate().find(|(_, row)| row.order == order)
    }

    /// Orders played before row `idx`
    pub fn orders_before(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        self.rows[..idx.min(self.rows.len())].iter().map(|row| row.order)
    }

    pub fn contains(&self, order: usize) -> bool {
        self.orders.contains(&order)
    }

    pub fn info(&self) -> SequenceInfo {
        SequenceInfo {
            entry: self.entry,
            duration_frames: self.duration_frames,
            duration_ms: self.duration_ms,
        }
    }
}

fn time_key(ms: f64) -> u64 {
    (ms * 1000.0).round() as u64
}

/// Result of scanning a module
#[derive(Debug, Clone)]
pub(crate) struct ScanData {
    pub sequences: Vec<ScannedSequence>,
}

impl ScanData {
    /// Sequence whose pass plays `order`
    pub fn sequence_of(&self, order: usize) -> Option<usize> {
        self.sequences.iter().position(|seq| seq.contains(order))
    }

    pub fn sequence(&self, idx: usize) -> Option<&ScannedSequence> {
        self.sequences.get(idx)
    }

    pub fn infos(&self) -> Vec<SequenceInfo> {
        self.sequences.iter().map(ScannedSequence::info).collect()
    }
}

/// Scan every sequence of a module
pub(crate) fn scan(module: &Module, flags: PlayerFlags) -> ScanData {
    let mut sequences: Vec<ScannedSequence> = Vec::new();

    while sequences.len() < MAX_SEQUENCES {
        let entry = (0..module.len()).find(|&order| {
            module.pattern_index_at(order).is_some()
                && !sequences.iter().any(|seq| seq.contains(order))
        });
        let Some(entry) = entry else {
            break;
        };
        // Only the first sequence honours the module's restart position
        let wrap_target = if sequences.is_empty() {
            module.restart
        } else {
            entry
        };
        sequences.push(scan_sequence(module, flags, entry, wrap_target));
    }

    debug!(
        sequences = sequences.len(),
        duration_ms = sequences.first().map(|s| s.duration_ms),
        "scan complete"
    );
    ScanData { sequences }
}

fn scan_sequence(
    module: &Module,
    flags: PlayerFlags,
    entry: usize,
    wrap_target: usize,
) -> ScannedSequence {
    let mut result = ScannedSequence::new(entry, wrap_target);
    let mut seq = Sequencer::new(module, entry, wrap_target);

    loop {
        match seq.next_tick(module, flags, 1) {
            Step::Tick { row_start, .. } => {
                if row_start {
                    result.record(RowTiming {
                        order: seq.order,
                        row: seq.row,
                        time_ms: seq.time_ms,
                        frames: seq.frames - 1,
                        speed: seq.speed,
                        bpm: seq.bpm,
                    });
                }
                if seq.frames >= MAX_SCAN_TICKS {
                    warn!(entry, "sequence scan did not finish, truncating");
                    result.duration_ms = seq.time_ms + seq.tick_ms();
                    break;
                }
            }
            Step::End => {
                result.duration_ms = seq.time_ms;
                break;
            }
        }
    }

    result.duration_frames = seq.frames;
    result
}

#[cfg(test)]
mod tests {
    use modplay_module::{Effect, ORDER_END};

    use super::*;
    use crate::fixtures::{fx, set, song};

    #[test]
    fn test_single_sequence() {
        let module = song(1, 64, 2, &[0, 1]);
        let data = scan(&module, PlayerFlags::empty());
        assert_eq!(data.sequences.len(), 1);

        let seq = &data.sequences[0];
        assert_eq!(seq.entry, 0);
        assert_eq!(seq.duration_frames, 128 * 6);
        assert_eq!(seq.duration_ms, 128.0 * 6.0 * 20.0);
        assert_eq!(seq.rows.len(), 128);
        assert_eq!(seq.rows[64].order, 1);
        assert_eq!(seq.rows[64].time_ms, 64.0 * 120.0);
        assert_eq!(seq.rows[64].frames, 64 * 6);
    }

    #[test]
    fn test_hidden_orders_become_sequences() {
        // Order 1 ends the first song, orders 2-3 are a second song
        let module = song(1, 16, 3, &[0, ORDER_END, 1, 2]);
        let data = scan(&module, PlayerFlags::empty());
        assert_eq!(data.sequences.len(), 2);
        assert_eq!(data.sequences[1].entry, 2);
        assert_eq!(data.sequences[1].duration_frames, 32 * 6);
        assert_eq!(data.sequence_of(3), Some(1));
        assert_eq!(data.sequence_of(0), Some(0));
        assert_eq!(data.sequence_of(1), None);
    }

    #[test]
    fn test_skipped_by_jump_becomes_sequence() {
        let mut module = song(1, 16, 3, &[0, 1, 2]);
        set(&mut module, 0, 15, 0, fx(Effect::PositionJump(2)));
        let data = scan(&module, PlayerFlags::empty());
        assert_eq!(data.sequences.len(), 2);
        assert_eq!(data.sequences[0].duration_frames, 32 * 6);
        assert_eq!(data.sequences[1].entry, 1);
        assert_eq!(data.sequence_of(1), Some(1));
    }

    #[test]
    fn test_row_at_time() {
        let module = song(1, 64, 1, &[0]);
        let data = scan(&module, PlayerFlags::empty());
        let seq = &data.sequences[0];

        let (idx, row) = seq.row_at_time(0.0).expect("row");
        assert_eq!((idx, row.row), (0, 0));

        // Each row lasts 120 ms
        let (_, row) = seq.row_at_time(250.0).expect("row");
        assert_eq!(row.row, 2);
        assert_eq!(row.time_ms, 240.0);

        let (_, row) = seq.row_at_time(1e9).expect("row");
        assert_eq!(row.row, 63);

        let (_, row) = seq.row_at_time(-5.0).expect("row");
        assert_eq!(row.row, 0);
    }

    #[test]
    fn test_tempo_changes_are_recorded() {
        let mut module = song(1, 8, 1, &[0]);
        set(&mut module, 0, 4, 0, fx(Effect::SetSpeed(3)));
        let data = scan(&module, PlayerFlags::empty());
        let seq = &data.sequences[0];
        assert_eq!(seq.rows[3].speed, 6);
        assert_eq!(seq.rows[4].speed, 3);
        assert_eq!(seq.duration_frames, 4 * 6 + 4 * 3);
    }

    #[test]
    fn test_first_row_of_and_history() {
        let module = song(1, 4, 3, &[0, 1, 2]);
        let data = scan(&module, PlayerFlags::empty());
        let seq = &data.sequences[0];
        let (idx, row) = seq.first_row_of(2).expect("order 2");
        assert_eq!(idx, 8);
        assert_eq!(row.time_ms, 8.0 * 120.0);
        let before: Vec<usize> = seq.orders_before(idx).collect();
        assert!(before.contains(&0) && before.contains(&1) && !before.contains(&2));
        assert!(seq.first_row_of(5).is_none());
    }
}
