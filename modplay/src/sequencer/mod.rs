//! Timing-only playback cursor
//!
//! The sequencer walks order/row/frame, interprets the effects that change
//! timing or position (speed, tempo, jumps, breaks, pattern loops, pattern
//! delay) and detects when playback wraps. It never touches audio, so the
//! scan and the real playback share this exact code path.
//!
//! A pass wraps when the cursor re-enters an order already played in the
//! current pass, or runs past the end of the order list.

use hashbrown::HashSet;
use modplay_module::{Effect, Module, ORDER_END, ORDER_SKIP, PlayerFlags};

use crate::utils::tick_ms;


/// Tempo used for tick length in vblank mode
pub(crate) const VBLANK_BPM: u8 = 125;

/// Outcome of advancing the cursor by one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// A tick is ready to play
    Tick {
        /// First tick of a freshly fetched row (events must be applied)
        row_start: bool,
        /// The cursor wrapped back into already played orders
        wrapped: bool,
    },
    /// The loop limit was reached, nothing to play
    End,
}

/// Pattern loop state of one channel
#[derive(Debug, Clone, Copy, Default)]
struct PatternLoop {
    start: usize,
    count: u8,
}

/// Playback cursor
#[derive(Debug, Clone)]
pub(crate) struct Sequencer {
    /// Current order position
    pub order: usize,
    /// Pattern index at `order`
    pub pattern: usize,
    /// Current row
    pub row: usize,
    /// Tick within the row
    pub frame: usize,
    /// Ticks per row
    pub speed: u8,
    /// Tempo (BPM)
    pub bpm: u8,
    /// Completed passes
    pub loop_count: u32,
    /// Start time of the current tick
    pub time_ms: f64,
    /// Ticks played so far, including the current one
    pub frames: u64,

    entry: usize,
    wrap_target: usize,
    visited: HashSet<usize>,
    primed: bool,
    vblank: bool,

    // Pending row effects
    jump: Option<usize>,
    break_row: Option<usize>,
    loop_jump: Option<usize>,
    delay: u8,
    loops: Vec<PatternLoop>,
}

impl Sequencer {
    /// Cursor at the start of a sequence
    ///
    /// `entry` must be a playable order. `wrap_target` is where playback
    /// continues after running off the end of the order list.
    pub fn new(module: &Module, entry: usize, wrap_target: usize) -> Self {
        let mut seq = Self {
            order: entry,
            pattern: 0,
            row: 0,
            frame: 0,
            speed: module.speed,
            bpm: module.bpm,
            loop_count: 0,
            time_ms: 0.0,
            frames: 0,
            entry,
            wrap_target,
            visited: HashSet::new(),
            primed: false,
            vblank: false,
            jump: None,
            break_row: None,
            loop_jump: None,
            delay: 0,
            loops: vec![PatternLoop::default(); module.channels],
        };
        seq.reset(module);
        seq
    }

    /// Return to the sequence entry point with the module's initial timing
    pub fn reset(&mut self, module: &Module) {
        self.order = self.entry;
        self.pattern = module.pattern_index_at(self.entry).unwrap_or(0);
        self.row = 0;
        self.frame = 0;
        self.speed = module.speed;
        self.bpm = module.bpm;
        self.loop_count = 0;
        self.time_ms = 0.0;
        self.frames = 0;
        self.visited.clear();
        self.visited.insert(self.entry);
        self.primed = false;
        self.clear_pending();
    }

    /// Place the cursor at the start of a row with known timing
    ///
    /// `visited` lists the orders already played in the current pass.
    #[allow(clippy::too_many_arguments)]
    pub fn jump_to(
        &mut self,
        module: &Module,
        order: usize,
        row: usize,
        speed: u8,
        bpm: u8,
        time_ms: f64,
        frames: u64,
        visited: impl IntoIterator<Item = usize>,
    ) {
        self.order = order;
        self.pattern = module.pattern_index_at(order).unwrap_or(0);
        self.row = if row < self.rows(module) { row } else { 0 };
        self.frame = 0;
        self.speed = speed;
        self.bpm = bpm;
        self.time_ms = time_ms;
        self.frames = frames;
        self.visited.clear();
        self.visited.extend(visited);
        self.visited.insert(order);
        self.primed = false;
        self.clear_pending();
    }

    fn clear_pending(&mut self) {
        self.jump = None;
        self.break_row = None;
        self.loop_jump = None;
        self.delay = 0;
        self.loops.fill(PatternLoop::default());
    }

    pub fn entry(&self) -> usize {
        self.entry
    }

    /// Rows in the current pattern
    pub fn rows(&self, module: &Module) -> usize {
        module.patterns.get(self.pattern).map_or(0, |p| p.rows)
    }

    /// Tempo that sets the tick length
    pub fn tick_bpm(&self) -> u8 {
        if self.vblank { VBLANK_BPM } else { self.bpm }
    }

    /// Length of the current tick
    pub fn tick_ms(&self) -> f64 {
        tick_ms(self.tick_bpm())
    }

    /// Advance to the next tick
    ///
    /// `limit` is the number of passes to play, 0 for no limit.
    pub fn next_tick(&mut self, module: &Module, flags: PlayerFlags, limit: u32) -> Step {
        if !self.primed {
            self.vblank = flags.contains(PlayerFlags::VBLANK);
            self.primed = true;
            self.fetch_row(module);
            return self.played(true, false);
        }

        self.time_ms += self.tick_ms();
        self.vblank = flags.contains(PlayerFlags::VBLANK);

        self.frame += 1;
        if self.frame < self.speed as usize {
            return self.played(false, false);
        }

        // End of row
        self.frame = 0;
        if self.delay > 0 {
            self.delay -= 1;
            return self.played(false, false);
        }

        let mut wrapped = false;
        if let Some(start) = self.loop_jump.take() {
            self.row = start;
            self.jump = None;
            self.break_row = None;
        } else if self.jump.is_some() || self.break_row.is_some() {
            let target = self.jump.take().unwrap_or(self.order + 1);
            let row = self.break_row.take().unwrap_or(0);
            wrapped = self.enter_order(module, target, row);
        } else {
            self.row += 1;
            if self.row >= self.rows(module) {
                wrapped = self.enter_order(module, self.order + 1, 0);
            }
        }

        if wrapped {
            self.loop_count += 1;
            if limit > 0 && self.loop_count >= limit {
                return Step::End;
            }
        }

        self.fetch_row(module);
        self.played(true, wrapped)
    }

    fn played(&mut self, row_start: bool, wrapped: bool) -> Step {
        self.frames += 1;
        Step::Tick { row_start, wrapped }
    }

    /// Move to an order, skipping markers; returns true if this wrapped
    fn enter_order(&mut self, module: &Module, target: usize, row: usize) -> bool {
        let len = module.len();
        let mut target = target;
        let mut wrapped = false;

        for attempt in 0..3 {
            while target < len && module.orders[target] == ORDER_SKIP {
                target += 1;
            }
            if target < len && module.orders[target] != ORDER_END {
                break;
            }
            // Ran off the song: restart position first, entry point if that is unplayable too
            wrapped = true;
            target = if attempt == 0 {
                self.wrap_target
            } else {
                self.entry
            };
        }

        if !wrapped && self.visited.contains(&target) {
            wrapped = true;
        }
        if wrapped {
            self.visited.clear();
        }
        self.visited.insert(target);

        self.order = target;
        self.pattern = module.pattern_index_at(target).unwrap_or(0);
        self.row = if row < self.rows(module) { row } else { 0 };
        self.loops.fill(PatternLoop::default());
        wrapped
    }

    /// Interpret the timing effects of the current row
    fn fetch_row(&mut self, module: &Module) {
        for ch in 0..module.channels {
            let Some(event) = module.event(self.pattern, self.row, ch) else {
                continue;
            };
            for effect in event.effects() {
                match effect {
                    Effect::SetSpeed(speed) if speed > 0 => self.speed = speed,
                    Effect::SetTempo(bpm) if bpm > 0 => {
                        if self.vblank {
                            self.speed = bpm;
                        } else {
                            self.bpm = bpm;
                        }
                    }
                    Effect::PositionJump(order) => self.jump = Some(order as usize),
                    Effect::PatternBreak(row) => self.break_row = Some(row as usize),
                    Effect::PatternLoop(0) => self.loops[ch].start = self.row,
                    Effect::PatternLoop(count) => {
                        let state = &mut self.loops[ch];
                        if state.count == 0 {
                            state.count = count;
                            self.loop_jump = Some(state.start);
                        } else {
                            state.count -= 1;
                            if state.count > 0 {
                                self.loop_jump = Some(state.start);
                            } else {
                                state.start = self.row + 1;
                            }
                        }
                    }
                    Effect::PatternDelay(rows) if self.delay == 0 => self.delay = rows,
                    _ => {}
                }
            }
        }
    }
}
