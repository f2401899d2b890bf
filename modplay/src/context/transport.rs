//! Transport: start/stop, rendering, position changes and seeking

use tracing::{debug, info, warn};

use super::{Context, Session, cursor_for};
use crate::error::{PlayerError, Result};
use crate::mixer::{MixEnv, Mixer};
use crate::params::Parameters;
use crate::sequencer::Step;
use crate::{MAX_SAMPLE_RATE, MIN_SAMPLE_RATE, OutputFormat};

impl Session {
    /// Advance one tick and render it
    ///
    /// Returns false, and drops back to loaded, once the loop limit is reached.
    fn render_tick(&mut self, params: &Parameters, limit: u32) -> bool {
        let flags = params.player_flags | self.module.flags;
        match self.cursor.next_tick(&self.module, flags, limit) {
            Step::End => {
                debug!(
                    loops = self.cursor.loop_count,
                    frames = self.cursor.frames,
                    "end of sequence"
                );
                self.mixer = None;
                self.cursor.reset(&self.module);
                self.clear_carry();
                false
            }
            Step::Tick { row_start, wrapped } => {
                if wrapped {
                    debug!(loops = self.cursor.loop_count, "sequence wrapped");
                }
                let env = MixEnv {
                    params,
                    flags,
                    controls: &self.controls,
                };
                if let Some(mixer) = self.mixer.as_mut() {
                    mixer.play_tick(&self.module, &self.cursor, row_start, &env);
                }
                true
            }
        }
    }

    /// Copy pending rendered bytes into `out`, returning how many were copied
    fn drain_carry(&mut self, out: &mut [u8]) -> usize {
        let available = &self.carry[self.carry_pos..];
        let n = available.len().min(out.len());
        out[..n].copy_from_slice(&available[..n]);
        self.carry_pos += n;
        n
    }

    fn refill_carry(&mut self) {
        self.carry.clear();
        self.carry_pos = 0;
        if let Some(mixer) = self.mixer.as_ref() {
            self.carry.extend_from_slice(mixer.buffer());
        }
    }

    /// Place the cursor at the start of an order, switching sequence if needed
    fn goto_order(&mut self, order: usize) {
        if let Some(seq) = self.scan.sequence_of(order)
            && seq != self.sequence
        {
            self.sequence = seq;
            self.cursor = cursor_for(&self.module, &self.scan, seq);
        }

        let entry = self.scan.sequence(self.sequence).and_then(|seq| {
            let (idx, timing) = seq.first_row_of(order)?;
            Some((*timing, seq.orders_before(idx).collect::<Vec<_>>()))
        });
        match entry {
            Some((timing, visited)) => self.cursor.jump_to(
                &self.module,
                order,
                0,
                timing.speed,
                timing.bpm,
                timing.time_ms,
                timing.frames,
                visited,
            ),
            None => self.cursor.jump_to(
                &self.module,
                order,
                0,
                self.module.speed,
                self.module.bpm,
                0.0,
                0,
                [],
            ),
        }
        self.silence();
    }

    fn silence(&mut self) {
        if let Some(mixer) = self.mixer.as_mut() {
            mixer.silence();
        }
        self.clear_carry();
    }

    fn is_playable(&self, order: usize) -> bool {
        self.module.pattern_index_at(order).is_some()
    }
}

impl Context {
    pub(super) fn playing_session(&mut self, operation: &'static str) -> Result<&mut Session> {
        let state = self.state();
        match self.session.as_mut() {
            Some(session) if session.mixer.is_some() => Ok(session),
            _ => Err(PlayerError::state(operation, state)),
        }
    }

    /// Start playback at `rate` Hz
    ///
    /// Playback resumes from the current cursor. Starting while already
    /// playing rebuilds the mixer.
    pub fn start(&mut self, rate: u32, format: OutputFormat) -> Result<()> {
        self.ensure_open("start")?;
        let params = self.params;
        let virtual_voices = self.virtual_voices;
        let session = self.session_mut("start")?;

        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&rate) {
            warn!(rate, "sample rate out of range");
            return Err(PlayerError::invalid(format!(
                "sample rate {rate} outside {MIN_SAMPLE_RATE}..={MAX_SAMPLE_RATE}"
            )));
        }

        let mixer = Mixer::new(&session.module, rate, format, &params, virtual_voices)?;
        session.mixer = Some(mixer);
        session.clear_carry();
        info!(rate, format = format.bits(), "playback started");
        Ok(())
    }

    /// Passes `play_frame` plays before reporting the end (0 = forever)
    pub fn max_loops(&self) -> u32 {
        self.max_loops
    }

    /// Change the pass limit of `play_frame`; takes effect at the next wrap
    pub fn set_max_loops(&mut self, loops: u32) {
        self.max_loops = loops;
        debug!(loops, "max loops set");
    }

    /// Render one tick
    ///
    /// Returns false when the loop limit from the config is reached; the
    /// context is then back in the loaded state with the cursor at the
    /// sequence entry.
    pub fn play_frame(&mut self) -> Result<bool> {
        let params = self.params;
        let limit = self.max_loops;
        let session = self.playing_session("play_frame")?;
        Ok(session.render_tick(&params, limit))
    }

    /// Audio of the last rendered tick (empty when not playing)
    pub fn frame_buffer(&self) -> &[u8] {
        self.session
            .as_ref()
            .and_then(|s| s.mixer.as_ref())
            .map(Mixer::buffer)
            .unwrap_or_default()
    }

    /// Fill `out` completely with rendered audio
    ///
    /// Ticks are split across calls as needed. `loop_limit` is the number of
    /// passes to play, 0 for no limit. Once the end is reached the rest of
    /// `out` is zeroed and false is returned.
    pub fn fill_buffer(&mut self, out: &mut [u8], loop_limit: u32) -> Result<bool> {
        let params = self.params;
        let session = self.playing_session("fill_buffer")?;

        let mut written = 0;
        while written < out.len() {
            if session.carry_pos < session.carry.len() {
                written += session.drain_carry(&mut out[written..]);
                continue;
            }
            if !session.render_tick(&params, loop_limit) {
                out[written..].fill(0);
                return Ok(false);
            }
            session.refill_carry();
        }
        Ok(true)
    }

    /// Stop playback, keeping the cursor for a later `start`
    pub fn stop(&mut self) -> Result<()> {
        let session = self.session_mut("stop")?;
        if session.mixer.take().is_some() {
            info!(order = session.cursor.order, row = session.cursor.row, "playback stopped");
        }
        session.clear_carry();
        Ok(())
    }

    /// Return to the entry point of the active sequence
    pub fn restart(&mut self) -> Result<()> {
        let params = self.params;
        let session = self.session_mut("restart")?;
        session.cursor.reset(&session.module);
        if let Some(mixer) = session.mixer.as_mut() {
            mixer.reset_channels(&session.module, &params);
        }
        session.clear_carry();
        debug!(order = session.cursor.order, "restarted");
        Ok(())
    }

    /// Jump to the start of an order
    ///
    /// Skip markers move forward to the next playable order. Returns the
    /// order reached.
    pub fn set_position(&mut self, order: usize) -> Result<usize> {
        let session = self.session_mut("set_position")?;
        let len = session.module.len();
        if order >= len {
            return Err(PlayerError::invalid(format!(
                "order {order} outside 0..{len}"
            )));
        }
        let target = (order..len)
            .find(|&o| session.is_playable(o))
            .ok_or_else(|| PlayerError::invalid(format!("no playable order from {order}")))?;
        session.goto_order(target);
        debug!(order = target, "position set");
        Ok(target)
    }

    /// Jump to the next playable order
    pub fn next(&mut self) -> Result<usize> {
        let session = self.session_mut("next")?;
        let current = session.cursor.order;
        let target = (current + 1..session.module.len())
            .find(|&o| session.is_playable(o))
            .ok_or_else(|| PlayerError::invalid(format!("no order after {current}")))?;
        session.goto_order(target);
        Ok(target)
    }

    /// Jump to the previous playable order, or restart the first one
    pub fn prev(&mut self) -> Result<usize> {
        let session = self.session_mut("prev")?;
        let current = session.cursor.order;
        let target = (0..current)
            .rev()
            .find(|&o| session.is_playable(o))
            .unwrap_or(current);
        session.goto_order(target);
        Ok(target)
    }

    /// Move to the row playing at `ms` in the active sequence
    ///
    /// Lands on a row start at or before `ms` (the last row for times past
    /// the end). Returns the order reached.
    pub fn seek(&mut self, ms: f64) -> Result<usize> {
        let session = self.session_mut("seek")?;
        let seq = session
            .scan
            .sequence(session.sequence)
            .ok_or_else(|| PlayerError::Internal("active sequence missing".into()))?;
        let (idx, timing) = seq
            .row_at_time(ms)
            .ok_or_else(|| PlayerError::Internal("sequence has no rows".into()))?;
        let timing = *timing;
        let visited: Vec<usize> = seq.orders_before(idx).collect();

        session.cursor.jump_to(
            &session.module,
            timing.order,
            timing.row,
            timing.speed,
            timing.bpm,
            timing.time_ms,
            timing.frames,
            visited,
        );
        session.silence();
        debug!(ms, order = timing.order, row = timing.row, "seek");
        Ok(timing.order)
    }
}
