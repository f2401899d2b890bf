//! Row events at tick 0
//!
//! An event is applied in a fixed order: the sounding note is displaced
//! (new note action, duplicate check), then the instrument column, the key,
//! the special note values, the volume column and finally the effects.

use modplay_module::{
    DuplicateCheckAction, DuplicateCheckType, Effect, Event, Module, NewNoteAction, PlayerFlags,
};

use super::Mixer;
use super::voice::FADEOUT_MAX;
use crate::sequencer::Sequencer;
use crate::utils::{note_to_period, pan_to_f32};

impl Mixer {
    /// Apply the events of a freshly fetched row
    pub(super) fn process_row(&mut self, module: &Module, seq: &Sequencer, flags: PlayerFlags) {
        self.global_slide_active = false;

        for ch in 0..self.channels {
            let event = module
                .event(seq.pattern, seq.row, ch)
                .copied()
                .unwrap_or_default();

            let voice = &mut self.voices[ch];
            voice.reset_row_effects();
            voice.event = event;
            if event.is_empty() {
                continue;
            }

            // Delays at or past the row length never fire
            let delay = event.effects().into_iter().find_map(|e| match e {
                Effect::NoteDelay(d) if d > 0 => Some(d),
                _ => None,
            });
            match delay {
                Some(d) if (d as usize) < seq.speed as usize => voice.delayed = Some((d, event)),
                Some(_) => {}
                None => self.apply_event(module, ch, &event, flags, false),
            }
        }
    }

    /// Apply one event to a pattern channel
    pub(super) fn apply_event(
        &mut self,
        module: &Module,
        ch: usize,
        event: &Event,
        flags: PlayerFlags,
        injected: bool,
    ) {
        if ch >= self.channels {
            return;
        }

        let tone_porta = event.effects().iter().any(Effect::is_tone_porta);
        let key = event.key();
        // Unknown instruments are ignored
        let ins_idx = event
            .has_instrument()
            .then(|| event.instrument as usize - 1)
            .filter(|&idx| idx < module.instruments.len());

        // Displace the sounding note
        if let Some(key) = key
            && !tone_porta
        {
            let current = ins_idx.or(self.voices[ch].instrument);
            let policy = current
                .and_then(|idx| module.instruments.get(idx))
                .and_then(|ins| ins.mapping(key))
                .map(|(sub, _)| (sub.nna, sub.dct, sub.dca, sub.sample));

            if let (Some((_, dct, dca, sample)), Some(instrument)) = (policy, current) {
                self.process_duplicate_check(ch, dct, dca, key, sample, instrument);
            }
            let nna = policy.map_or(NewNoteAction::Cut, |(nna, ..)| nna);
            self.handle_nna(ch, nna);
        }

        // Instrument column
        if let Some(idx) = ins_idx {
            let instrument = &module.instruments[idx];
            let voice = &mut self.voices[ch];
            let sub = key
                .or(voice.key)
                .and_then(|k| instrument.mapping(k))
                .map(|(sub, _)| sub)
                .or(instrument.subs.first());

            voice.instrument = Some(idx);
            voice.volume = sub.map_or(instrument.volume, |s| s.volume).min(64) as f32 / 64.0;
            if let Some(pan) = sub.and_then(|s| s.pan) {
                voice.panning = pan_to_f32(pan);
            }
            if key.is_none() && voice.active {
                voice.fadeout = FADEOUT_MAX;
                voice.key_off = false;
            }
        }

        // Key
        let mut triggered = false;
        if let Some(key) = key {
            let current = self.voices[ch].instrument;
            let mapped = current.and_then(|idx| {
                let instrument = module.instruments.get(idx)?;
                let (sub, transpose) = instrument.mapping(key)?;
                (sub.sample < module.samples.len()).then_some((idx, instrument, sub, transpose))
            });

            let voice = &mut self.voices[ch];
            match mapped {
                Some((_, _, sub, transpose)) if tone_porta && voice.active => {
                    let effective = key as i16 + transpose as i16 + sub.transpose as i16;
                    voice.target_period = note_to_period(effective, voice.finetune);
                    voice.key = Some(key);
                }
                Some((idx, instrument, sub, transpose)) => {
                    voice.trigger(key, idx, instrument, sub, transpose);
                    voice.injected = injected;
                    triggered = true;
                }
                None => voice.cut(),
            }
        }

        // Special notes
        let voice = &mut self.voices[ch];
        if event.is_key_off() {
            voice.key_off = true;
        } else if event.is_key_cut() {
            voice.cut();
        } else if event.is_key_fade() {
            voice.fade();
        }

        if let Some(volume) = event.volume() {
            voice.volume = volume as f32 / 64.0;
        }

        for effect in event.effects() {
            self.apply_tick0_effect(module, ch, effect, triggered, flags);
        }
    }

    /// Find a background voice for a displaced note
    ///
    /// Prefers a free voice, otherwise steals the quietest one.
    pub(super) fn find_background_voice(&self) -> Option<usize> {
        let background = self.channels..self.voices.len();

        if let Some(idx) = background
            .clone()
            .find(|&idx| self.voices[idx].is_available_for_nna())
        {
            return Some(idx);
        }

        let mut quietest = None;
        let mut quietest_vol = f32::MAX;
        for idx in background {
            let voice = &self.voices[idx];
            let vol = voice.volume * (voice.fadeout as f32 / FADEOUT_MAX as f32);
            if vol < quietest_vol {
                quietest_vol = vol;
                quietest = Some(idx);
            }
        }
        quietest
    }

    /// Apply a duplicate check to the background voices of a channel
    pub(super) fn process_duplicate_check(
        &mut self,
        ch: usize,
        dct: DuplicateCheckType,
        dca: DuplicateCheckAction,
        key: u8,
        sample: usize,
        instrument: usize,
    ) {
        if dct == DuplicateCheckType::Off {
            return;
        }

        for voice in &mut self.voices[self.channels..] {
            if voice.channel == ch && voice.matches_duplicate_check(dct, key, sample, instrument) {
                voice.apply_dca(dca);
            }
        }
    }

    /// Move the sounding note of a channel to a background voice
    ///
    /// `nna` comes from the instrument about to play. Cut, or no voice to
    /// move to, leaves the note in place for the new trigger to replace.
    /// Returns true if the note was moved.
    pub(super) fn handle_nna(&mut self, ch: usize, nna: NewNoteAction) -> bool {
        if !self.voices[ch].is_audible() || nna == NewNoteAction::Cut {
            return false;
        }

        let Some(bg) = self.find_background_voice() else {
            return false;
        };

        let mut displaced = self.voices[ch].copy_to_background(ch);
        if !displaced.apply_nna_action(nna) {
            return false;
        }
        self.voices[bg] = displaced;
        true
    }
}
