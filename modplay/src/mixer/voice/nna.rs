//! New note actions and duplicate checks

use modplay_module::{DuplicateCheckAction, DuplicateCheckType, NewNoteAction};

use super::Voice;

impl Voice {
    /// Check if this voice is currently producing audible output
    pub fn is_audible(&self) -> bool {
        self.active && self.sample.is_some() && self.fadeout > 0
    }

    /// Check if this voice can take a displaced note
    pub fn is_available_for_nna(&self) -> bool {
        !self.active || self.sample.is_none() || self.fadeout == 0
    }

    /// Copy this voice into a background voice owned by `parent`
    pub fn copy_to_background(&self, parent: usize) -> Voice {
        let mut bg = self.clone();
        bg.is_background = true;
        bg.channel = parent;
        bg.delayed = None;
        bg
    }

    /// Apply a new note action to a displaced voice
    ///
    /// Returns true if the voice keeps sounding in the background.
    pub fn apply_nna_action(&mut self, action: NewNoteAction) -> bool {
        match action {
            NewNoteAction::Cut => {
                self.cut();
                false
            }
            NewNoteAction::Continue => true,
            NewNoteAction::NoteOff => {
                self.key_off = true;
                true
            }
            NewNoteAction::NoteFade => {
                self.fade();
                true
            }
        }
    }

    /// Apply a duplicate check action to a matching voice
    pub fn apply_dca(&mut self, action: DuplicateCheckAction) {
        match action {
            DuplicateCheckAction::Cut => self.cut(),
            DuplicateCheckAction::NoteOff => self.key_off = true,
            DuplicateCheckAction::NoteFade => self.fade(),
        }
    }

    /// Check if this voice matches a duplicate check condition
    pub fn matches_duplicate_check(
        &self,
        dct: DuplicateCheckType,
        key: u8,
        sample: usize,
        instrument: usize,
    ) -> bool {
        if !self.is_audible() {
            return false;
        }

        match dct {
            DuplicateCheckType::Off => false,
            DuplicateCheckType::Note => self.key == Some(key),
            DuplicateCheckType::Sample => self.sample == Some(sample),
            DuplicateCheckType::Instrument => self.instrument == Some(instrument),
        }
    }
}
