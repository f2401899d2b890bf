//! Resonant lowpass filter

use super::Voice;

impl Voice {
    /// Cutoff after the filter envelope (0.0-1.0)
    pub fn effective_cutoff(&self) -> f32 {
        (self.filter_cutoff * self.filter_env).clamp(0.0, 1.0)
    }

    /// Check if the filter changes the signal at all
    pub fn filter_engaged(&self) -> bool {
        self.effective_cutoff() < 1.0
    }

    /// Filter one input frame
    ///
    /// Direct Form II transposed biquad. Coefficients are rebuilt lazily when
    /// the cutoff, resonance or output rate changed.
    pub fn apply_filter(&mut self, input: f32, sample_rate: u32) -> f32 {
        if !self.filter_engaged() {
            return input;
        }

        if self.filter_dirty || self.filter_rate != sample_rate {
            self.update_filter_coefficients(sample_rate);
            self.filter_dirty = false;
            self.filter_rate = sample_rate;
        }

        let output = self.filter_b0 * input + self.filter_z1;
        self.filter_z1 = self.filter_b1 * input - self.filter_a1 * output + self.filter_z2;
        self.filter_z2 = self.filter_b2 * input - self.filter_a2 * output;
        output
    }

    /// Recalculate biquad coefficients
    ///
    /// Cutoff maps to freq = 110 * 2^(cutoff * 127 / 24 + 0.25) Hz.
    pub fn update_filter_coefficients(&mut self, sample_rate: u32) {
        let sample_rate = sample_rate as f32;
        let cutoff = self.effective_cutoff() * 127.0;
        let freq = 110.0 * 2.0_f32.powf(cutoff / 24.0 + 0.25);

        // Clamp below Nyquist
        let freq = freq.min(sample_rate / 2.0 - 1.0);

        let omega = 2.0 * std::f32::consts::PI * freq / sample_rate;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();

        let q_denom = 1.0 + self.filter_resonance * 10.0;
        let alpha = sin_omega / (2.0 * q_denom);

        let b0 = (1.0 - cos_omega) / 2.0;
        let b1 = 1.0 - cos_omega;
        let b2 = (1.0 - cos_omega) / 2.0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha;

        self.filter_b0 = b0 / a0;
        self.filter_b1 = b1 / a0;
        self.filter_b2 = b2 / a0;
        self.filter_a1 = a1 / a0;
        self.filter_a2 = a2 / a0;
    }

    /// Change cutoff and/or resonance (0-127 each)
    pub fn set_filter(&mut self, cutoff: Option<u8>, resonance: Option<u8>) {
        if let Some(cutoff) = cutoff {
            self.filter_cutoff = cutoff.min(127) as f32 / 127.0;
        }
        if let Some(resonance) = resonance {
            self.filter_resonance = resonance.min(127) as f32 / 127.0;
        }
        self.filter_dirty = true;
    }
}
