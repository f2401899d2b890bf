//! Channel controls and event injection

use modplay_module::Event;
use tracing::{debug, trace};

use super::{Context, Session};
use crate::error::{PlayerError, Result};
use crate::mixer::ChannelControl;

impl Session {
    fn control(&self, channel: usize) -> Result<&ChannelControl> {
        self.controls
            .get(channel)
            .ok_or_else(|| channel_error(channel, self.controls.len()))
    }

    fn control_mut(&mut self, channel: usize) -> Result<&mut ChannelControl> {
        let channels = self.controls.len();
        self.controls
            .get_mut(channel)
            .ok_or_else(|| channel_error(channel, channels))
    }
}

fn channel_error(channel: usize, channels: usize) -> PlayerError {
    PlayerError::invalid(format!("channel {channel} outside 0..{channels}"))
}

impl Context {
    /// Mute or unmute a pattern channel
    ///
    /// Muted channels keep playing silently, so unmuting picks up in time.
    pub fn mute_channel(&mut self, channel: usize, muted: bool) -> Result<()> {
        let control = self.session_mut("mute_channel")?.control_mut(channel)?;
        control.muted = muted;
        debug!(channel, muted, "channel mute");
        Ok(())
    }

    pub fn channel_muted(&self, channel: usize) -> Result<bool> {
        Ok(self.session("channel_muted")?.control(channel)?.muted)
    }

    /// Set a channel's volume; values are clamped to 0.0-1.0
    pub fn set_channel_volume(&mut self, channel: usize, volume: f32) -> Result<()> {
        let control = self.session_mut("set_channel_volume")?.control_mut(channel)?;
        control.volume = if volume.is_nan() {
            0.0
        } else {
            volume.clamp(0.0, 1.0)
        };
        Ok(())
    }

    pub fn channel_volume(&self, channel: usize) -> Result<f32> {
        Ok(self.session("channel_volume")?.control(channel)?.volume)
    }

    /// Play an event on a channel at the next tick, bypassing the pattern
    ///
    /// Notes started this way are scaled by the secondary volume parameter.
    pub fn inject_event(&mut self, channel: usize, event: Event) -> Result<()> {
        let session = self.playing_session("inject_event")?;
        session.control(channel)?;
        if let Some(mixer) = session.mixer.as_mut() {
            mixer.inject(channel, event);
        }
        trace!(channel, note = event.note, "event queued");
        Ok(())
    }
}
