//! Playback context
//!
//! A [`Context`] owns at most one module together with its scan results,
//! playback cursor and mixer. Its state is derived from what it holds:
//!
//! - no session: [`PlayerState::Unloaded`]
//! - session without mixer: [`PlayerState::Loaded`]
//! - session with mixer: [`PlayerState::Playing`]
//!
//! Submodules:
//! - `transport` - start/stop, frame rendering, position and seeking
//! - `controls` - channel mute/volume and event injection

mod controls;
mod transport;


use std::io::Read;
use std::path::Path;

use modplay_module::{
    ChannelFlags, LoadOptions, LoaderRegistry, Module, PlayerFlags, TestInfo,
};
use tracing::{debug, info, warn};
use xxhash_rust::xxh3::xxh3_128;

use crate::PlayerState;
use crate::config::{ConfigError, PlayerConfig};
use crate::error::{PlayerError, Result};
use crate::info::{ChannelInfo, FrameInfo, ModuleInfo};
use crate::mixer::{ChannelControl, Mixer};
use crate::params::{Parameter, Parameters};
use crate::scan::{ScanData, scan};
use crate::sequencer::Sequencer;
use crate::utils::samples_per_tick;

/// Everything that exists while a module is loaded
#[derive(Debug)]
struct Session {
    module: Module,
    digest: [u8; 16],
    scan: ScanData,
    /// Active sequence
    sequence: usize,
    cursor: Sequencer,
    controls: Vec<ChannelControl>,
    mixer: Option<Mixer>,
    /// Rendered bytes not yet handed out by `fill_buffer`
    carry: Vec<u8>,
    carry_pos: usize,
}

impl Session {
    fn new(module: Module, digest: [u8; 16], flags: PlayerFlags) -> Self {
        let scan = scan(&module, flags);
        let cursor = cursor_for(&module, &scan, 0);
        let controls = (0..module.channels)
            .map(|ch| ChannelControl {
                muted: module
                    .channel_settings
                    .get(ch)
                    .is_some_and(|s| s.flags.contains(ChannelFlags::MUTE)),
                ..Default::default()
            })
            .collect();
        Self {
            module,
            digest,
            scan,
            sequence: 0,
            cursor,
            controls,
            mixer: None,
            carry: Vec::new(),
            carry_pos: 0,
        }
    }

    fn state(&self) -> PlayerState {
        if self.mixer.is_some() {
            PlayerState::Playing
        } else {
            PlayerState::Loaded
        }
    }

    fn clear_carry(&mut self) {
        self.carry.clear();
        self.carry_pos = 0;
    }
}

/// Cursor at the entry point of a scanned sequence
fn cursor_for(module: &Module, scan: &ScanData, sequence: usize) -> Sequencer {
    match scan.sequence(sequence) {
        Some(seq) => Sequencer::new(module, seq.entry, seq.wrap_target),
        None => Sequencer::new(module, 0, module.restart),
    }
}

/// Tracker module player
#[derive(Debug)]
pub struct Context {
    registry: LoaderRegistry,
    params: Parameters,
    /// Passes `play_frame` plays before reporting the end (0 = forever)
    max_loops: u32,
    virtual_voices: usize,
    session: Option<Session>,
    closed: bool,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Context with the built-in loaders and default parameters
    pub fn new() -> Self {
        let config = PlayerConfig::default();
        Self {
            registry: LoaderRegistry::with_builtin(),
            params: Parameters::default(),
            max_loops: config.max_loops,
            virtual_voices: config.virtual_voices,
            session: None,
            closed: false,
        }
    }

    /// Context whose parameters start from a validated config
    pub fn with_config(config: &PlayerConfig) -> std::result::Result<Self, ConfigError> {
        let params = config.parameters()?;
        Ok(Self {
            params,
            max_loops: config.max_loops,
            virtual_voices: config.virtual_voices,
            ..Self::new()
        })
    }

    /// Loader registry, for registering extra formats or depackers
    pub fn registry_mut(&mut self) -> &mut LoaderRegistry {
        &mut self.registry
    }

    pub fn state(&self) -> PlayerState {
        self.session
            .as_ref()
            .map_or(PlayerState::Unloaded, Session::state)
    }

    /// Check if `close` was called
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self, operation: &'static str) -> Result<()> {
        if self.closed {
            return Err(PlayerError::state(operation, PlayerState::Unloaded));
        }
        Ok(())
    }

    fn session(&self, operation: &'static str) -> Result<&Session> {
        self.session
            .as_ref()
            .ok_or(PlayerError::state(operation, PlayerState::Unloaded))
    }

    fn session_mut(&mut self, operation: &'static str) -> Result<&mut Session> {
        self.session
            .as_mut()
            .ok_or(PlayerError::state(operation, PlayerState::Unloaded))
    }

    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            skip_samples: self.params.skip_samples(),
        }
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Load a module from memory
    ///
    /// On failure any previously loaded module stays loaded.
    pub fn load(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_open("load")?;
        let module = self.registry.load(data, self.load_options()).inspect_err(|e| {
            warn!(error = %e, "module load failed");
        })?;
        self.install(module, xxh3_128(data).to_be_bytes());
        Ok(())
    }

    /// Load a module from a file
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.ensure_open("load_file")?;
        let data = std::fs::read(path.as_ref())?;
        self.load(&data)
    }

    /// Load a module from any reader
    pub fn load_reader<R: Read>(&mut self, mut reader: R) -> Result<()> {
        self.ensure_open("load_reader")?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        self.load(&data)
    }

    /// Take ownership of an already built module
    ///
    /// The module is validated first; its digest is all zeros.
    pub fn load_module(&mut self, module: Module) -> Result<()> {
        self.ensure_open("load_module")?;
        module.validate()?;
        self.install(module, [0; 16]);
        Ok(())
    }

    fn install(&mut self, module: Module, digest: [u8; 16]) {
        self.release();
        let flags = self.params.player_flags | module.flags;
        info!(
            name = %module.name,
            format = %module.format,
            channels = module.channels,
            "module loaded"
        );
        self.session = Some(Session::new(module, digest, flags));
    }

    /// Identify module data without loading it
    pub fn test_module(&self, data: &[u8]) -> Result<TestInfo> {
        Ok(self.registry.test(data)?)
    }

    /// Names of the formats the registry can load
    pub fn format_list(&self) -> Vec<&'static str> {
        self.registry.format_list()
    }

    /// Recompute sequences and the timing table
    ///
    /// Only valid while loaded and not playing.
    pub fn scan(&mut self) -> Result<()> {
        let state = self.state();
        if state != PlayerState::Loaded {
            return Err(PlayerError::state("scan", state));
        }
        let player_flags = self.params.player_flags;
        let session = self.session_mut("scan")?;
        session.scan = scan(&session.module, player_flags | session.module.flags);
        if session.scan.sequence(session.sequence).is_none() {
            session.sequence = 0;
            session.cursor = cursor_for(&session.module, &session.scan, 0);
        }
        Ok(())
    }

    /// Free the module and all playback state
    ///
    /// Does nothing if no module is loaded.
    pub fn release(&mut self) {
        if let Some(session) = self.session.take() {
            debug!(name = %session.module.name, "module released");
        }
    }

    /// Alias of [`Context::release`]
    pub fn unload(&mut self) {
        self.release();
    }

    /// Release everything; the context accepts no further loads
    pub fn close(&mut self) {
        if !self.closed {
            self.release();
            self.closed = true;
            debug!("context closed");
        }
    }

    /// The loaded module
    pub fn module(&self) -> Option<&Module> {
        self.session.as_ref().map(|s| &s.module)
    }

    // =========================================================================
    // Parameters
    // =========================================================================

    /// Set a writable parameter
    pub fn set_parameter(&mut self, param: Parameter, value: i32) -> Result<()> {
        self.params.set(param, value).inspect_err(|e| {
            warn!(error = %e, "parameter rejected");
        })?;
        debug!(?param, value, "parameter set");
        Ok(())
    }

    /// Set a parameter by numeric code
    pub fn set_parameter_code(&mut self, code: i32, value: i32) -> Result<()> {
        let param = Parameter::from_code(code)
            .ok_or_else(|| PlayerError::invalid(format!("unknown parameter {code}")))?;
        self.set_parameter(param, value)
    }

    /// Current value of a parameter
    ///
    /// The module flags parameter needs a loaded module.
    pub fn parameter(&self, param: Parameter) -> Result<i32> {
        match param {
            Parameter::State => Ok(self.state() as i32),
            Parameter::ModuleFlags => {
                let session = self.session("get module flags")?;
                Ok(session.module.flags.bits() as i32)
            }
            _ => self
                .params
                .get(param)
                .ok_or_else(|| PlayerError::Internal(format!("{param:?} has no value"))),
        }
    }

    /// Current value of a parameter by numeric code
    pub fn parameter_code(&self, code: i32) -> Result<i32> {
        let param = Parameter::from_code(code)
            .ok_or_else(|| PlayerError::invalid(format!("unknown parameter {code}")))?;
        self.parameter(param)
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Playback state at the last rendered tick
    pub fn frame_info(&self) -> Result<FrameInfo> {
        let session = self.session("frame_info")?;
        let cursor = &session.cursor;
        let mixer = session.mixer.as_ref();

        let channels = session
            .controls
            .iter()
            .enumerate()
            .map(|(ch, &control)| match mixer.and_then(|m| m.voice(ch)) {
                Some(voice) => ChannelInfo::from_voice(voice, control),
                None => ChannelInfo::idle(control),
            })
            .collect();

        Ok(FrameInfo {
            position: cursor.order,
            pattern: cursor.pattern,
            row: cursor.row,
            num_rows: cursor.rows(&session.module),
            frame: cursor.frame,
            speed: cursor.speed,
            bpm: cursor.bpm,
            time_ms: cursor.time_ms,
            total_time_ms: session
                .scan
                .sequence(session.sequence)
                .map_or(0.0, |s| s.duration_ms),
            frame_time_us: (cursor.tick_ms() * 1000.0).round() as u64,
            buffer_bytes: mixer.map_or(0, |m| m.buffer().len()),
            buffer_size: mixer.map_or(0, |m| {
                samples_per_tick(m.rate(), cursor.tick_bpm()) * m.format().frame_bytes()
            }),
            total_buffer_size: mixer.map_or(0, Mixer::max_buffer_bytes),
            volume: self.params.volume,
            loop_count: cursor.loop_count,
            virtual_channels: mixer.map_or(0, Mixer::virtual_channels),
            virtual_used: mixer.map_or(0, Mixer::virtual_used),
            sequence: session.sequence,
            channels,
        })
    }

    /// Summary of the loaded module
    pub fn module_info(&self) -> Result<ModuleInfo> {
        let session = self.session("module_info")?;
        Ok(ModuleInfo::new(
            &session.module,
            session.digest,
            session.scan.infos(),
        ))
    }
}
