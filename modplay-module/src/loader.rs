//! Format loaders, depackers and the dispatch registry

use std::borrow::Cow;

use tracing::{debug, trace};

use crate::Module;
use crate::protracker::ProTrackerLoader;

/// Module loading error types
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// No registered loader recognized the data
    #[error("unrecognized module format")]
    UnknownFormat,

    /// Data was recognized but is malformed or unsupported
    #[error("invalid module: {0}")]
    Format(String),

    /// Data ended before a required structure
    #[error("unexpected end of data at offset {offset}")]
    Truncated { offset: u64 },

    /// A compressed container failed to unpack
    #[error("{packer} depack failed: {reason}")]
    Depack { packer: &'static str, reason: String },

    /// Reading the source failed
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Options passed to format loaders
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Keep sample headers but drop the PCM payloads
    pub skip_samples: bool,
}

/// Result of probing data without loading it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestInfo {
    /// Module title
    pub name: String,
    /// Name of the loader that recognized the data
    pub format: String,
}

/// A module format front-end
///
/// Loaders are pure: they turn bytes into a [`Module`] or an error and keep
/// no state between calls.
pub trait FormatLoader: Send + Sync {
    /// Human readable format name
    fn name(&self) -> &'static str;

    /// Return the module title if the data looks like this format
    fn probe(&self, data: &[u8]) -> Option<String>;

    /// Parse the data
    fn load(&self, data: &[u8], options: LoadOptions) -> Result<Module, LoadError>;
}

/// A compressed container front-end
pub trait Depacker: Send + Sync {
    fn name(&self) -> &'static str;

    /// Check if the data is packed with this packer
    fn detect(&self, data: &[u8]) -> bool;

    /// Unpack the data
    fn depack(&self, data: &[u8]) -> Result<Vec<u8>, LoadError>;
}

/// Format-sniffing dispatch table
pub struct LoaderRegistry {
    loaders: Vec<Box<dyn FormatLoader>>,
    depackers: Vec<Box<dyn Depacker>>,
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl std::fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderRegistry")
            .field("loaders", &self.format_list())
            .field(
                "depackers",
                &self.depackers.iter().map(|d| d.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl LoaderRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            loaders: Vec::new(),
            depackers: Vec::new(),
        }
    }

    /// Registry with every built-in loader
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register_loader(Box::new(ProTrackerLoader));
        registry
    }

    pub fn register_loader(&mut self, loader: Box<dyn FormatLoader>) {
        self.loaders.push(loader);
    }

    pub fn register_depacker(&mut self, depacker: Box<dyn Depacker>) {
        self.depackers.push(depacker);
    }

    /// Names of all registered formats
    pub fn format_list(&self) -> Vec<&'static str> {
        self.loaders.iter().map(|l| l.name()).collect()
    }

    /// Unpack the data if a registered depacker recognizes it
    pub fn depack<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>, LoadError> {
        match self.depackers.iter().find(|d| d.detect(data)) {
            Some(depacker) => {
                trace!(packer = depacker.name(), "depacking module");
                let unpacked = depacker.depack(data).map_err(|e| match e {
                    e @ LoadError::Depack { .. } => e,
                    other => LoadError::Depack {
                        packer: depacker.name(),
                        reason: other.to_string(),
                    },
                })?;
                Ok(Cow::Owned(unpacked))
            }
            None => Ok(Cow::Borrowed(data)),
        }
    }

    fn find(&self, data: &[u8]) -> Option<(&dyn FormatLoader, String)> {
        self.loaders
            .iter()
            .find_map(|l| l.probe(data).map(|title| (l.as_ref(), title)))
    }

    /// Identify the data without loading it
    pub fn test(&self, data: &[u8]) -> Result<TestInfo, LoadError> {
        let data = self.depack(data)?;
        let (loader, name) = self.find(&data).ok_or(LoadError::UnknownFormat)?;
        Ok(TestInfo {
            name,
            format: loader.name().to_string(),
        })
    }

    /// Load and validate a module from memory
    pub fn load(&self, data: &[u8], options: LoadOptions) -> Result<Module, LoadError> {
        let data = self.depack(data)?;
        self.parse(&data, options)
    }

    /// Parse and validate already unpacked data
    pub fn parse(&self, data: &[u8], options: LoadOptions) -> Result<Module, LoadError> {
        let (loader, _) = self.find(data).ok_or(LoadError::UnknownFormat)?;
        let module = loader.load(data, options)?;
        module.validate()?;
        debug!(
            format = loader.name(),
            name = %module.name,
            channels = module.channels,
            patterns = module.num_patterns(),
            "module loaded"
        );
        Ok(module)
    }
}
