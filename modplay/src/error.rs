//! Playback error types

use modplay_module::LoadError;

use crate::PlayerState;

/// Result alias used by every control operation
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Errors returned by the playback context
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    /// Data is not a recognized or supported module
    #[error("format error: {0}")]
    Format(String),

    /// A compressed container failed to unpack
    #[error("depack error: {0}")]
    Depack(String),

    /// Reading the module source failed
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Engine invariant violated
    #[error("internal error: {0}")]
    Internal(String),

    /// Argument out of range (channel index, sample rate, parameter...)
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Operation not valid in the current state
    #[error("{operation} is not valid while {state}")]
    State {
        operation: &'static str,
        state: PlayerState,
    },

    /// Resource allocation failed
    #[error("system error: {0}")]
    System(String),
}

impl PlayerError {
    /// Numeric error code for binding layers
    pub fn code(&self) -> i32 {
        match self {
            PlayerError::Internal(_) => -2,
            PlayerError::Format(_) => -3,
            PlayerError::Io(_) => -4,
            PlayerError::Depack(_) => -5,
            PlayerError::System(_) => -6,
            PlayerError::InvalidParameter(_) => -7,
            PlayerError::State { .. } => -8,
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        PlayerError::InvalidParameter(reason.into())
    }

    pub(crate) fn state(operation: &'static str, state: PlayerState) -> Self {
        PlayerError::State { operation, state }
    }
}

impl From<LoadError> for PlayerError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::UnknownFormat | LoadError::Format(_) | LoadError::Truncated { .. } => {
                PlayerError::Format(err.to_string())
            }
            LoadError::Depack { .. } => PlayerError::Depack(err.to_string()),
            LoadError::Io(io) => PlayerError::Io(io),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_error_mapping() {
        let err: PlayerError = LoadError::UnknownFormat.into();
        assert!(matches!(err, PlayerError::Format(_)));
        assert_eq!(err.code(), -3);

        let err: PlayerError = LoadError::Truncated { offset: 12 }.into();
        assert!(matches!(err, PlayerError::Format(_)));

        let err: PlayerError = LoadError::Depack {
            packer: "zip",
            reason: "bad crc".into(),
        }
        .into();
        assert!(matches!(err, PlayerError::Depack(_)));
        assert_eq!(err.code(), -5);

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: PlayerError = LoadError::Io(io).into();
        assert!(matches!(err, PlayerError::Io(_)));
        assert_eq!(err.code(), -4);
    }

    #[test]
    fn test_state_error_message() {
        let err = PlayerError::state("play_frame", PlayerState::Loaded);
        assert_eq!(err.to_string(), "play_frame is not valid while loaded");
        assert_eq!(err.code(), -8);
    }
}
