//! Error types for Cadenza

use crate::playback::PlaybackState;
use thiserror::Error;

/// Failures of the process-wide audio subsystem.
#[derive(Error, Debug)]
pub enum InitError {
    #[error("Audio system is already initialized")]
    AlreadyInitialized,

    #[error("Audio system is not initialized")]
    NotInitialized,

    #[error("No output device available")]
    NoOutputDevice,

    #[error("Audio backend error: {0}")]
    Backend(String),
}

/// Failures while opening or decoding a media source.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Corrupt media: {0}")]
    Corrupt(String),

    #[error("IO failure: {0}")]
    IoFailure(#[from] std::io::Error),

    #[error("Open cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum CadenzaError {
    #[error("Initialization error: {0}")]
    Init(#[from] InitError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: PlaybackState,
    },

    #[error("Audio device error: {0}")]
    Device(String),

    #[error("{0} player handle(s) still active")]
    HandlesActive(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Thread error: {0}")]
    Thread(String),

    #[error("{0} was cancelled")]
    Cancelled(&'static str),
}

impl CadenzaError {
    pub(crate) fn invalid_state(operation: &'static str, state: PlaybackState) -> Self {
        Self::InvalidState { operation, state }
    }

    /// Returns true for errors that leave the handle usable (illegal transitions).
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. })
    }
}

pub type Result<T> = std::result::Result<T, CadenzaError>;
