//! Error taxonomy shared by every component of the session layer.
//!
//! All variants are cheap to clone so a single error can be recorded in the
//! session snapshot, carried by `SessionState::Error`, and broadcast to
//! observers at the same time.

use std::fmt;

/// Why the capture hardware could not be acquired, or why it stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceErrorKind {
    PermissionDenied,
    DeviceBusy,
    NoDevice,
    /// The device went away while capturing (e.g. unplugged).
    Disconnected,
    Other(String),
}

impl fmt::Display for DeviceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceErrorKind::PermissionDenied => write!(f, "microphone permission denied"),
            DeviceErrorKind::DeviceBusy => write!(f, "microphone is in use by another application"),
            DeviceErrorKind::NoDevice => write!(f, "no microphone found"),
            DeviceErrorKind::Disconnected => write!(f, "microphone was disconnected"),
            DeviceErrorKind::Other(message) => write!(f, "{}", message),
        }
    }
}

/// Errors surfaced by the session layer. None of them are fatal to the process.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// A provider call failed or timed out. The user may retry.
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid room name {name:?}: {reason}")]
    InvalidRoomName { name: String, reason: String },
    #[error("could not acquire microphone: {0}")]
    DeviceAcquisition(DeviceErrorKind),
    /// Asynchronous hardware fault reported mid-session.
    #[error("audio device fault: {0}")]
    DeviceFault(DeviceErrorKind),
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },
    #[error("transport error: {0}")]
    Transport(String),
    /// The join attempt was superseded by `leave()` and its result discarded.
    #[error("join attempt was cancelled")]
    Cancelled,
}

impl SessionError {
    pub fn network(err: impl fmt::Display) -> Self {
        SessionError::Network(err.to_string())
    }

    pub fn transport(err: impl fmt::Display) -> Self {
        SessionError::Transport(err.to_string())
    }

    pub fn invalid_room(name: impl Into<String>, reason: impl Into<String>) -> Self {
        SessionError::InvalidRoomName {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
