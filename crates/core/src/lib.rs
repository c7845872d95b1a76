pub mod connection;
pub mod controller;
pub mod device;
pub mod directory;
pub mod error;
pub mod room;
pub mod transport;

pub use controller::{ControllerOptions, SessionController, SessionSnapshot, SessionState};
pub use error::{DeviceErrorKind, SessionError};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Everything the session controller publishes to its observers.
///
/// This enum is the contract between the orchestration core and whatever
/// renders it (a UI, a CLI, a test harness).
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The session moved to a new state.
    StateChanged(SessionState),
    /// The room picker was shown or hidden.
    PickerChanged(bool),
    /// A directory refresh started (`true`) or finished (`false`).
    RoomsLoading(bool),
    /// A directory refresh produced a new room list.
    RoomsUpdated(Vec<room::RoomSummary>),
    SelectionChanged(room::RoomSelection),
    /// The agent's audio track appeared or went away.
    AgentAudio(Option<transport::AudioTrackHandle>),
    /// A user-facing error to display.
    Alert(SessionError),
}

/// Locks a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
