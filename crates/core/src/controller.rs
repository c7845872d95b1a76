//! Session Controller
//!
//! This module implements the state machine that sits between the room
//! picker UI and the transport. It sequences a join attempt (connection
//! details, transport connect, microphone), tracks the agent's activity once
//! connected, and publishes every change as a `SessionEvent`.
//!
//! All state lives behind one mutex that is never held across an `.await`.
//! Each join attempt is stamped with a number; `leave()` bumps it, so a step
//! that completes after the user left sees a stale number and stops.

use crate::{
    SessionEvent,
    connection::ConnectionProvider,
    device::{DeviceManager, DeviceStatus},
    directory::RoomDirectory,
    error::{DeviceErrorKind, SessionError},
    lock,
    room::{RoomSelection, RoomSummary},
    transport::{
        AgentPhase, AudioTrackHandle, Transport, TransportConnection, TransportEvent,
        TransportLink,
    },
};
use std::sync::{Arc, Mutex, Weak};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 64;

/// Connection state of the session. `Connected` carries the agent's activity.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Connected(AgentPhase),
    Disconnecting,
    /// A join attempt failed. Folds back to `Disconnected` once published.
    Error(SessionError),
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected(_) => "connected",
            SessionState::Disconnecting => "disconnecting",
            SessionState::Error(_) => "error",
        }
    }

    pub fn agent_phase(&self) -> Option<AgentPhase> {
        match self {
            SessionState::Connected(phase) => Some(*phase),
            _ => None,
        }
    }

    fn permits(&self, next: &SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected(_) | Error(_) | Disconnecting)
                | (Connected(_), Connected(_) | Disconnecting)
                | (Disconnecting, Disconnected)
                | (Error(_), Disconnected)
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ControllerOptions {
    /// Request the noise filter whenever the microphone comes up.
    pub noise_filter: bool,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self { noise_filter: true }
    }
}

/// Read-only view of everything a UI needs to render the session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub selection: RoomSelection,
    pub picker_visible: bool,
    pub rooms_loading: bool,
    pub rooms: Vec<RoomSummary>,
    pub device: DeviceStatus,
    pub agent_audio: Option<AudioTrackHandle>,
    pub last_error: Option<SessionError>,
    /// The provider picks a room when nothing is selected.
    pub default_room: bool,
}

impl SessionSnapshot {
    pub fn agent_phase(&self) -> Option<AgentPhase> {
        self.state.agent_phase()
    }

    /// Whether a join button should be enabled.
    pub fn can_join(&self) -> bool {
        self.state == SessionState::Disconnected
            && !self.rooms_loading
            && (self.default_room || !self.selection.is_none())
    }
}

#[derive(Default)]
struct Inner {
    state: SessionState,
    selection: RoomSelection,
    picker_visible: bool,
    refreshing: usize,
    last_error: Option<SessionError>,
    attempt: u64,
    connection: Option<Box<dyn TransportConnection>>,
    agent_audio: Option<AudioTrackHandle>,
    pump: Option<JoinHandle<()>>,
}

impl Inner {
    fn is_current(&self, attempt: u64) -> bool {
        self.attempt == attempt && self.state == SessionState::Connecting
    }
}

struct Shared {
    directory: Arc<dyn RoomDirectory>,
    provider: Arc<dyn ConnectionProvider>,
    transport: Arc<dyn Transport>,
    devices: DeviceManager,
    options: ControllerOptions,
    default_room: bool,
    inner: Mutex<Inner>,
    events: broadcast::Sender<SessionEvent>,
}

impl Shared {
    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// The only place `Inner::state` is written.
    fn transition(&self, inner: &mut Inner, next: SessionState) {
        if inner.state == next {
            return;
        }
        if !inner.state.permits(&next) {
            warn!(
                from = inner.state.name(),
                to = next.name(),
                "Ignoring illegal session transition"
            );
            return;
        }
        debug!(from = ?inner.state, to = ?next, "Session state changed");
        inner.state = next.clone();
        self.emit(SessionEvent::StateChanged(next));
    }

    fn record_alert(&self, inner: &mut Inner, err: SessionError) {
        inner.last_error = Some(err.clone());
        self.emit(SessionEvent::Alert(err));
    }

    fn device_fault(&self, kind: &DeviceErrorKind) {
        let mut inner = lock(&self.inner);
        if matches!(inner.state, SessionState::Connected(_)) {
            warn!(error = %kind, "Audio device fault mid-session; session left open");
        } else {
            debug!(error = %kind, state = inner.state.name(), "Audio device fault outside a session");
        }
        self.record_alert(&mut inner, SessionError::DeviceFault(kind.clone()));
    }

    fn apply_transport_event(&self, attempt: u64, event: TransportEvent) {
        let mut inner = lock(&self.inner);
        if inner.attempt != attempt {
            debug!(attempt, "Dropping event from a stale transport");
            return;
        }
        match event {
            TransportEvent::AgentState(phase) => {
                if matches!(inner.state, SessionState::Connected(_)) {
                    self.transition(&mut inner, SessionState::Connected(phase));
                }
            }
            TransportEvent::AgentAudio(handle) => {
                if inner.agent_audio != handle {
                    inner.agent_audio = handle.clone();
                    self.emit(SessionEvent::AgentAudio(handle));
                }
            }
            TransportEvent::Closed { .. } => {}
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(pump) = lock(&self.inner).pump.take() {
            pump.abort();
        }
    }
}

/// Owns one voice session's lifecycle. Cloning yields another handle to the
/// same session.
#[derive(Clone)]
pub struct SessionController {
    shared: Arc<Shared>,
}

impl SessionController {
    pub fn new(
        directory: Arc<dyn RoomDirectory>,
        provider: Arc<dyn ConnectionProvider>,
        transport: Arc<dyn Transport>,
        devices: DeviceManager,
        options: ControllerOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let default_room = provider.allows_default_room();
        let shared = Arc::new(Shared {
            directory,
            provider,
            transport,
            devices,
            options,
            default_room,
            inner: Mutex::new(Inner::default()),
            events,
        });

        let weak = Arc::downgrade(&shared);
        shared.devices.on_device_error(move |kind| {
            if let Some(shared) = weak.upgrade() {
                shared.device_fault(kind);
            }
        });

        Self { shared }
    }

    /// Subscribes to every subsequent `SessionEvent`.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = lock(&self.shared.inner);
        SessionSnapshot {
            state: inner.state.clone(),
            selection: inner.selection.clone(),
            picker_visible: inner.picker_visible,
            rooms_loading: inner.refreshing > 0,
            rooms: self.shared.directory.rooms(),
            device: self.shared.devices.status(),
            agent_audio: inner.agent_audio.clone(),
            last_error: inner.last_error.clone(),
            default_room: self.shared.default_room,
        }
    }

    pub fn state(&self) -> SessionState {
        lock(&self.shared.inner).state.clone()
    }

    pub fn devices(&self) -> &DeviceManager {
        &self.shared.devices
    }

    /// Shows the room picker and refreshes the directory.
    ///
    /// Only valid while `Disconnected`; the session state itself is untouched.
    pub async fn open_picker(&self) -> Result<Vec<RoomSummary>, SessionError> {
        {
            let mut inner = lock(&self.shared.inner);
            if inner.state != SessionState::Disconnected {
                return Err(SessionError::InvalidState {
                    operation: "open the room picker",
                    state: inner.state.name(),
                });
            }
            if !inner.picker_visible {
                inner.picker_visible = true;
                self.shared.emit(SessionEvent::PickerChanged(true));
            }
        }
        self.refresh_rooms().await
    }

    pub fn close_picker(&self) {
        let mut inner = lock(&self.shared.inner);
        if inner.picker_visible {
            inner.picker_visible = false;
            self.shared.emit(SessionEvent::PickerChanged(false));
        }
    }

    /// Refreshes the room list. A failure keeps the previous list and is
    /// recorded for display; nothing is retried.
    pub async fn refresh_rooms(&self) -> Result<Vec<RoomSummary>, SessionError> {
        let _loading = RefreshGuard::start(&self.shared);
        let result = self.shared.directory.refresh().await;

        match &result {
            Ok(rooms) => self.shared.emit(SessionEvent::RoomsUpdated(rooms.clone())),
            Err(e) => {
                warn!(error = %e, "Could not refresh rooms");
                let mut inner = lock(&self.shared.inner);
                self.shared.record_alert(&mut inner, e.clone());
            }
        }
        result
    }

    /// Replaces the current selection. Purely local.
    pub fn select_room(&self, selection: RoomSelection) {
        let mut inner = lock(&self.shared.inner);
        if inner.selection == selection {
            return;
        }
        debug!(?selection, "Room selection changed");
        inner.selection = selection.clone();
        self.shared.emit(SessionEvent::SelectionChanged(selection));
    }

    /// Joins the selected room.
    ///
    /// The steps run strictly in order, each waiting on the previous one:
    /// 1. move to `Connecting`
    /// 2. fetch fresh connection details
    /// 3. open the transport
    /// 4. enable the microphone (a failure here only degrades the session)
    /// 5. move to `Connected(Listening)`
    ///
    /// A failure in steps 2 or 3 publishes `Error` then returns to
    /// `Disconnected`, keeping the selection for a retry. If `leave()` runs
    /// while a step is pending, that step's result is discarded and
    /// `SessionError::Cancelled` is returned without further transitions.
    pub async fn join(&self) -> Result<(), SessionError> {
        let shared = &self.shared;
        let (attempt, selection) = {
            let mut inner = lock(&shared.inner);
            if inner.state != SessionState::Disconnected {
                return Err(SessionError::InvalidState {
                    operation: "join",
                    state: inner.state.name(),
                });
            }
            if inner.selection.is_none() && !shared.default_room {
                return Err(SessionError::invalid_room("", "no room selected"));
            }
            inner.attempt += 1;
            inner.last_error = None;
            if inner.picker_visible {
                inner.picker_visible = false;
                shared.emit(SessionEvent::PickerChanged(false));
            }
            shared.transition(&mut inner, SessionState::Connecting);
            (inner.attempt, inner.selection.clone())
        };
        let room = selection
            .room_name()
            .map(ToString::to_string)
            .unwrap_or_else(|| "<provider default>".to_string());
        info!(%room, attempt, "Joining room");

        let details = match shared.provider.request_connection(&selection).await {
            Ok(details) => details,
            Err(e) => return Err(self.fail_attempt(attempt, e)),
        };
        if !lock(&shared.inner).is_current(attempt) {
            debug!(attempt, "Discarding connection details for a cancelled join");
            return Err(SessionError::Cancelled);
        }

        let TransportLink { connection, events } = match shared.transport.connect(details).await {
            Ok(link) => link,
            Err(e) => return Err(self.fail_attempt(attempt, e)),
        };
        let stale = {
            let mut inner = lock(&shared.inner);
            if inner.is_current(attempt) {
                inner.connection = Some(connection);
                None
            } else {
                Some(connection)
            }
        };
        if let Some(connection) = stale {
            debug!(attempt, "Closing transport opened by a cancelled join");
            connection.close().await;
            return Err(SessionError::Cancelled);
        }

        let microphone = shared.devices.enable_microphone().await;
        if microphone.is_ok() && shared.options.noise_filter {
            shared.devices.set_noise_filter(true).await;
        }

        let connected = {
            let mut inner = lock(&shared.inner);
            if inner.is_current(attempt) {
                if let Err(e) = microphone {
                    warn!(error = %e, "Joined without a microphone");
                    shared.record_alert(&mut inner, e);
                }
                shared.transition(&mut inner, SessionState::Connected(AgentPhase::Listening));
                inner.pump = Some(self.spawn_event_pump(attempt, events));
                true
            } else {
                false
            }
        };
        if !connected {
            // Teardown already disabled (or abandoned) this attempt's capture.
            debug!(attempt, "Join cancelled after microphone step");
            return Err(SessionError::Cancelled);
        }

        info!(%room, "Connected to agent session");
        Ok(())
    }

    /// Ends the session. A no-op when already `Disconnected` (or already
    /// disconnecting).
    pub async fn leave(&self) {
        let (connection, pump) = {
            let mut inner = lock(&self.shared.inner);
            match inner.state {
                SessionState::Disconnected | SessionState::Disconnecting => return,
                SessionState::Error(_) => {
                    self.shared.transition(&mut inner, SessionState::Disconnected);
                    return;
                }
                SessionState::Connecting | SessionState::Connected(_) => {}
            }
            info!(state = inner.state.name(), "Leaving session");
            inner.attempt += 1;
            self.shared.transition(&mut inner, SessionState::Disconnecting);
            (inner.connection.take(), inner.pump.take())
        };
        if let Some(pump) = pump {
            pump.abort();
        }
        self.shutdown(connection).await;
    }

    /// Turns the microphone on or off mid-session.
    pub async fn set_microphone_enabled(&self, enabled: bool) -> Result<(), SessionError> {
        {
            let inner = lock(&self.shared.inner);
            if !matches!(inner.state, SessionState::Connected(_)) {
                return Err(SessionError::InvalidState {
                    operation: "toggle the microphone",
                    state: inner.state.name(),
                });
            }
        }

        if !enabled {
            self.shared.devices.disable_microphone().await;
            return Ok(());
        }
        match self.shared.devices.enable_microphone().await {
            Ok(()) => {}
            Err(SessionError::Cancelled) => return Err(SessionError::Cancelled),
            Err(e) => {
                let mut inner = lock(&self.shared.inner);
                self.shared.record_alert(&mut inner, e.clone());
                return Err(e);
            }
        }
        if self.shared.options.noise_filter {
            self.shared.devices.set_noise_filter(true).await;
        }
        Ok(())
    }

    fn fail_attempt(&self, attempt: u64, err: SessionError) -> SessionError {
        let mut inner = lock(&self.shared.inner);
        if !inner.is_current(attempt) {
            debug!(attempt, error = %err, "Discarding failure of a cancelled join");
            return SessionError::Cancelled;
        }
        warn!(attempt, error = %err, "Join failed");
        self.shared
            .transition(&mut inner, SessionState::Error(err.clone()));
        self.shared.record_alert(&mut inner, err.clone());
        self.shared.transition(&mut inner, SessionState::Disconnected);
        err
    }

    /// Closes the transport, releases the microphone and clears the session.
    async fn shutdown(&self, connection: Option<Box<dyn TransportConnection>>) {
        if let Some(connection) = connection {
            connection.close().await;
        }
        self.shared.devices.disable_microphone().await;

        let mut inner = lock(&self.shared.inner);
        if !inner.selection.is_none() {
            inner.selection = RoomSelection::None;
            self.shared
                .emit(SessionEvent::SelectionChanged(RoomSelection::None));
        }
        if inner.agent_audio.take().is_some() {
            self.shared.emit(SessionEvent::AgentAudio(None));
        }
        self.shared.transition(&mut inner, SessionState::Disconnected);
        info!("Session disconnected");
    }

    async fn handle_remote_close(&self, attempt: u64, reason: Option<String>) {
        let connection = {
            let mut inner = lock(&self.shared.inner);
            if inner.attempt != attempt || !matches!(inner.state, SessionState::Connected(_)) {
                return;
            }
            info!(?reason, "Transport closed by the remote end");
            inner.attempt += 1;
            // This task is the pump; let it finish on its own.
            inner.pump = None;
            self.shared
                .transition(&mut inner, SessionState::Disconnecting);
            inner.connection.take()
        };
        self.shutdown(connection).await;
    }

    fn spawn_event_pump(
        &self,
        attempt: u64,
        events: mpsc::Receiver<TransportEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(pump_transport_events(
            Arc::downgrade(&self.shared),
            attempt,
            events,
        ))
    }
}

async fn pump_transport_events(
    weak: Weak<Shared>,
    attempt: u64,
    mut events: mpsc::Receiver<TransportEvent>,
) {
    let mut reason = None;
    while let Some(event) = events.recv().await {
        let Some(shared) = weak.upgrade() else {
            return;
        };
        if let TransportEvent::Closed { reason: r } = event {
            reason = r;
            break;
        }
        shared.apply_transport_event(attempt, event);
    }
    if let Some(shared) = weak.upgrade() {
        SessionController { shared }
            .handle_remote_close(attempt, reason)
            .await;
    }
}

/// Keeps the "rooms loading" flag raised for the duration of a refresh.
struct RefreshGuard<'a> {
    shared: &'a Shared,
}

impl<'a> RefreshGuard<'a> {
    fn start(shared: &'a Shared) -> Self {
        let mut inner = lock(&shared.inner);
        inner.refreshing += 1;
        if inner.refreshing == 1 {
            shared.emit(SessionEvent::RoomsLoading(true));
        }
        Self { shared }
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        let mut inner = lock(&self.shared.inner);
        inner.refreshing = inner.refreshing.saturating_sub(1);
        if inner.refreshing == 0 {
            self.shared.emit(SessionEvent::RoomsLoading(false));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        connection::MockConnectionProvider,
        device::{AudioCapture, AudioInput, FaultReporter, NoiseFilterSupport},
        directory::MockRoomDirectory,
    };
    use async_trait::async_trait;

    struct NoTransport;

    #[async_trait]
    impl Transport for NoTransport {
        async fn connect(
            &self,
            _details: crate::connection::ConnectionDetails,
        ) -> Result<TransportLink, SessionError> {
            Err(SessionError::transport("connection refused"))
        }
    }

    struct NoCapture;

    #[async_trait]
    impl AudioCapture for NoCapture {
        async fn input_devices(&self) -> Result<Vec<AudioInput>, DeviceErrorKind> {
            Ok(vec![])
        }
        async fn acquire(&self, _faults: FaultReporter) -> Result<(), DeviceErrorKind> {
            Err(DeviceErrorKind::NoDevice)
        }
        async fn release(&self) {}
        async fn set_noise_filter(&self, _enabled: bool) -> NoiseFilterSupport {
            NoiseFilterSupport::Unavailable
        }
    }

    fn controller(
        directory: MockRoomDirectory,
        mut provider: MockConnectionProvider,
    ) -> SessionController {
        provider.expect_allows_default_room().return_const(false);
        SessionController::new(
            Arc::new(directory),
            Arc::new(provider),
            Arc::new(NoTransport),
            DeviceManager::new(Arc::new(NoCapture)),
            ControllerOptions::default(),
        )
    }

    fn standup() -> Vec<RoomSummary> {
        vec![RoomSummary {
            name: "standup".to_string(),
            participant_count: 3,
        }]
    }

    fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = vec![];
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_transition_table() {
        use SessionState::*;
        let listening = Connected(AgentPhase::Listening);
        let err = Error(SessionError::Cancelled);

        assert!(Disconnected.permits(&Connecting));
        assert!(Connecting.permits(&listening));
        assert!(Connecting.permits(&err));
        assert!(listening.permits(&Connected(AgentPhase::Speaking)));
        assert!(err.permits(&Disconnected));

        assert!(!Disconnected.permits(&listening));
        assert!(!Disconnected.permits(&Disconnecting));
        assert!(!listening.permits(&Connecting));
        assert!(!listening.permits(&err));
        assert!(!Disconnecting.permits(&Connecting));
    }

    #[tokio::test]
    async fn test_open_picker_refreshes_rooms() {
        let mut directory = MockRoomDirectory::new();
        directory
            .expect_refresh()
            .times(1)
            .returning(|| Ok(standup()));
        directory.expect_rooms().returning(standup);
        let controller = controller(directory, MockConnectionProvider::new());
        let mut rx = controller.subscribe();

        let rooms = controller.open_picker().await.unwrap();
        assert_eq!(rooms, standup());

        let snapshot = controller.snapshot();
        assert!(snapshot.picker_visible);
        assert!(!snapshot.rooms_loading);
        assert_eq!(snapshot.state, SessionState::Disconnected);
        assert_eq!(snapshot.rooms, standup());
        assert_eq!(
            drain(&mut rx),
            vec![
                SessionEvent::PickerChanged(true),
                SessionEvent::RoomsLoading(true),
                SessionEvent::RoomsUpdated(standup()),
                SessionEvent::RoomsLoading(false),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_refresh_is_recorded() {
        let mut directory = MockRoomDirectory::new();
        directory
            .expect_refresh()
            .times(1)
            .returning(|| Err(SessionError::Network("timed out".into())));
        directory.expect_rooms().returning(standup);
        let controller = controller(directory, MockConnectionProvider::new());

        let err = controller.open_picker().await.unwrap_err();
        assert_eq!(err, SessionError::Network("timed out".into()));

        let snapshot = controller.snapshot();
        assert!(snapshot.picker_visible);
        assert_eq!(snapshot.rooms, standup());
        assert_eq!(snapshot.last_error, Some(err));
    }

    #[tokio::test]
    async fn test_join_requires_selection() {
        let mut directory = MockRoomDirectory::new();
        directory.expect_rooms().returning(Vec::new);
        let mut provider = MockConnectionProvider::new();
        provider.expect_request_connection().never();
        let controller = controller(directory, provider);

        assert!(!controller.snapshot().can_join());
        let err = controller.join().await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidRoomName { .. }));
        assert_eq!(controller.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_join_without_selection_defers_to_default_room() {
        let mut directory = MockRoomDirectory::new();
        directory.expect_rooms().returning(Vec::new);
        let mut provider = MockConnectionProvider::new();
        provider.expect_allows_default_room().return_const(true);
        provider
            .expect_request_connection()
            .withf(|selection: &RoomSelection| selection.is_none())
            .times(1)
            .returning(|_| Err(SessionError::network("timed out")));
        let controller = SessionController::new(
            Arc::new(directory),
            Arc::new(provider),
            Arc::new(NoTransport),
            DeviceManager::new(Arc::new(NoCapture)),
            ControllerOptions::default(),
        );

        assert!(controller.snapshot().can_join());
        let err = controller.join().await.unwrap_err();
        assert_eq!(err, SessionError::Network("timed out".into()));
        assert_eq!(controller.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_join_passes_selection_and_keeps_it_on_failure() {
        let mut directory = MockRoomDirectory::new();
        directory.expect_rooms().returning(Vec::new);
        let mut provider = MockConnectionProvider::new();
        provider
            .expect_request_connection()
            .withf(|selection| selection.room_name().map(|n| n.as_str()) == Some("standup"))
            .times(1)
            .returning(|_| Err(SessionError::Network("connection reset".into())));
        let controller = controller(directory, provider);
        let selection = RoomSelection::existing("standup").unwrap();
        controller.select_room(selection.clone());
        let mut rx = controller.subscribe();

        let err = controller.join().await.unwrap_err();

        assert_eq!(err, SessionError::Network("connection reset".into()));
        let states: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::StateChanged(state) => Some(state),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                SessionState::Connecting,
                SessionState::Error(err.clone()),
                SessionState::Disconnected,
            ]
        );
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.selection, selection);
        assert!(snapshot.can_join());
    }

    #[tokio::test]
    async fn test_transport_failure_takes_error_path() {
        let mut directory = MockRoomDirectory::new();
        directory.expect_rooms().returning(Vec::new);
        let mut provider = MockConnectionProvider::new();
        provider.expect_request_connection().returning(|_| {
            Ok(crate::connection::ConnectionDetails::new(
                reqwest::Url::parse("wss://media.example.com").unwrap(),
                "token",
            ))
        });
        let controller = controller(directory, provider);
        controller.select_room(RoomSelection::custom("my room").unwrap());

        let err = controller.join().await.unwrap_err();
        assert!(matches!(err, SessionError::Transport(_)));
        assert_eq!(controller.state(), SessionState::Disconnected);
        assert_eq!(controller.snapshot().last_error, Some(err));
    }

    #[tokio::test]
    async fn test_leave_when_disconnected_is_a_no_op() {
        let mut directory = MockRoomDirectory::new();
        directory.expect_rooms().returning(Vec::new);
        let controller = controller(directory, MockConnectionProvider::new());
        let mut rx = controller.subscribe();
        let before = controller.snapshot();

        controller.leave().await;
        controller.leave().await;

        assert_eq!(controller.snapshot(), before);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_select_room_replaces_previous_choice() {
        let mut directory = MockRoomDirectory::new();
        directory.expect_rooms().returning(Vec::new);
        let controller = controller(directory, MockConnectionProvider::new());

        controller.select_room(RoomSelection::existing("standup").unwrap());
        controller.select_room(RoomSelection::custom("my room").unwrap());

        assert_eq!(
            controller.snapshot().selection,
            RoomSelection::custom("my room").unwrap()
        );
    }

    #[tokio::test]
    async fn test_microphone_toggle_requires_connection() {
        let mut directory = MockRoomDirectory::new();
        directory.expect_rooms().returning(Vec::new);
        let controller = controller(directory, MockConnectionProvider::new());

        let err = controller.set_microphone_enabled(true).await.unwrap_err();
        assert_eq!(
            err,
            SessionError::InvalidState {
                operation: "toggle the microphone",
                state: "disconnected"
            }
        );
    }
}
