//! Audio Device Management
//!
//! `DeviceManager` owns the microphone capture lifecycle and the optional
//! noise filter. Capture hardware is reached through the `AudioCapture`
//! trait so platform backends can be swapped without touching the session
//! logic.

use crate::{
    error::{DeviceErrorKind, SessionError},
    lock,
};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::{
    Arc, Mutex, Weak,
    atomic::{AtomicBool, AtomicU64, Ordering},
};
use tracing::{debug, info, warn};

/// Snapshot of the local capture state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceStatus {
    pub microphone_enabled: bool,
    pub noise_filter_enabled: bool,
    pub last_error: Option<DeviceErrorKind>,
}

/// A capture device as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioInput {
    pub name: String,
    pub is_default: bool,
}

/// Outcome of a noise filter request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseFilterSupport {
    Applied,
    /// The backend (or the account tier) has no noise filter.
    Unavailable,
}

/// Platform access to audio capture hardware.
#[async_trait]
pub trait AudioCapture: Send + Sync {
    async fn input_devices(&self) -> Result<Vec<AudioInput>, DeviceErrorKind>;

    /// Starts capturing. Asynchronous hardware faults that happen later must be
    /// passed to `faults`.
    async fn acquire(&self, faults: FaultReporter) -> Result<(), DeviceErrorKind>;

    async fn release(&self);

    async fn set_noise_filter(&self, enabled: bool) -> NoiseFilterSupport;
}

/// Callback invoked on asynchronous device faults.
pub type DeviceErrorHandler = Arc<dyn Fn(&DeviceErrorKind) + Send + Sync>;

#[derive(Default)]
struct DeviceShared {
    status: Mutex<DeviceStatus>,
    handlers: Mutex<Vec<DeviceErrorHandler>>,
    /// Backend holds a capture handle, even if a fault since stopped the stream.
    holding: AtomicBool,
}

/// Handle given to capture backends for reporting faults mid-capture.
#[derive(Clone)]
pub struct FaultReporter {
    shared: Weak<DeviceShared>,
}

impl FaultReporter {
    /// Records the fault and notifies every registered handler.
    ///
    /// Capture is considered stopped afterwards, but nothing is torn down here.
    pub fn report(&self, kind: DeviceErrorKind) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        warn!(error = %kind, "Audio capture device reported a fault");
        {
            let mut status = lock(&shared.status);
            status.microphone_enabled = false;
            status.last_error = Some(kind.clone());
        }
        let handlers = lock(&shared.handlers).clone();
        for handler in handlers {
            handler(&kind);
        }
    }
}

/// Manages microphone capture and the noise filter.
pub struct DeviceManager {
    capture: Arc<dyn AudioCapture>,
    shared: Arc<DeviceShared>,
    acquiring: tokio::sync::Mutex<()>,
    /// Bumped by every disable; an acquisition that sees it move is stale.
    generation: AtomicU64,
}

impl DeviceManager {
    pub fn new(capture: Arc<dyn AudioCapture>) -> Self {
        Self {
            capture,
            shared: Arc::new(DeviceShared::default()),
            acquiring: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn status(&self) -> DeviceStatus {
        lock(&self.shared.status).clone()
    }

    pub async fn input_devices(&self) -> Result<Vec<AudioInput>, SessionError> {
        self.capture
            .input_devices()
            .await
            .map_err(SessionError::DeviceAcquisition)
    }

    /// Starts microphone capture.
    ///
    /// On failure the error is recorded in `DeviceStatus::last_error` and
    /// capture stays disabled. Presenting the error is up to the caller.
    ///
    /// Acquisitions never overlap. If `disable_microphone` runs while the
    /// backend is still acquiring, the handle is released as soon as it
    /// arrives and `SessionError::Cancelled` is returned.
    pub async fn enable_microphone(&self) -> Result<(), SessionError> {
        let _acquiring = self.acquiring.lock().await;
        if self.status().microphone_enabled {
            return Ok(());
        }
        if self.shared.holding.swap(false, Ordering::SeqCst) {
            self.capture.release().await;
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let reporter = FaultReporter {
            shared: Arc::downgrade(&self.shared),
        };
        let result = self.capture.acquire(reporter).await;

        {
            let mut status = lock(&self.shared.status);
            if self.generation.load(Ordering::SeqCst) == generation {
                return match result {
                    Ok(()) => {
                        info!("Microphone enabled");
                        self.shared.holding.store(true, Ordering::SeqCst);
                        status.microphone_enabled = true;
                        status.last_error = None;
                        Ok(())
                    }
                    Err(kind) => {
                        warn!(error = %kind, "Failed to acquire microphone");
                        status.microphone_enabled = false;
                        status.last_error = Some(kind.clone());
                        Err(SessionError::DeviceAcquisition(kind))
                    }
                };
            }
        }

        if result.is_ok() {
            debug!("Releasing microphone acquired after it was disabled");
            self.capture.release().await;
        }
        Err(SessionError::Cancelled)
    }

    /// Stops capture and drops the noise filter along with it. An acquisition
    /// still in flight is abandoned.
    pub async fn disable_microphone(&self) {
        let held = {
            let mut status = lock(&self.shared.status);
            self.generation.fetch_add(1, Ordering::SeqCst);
            status.microphone_enabled = false;
            status.noise_filter_enabled = false;
            self.shared.holding.swap(false, Ordering::SeqCst)
        };
        if held {
            self.capture.release().await;
            info!("Microphone disabled");
        }
    }

    /// Best-effort noise filter toggle. Unsupported backends make this a no-op.
    pub async fn set_noise_filter(&self, enabled: bool) {
        match self.capture.set_noise_filter(enabled).await {
            NoiseFilterSupport::Applied => {
                debug!(enabled, "Noise filter updated");
                lock(&self.shared.status).noise_filter_enabled = enabled;
            }
            NoiseFilterSupport::Unavailable => {
                debug!(enabled, "Noise filter unavailable; ignoring request");
            }
        }
    }

    /// Registers a handler for asynchronous capture faults.
    pub fn on_device_error(&self, handler: impl Fn(&DeviceErrorKind) + Send + Sync + 'static) {
        lock(&self.shared.handlers).push(Arc::new(handler));
    }
}
