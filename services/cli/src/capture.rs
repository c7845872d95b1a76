//! Microphone capture backends for the command line.
//!
//! Without the `native-audio` feature the CLI has no audio stack and every
//! session runs muted. With it, capture goes through cpal on a dedicated
//! thread since cpal streams are not `Send`.

use agent_session_core::{
    DeviceErrorKind,
    device::{AudioCapture, AudioInput, FaultReporter, NoiseFilterSupport},
};
use async_trait::async_trait;
use std::sync::Arc;

/// Backend used when no audio stack is compiled in.
#[derive(Debug, Default)]
pub struct NoCapture;

#[async_trait]
impl AudioCapture for NoCapture {
    async fn input_devices(&self) -> Result<Vec<AudioInput>, DeviceErrorKind> {
        Ok(Vec::new())
    }

    async fn acquire(&self, _faults: FaultReporter) -> Result<(), DeviceErrorKind> {
        Err(DeviceErrorKind::NoDevice)
    }

    async fn release(&self) {}

    async fn set_noise_filter(&self, _enabled: bool) -> NoiseFilterSupport {
        NoiseFilterSupport::Unavailable
    }
}

/// Picks the capture backend for this build.
pub fn default_capture() -> Arc<dyn AudioCapture> {
    #[cfg(feature = "native-audio")]
    {
        Arc::new(native::CpalCapture::default())
    }
    #[cfg(not(feature = "native-audio"))]
    {
        Arc::new(NoCapture)
    }
}

#[cfg(feature = "native-audio")]
pub use native::CpalCapture;

#[cfg(feature = "native-audio")]
mod native {
    use super::*;
    use cpal::{
        BuildStreamError, DefaultStreamConfigError, PlayStreamError, StreamError,
        traits::{DeviceTrait, HostTrait, StreamTrait},
    };
    use std::sync::{Mutex, PoisonError, mpsc};
    use tokio::sync::oneshot;
    use tracing::{debug, info};

    /// Captures from the host's default input device.
    #[derive(Default)]
    pub struct CpalCapture {
        stop: Mutex<Option<mpsc::Sender<()>>>,
    }

    #[async_trait]
    impl AudioCapture for CpalCapture {
        async fn input_devices(&self) -> Result<Vec<AudioInput>, DeviceErrorKind> {
            tokio::task::spawn_blocking(list_inputs)
                .await
                .map_err(|e| DeviceErrorKind::Other(e.to_string()))?
        }

        async fn acquire(&self, faults: FaultReporter) -> Result<(), DeviceErrorKind> {
            let (ready_tx, ready_rx) = oneshot::channel();
            let (stop_tx, stop_rx) = mpsc::channel();
            std::thread::Builder::new()
                .name("audio-capture".to_string())
                .spawn(move || run_capture(faults, ready_tx, stop_rx))
                .map_err(|e| DeviceErrorKind::Other(e.to_string()))?;

            ready_rx
                .await
                .map_err(|_| DeviceErrorKind::Other("capture thread exited".to_string()))??;
            *self.stop.lock().unwrap_or_else(PoisonError::into_inner) = Some(stop_tx);
            Ok(())
        }

        async fn release(&self) {
            let stop = self
                .stop
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(stop) = stop {
                let _ = stop.send(());
                debug!("Capture stream released");
            }
        }

        async fn set_noise_filter(&self, _enabled: bool) -> NoiseFilterSupport {
            NoiseFilterSupport::Unavailable
        }
    }

    fn list_inputs() -> Result<Vec<AudioInput>, DeviceErrorKind> {
        let host = cpal::default_host();
        let default_name = host.default_input_device().and_then(|d| d.name().ok());
        let devices = host
            .input_devices()
            .map_err(|e| DeviceErrorKind::Other(e.to_string()))?;
        Ok(devices
            .filter_map(|d| d.name().ok())
            .map(|name| AudioInput {
                is_default: default_name.as_deref() == Some(name.as_str()),
                name,
            })
            .collect())
    }

    fn run_capture(
        faults: FaultReporter,
        ready: oneshot::Sender<Result<(), DeviceErrorKind>>,
        stop: mpsc::Receiver<()>,
    ) {
        let stream = match open_stream(faults) {
            Ok(stream) => stream,
            Err(kind) => {
                let _ = ready.send(Err(kind));
                return;
            }
        };
        let _ = ready.send(Ok(()));
        // Returns on an explicit stop or when the capture handle is dropped.
        let _ = stop.recv();
        drop(stream);
    }

    fn open_stream(faults: FaultReporter) -> Result<cpal::Stream, DeviceErrorKind> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(DeviceErrorKind::NoDevice)?;
        let supported = device.default_input_config().map_err(|e| match e {
            DefaultStreamConfigError::DeviceNotAvailable => DeviceErrorKind::NoDevice,
            other => DeviceErrorKind::Other(other.to_string()),
        })?;
        info!(
            device = device.name().unwrap_or_default(),
            sample_rate = supported.sample_rate().0,
            channels = supported.channels(),
            "Opening capture stream"
        );

        let stream = device
            .build_input_stream_raw(
                &supported.config(),
                supported.sample_format(),
                |_data: &cpal::Data, _: &cpal::InputCallbackInfo| {},
                move |err| {
                    faults.report(match err {
                        StreamError::DeviceNotAvailable => DeviceErrorKind::Disconnected,
                        other => DeviceErrorKind::Other(other.to_string()),
                    })
                },
                None,
            )
            .map_err(|e| match e {
                BuildStreamError::DeviceNotAvailable => DeviceErrorKind::NoDevice,
                other => DeviceErrorKind::Other(other.to_string()),
            })?;
        stream.play().map_err(|e| match e {
            PlayStreamError::DeviceNotAvailable => DeviceErrorKind::Disconnected,
            other => DeviceErrorKind::Other(other.to_string()),
        })?;
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_session_core::device::DeviceManager;

    #[tokio::test]
    async fn test_no_capture_reports_no_device() {
        let devices = DeviceManager::new(Arc::new(NoCapture));

        assert!(devices.input_devices().await.unwrap().is_empty());
        let err = devices.enable_microphone().await.unwrap_err();
        assert_eq!(
            err,
            agent_session_core::SessionError::DeviceAcquisition(DeviceErrorKind::NoDevice)
        );
        assert!(!devices.status().microphone_enabled);
        assert_eq!(devices.status().last_error, Some(DeviceErrorKind::NoDevice));
    }

    #[tokio::test]
    async fn test_no_capture_has_no_noise_filter() {
        assert_eq!(
            NoCapture.set_noise_filter(true).await,
            NoiseFilterSupport::Unavailable
        );
    }
}
