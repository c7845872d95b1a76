//! Voice Session CLI Library
//!
//! Concrete adapters for the session core: configuration from the
//! environment, the WebSocket media transport, and the microphone capture
//! backends. The `voice-session` binary is a thin wrapper around this library.

pub mod capture;
pub mod config;
pub mod transport;

use agent_session_core::{
    ControllerOptions, SessionController, connection::HttpConnectionProvider,
    device::DeviceManager, directory::HttpRoomDirectory,
};
use config::Config;
use std::sync::Arc;
use transport::WsTransport;

/// Builds the HTTP client shared by the room directory and the connection provider.
pub fn http_client(config: &Config) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
}

/// Wires the HTTP providers, the WebSocket transport and the capture backend
/// into a session controller.
pub fn build_controller(config: &Config) -> reqwest::Result<SessionController> {
    let http = http_client(config)?;
    let directory = Arc::new(HttpRoomDirectory::new(
        http.clone(),
        &config.connection_endpoint,
    ));
    let provider = Arc::new(HttpConnectionProvider::new(
        http,
        config.connection_endpoint.clone(),
        config.allow_default_room,
    ));
    let devices = DeviceManager::new(capture::default_capture());

    Ok(SessionController::new(
        directory,
        provider,
        Arc::new(WsTransport),
        devices,
        ControllerOptions {
            noise_filter: config.noise_filter,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_session_core::SessionState;
    use std::time::Duration;

    fn config(allow_default_room: bool) -> Config {
        Config {
            connection_endpoint: "http://localhost:3000/api/connection-details"
                .parse()
                .unwrap(),
            request_timeout: Duration::from_secs(1),
            noise_filter: true,
            allow_default_room,
            log_level: tracing::Level::INFO,
        }
    }

    #[tokio::test]
    async fn test_build_controller_starts_idle() {
        let controller = build_controller(&config(false)).unwrap();
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.state, SessionState::Disconnected);
        assert!(!snapshot.picker_visible);
        assert!(!snapshot.device.microphone_enabled);
    }

    #[tokio::test]
    async fn test_default_room_policy_reaches_controller() {
        let strict = build_controller(&config(false)).unwrap().snapshot();
        assert!(!strict.default_room);
        assert!(!strict.can_join());

        let lenient = build_controller(&config(true)).unwrap().snapshot();
        assert!(lenient.default_room);
        assert!(lenient.can_join());
    }
}
