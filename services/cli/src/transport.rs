//! WebSocket transport to the agent's media server.
//!
//! The server address and credential come from the connection provider. The
//! token is presented as a bearer header; agent activity arrives as JSON
//! text frames and is forwarded to the session controller as
//! `TransportEvent`s.

use agent_session_core::{
    SessionError,
    connection::ConnectionDetails,
    transport::{
        AgentPhase, AudioTrackHandle, Transport, TransportConnection, TransportEvent,
        TransportLink,
    },
};
use async_trait::async_trait;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tokio::{
    net::TcpStream,
    sync::{Mutex, mpsc},
    task::JoinHandle,
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{client::IntoClientRequest, protocol::Message as WsMessage},
};
use tracing::{debug, info, warn};

const EVENT_BUFFER: usize = 64;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Frames the media server sends about the agent.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AgentMessage {
    AgentState { state: AgentPhase },
    AgentAudio { track: Option<String> },
}

impl From<AgentMessage> for TransportEvent {
    fn from(message: AgentMessage) -> Self {
        match message {
            AgentMessage::AgentState { state } => TransportEvent::AgentState(state),
            AgentMessage::AgentAudio { track } => {
                TransportEvent::AgentAudio(track.map(AudioTrackHandle))
            }
        }
    }
}

fn parse_frame(text: &str) -> Option<TransportEvent> {
    match serde_json::from_str::<AgentMessage>(text) {
        Ok(message) => Some(message.into()),
        Err(e) => {
            debug!(error = %e, "Ignoring unrecognised frame from media server");
            None
        }
    }
}

/// Connects to media servers over WebSocket.
#[derive(Default)]
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, details: ConnectionDetails) -> Result<TransportLink, SessionError> {
        let mut request = details
            .server_address()
            .as_str()
            .into_client_request()
            .map_err(SessionError::transport)?;
        request.headers_mut().insert(
            "Authorization",
            format!("Bearer {}", details.credential_token().expose_secret())
                .parse()
                .map_err(SessionError::transport)?,
        );

        let (ws_stream, _) = connect_async(request)
            .await
            .map_err(SessionError::transport)?;
        info!(server = %details.server_address(), "Connected to media server");

        let (sink, stream) = ws_stream.split();
        let (tx, events) = mpsc::channel(EVENT_BUFFER);
        let reader = tokio::spawn(read_frames(stream, tx));

        Ok(TransportLink {
            connection: Box::new(WsConnection {
                sink: Mutex::new(sink),
                reader,
            }),
            events,
        })
    }
}

async fn read_frames(mut stream: SplitStream<WsStream>, tx: mpsc::Sender<TransportEvent>) {
    let mut reason = None;
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => {
                if let Some(event) = parse_frame(&text) {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
            Ok(WsMessage::Close(frame)) => {
                reason = frame
                    .map(|f| f.reason.to_string())
                    .filter(|r| !r.is_empty());
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Media server connection failed");
                reason = Some(e.to_string());
                break;
            }
        }
    }
    let _ = tx.send(TransportEvent::Closed { reason }).await;
}

struct WsConnection {
    sink: Mutex<SplitSink<WsStream, WsMessage>>,
    reader: JoinHandle<()>,
}

#[async_trait]
impl TransportConnection for WsConnection {
    async fn close(&self) {
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.send(WsMessage::Close(None)).await {
            debug!(error = %e, "Media server connection already closed");
        }
        self.reader.abort();
    }
}

impl Drop for WsConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
