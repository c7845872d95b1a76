use crate::{connection::ConnectionDetails, error::SessionError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// What the remote agent is doing, as reported over the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentPhase {
    Listening,
    Thinking,
    Speaking,
}

/// Opaque reference to the agent's audio track, handed to renderers/visualizers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AudioTrackHandle(pub String);

/// Events any transport implementation can emit back to the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The agent changed activity.
    AgentState(AgentPhase),
    /// The agent published (or withdrew) its audio track.
    AgentAudio(Option<AudioTrackHandle>),
    /// The connection was closed by the remote end.
    Closed { reason: Option<String> },
}

/// An open connection plus the stream of events it produces.
pub struct TransportLink {
    pub connection: Box<dyn TransportConnection>,
    pub events: mpsc::Receiver<TransportEvent>,
}

/// The real-time media/control transport, consumed as an opaque capability.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens a connection. The details are consumed and must not be reused.
    async fn connect(&self, details: ConnectionDetails) -> Result<TransportLink, SessionError>;
}

/// A single open connection. Owned exclusively by the session controller.
#[async_trait]
pub trait TransportConnection: Send + Sync {
    /// Closes the connection. Must be safe to call on an already closed link.
    async fn close(&self);
}
