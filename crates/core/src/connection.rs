use crate::{error::SessionError, room::RoomSelection};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use secrecy::SecretString;
use serde::Deserialize;
use tracing::{debug, info};

/// Server address and single-use credential for one join attempt.
///
/// Deliberately not `Clone`: the transport consumes it and it is gone.
#[derive(Debug)]
pub struct ConnectionDetails {
    server_address: Url,
    credential_token: SecretString,
    room_name: Option<String>,
    participant_name: Option<String>,
}

impl ConnectionDetails {
    pub fn new(server_address: Url, credential_token: impl Into<String>) -> Self {
        Self {
            server_address,
            credential_token: SecretString::from(credential_token.into()),
            room_name: None,
            participant_name: None,
        }
    }

    pub fn server_address(&self) -> &Url {
        &self.server_address
    }

    pub fn credential_token(&self) -> &SecretString {
        &self.credential_token
    }

    /// Room the provider actually placed us in, when it says so.
    pub fn room_name(&self) -> Option<&str> {
        self.room_name.as_deref()
    }

    /// Identity minted for this attempt, when the provider reports it.
    pub fn participant_name(&self) -> Option<&str> {
        self.participant_name.as_deref()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionDetailsBody {
    #[serde(alias = "serverUrl")]
    server_address: String,
    #[serde(alias = "participantToken")]
    credential_token: String,
    room_name: Option<String>,
    participant_name: Option<String>,
}

impl TryFrom<ConnectionDetailsBody> for ConnectionDetails {
    type Error = SessionError;

    fn try_from(body: ConnectionDetailsBody) -> Result<Self, Self::Error> {
        let server_address = Url::parse(&body.server_address).map_err(|e| {
            SessionError::Network(format!(
                "provider returned an invalid server address {:?}: {}",
                body.server_address, e
            ))
        })?;
        let mut details = ConnectionDetails::new(server_address, body.credential_token);
        details.room_name = body.room_name;
        details.participant_name = body.participant_name;
        Ok(details)
    }
}

/// Issues connection credentials for a room.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Requests fresh credentials for the selected room. Never cached.
    async fn request_connection(
        &self,
        selection: &RoomSelection,
    ) -> Result<ConnectionDetails, SessionError>;

    /// Whether a `None` selection may be requested, leaving the room choice
    /// to the provider.
    fn allows_default_room(&self) -> bool {
        false
    }
}

/// A `ConnectionProvider` that calls the provider's connection-details endpoint.
pub struct HttpConnectionProvider {
    http: reqwest::Client,
    endpoint: Url,
    allow_default_room: bool,
}

impl HttpConnectionProvider {
    /// Creates a provider client.
    ///
    /// # Arguments
    ///
    /// * `endpoint` - The absolute connection-details endpoint.
    /// * `allow_default_room` - Whether a `None` selection may be sent without
    ///   a `room` parameter, leaving the room choice to the provider.
    pub fn new(http: reqwest::Client, endpoint: Url, allow_default_room: bool) -> Self {
        Self {
            http,
            endpoint,
            allow_default_room,
        }
    }

    fn request_url(&self, selection: &RoomSelection) -> Result<Url, SessionError> {
        let mut url = self.endpoint.clone();
        match selection.room_name() {
            Some(name) => {
                // Form encoding would turn spaces into '+'.
                let room = format!("room={}", urlencoding::encode(name.as_str()));
                let query = match url.query() {
                    Some(existing) if !existing.is_empty() => format!("{}&{}", existing, room),
                    _ => room,
                };
                url.set_query(Some(&query));
            }
            None if self.allow_default_room => {}
            None => {
                return Err(SessionError::invalid_room(
                    "",
                    "no room selected and the provider has no default room",
                ));
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl ConnectionProvider for HttpConnectionProvider {
    fn allows_default_room(&self) -> bool {
        self.allow_default_room
    }

    async fn request_connection(
        &self,
        selection: &RoomSelection,
    ) -> Result<ConnectionDetails, SessionError> {
        let url = self.request_url(selection)?;
        debug!(%url, "Requesting connection details");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(SessionError::network)?;

        let status = response.status();
        if matches!(
            status,
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY
        ) {
            let reason = response.text().await.unwrap_or_default();
            let name = selection
                .room_name()
                .map(|n| n.as_str().to_string())
                .unwrap_or_default();
            return Err(SessionError::invalid_room(
                name,
                if reason.is_empty() {
                    format!("rejected by provider ({})", status)
                } else {
                    reason
                },
            ));
        }

        let body: ConnectionDetailsBody = response
            .error_for_status()
            .map_err(SessionError::network)?
            .json()
            .await
            .map_err(SessionError::network)?;
        let details = ConnectionDetails::try_from(body)?;

        info!(
            server = %details.server_address(),
            room = ?details.room_name(),
            "Connection details issued"
        );
        Ok(details)
    }
}
