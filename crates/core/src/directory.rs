//! Room Directory
//!
//! Lists the rooms currently active at the provider. Refreshes are coalesced
//! so that at most one directory request is in flight at any time, and the
//! last successful listing survives a failed refresh.

use crate::{error::SessionError, lock, room::RoomSummary};
use async_trait::async_trait;
use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use reqwest::Url;
use serde::Deserialize;
use std::sync::{
    Mutex,
    atomic::{AtomicU64, Ordering},
};
use tracing::{debug, info, warn};

/// Defines the contract for any source of active rooms.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoomDirectory: Send + Sync {
    /// Fetches the current room list, replacing the cached one on success.
    ///
    /// Calls made while a fetch is pending resolve with that fetch's result.
    async fn refresh(&self) -> Result<Vec<RoomSummary>, SessionError>;

    /// The most recent successful listing (empty before the first one).
    fn rooms(&self) -> Vec<RoomSummary>;
}

#[derive(Deserialize)]
struct RoomList {
    rooms: Vec<RoomSummary>,
}

type PendingRefresh = Shared<BoxFuture<'static, Result<Vec<RoomSummary>, SessionError>>>;

/// A `RoomDirectory` backed by the provider's `?list=true` endpoint.
pub struct HttpRoomDirectory {
    http: reqwest::Client,
    list_url: Url,
    rooms: Mutex<Vec<RoomSummary>>,
    pending: Mutex<Option<(u64, PendingRefresh)>>,
    next_request: AtomicU64,
}

impl HttpRoomDirectory {
    /// Creates a directory client for the given connection endpoint.
    pub fn new(http: reqwest::Client, endpoint: &Url) -> Self {
        let mut list_url = endpoint.clone();
        list_url.query_pairs_mut().append_pair("list", "true");
        Self {
            http,
            list_url,
            rooms: Mutex::new(Vec::new()),
            pending: Mutex::new(None),
            next_request: AtomicU64::new(0),
        }
    }
}

async fn fetch_rooms(http: reqwest::Client, url: Url) -> Result<Vec<RoomSummary>, SessionError> {
    let response = http
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(SessionError::network)?;
    let list: RoomList = response.json().await.map_err(SessionError::network)?;

    Ok(list
        .rooms
        .into_iter()
        .filter(|room| {
            if room.name.is_empty() {
                warn!("Ignoring directory entry with an empty room name");
            }
            !room.name.is_empty()
        })
        .collect())
}

#[async_trait]
impl RoomDirectory for HttpRoomDirectory {
    async fn refresh(&self) -> Result<Vec<RoomSummary>, SessionError> {
        let (request_id, pending) = {
            let mut slot = lock(&self.pending);
            match slot.as_ref() {
                Some((id, pending)) => {
                    debug!(request = id, "Joining in-flight room directory refresh");
                    (*id, pending.clone())
                }
                None => {
                    let id = self.next_request.fetch_add(1, Ordering::Relaxed);
                    let pending = fetch_rooms(self.http.clone(), self.list_url.clone())
                        .boxed()
                        .shared();
                    *slot = Some((id, pending.clone()));
                    (id, pending)
                }
            }
        };

        let result = pending.await;

        {
            let mut slot = lock(&self.pending);
            if matches!(slot.as_ref(), Some((id, _)) if *id == request_id) {
                *slot = None;
            }
        }

        match &result {
            Ok(rooms) => {
                info!(count = rooms.len(), "Room directory refreshed");
                *lock(&self.rooms) = rooms.clone();
            }
            Err(e) => warn!(error = %e, "Room directory refresh failed; keeping previous list"),
        }
        result
    }

    fn rooms(&self) -> Vec<RoomSummary> {
        lock(&self.rooms).clone()
    }
}

/// A `RoomDirectory` serving a preset list. Used as a test double by the
/// session scenarios.
pub struct StaticRoomDirectory {
    rooms: Vec<RoomSummary>,
}

impl StaticRoomDirectory {
    pub fn new(rooms: Vec<RoomSummary>) -> Self {
        Self { rooms }
    }
}

#[async_trait]
impl RoomDirectory for StaticRoomDirectory {
    async fn refresh(&self) -> Result<Vec<RoomSummary>, SessionError> {
        Ok(self.rooms.clone())
    }

    fn rooms(&self) -> Vec<RoomSummary> {
        self.rooms.clone()
    }
}
