use crate::error::SessionError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A room name supplied by the user or the directory. Guaranteed non-empty.
///
/// Names are otherwise opaque: reserved URL characters are escaped when the
/// name goes on the wire, never rejected here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RoomName(String);

impl RoomName {
    pub fn new(name: impl Into<String>) -> Result<Self, SessionError> {
        let name = name.into();
        if name.is_empty() {
            return Err(SessionError::invalid_room(name, "room name must not be empty"));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An active room as reported by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub name: String,
    #[serde(rename = "participantCount", alias = "numParticipants", default)]
    pub participant_count: u32,
}

/// The room the user intends to join.
///
/// Being a single enum value, choosing an existing room necessarily clears a
/// custom one and vice versa.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum RoomSelection {
    ExistingRoom(RoomName),
    CustomRoom(RoomName),
    #[default]
    None,
}

impl RoomSelection {
    pub fn existing(name: impl Into<String>) -> Result<Self, SessionError> {
        RoomName::new(name).map(RoomSelection::ExistingRoom)
    }

    pub fn custom(name: impl Into<String>) -> Result<Self, SessionError> {
        RoomName::new(name).map(RoomSelection::CustomRoom)
    }

    pub fn room_name(&self) -> Option<&RoomName> {
        match self {
            RoomSelection::ExistingRoom(name) | RoomSelection::CustomRoom(name) => Some(name),
            RoomSelection::None => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, RoomSelection::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_name_rejects_empty() {
        assert!(matches!(
            RoomName::new(""),
            Err(SessionError::InvalidRoomName { .. })
        ));
        assert!(RoomSelection::custom("").is_err());
        // Whitespace and reserved characters are the provider's business.
        assert_eq!(RoomName::new(" a/b?c ").unwrap().as_str(), " a/b?c ");
    }

    #[test]
    fn test_selection_is_exclusive() {
        let steps = [
            RoomSelection::existing("standup").unwrap(),
            RoomSelection::custom("my room").unwrap(),
            RoomSelection::existing("retro").unwrap(),
            RoomSelection::None,
            RoomSelection::custom("x").unwrap(),
        ];

        let mut selection = RoomSelection::default();
        for step in steps {
            selection = step.clone();
            let existing = matches!(selection, RoomSelection::ExistingRoom(_));
            let custom = matches!(selection, RoomSelection::CustomRoom(_));
            assert!(!(existing && custom));
            assert_eq!(selection, step);
        }
        assert_eq!(selection.room_name().map(RoomName::as_str), Some("x"));
    }

    #[test]
    fn test_room_summary_accepts_both_count_fields() {
        let summary: RoomSummary =
            serde_json::from_str(r#"{"name":"standup","numParticipants":3}"#).unwrap();
        assert_eq!(summary.participant_count, 3);

        let summary: RoomSummary =
            serde_json::from_str(r#"{"name":"standup","participantCount":2}"#).unwrap();
        assert_eq!(summary.participant_count, 2);

        let summary: RoomSummary = serde_json::from_str(r#"{"name":"empty"}"#).unwrap();
        assert_eq!(summary.participant_count, 0);
    }
}
