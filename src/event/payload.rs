//! Event and payload types.
//!
//! Payloads are a closed tagged union. A `kind` string resolves to exactly one
//! payload variant through the [`EventRegistry`](super::EventRegistry).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

/// Payload variant tag, used by reactors to declare what they accept.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Message,
    Whisper,
    Join,
    Quit,
    Kick,
    ViewForced,
    ViewSync,
    Disconnect,
    LandInvite,
    PlayerIdle,
    PlayerResume,
    LandDeposit,
    LandWithdraw,
    GameCrashed,
}

impl PayloadKind {
    /// Every payload variant.
    pub const ALL: [Self; 14] = [
        Self::Message,
        Self::Whisper,
        Self::Join,
        Self::Quit,
        Self::Kick,
        Self::ViewForced,
        Self::ViewSync,
        Self::Disconnect,
        Self::LandInvite,
        Self::PlayerIdle,
        Self::PlayerResume,
        Self::LandDeposit,
        Self::LandWithdraw,
        Self::GameCrashed,
    ];

    /// Stable snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Whisper => "whisper",
            Self::Join => "join",
            Self::Quit => "quit",
            Self::Kick => "kick",
            Self::ViewForced => "view_forced",
            Self::ViewSync => "view_sync",
            Self::Disconnect => "disconnect",
            Self::LandInvite => "land_invite",
            Self::PlayerIdle => "player_idle",
            Self::PlayerResume => "player_resume",
            Self::LandDeposit => "land_deposit",
            Self::LandWithdraw => "land_withdraw",
            Self::GameCrashed => "game_crashed",
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed event payloads.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Public chat line.
    Message {
        server_name: String,
        channel: String,
        tag: String,
        player: String,
        content: String,
    },

    /// Private message addressed to us.
    Whisper { sender: String, text: String },

    Join { player: String },

    Quit { player: String },

    /// We were kicked from the server.
    Kick,

    /// The server rotated our view.
    ViewForced { dx: i64, dy: i64 },

    /// An admin synchronized their view with ours.
    ViewSync { admin_name: String },

    /// Network-level disconnect.
    Disconnect,

    LandInvite { inviter: String, land_name: String },

    /// The server flagged us as idle.
    PlayerIdle,

    /// The idle flag was cleared.
    PlayerResume,

    LandDeposit {
        land_name: String,
        player: String,
        in_value: f64,
        now_value: String,
    },

    LandWithdraw {
        land_name: String,
        player: String,
        out_value: f64,
        now_value: String,
    },

    /// The game process itself crashed.
    GameCrashed,
}

impl EventPayload {
    /// The variant tag of this payload.
    #[must_use]
    pub const fn payload_kind(&self) -> PayloadKind {
        match self {
            Self::Message { .. } => PayloadKind::Message,
            Self::Whisper { .. } => PayloadKind::Whisper,
            Self::Join { .. } => PayloadKind::Join,
            Self::Quit { .. } => PayloadKind::Quit,
            Self::Kick => PayloadKind::Kick,
            Self::ViewForced { .. } => PayloadKind::ViewForced,
            Self::ViewSync { .. } => PayloadKind::ViewSync,
            Self::Disconnect => PayloadKind::Disconnect,
            Self::LandInvite { .. } => PayloadKind::LandInvite,
            Self::PlayerIdle => PayloadKind::PlayerIdle,
            Self::PlayerResume => PayloadKind::PlayerResume,
            Self::LandDeposit { .. } => PayloadKind::LandDeposit,
            Self::LandWithdraw { .. } => PayloadKind::LandWithdraw,
            Self::GameCrashed => PayloadKind::GameCrashed,
        }
    }

    /// Payload fields as a JSON object, without the variant tag.
    #[must_use]
    pub fn fields(&self) -> Map<String, JsonValue> {
        match serde_json::to_value(self) {
            Ok(JsonValue::Object(mut map)) => {
                map.remove("type");
                map
            }
            _ => Map::new(),
        }
    }
}

/// A classified event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique id of this occurrence.
    pub event_id: Uuid,
    /// Registry name of the event kind (e.g. `whisper`).
    pub kind: String,
    /// Typed payload.
    pub payload: EventPayload,
    /// When the line was classified.
    pub occurred_at: DateTime<Utc>,
}

impl Event {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(kind: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            kind: kind.into(),
            payload,
            occurred_at: Utc::now(),
        }
    }

    /// The payload variant tag.
    #[must_use]
    pub const fn payload_kind(&self) -> PayloadKind {
        self.payload.payload_kind()
    }

    /// Looks up a single payload field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<JsonValue> {
        self.payload.fields().remove(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_kind_matches_variant() {
        let payload = EventPayload::Whisper {
            sender: "Alice".to_string(),
            text: "hi".to_string(),
        };
        assert_eq!(payload.payload_kind(), PayloadKind::Whisper);
        assert_eq!(EventPayload::Kick.payload_kind(), PayloadKind::Kick);
    }

    #[test]
    fn fields_exclude_variant_tag() {
        let payload = EventPayload::LandInvite {
            inviter: "Bob".to_string(),
            land_name: "Lakeside".to_string(),
        };
        let fields = payload.fields();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields["land_name"], JsonValue::String("Lakeside".to_string()));
        assert!(!fields.contains_key("type"));
    }

    #[test]
    fn unit_payload_has_no_fields() {
        assert!(EventPayload::Disconnect.fields().is_empty());
    }

    #[test]
    fn event_field_lookup() {
        let ev = Event::new(
            "view-forced",
            EventPayload::ViewForced { dx: 3, dy: -2 },
        );
        assert_eq!(ev.field("dy"), Some(JsonValue::from(-2)));
        assert_eq!(ev.field("missing"), None);
        assert_eq!(ev.payload_kind(), PayloadKind::ViewForced);
    }

    #[test]
    fn all_kinds_have_distinct_names() {
        let mut names: Vec<&str> = PayloadKind::ALL.iter().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), PayloadKind::ALL.len());
    }
}
