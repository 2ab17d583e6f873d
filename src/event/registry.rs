//! Bidirectional mapping between event-kind names and payload constructors.
//!
//! The registry is an explicit build step: it is constructed before any
//! ingestion starts and then handed to the classifier by value.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::error::{ClassifyError, ConfigError};

use super::payload::{EventPayload, PayloadKind};

/// Named captures of one match. Groups that did not participate map to `None`.
pub type CaptureMap = BTreeMap<String, Option<String>>;

/// Builds a payload from the captures of a match. The first argument is the
/// event kind, for diagnostics.
pub type PayloadConstructor =
    Arc<dyn Fn(&str, &CaptureMap) -> Result<EventPayload, ClassifyError> + Send + Sync>;

/// Wraps a closure as a [`PayloadConstructor`].
pub fn constructor<F>(f: F) -> PayloadConstructor
where
    F: Fn(&str, &CaptureMap) -> Result<EventPayload, ClassifyError> + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Clone)]
struct Registration {
    payload: PayloadKind,
    construct: PayloadConstructor,
}

/// Registry of event kinds.
#[derive(Clone, Default)]
pub struct EventRegistry {
    by_kind: HashMap<String, Registration>,
    by_payload: HashMap<PayloadKind, String>,
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRegistry")
            .field("kinds", &self.by_payload)
            .finish()
    }
}

impl EventRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every built-in kind.
    ///
    /// `channel_aliases` maps the channel tag seen in chat lines to the
    /// command prefix stored on `message` payloads.
    pub fn with_builtins(channel_aliases: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let mut reg = Self::new();

        let aliases = channel_aliases.clone();
        reg.register(
            "message",
            PayloadKind::Message,
            constructor(move |kind, caps| {
                let tag = optional(caps, "channel").unwrap_or_else(|| "G".to_string());
                let channel = aliases.get(&tag).cloned().unwrap_or_else(|| "global".to_string());
                Ok(EventPayload::Message {
                    server_name: optional(caps, "server_name").unwrap_or_else(|| "主服".to_string()),
                    channel,
                    tag: optional(caps, "tag").unwrap_or_else(|| "流浪者".to_string()),
                    player: required(kind, caps, "player")?,
                    content: optional(caps, "content").unwrap_or_default(),
                })
            }),
        )?;
        reg.register(
            "whisper",
            PayloadKind::Whisper,
            constructor(|kind, caps| {
                Ok(EventPayload::Whisper {
                    sender: required(kind, caps, "sender")?,
                    text: required(kind, caps, "text")?,
                })
            }),
        )?;
        reg.register(
            "join",
            PayloadKind::Join,
            constructor(|kind, caps| Ok(EventPayload::Join { player: required(kind, caps, "player")? })),
        )?;
        reg.register(
            "quit",
            PayloadKind::Quit,
            constructor(|kind, caps| Ok(EventPayload::Quit { player: required(kind, caps, "player")? })),
        )?;
        reg.register("kick", PayloadKind::Kick, constructor(|_, _| Ok(EventPayload::Kick)))?;
        reg.register(
            "view-forced",
            PayloadKind::ViewForced,
            constructor(|kind, caps| {
                Ok(EventPayload::ViewForced {
                    dx: parse_int(kind, "dx", &required(kind, caps, "dx")?)?,
                    dy: parse_int(kind, "dy", &required(kind, caps, "dy")?)?,
                })
            }),
        )?;
        reg.register(
            "view-sync",
            PayloadKind::ViewSync,
            constructor(|kind, caps| {
                Ok(EventPayload::ViewSync {
                    admin_name: required(kind, caps, "admin_name")?,
                })
            }),
        )?;
        reg.register("disconnect", PayloadKind::Disconnect, constructor(|_, _| Ok(EventPayload::Disconnect)))?;
        reg.register(
            "land-invite",
            PayloadKind::LandInvite,
            constructor(|kind, caps| {
                Ok(EventPayload::LandInvite {
                    inviter: required(kind, caps, "inviter")?,
                    land_name: required(kind, caps, "land_name")?.trim().to_string(),
                })
            }),
        )?;
        reg.register("idle", PayloadKind::PlayerIdle, constructor(|_, _| Ok(EventPayload::PlayerIdle)))?;
        reg.register(
            "idle-resume",
            PayloadKind::PlayerResume,
            constructor(|_, _| Ok(EventPayload::PlayerResume)),
        )?;
        reg.register(
            "land-deposit",
            PayloadKind::LandDeposit,
            constructor(|kind, caps| {
                Ok(EventPayload::LandDeposit {
                    land_name: required(kind, caps, "land_name")?,
                    player: required(kind, caps, "player")?,
                    in_value: parse_amount(kind, "in_value", &required(kind, caps, "in_value")?)?,
                    now_value: required(kind, caps, "now_value")?,
                })
            }),
        )?;
        reg.register(
            "land-withdraw",
            PayloadKind::LandWithdraw,
            constructor(|kind, caps| {
                Ok(EventPayload::LandWithdraw {
                    land_name: required(kind, caps, "land_name")?,
                    player: required(kind, caps, "player")?,
                    out_value: parse_amount(kind, "out_value", &required(kind, caps, "out_value")?)?,
                    now_value: required(kind, caps, "now_value")?,
                })
            }),
        )?;
        reg.register(
            "game-crashed",
            PayloadKind::GameCrashed,
            constructor(|_, _| Ok(EventPayload::GameCrashed)),
        )?;

        Ok(reg)
    }

    /// Registers a kind. Both the name and the payload type must be unbound.
    pub fn register(
        &mut self,
        kind: impl Into<String>,
        payload: PayloadKind,
        construct: PayloadConstructor,
    ) -> Result<(), ConfigError> {
        let kind = kind.into();
        if self.by_kind.contains_key(&kind) {
            return Err(ConfigError::DuplicateKind { kind });
        }
        if let Some(bound) = self.by_payload.get(&payload) {
            return Err(ConfigError::DuplicatePayload {
                payload: payload.to_string(),
                kind: bound.clone(),
            });
        }

        self.by_payload.insert(payload, kind.clone());
        self.by_kind.insert(kind, Registration { payload, construct });
        Ok(())
    }

    /// Builds the payload for `kind` from a match's captures.
    pub fn construct(&self, kind: &str, captures: &CaptureMap) -> Result<EventPayload, ClassifyError> {
        let reg = self.by_kind.get(kind).ok_or_else(|| ClassifyError::UnregisteredKind {
            kind: kind.to_string(),
        })?;
        (reg.construct)(kind, captures)
    }

    /// The kind name bound to a payload type.
    #[must_use]
    pub fn kind_of(&self, payload: PayloadKind) -> Option<&str> {
        self.by_payload.get(&payload).map(String::as_str)
    }

    /// The payload type bound to a kind name.
    #[must_use]
    pub fn payload_of(&self, kind: &str) -> Option<PayloadKind> {
        self.by_kind.get(kind).map(|r| r.payload)
    }

    /// Returns true if `kind` is registered.
    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.by_kind.contains_key(kind)
    }

    /// Number of registered kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_kind.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty()
    }
}

fn optional(caps: &CaptureMap, field: &str) -> Option<String> {
    caps.get(field).cloned().flatten()
}

fn required(kind: &str, caps: &CaptureMap, field: &str) -> Result<String, ClassifyError> {
    optional(caps, field).ok_or_else(|| ClassifyError::MissingField {
        kind: kind.to_string(),
        field: field.to_string(),
    })
}

fn parse_amount(kind: &str, field: &str, raw: &str) -> Result<f64, ClassifyError> {
    raw.replace(',', "").trim().parse::<f64>().map_err(|_| ClassifyError::InvalidField {
        kind: kind.to_string(),
        field: field.to_string(),
        value: raw.to_string(),
    })
}

fn parse_int(kind: &str, field: &str, raw: &str) -> Result<i64, ClassifyError> {
    raw.trim().parse::<i64>().map_err(|_| ClassifyError::InvalidField {
        kind: kind.to_string(),
        field: field.to_string(),
        value: raw.to_string(),
    })
}
