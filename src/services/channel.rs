use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::action::{chat, ActionQueue, ProbeRegistry};
use crate::dispatch::{Reactor, Subscription};
use crate::error::HandlerError;
use crate::event::{Event, EventPayload, PayloadKind};

/// Text prefix of a channel probe message.
pub const PROBE_PREFIX: &str = "channel_scan:";

/// Tracks which chat channel the player is speaking in.
///
/// Only the player's own messages are considered. The cache follows every
/// such message; [`current_channel`](Self::current_channel) additionally sends
/// a probe and waits for its echo so the answer reflects the moment of asking.
#[derive(Debug)]
pub struct ChannelTracker {
    user_id: String,
    queue: ActionQueue,
    probes: ProbeRegistry<String>,
    current: Mutex<String>,
    probe_timeout: Duration,
}

impl ChannelTracker {
    /// Creates a tracker for the player `user_id`, starting in `global`.
    #[must_use]
    pub fn new(user_id: impl Into<String>, queue: ActionQueue, probe_timeout: Duration) -> Self {
        Self {
            user_id: user_id.into(),
            queue,
            probes: ProbeRegistry::new(),
            current: Mutex::new("global".to_string()),
            probe_timeout,
        }
    }

    /// Last channel seen, without probing.
    #[must_use]
    pub fn cached_channel(&self) -> String {
        self.current.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn remember(&self, channel: &str) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = channel.to_string();
    }

    /// Probes the current channel, falling back to the cached one.
    pub async fn current_channel(&self) -> String {
        let probe = self.probes.register();
        let message = format!("{PROBE_PREFIX}{}", probe.id());
        let sent = match chat(message).build() {
            Ok(step) => step.run(&self.queue).await.map_err(HandlerError::from),
            Err(err) => Err(err.into()),
        };
        if let Err(err) = sent {
            warn!(error = %err, "channel probe not sent, using cached channel");
            return self.cached_channel();
        }
        let cached = self.cached_channel();
        probe.wait_or(self.probe_timeout, cached).await
    }

    /// Probes still waiting for their echo.
    #[must_use]
    pub fn pending_probes(&self) -> usize {
        self.probes.pending()
    }
}

#[async_trait]
impl Reactor for ChannelTracker {
    fn name(&self) -> &str {
        "channel-tracker"
    }

    fn subscription(&self) -> Subscription {
        Subscription::only([PayloadKind::Message])
    }

    async fn react(&self, event: &Event) -> Result<(), HandlerError> {
        let EventPayload::Message {
            channel,
            player,
            content,
            ..
        } = &event.payload
        else {
            return Ok(());
        };
        if *player != self.user_id {
            return Ok(());
        }

        self.remember(channel);
        if let Some(id) = self
            .probes
            .resolve_where(|id| content.contains(&format!("{PROBE_PREFIX}{id}")), channel.clone())
        {
            debug!(probe = %id, channel = %channel, "channel probe echoed");
        }
        Ok(())
    }
}
