//! Actions on the controlled player.
//!
//! Everything that touches the player goes through the [`ActionQueue`], which
//! owns the [`Actuator`] and runs one action at a time. Fluent builders in
//! [`command`] produce [`ActionStep`]s; steps compose into [`ActionChain`]s.

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::error::ActionError;

/// Step composition and chain timeouts.
pub mod chain;
/// Fluent builders for player and server commands.
pub mod command;
/// Correlated request/response probes.
pub mod probe;
/// The serialized executor.
pub mod queue;
/// Primitive steps.
pub mod step;

pub use chain::ActionChain;
pub use command::{chat, jump, land, pay, wait};
pub use probe::{ProbeGuard, ProbeRegistry};
pub use queue::{ActionQueue, ActionTicket};
pub use step::{ActionStep, StepAction, DEFAULT_STEP_TIMEOUT};

/// The input device of the controlled player.
///
/// Implementations are invoked only by the queue worker, never concurrently.
#[async_trait]
pub trait Actuator: Send + Sync {
    /// Opens chat, enters each line, then pauses.
    async fn type_text(&self, lines: &[String], pause: Duration) -> Result<(), ActionError>;

    /// Presses jump `times` times with `interval` between presses.
    async fn jump(&self, times: u32, interval: Duration) -> Result<(), ActionError>;
}

/// Actuator that logs each action instead of driving an input device.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunActuator;

#[async_trait]
impl Actuator for DryRunActuator {
    async fn type_text(&self, lines: &[String], pause: Duration) -> Result<(), ActionError> {
        for line in lines {
            info!(line = %line, "chat");
        }
        tokio::time::sleep(pause).await;
        Ok(())
    }

    async fn jump(&self, times: u32, interval: Duration) -> Result<(), ActionError> {
        for press in 1..=times {
            info!(press, times, "jump");
            if press < times {
                tokio::time::sleep(interval).await;
            }
        }
        Ok(())
    }
}
