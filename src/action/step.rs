use std::fmt;
use std::time::Duration;

use super::queue::ActionQueue;
use crate::error::ActionError;

/// Default wait for a single step to complete through the queue.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(10);

/// A primitive actuation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    /// Press jump `times` times, pausing `interval` between presses.
    Jump {
        /// Number of presses.
        times: u32,
        /// Pause between presses.
        interval: Duration,
    },
    /// Hold the actor idle.
    Wait {
        /// How long to hold.
        duration: Duration,
    },
    /// Enter each line into chat, then pause.
    Type {
        /// Lines entered in order.
        lines: Vec<String>,
        /// Pause after the last line.
        pause: Duration,
    },
}

impl StepAction {
    /// Short name used in logs and errors.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Jump { .. } => "jump",
            Self::Wait { .. } => "wait",
            Self::Type { .. } => "type",
        }
    }

    /// Single-line chat entry with no trailing pause.
    #[must_use]
    pub fn command(line: impl Into<String>) -> Self {
        Self::Type {
            lines: vec![line.into()],
            pause: Duration::ZERO,
        }
    }
}

impl fmt::Display for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jump { times, interval } => write!(f, "jump x{times} every {}ms", interval.as_millis()),
            Self::Wait { duration } => write!(f, "wait {}ms", duration.as_millis()),
            Self::Type { lines, .. } => write!(f, "type {}", lines.join(" | ")),
        }
    }
}

/// One queued unit of work with its own completion timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionStep {
    action: StepAction,
    timeout: Duration,
}

impl ActionStep {
    /// Wraps an action with the default timeout.
    #[must_use]
    pub const fn new(action: StepAction) -> Self {
        Self {
            action,
            timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    /// Overrides how long [`run`](Self::run) waits for completion.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The wrapped action.
    #[must_use]
    pub const fn action(&self) -> &StepAction {
        &self.action
    }

    /// The completion timeout.
    #[must_use]
    pub const fn wait_limit(&self) -> Duration {
        self.timeout
    }

    /// Submits the step and waits for it within its timeout.
    ///
    /// On timeout only the wait is abandoned; the queued action still runs.
    pub async fn run(&self, queue: &ActionQueue) -> Result<(), ActionError> {
        queue.submit(self.action.clone())?.wait_timeout(self.timeout).await
    }
}

impl From<StepAction> for ActionStep {
    fn from(action: StepAction) -> Self {
        Self::new(action)
    }
}
