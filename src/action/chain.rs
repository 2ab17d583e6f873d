use std::ops::Add;
use std::time::Duration;

use super::queue::ActionQueue;
use super::step::ActionStep;
use crate::error::ActionError;

/// An ordered sequence of steps run one after another.
///
/// Step N+1 is submitted only after step N has completed, so steps of one
/// chain never interleave. With [`timeout_all`](Self::timeout_all), steps not
/// yet submitted when the deadline passes are dropped; a submitted step still
/// runs to completion in the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionChain {
    steps: Vec<ActionStep>,
    deadline: Option<Duration>,
}

impl ActionChain {
    /// An empty chain.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            steps: Vec::new(),
            deadline: None,
        }
    }

    /// Appends a step or chain. If both sides carry a deadline the tighter
    /// one bounds the combined run.
    #[must_use]
    pub fn then(mut self, next: impl Into<Self>) -> Self {
        let next = next.into();
        self.deadline = match (self.deadline, next.deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.steps.extend(next.steps);
        self
    }

    /// Bounds the whole sequential run.
    #[must_use]
    pub const fn timeout_all(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// The steps in execution order.
    #[must_use]
    pub fn steps(&self) -> &[ActionStep] {
        &self.steps
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the chain has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs every step in order, stopping at the first failure.
    pub async fn run(&self, queue: &ActionQueue) -> Result<(), ActionError> {
        match self.deadline {
            None => self.run_steps(queue).await,
            Some(deadline) => tokio::time::timeout(deadline, self.run_steps(queue))
                .await
                .map_err(|_| ActionError::ChainTimeout {
                    duration_ms: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
                })?,
        }
    }

    async fn run_steps(&self, queue: &ActionQueue) -> Result<(), ActionError> {
        for step in &self.steps {
            step.run(queue).await?;
        }
        Ok(())
    }
}

impl From<ActionStep> for ActionChain {
    fn from(step: ActionStep) -> Self {
        Self {
            steps: vec![step],
            deadline: None,
        }
    }
}

impl FromIterator<ActionStep> for ActionChain {
    fn from_iter<I: IntoIterator<Item = ActionStep>>(iter: I) -> Self {
        Self {
            steps: iter.into_iter().collect(),
            deadline: None,
        }
    }
}

impl<T: Into<Self>> Add<T> for ActionChain {
    type Output = Self;

    fn add(self, rhs: T) -> Self {
        self.then(rhs)
    }
}

impl<T: Into<ActionChain>> Add<T> for ActionStep {
    type Output = ActionChain;

    fn add(self, rhs: T) -> ActionChain {
        ActionChain::from(self).then(rhs)
    }
}
