use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::action::{jump, wait, ActionChain, ActionQueue, DEFAULT_STEP_TIMEOUT};
use crate::dispatch::{Reactor, Subscription};
use crate::error::{ActionError, HandlerError};
use crate::event::{Event, EventPayload, PayloadKind};

/// Keeps the player moving while the server considers it idle.
///
/// The first idle event starts an evasion loop (three jumps, then a pause)
/// that runs until a resume event clears the flag. Idle events arriving while
/// the loop is active are ignored.
#[derive(Debug)]
pub struct IdleGuard {
    queue: ActionQueue,
    idle: AtomicBool,
    evasions: AtomicU64,
    jump_interval: Duration,
    hold: Duration,
    step_timeout: Duration,
}

impl IdleGuard {
    /// Creates a guard with one-second jumps and a four-second pause.
    #[must_use]
    pub fn new(queue: ActionQueue) -> Self {
        Self::with_timing(queue, Duration::from_secs(1), Duration::from_secs(4))
    }

    /// Creates a guard with custom timing.
    #[must_use]
    pub const fn with_timing(queue: ActionQueue, jump_interval: Duration, hold: Duration) -> Self {
        Self {
            queue,
            idle: AtomicBool::new(false),
            evasions: AtomicU64::new(0),
            jump_interval,
            hold,
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    /// How long each jump step may take before the round moves on. The
    /// pause step waits its hold time plus this.
    #[must_use]
    pub fn step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Whether the evasion loop is active.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.idle.load(Ordering::Acquire)
    }

    /// How many idle periods have been handled.
    #[must_use]
    pub fn evasions(&self) -> u64 {
        self.evasions.load(Ordering::Relaxed)
    }

    fn round(&self) -> ActionChain {
        jump(3)
            .interval(self.jump_interval)
            .step()
            .timeout(self.step_timeout)
            + wait(self.hold).timeout(self.hold + self.step_timeout)
    }

    async fn evade(&self) -> Result<(), HandlerError> {
        if self.idle.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.evasions.fetch_add(1, Ordering::Relaxed);
        info!("idle detected, jumping to stay connected");

        while self.is_idle() {
            match self.round().run(&self.queue).await {
                Ok(()) => {}
                Err(ActionError::QueueClosed) => {
                    self.idle.store(false, Ordering::Release);
                    return Err(ActionError::QueueClosed.into());
                }
                Err(err) => warn!(error = %err, "idle evasion round failed"),
            }
        }
        Ok(())
    }

    fn resume(&self) {
        if self.idle.swap(false, Ordering::AcqRel) {
            info!(evasions = self.evasions(), "idle flag cleared");
        }
    }
}

#[async_trait]
impl Reactor for IdleGuard {
    fn name(&self) -> &str {
        "idle-guard"
    }

    fn subscription(&self) -> Subscription {
        Subscription::only([PayloadKind::PlayerIdle, PayloadKind::PlayerResume])
    }

    async fn react(&self, event: &Event) -> Result<(), HandlerError> {
        match event.payload {
            EventPayload::PlayerIdle => self.evade().await,
            EventPayload::PlayerResume => {
                self.resume();
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
