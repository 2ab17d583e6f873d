//! Event dispatch and task supervision.

/// The scheduler and its control handle.
pub mod scheduler;
/// Reactor, handler and hook types.
pub mod subscriber;

pub use scheduler::{Scheduler, SchedulerHandle, SchedulerState};
pub use subscriber::{hook, named_handler, HandlerFuture, Hook, NamedHandler, Reactor, Subscription};
