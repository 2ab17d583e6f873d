//! Built-in reactors.

/// Current chat channel tracking.
pub mod channel;
/// Anti-idle jumping.
pub mod idle;
/// Declarative trigger rules.
pub mod triggers;

pub use channel::{ChannelTracker, PROBE_PREFIX};
pub use idle::IdleGuard;
pub use triggers::{TriggerActionSpec, TriggerReactor, TriggerSet, TriggerSpec};
