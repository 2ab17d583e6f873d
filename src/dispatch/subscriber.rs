use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::event::{Event, PayloadKind};

/// Boxed future returned by named handlers and lifecycle hooks.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send>>;

/// Handler bound to an event kind name.
pub type NamedHandler = Arc<dyn Fn(Arc<Event>) -> HandlerFuture + Send + Sync>;

/// Startup or shutdown hook. Runs once.
pub type Hook = Box<dyn FnOnce() -> HandlerFuture + Send>;

/// Payload variants a reactor accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subscription {
    /// Every event.
    All,
    /// Only events whose payload is one of these variants.
    Only(BTreeSet<PayloadKind>),
}

impl Subscription {
    /// Subscription to the given variants.
    pub fn only(kinds: impl IntoIterator<Item = PayloadKind>) -> Self {
        Self::Only(kinds.into_iter().collect())
    }

    /// Whether an event with payload `kind` is delivered.
    #[must_use]
    pub fn accepts(&self, kind: PayloadKind) -> bool {
        match self {
            Self::All => true,
            Self::Only(kinds) => kinds.contains(&kind),
        }
    }
}

/// Long-lived consumer subscribed by payload variant.
///
/// Each matching event is handled in its own task, so `react` may run
/// concurrently with itself. State that must survive between events belongs
/// behind the reactor's own synchronization.
#[async_trait]
pub trait Reactor: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Variants this reactor accepts. Read once, at registration.
    fn subscription(&self) -> Subscription;

    /// Handles one event.
    async fn react(&self, event: &Event) -> Result<(), HandlerError>;
}

/// Wraps an async closure as a [`NamedHandler`].
pub fn named_handler<F, Fut>(f: F) -> NamedHandler
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(move |event| Box::pin(f(event)) as HandlerFuture)
}

/// Wraps an async closure as a [`Hook`].
pub fn hook<F, Fut>(f: F) -> Hook
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Box::new(move || Box::pin(f()) as HandlerFuture)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_membership() {
        assert!(Subscription::All.accepts(PayloadKind::Kick));

        let idle = Subscription::only([PayloadKind::PlayerIdle, PayloadKind::PlayerResume]);
        assert!(idle.accepts(PayloadKind::PlayerResume));
        assert!(!idle.accepts(PayloadKind::Message));
    }
}
