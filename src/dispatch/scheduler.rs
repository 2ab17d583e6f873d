use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::task::{self, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::subscriber::{hook, named_handler, Hook, NamedHandler, Reactor, Subscription};
use crate::classify::Classifier;
use crate::config::SchedulerConfig;
use crate::error::{ConfigError, HandlerError, McResult};
use crate::event::Event;
use crate::ingest::LineSource;

/// Lifecycle of a [`Scheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulerState {
    /// Registered but not started.
    Idle,
    /// Ingesting and dispatching.
    Running,
    /// Cancelling tasks and running shutdown hooks.
    Draining,
    /// Finished.
    Stopped,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
struct Control {
    state: watch::Sender<SchedulerState>,
    cancel: CancellationToken,
    started: OnceLock<Instant>,
}

/// Cloneable control handle for a scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    control: Arc<Control>,
}

impl SchedulerHandle {
    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        *self.control.state.borrow()
    }

    /// Watches lifecycle transitions.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<SchedulerState> {
        self.control.state.subscribe()
    }

    /// Time since `run` started.
    #[must_use]
    pub fn uptime(&self) -> Option<Duration> {
        self.control.started.get().map(Instant::elapsed)
    }

    /// Asks the scheduler to drain without waiting.
    pub fn request_drain(&self) {
        self.control.cancel.cancel();
    }

    /// Drains the scheduler and waits until it has stopped.
    ///
    /// Safe to call any number of times, concurrently. Shutdown hooks run
    /// once. If the scheduler has not started, this only marks it cancelled.
    pub async fn drain(&self) {
        self.request_drain();
        if self.state() == SchedulerState::Idle {
            return;
        }
        let mut rx = self.subscribe_state();
        let _ = rx.wait_for(|s| *s == SchedulerState::Stopped).await;
    }
}

/// Who a consumer task is running for. Kept outside the task so a panic can
/// still be reported with its context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ConsumerTag {
    consumer: String,
    kind: String,
    event_id: Uuid,
}

type InFlight = HashMap<task::Id, ConsumerTag>;

/// How a consumer task ended.
#[derive(Debug)]
enum Outcome {
    Completed,
    Terminate(String),
    Failed { tag: ConsumerTag, panicked: bool },
}

/// Central coordinator: pumps sources through the classifier and fans each
/// event out to reactors and named handlers.
///
/// Every event is delivered to every reactor whose subscription accepts its
/// payload and to every handler bound to its kind, each in its own task. A
/// task failing with [`HandlerError::Terminate`] drains the scheduler.
pub struct Scheduler {
    classifier: Arc<Classifier>,
    config: SchedulerConfig,
    sources: Vec<Box<dyn LineSource>>,
    reactors: Vec<(Subscription, Arc<dyn Reactor>)>,
    handlers: HashMap<String, Vec<NamedHandler>>,
    startup: Vec<Hook>,
    shutdown: Vec<Hook>,
    control: Arc<Control>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("sources", &self.sources.len())
            .field("reactors", &self.reactors.len())
            .field("handlers", &self.handlers.len())
            .field("state", &*self.control.state.borrow())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Creates an idle scheduler.
    #[must_use]
    pub fn new(classifier: Classifier, config: SchedulerConfig) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            classifier: Arc::new(classifier),
            config,
            sources: Vec::new(),
            reactors: Vec::new(),
            handlers: HashMap::new(),
            startup: Vec::new(),
            shutdown: Vec::new(),
            control: Arc::new(Control {
                state,
                cancel: CancellationToken::new(),
                started: OnceLock::new(),
            }),
        }
    }

    /// Control handle, usable before and after `run`.
    #[must_use]
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            control: Arc::clone(&self.control),
        }
    }

    /// Adds an ingestion source.
    pub fn add_source(&mut self, source: impl LineSource + 'static) -> &mut Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Adds an already boxed ingestion source.
    pub fn add_boxed_source(&mut self, source: Box<dyn LineSource>) -> &mut Self {
        self.sources.push(source);
        self
    }

    /// Registers a reactor, resolving its subscription now.
    pub fn add_reactor(&mut self, reactor: Arc<dyn Reactor>) -> &mut Self {
        let subscription = reactor.subscription();
        debug!(reactor = reactor.name(), ?subscription, "reactor registered");
        self.reactors.push((subscription, reactor));
        self
    }

    /// Binds an async handler to the event kind `kind`.
    pub fn on_event<F, Fut>(&mut self, kind: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.handlers
            .entry(kind.into())
            .or_default()
            .push(named_handler(handler));
        self
    }

    /// Adds a hook run before ingestion starts. Failures are logged only.
    pub fn add_startup_hook<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.startup.push(hook(f));
        self
    }

    /// Adds a hook run once while draining, in registration order.
    pub fn add_shutdown_hook<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.shutdown.push(hook(f));
        self
    }

    /// Runs until drained: by a handle, by a terminate signal, or because
    /// every source ended and all in-flight tasks finished.
    pub async fn run(self) -> McResult<()> {
        if self.sources.is_empty() {
            return Err(ConfigError::NoIngestionSource.into());
        }

        let Self {
            classifier,
            config,
            sources,
            reactors,
            handlers,
            startup,
            shutdown,
            control,
        } = self;

        let _ = control.started.set(Instant::now());
        control.state.send_replace(SchedulerState::Running);
        info!(
            sources = sources.len(),
            reactors = reactors.len(),
            handlers = handlers.values().map(Vec::len).sum::<usize>(),
            "scheduler running"
        );

        for (idx, startup_hook) in startup.into_iter().enumerate() {
            if let Err(err) = startup_hook().await {
                warn!(hook = idx, error = %err, "startup hook failed");
            }
        }

        let (event_tx, mut event_rx) = mpsc::channel::<Event>(config.event_buffer.max(1));
        let mut pumps = JoinSet::new();
        for source in sources {
            pumps.spawn(pump(source, Arc::clone(&classifier), event_tx.clone()));
        }
        drop(event_tx);

        let mut tasks: JoinSet<Result<(), HandlerError>> = JoinSet::new();
        let mut inflight = InFlight::new();
        let cancel = control.cancel.clone();
        let mut ingesting = true;

        loop {
            if !ingesting && tasks.is_empty() {
                info!("all ingestion sources ended");
                break;
            }
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!("drain requested");
                    break;
                }
                Some(done) = tasks.join_next_with_id(), if !tasks.is_empty() => {
                    if let Outcome::Terminate(reason) = observe(done, &mut inflight) {
                        info!(reason = %reason, "terminate signal received, draining");
                        break;
                    }
                }
                next = event_rx.recv(), if ingesting => match next {
                    Some(event) => fan_out(event, &reactors, &handlers, &mut tasks, &mut inflight),
                    None => ingesting = false,
                },
            }
        }

        control.state.send_replace(SchedulerState::Draining);
        cancel.cancel();
        drop(event_rx);

        pumps.abort_all();
        while let Some(res) = pumps.join_next().await {
            if let Err(err) = res {
                log_join_error("ingestion", &err);
            }
        }
        tasks.abort_all();
        while let Some(res) = tasks.join_next_with_id().await {
            let _ = observe(res, &mut inflight);
        }

        for (idx, shutdown_hook) in shutdown.into_iter().enumerate() {
            if let Err(err) = shutdown_hook().await {
                warn!(hook = idx, error = %err, "shutdown hook failed");
            }
        }

        control.state.send_replace(SchedulerState::Stopped);
        info!("scheduler stopped");
        Ok(())
    }
}

async fn pump(mut source: Box<dyn LineSource>, classifier: Arc<Classifier>, tx: mpsc::Sender<Event>) {
    let name = source.describe();
    info!(source = %name, "ingestion started");
    loop {
        match source.next_line().await {
            Ok(Some(line)) => {
                for event in classifier.classify(&line) {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
            Ok(None) => {
                info!(source = %name, "ingestion source ended");
                return;
            }
            Err(err) => {
                error!(source = %name, error = %err, "ingestion source failed");
                return;
            }
        }
    }
}

fn fan_out(
    event: Event,
    reactors: &[(Subscription, Arc<dyn Reactor>)],
    handlers: &HashMap<String, Vec<NamedHandler>>,
    tasks: &mut JoinSet<Result<(), HandlerError>>,
    inflight: &mut InFlight,
) {
    let event = Arc::new(event);
    let payload_kind = event.payload_kind();
    let tag = |consumer: String| ConsumerTag {
        consumer,
        kind: event.kind.clone(),
        event_id: event.event_id,
    };

    for (subscription, reactor) in reactors {
        if !subscription.accepts(payload_kind) {
            continue;
        }
        let consumer = reactor.name().to_string();
        let reactor = Arc::clone(reactor);
        let ev = Arc::clone(&event);
        let handle = tasks.spawn(async move { reactor.react(&ev).await });
        inflight.insert(handle.id(), tag(consumer));
    }

    if let Some(bound) = handlers.get(&event.kind) {
        for handler in bound {
            let handler = Arc::clone(handler);
            let ev = Arc::clone(&event);
            let handle = tasks.spawn(async move { handler(ev).await });
            inflight.insert(handle.id(), tag(format!("on:{}", event.kind)));
        }
    }
}

/// Logs a finished consumer task with the context it was spawned for.
fn observe(done: Result<(task::Id, Result<(), HandlerError>), JoinError>, inflight: &mut InFlight) -> Outcome {
    let (id, result) = match done {
        Ok((id, result)) => (id, Ok(result)),
        Err(err) => (err.id(), Err(err)),
    };
    let tag = inflight.remove(&id).unwrap_or_default();
    match result {
        Ok(Ok(())) => Outcome::Completed,
        Ok(Err(HandlerError::Terminate { reason })) => Outcome::Terminate(reason),
        Ok(Err(err)) => {
            error!(consumer = %tag.consumer, kind = %tag.kind, event_id = %tag.event_id, error = %err, "event consumer failed");
            Outcome::Failed { tag, panicked: false }
        }
        Err(err) if err.is_panic() => {
            error!(consumer = %tag.consumer, kind = %tag.kind, event_id = %tag.event_id, error = %err, "event consumer panicked");
            Outcome::Failed { tag, panicked: true }
        }
        Err(_) => Outcome::Completed,
    }
}

fn log_join_error(what: &str, err: &JoinError) {
    if err.is_panic() {
        error!(task = what, error = %err, "task panicked");
    }
}
