use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::step::StepAction;
use super::Actuator;
use crate::error::ActionError;

struct ActionRequest {
    action: StepAction,
    reply: oneshot::Sender<Result<(), ActionError>>,
}

/// Single-owner executor for the controlled actor.
///
/// Requests are executed one at a time in submission order by a single worker
/// task that owns the actuator. A failing or panicking action resolves only its
/// own ticket. Cloning the queue clones the handle, not the worker.
#[derive(Clone)]
pub struct ActionQueue {
    tx: mpsc::UnboundedSender<ActionRequest>,
    cancel: CancellationToken,
    executed: Arc<AtomicU64>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl std::fmt::Debug for ActionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionQueue")
            .field("closed", &self.is_closed())
            .field("executed", &self.executed())
            .finish_non_exhaustive()
    }
}

impl ActionQueue {
    /// Starts the worker on the current runtime.
    #[must_use]
    pub fn spawn(actuator: Arc<dyn Actuator>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let executed = Arc::new(AtomicU64::new(0));

        let join = tokio::spawn(worker_loop(actuator, rx, cancel.clone(), Arc::clone(&executed)));

        Self {
            tx,
            cancel,
            executed,
            worker: Arc::new(Mutex::new(Some(join))),
        }
    }

    /// Enqueues an action without waiting for it.
    pub fn submit(&self, action: StepAction) -> Result<ActionTicket, ActionError> {
        if self.cancel.is_cancelled() {
            return Err(ActionError::QueueClosed);
        }
        let name = action.name();
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ActionRequest { action, reply })
            .map_err(|_| ActionError::QueueClosed)?;
        Ok(ActionTicket { action: name, rx })
    }

    /// Number of actions the worker has finished, successfully or not.
    #[must_use]
    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    /// Whether the queue has stopped accepting requests.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }

    /// Stops accepting requests. The in-flight action runs to completion and
    /// requests still queued resolve with [`ActionError::QueueClosed`].
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Closes the queue and waits for the worker to exit.
    pub async fn shutdown(&self) {
        self.close();
        let join = self.worker.lock().ok().and_then(|mut guard| guard.take());
        if let Some(join) = join {
            let _ = join.await;
        }
    }
}

/// Completion handle for a submitted action.
#[derive(Debug)]
pub struct ActionTicket {
    action: &'static str,
    rx: oneshot::Receiver<Result<(), ActionError>>,
}

impl ActionTicket {
    /// Name of the submitted action.
    #[must_use]
    pub const fn action(&self) -> &'static str {
        self.action
    }

    /// Waits for the action to finish.
    pub async fn wait(self) -> Result<(), ActionError> {
        self.rx.await.map_err(|_| ActionError::QueueClosed)?
    }

    /// Waits for the action to finish, giving up after `timeout`.
    ///
    /// Giving up abandons the wait only; the action itself still runs.
    pub async fn wait_timeout(self, timeout: Duration) -> Result<(), ActionError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| ActionError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            })?
    }
}

async fn worker_loop(
    actuator: Arc<dyn Actuator>,
    mut rx: mpsc::UnboundedReceiver<ActionRequest>,
    cancel: CancellationToken,
    executed: Arc<AtomicU64>,
) {
    info!("action worker started");
    loop {
        let request = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(request) => request,
                None => break,
            },
        };

        let ActionRequest { action, reply } = request;
        let name = action.name();
        debug!(action = %action, "executing action");

        let actuator = Arc::clone(&actuator);
        let task = tokio::spawn(async move { perform(actuator.as_ref(), &action).await });
        let result = match task.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => Err(ActionError::Panicked { action: name.to_string() }),
            Err(err) => Err(ActionError::Failed {
                action: name.to_string(),
                message: err.to_string(),
            }),
        };
        executed.fetch_add(1, Ordering::Relaxed);

        if let Err(err) = &result {
            warn!(action = name, error = %err, "action failed");
        }
        let _ = reply.send(result);
    }

    rx.close();
    while let Ok(pending) = rx.try_recv() {
        let _ = pending.reply.send(Err(ActionError::QueueClosed));
    }
    info!("action worker stopped");
}

async fn perform(actuator: &dyn Actuator, action: &StepAction) -> Result<(), ActionError> {
    match action {
        StepAction::Jump { times, interval } => actuator.jump(*times, *interval).await,
        StepAction::Wait { duration } => {
            tokio::time::sleep(*duration).await;
            Ok(())
        }
        StepAction::Type { lines, pause } => actuator.type_text(lines, *pause).await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl Recorder {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Actuator for Recorder {
        async fn type_text(&self, lines: &[String], _pause: Duration) -> Result<(), ActionError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.calls.lock().unwrap().push(lines.join("|"));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            match lines.first().map(String::as_str) {
                Some("fail") => Err(ActionError::Failed {
                    action: "type".to_string(),
                    message: "boom".to_string(),
                }),
                Some("panic") => panic!("actuator exploded"),
                _ => Ok(()),
            }
        }

        async fn jump(&self, times: u32, _interval: Duration) -> Result<(), ActionError> {
            self.calls.lock().unwrap().push(format!("jump:{times}"));
            Ok(())
        }
    }

    fn say(text: &str) -> StepAction {
        StepAction::command(text)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_submitters_are_serialized_in_order() {
        let recorder = Arc::new(Recorder::default());
        let queue = ActionQueue::spawn(recorder.clone());

        let tickets: Vec<_> = (0..20).map(|i| queue.submit(say(&format!("m{i}"))).unwrap()).collect();
        let waits: Vec<_> = tickets.into_iter().map(|t| tokio::spawn(t.wait())).collect();
        for w in waits {
            w.await.unwrap().unwrap();
        }

        let expected: Vec<String> = (0..20).map(|i| format!("m{i}")).collect();
        assert_eq!(recorder.calls(), expected);
        assert_eq!(recorder.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(queue.executed(), 20);
    }

    #[tokio::test]
    async fn failure_is_isolated_to_its_ticket() {
        let recorder = Arc::new(Recorder::default());
        let queue = ActionQueue::spawn(recorder.clone());

        let bad = queue.submit(say("fail")).unwrap();
        let good = queue.submit(say("after")).unwrap();

        assert!(matches!(bad.wait().await, Err(ActionError::Failed { .. })));
        good.wait().await.unwrap();
        assert_eq!(recorder.calls(), vec!["fail", "after"]);
    }

    #[tokio::test]
    async fn panic_is_reported_and_worker_survives() {
        let recorder = Arc::new(Recorder::default());
        let queue = ActionQueue::spawn(recorder.clone());

        let bad = queue.submit(say("panic")).unwrap();
        assert_eq!(
            bad.wait().await,
            Err(ActionError::Panicked {
                action: "type".to_string()
            })
        );
        queue.submit(StepAction::Jump { times: 2, interval: Duration::ZERO })
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert_eq!(recorder.calls().last().map(String::as_str), Some("jump:2"));
    }

    #[tokio::test]
    async fn wait_timeout_abandons_wait_not_action() {
        let recorder = Arc::new(Recorder::default());
        let queue = ActionQueue::spawn(recorder.clone());

        let hold = queue
            .submit(StepAction::Wait {
                duration: Duration::from_millis(100),
            })
            .unwrap();
        let err = hold.wait_timeout(Duration::from_millis(5)).await.unwrap_err();
        assert_eq!(err, ActionError::Timeout { duration_ms: 5 });

        queue.submit(say("still runs")).unwrap().wait().await.unwrap();
        assert_eq!(queue.executed(), 2);
    }

    #[tokio::test]
    async fn close_resolves_queued_requests() {
        struct Gate(Arc<Notify>);

        #[async_trait]
        impl Actuator for Gate {
            async fn type_text(&self, _lines: &[String], _pause: Duration) -> Result<(), ActionError> {
                self.0.notified().await;
                Ok(())
            }

            async fn jump(&self, _times: u32, _interval: Duration) -> Result<(), ActionError> {
                Ok(())
            }
        }

        let gate = Arc::new(Notify::new());
        let queue = ActionQueue::spawn(Arc::new(Gate(gate.clone())));

        let in_flight = queue.submit(say("held")).unwrap();
        let queued = queue.submit(say("never")).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        queue.close();
        assert!(matches!(queue.submit(say("late")), Err(ActionError::QueueClosed)));
        gate.notify_one();

        in_flight.wait().await.unwrap();
        assert_eq!(queued.wait().await, Err(ActionError::QueueClosed));
        queue.shutdown().await;
        assert!(queue.is_closed());
    }
}
