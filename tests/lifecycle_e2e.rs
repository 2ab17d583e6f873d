use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use mcreact::config::{IngestConfig, SchedulerConfig};
use mcreact::{
    source_from_config, Classifier, EventRegistry, HandlerError, IngestError, IngestMode, LineSource, PatternTable,
    Scheduler, SchedulerState,
};

/// A source that never produces a line.
struct Silent;

#[async_trait]
impl LineSource for Silent {
    fn describe(&self) -> String {
        "silent".to_string()
    }

    async fn next_line(&mut self) -> Result<Option<String>, IngestError> {
        std::future::pending().await
    }
}

fn classifier() -> Classifier {
    let registry = EventRegistry::with_builtins(&BTreeMap::new()).unwrap();
    Classifier::new(PatternTable::builtin().unwrap(), registry)
}

#[tokio::test]
async fn concurrent_drains_run_shutdown_hooks_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut scheduler = Scheduler::new(classifier(), SchedulerConfig::default());
    scheduler.add_source(Silent);
    for _ in 0..2 {
        let calls = Arc::clone(&calls);
        scheduler.add_shutdown_hook(move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<(), HandlerError>(())
        });
    }

    let handle = scheduler.handle();
    let mut state = handle.subscribe_state();
    let running = tokio::spawn(scheduler.run());
    state.wait_for(|s| *s == SchedulerState::Running).await.unwrap();
    assert!(handle.uptime().is_some());

    let (a, b) = (handle.clone(), handle.clone());
    tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(a.drain(), b.drain());
    })
    .await
    .unwrap();

    running.await.unwrap().unwrap();
    assert_eq!(handle.state(), SchedulerState::Stopped);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // Draining a stopped scheduler is a no-op.
    handle.drain().await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unreachable_stream_falls_back_to_log_file() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("latest.log");
    std::fs::write(&log_path, "Old joined the game\n").unwrap();

    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let ingest = IngestConfig {
        mode: IngestMode::Stream,
        encoding: "utf-8".to_string(),
        host: "127.0.0.1".to_string(),
        port,
        log_path: log_path.clone(),
        poll_interval_ms: 5,
        retry_limit: 2,
        retry_backoff_ms: 1,
    };

    let joins = Arc::new(std::sync::Mutex::new(Vec::new()));
    let mut scheduler = Scheduler::new(classifier(), SchedulerConfig::default());
    scheduler.add_boxed_source(source_from_config(&ingest).unwrap());
    {
        let joins = Arc::clone(&joins);
        scheduler.on_event("join", move |event| {
            let joins = Arc::clone(&joins);
            async move {
                if let Some(player) = event.field("player") {
                    joins.lock().unwrap().push(player.as_str().unwrap_or_default().to_string());
                }
                Ok::<(), HandlerError>(())
            }
        });
    }

    let handle = scheduler.handle();
    let running = tokio::spawn(scheduler.run());

    // The tail starts at the end of the file, so keep appending until the
    // degraded source has picked lines up.
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let mut file = OpenOptions::new().append(true).open(&log_path).unwrap();
            writeln!(file, "Alex joined the game").unwrap();
            drop(file);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if joins.lock().unwrap().len() >= 2 {
                break;
            }
        }
    })
    .await
    .expect("fallback tail delivers appended lines");

    handle.drain().await;
    running.await.unwrap().unwrap();

    let joins = joins.lock().unwrap().clone();
    assert!(joins.iter().all(|p| p == "Alex"), "pre-existing content was replayed: {joins:?}");
}
