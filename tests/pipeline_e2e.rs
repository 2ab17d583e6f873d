use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use mcreact::action::{chat, DEFAULT_STEP_TIMEOUT};
use mcreact::config::SchedulerConfig;
use mcreact::services::TriggerSpec;
use mcreact::{
    ActionError, ActionQueue, Actuator, Classifier, EventPayload, EventRegistry, HandlerError, PatternTable,
    ReplaySource, Scheduler, SchedulerState, TriggerReactor, TriggerSet,
};

#[derive(Default)]
struct Recorder {
    typed: Mutex<Vec<Vec<String>>>,
    jumps: Mutex<u32>,
}

#[async_trait]
impl Actuator for Recorder {
    async fn type_text(&self, lines: &[String], _pause: Duration) -> Result<(), ActionError> {
        self.typed.lock().unwrap().push(lines.to_vec());
        Ok(())
    }

    async fn jump(&self, times: u32, _interval: Duration) -> Result<(), ActionError> {
        *self.jumps.lock().unwrap() += times;
        Ok(())
    }
}

fn classifier() -> Classifier {
    let registry = EventRegistry::with_builtins(&BTreeMap::new()).unwrap();
    Classifier::new(PatternTable::builtin().unwrap(), registry)
}

fn rules() -> Vec<TriggerSpec> {
    serde_json::from_value(json!([
        {"on": "land-invite", "when": {}, "do": {"action": "land", "chain": [["invite"], ["accept"]]}},
        {"on": "land-deposit", "when": {"in_value": 100},
         "do": {"action": "chat", "args": {"content": "thanks"}, "chain": [["send_to", "Alex"]]}}
    ]))
    .unwrap()
}

#[tokio::test]
async fn replayed_log_drives_handlers_and_triggers() {
    let recorder = Arc::new(Recorder::default());
    let queue = ActionQueue::spawn(recorder.clone());
    let triggers = TriggerSet::compile(&rules(), &BTreeMap::new(), DEFAULT_STEP_TIMEOUT).unwrap();

    let mut scheduler = Scheduler::new(classifier(), SchedulerConfig::default());
    scheduler
        .add_source(ReplaySource::new([
            "[12:00:01] [Render thread/INFO]: loading chunks",
            "Alice 悄悄的对 我 说: 在吗",
            "Bob 邀请你加入 Lakeside 领土",
            "[CHAT] 领土>> 收件箱 - 领土 Lakeside: 玩家 Alex 存入了 $100.00.当前余额: $1,100.00",
            "[CHAT] 领土>> 收件箱 - 领土 Lakeside: 玩家 Alex 存入了 $5.00.当前余额: $1,105.00",
            "[12:00:04] [Render thread/INFO]: nothing to see",
        ]))
        .add_reactor(Arc::new(TriggerReactor::new(triggers, queue.clone())));

    let q = queue.clone();
    scheduler.on_event("whisper", move |event| {
        let queue = q.clone();
        async move {
            let EventPayload::Whisper { sender, text } = &event.payload else {
                return Ok(());
            };
            if !text.contains('在') {
                return Ok(());
            }
            chat("got it").send_to(sender).build()?.run(&queue).await?;
            Ok::<(), HandlerError>(())
        }
    });

    let q = queue.clone();
    scheduler.add_shutdown_hook(move || async move {
        q.shutdown().await;
        Ok::<(), HandlerError>(())
    });

    let handle = scheduler.handle();
    tokio::time::timeout(Duration::from_secs(5), scheduler.run())
        .await
        .expect("scheduler drains once the replay ends")
        .unwrap();
    assert_eq!(handle.state(), SchedulerState::Stopped);

    let typed = recorder.typed.lock().unwrap().clone();
    assert_eq!(typed.len(), 3, "typed: {typed:?}");
    assert_eq!(
        typed.iter().filter(|lines| lines.as_slice() == ["/m Alice got it"]).count(),
        1
    );
    assert_eq!(
        typed
            .iter()
            .filter(|lines| lines.as_slice() == ["/land accept Lakeside"])
            .count(),
        1
    );
    assert_eq!(
        typed.iter().filter(|lines| lines.as_slice() == ["/m Alex thanks"]).count(),
        1
    );
    assert_eq!(*recorder.jumps.lock().unwrap(), 0);
    assert_eq!(queue.executed(), 3);
    assert!(queue.is_closed());
}

#[tokio::test]
async fn kick_line_terminates_before_later_lines() {
    let recorder = Arc::new(Recorder::default());
    let queue = ActionQueue::spawn(recorder.clone());

    let mut scheduler = Scheduler::new(classifier(), SchedulerConfig::default());
    scheduler.add_source(ReplaySource::new(["[CHAT] 您已被踢出服务器"]));
    scheduler.on_event("kick", |_| async { Err::<(), _>(HandlerError::terminate("kicked")) });

    let hooks = Arc::new(Mutex::new(Vec::new()));
    for name in ["close-queue", "report"] {
        let hooks = Arc::clone(&hooks);
        let q = queue.clone();
        scheduler.add_shutdown_hook(move || async move {
            if name == "close-queue" {
                q.shutdown().await;
            }
            hooks.lock().unwrap().push(name);
            Ok::<(), HandlerError>(())
        });
    }

    let handle = scheduler.handle();
    tokio::time::timeout(Duration::from_secs(5), scheduler.run())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(handle.state(), SchedulerState::Stopped);
    assert_eq!(*hooks.lock().unwrap(), vec!["close-queue", "report"]);
    assert!(recorder.typed.lock().unwrap().is_empty());
}
