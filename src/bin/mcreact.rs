//! mcreact runner
//!
//! Tails the game client log, reacts to classified events and drives the
//! player through the action queue until kicked, disconnected or interrupted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use mcreact::action::{chat, jump, land, wait};
use mcreact::config::AppConfig;
use mcreact::{
    source_from_config, ActionQueue, ChannelTracker, Classifier, DryRunActuator, Event, EventPayload,
    EventRegistry, HandlerError, IdleGuard, IngestMode, McResult, PatternTable, Scheduler, TriggerReactor,
    TriggerSet,
};

/// Whisper fragments that suggest an admin is checking whether we are present.
const SUSPICIOUS_WHISPERS: [&str; 2] = ["跳一跳", "在"];

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    File,
    Stream,
}

impl From<Mode> for IngestMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::File => Self::File,
            Mode::Stream => Self::Stream,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "mcreact", version, about = "Log-driven event reactor for a live game client")]
struct Cli {
    /// Runtime configuration, written with defaults if missing
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Pattern table, written with defaults if missing
    #[arg(short, long, default_value = "patterns.json")]
    patterns: PathBuf,

    /// Override the configured ingestion mode
    #[arg(short, long, value_enum)]
    mode: Option<Mode>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn init_tracing(debug: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug {
            EnvFilter::new("mcreact=debug,info")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn whisper_text(event: &Event) -> Option<(&str, &str)> {
    match &event.payload {
        EventPayload::Whisper { sender, text } => Some((sender.as_str(), text.as_str())),
        _ => None,
    }
}

fn register_handlers(scheduler: &mut Scheduler, queue: &ActionQueue, step_timeout: Duration) {
    let q = queue.clone();
    scheduler.on_event("whisper", move |event| {
        let queue = q.clone();
        async move {
            let Some((sender, text)) = whisper_text(&event) else {
                return Ok(());
            };
            info!(sender, text, "whisper");
            if SUSPICIOUS_WHISPERS.iter().any(|w| text.contains(w)) {
                warn!(sender, "whisper looks like a presence check, evading");
                (wait(Duration::from_secs(2)) + jump(3).interval(Duration::from_secs(1)).step())
                    .run(&queue)
                    .await?;
            }
            Ok::<(), HandlerError>(())
        }
    });

    let q = queue.clone();
    scheduler.on_event("view-sync", move |event| {
        let queue = q.clone();
        async move {
            let EventPayload::ViewSync { admin_name } = &event.payload else {
                return Ok(());
            };
            warn!(admin = %admin_name, "view synchronized by admin, replying");
            chat("干嘛干嘛，要干嘛...")
                .send_to(admin_name)
                .build()?
                .timeout(step_timeout)
                .run(&queue)
                .await?;
            Ok::<(), HandlerError>(())
        }
    });

    let q = queue.clone();
    scheduler.on_event("land-invite", move |event| {
        let queue = q.clone();
        async move {
            let EventPayload::LandInvite { inviter, land_name } = &event.payload else {
                return Ok(());
            };
            info!(inviter = %inviter, land = %land_name, "accepting land invite");
            land(land_name.as_str())
                .invite()
                .accept()
                .build()?
                .timeout(step_timeout)
                .run(&queue)
                .await?;
            Ok::<(), HandlerError>(())
        }
    });

    scheduler.on_event("kick", |_| async { Err::<(), _>(HandlerError::terminate("kicked from the server")) });
    scheduler.on_event("disconnect", |_| async { Err::<(), _>(HandlerError::terminate("disconnected")) });
    scheduler.on_event("game-crashed", |_| async {
        error!("game client crashed");
        Err::<(), _>(HandlerError::terminate("game crashed"))
    });
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    if let Err(err) = run(cli).await {
        error!(error = %err, "mcreact stopped with an error");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> McResult<()> {
    let mut config = AppConfig::load_or_init(&cli.config)?;
    if let Some(mode) = cli.mode {
        config.ingest.mode = mode.into();
    }
    let table = PatternTable::load_or_init(&cli.patterns)?;
    let registry = EventRegistry::with_builtins(&config.server.chat_channels)?;
    let triggers = TriggerSet::compile(&config.triggers, &config.server.chat_channels, config.actions.step_timeout())?;
    let source = source_from_config(&config.ingest)?;
    info!(
        source = %source.describe(),
        rule_sets = table.len(),
        triggers = triggers.len(),
        player = %config.player.user_id,
        "starting"
    );

    let queue = ActionQueue::spawn(Arc::new(DryRunActuator));

    let mut scheduler = Scheduler::new(Classifier::new(table, registry), config.scheduler.clone());
    scheduler
        .add_boxed_source(source)
        .add_reactor(Arc::new(ChannelTracker::new(
            config.player.user_id.clone(),
            queue.clone(),
            config.actions.probe_timeout(),
        )))
        .add_reactor(Arc::new(IdleGuard::new(queue.clone()).step_timeout(config.actions.step_timeout())))
        .add_reactor(Arc::new(TriggerReactor::new(triggers, queue.clone())));
    register_handlers(&mut scheduler, &queue, config.actions.step_timeout());

    let game = config.player.game_title.clone();
    scheduler.add_startup_hook(move || async move {
        info!(window = %game, "dry-run actuator ready");
        Ok::<(), HandlerError>(())
    });
    let q = queue.clone();
    scheduler.add_shutdown_hook(move || async move {
        q.shutdown().await;
        info!(executed = q.executed(), "action queue stopped");
        Ok::<(), HandlerError>(())
    });

    let handle = scheduler.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, draining");
            handle.drain().await;
        }
    });

    scheduler.run().await
}
