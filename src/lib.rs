//! # mcreact - Log-driven event reactor for a live game client
//!
//! mcreact watches the log output of a running game client, classifies each
//! line into typed events, dispatches them to handlers, and drives the player
//! through a single serialized action queue.
//!
//! ## Core Concepts
//!
//! - **Pattern table**: ordered rule-sets of regexes, one event kind each
//! - **Event**: a kind name plus a typed payload built from named captures
//! - **Scheduler**: pumps line sources, fans events out, supervises tasks
//! - **Action queue**: the only path to the input device, one action at a time
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use mcreact::action::{jump, wait, ActionQueue, DryRunActuator};
//! use mcreact::{Classifier, EventRegistry, PatternTable, ReplaySource, Scheduler};
//!
//! let registry = EventRegistry::with_builtins(&Default::default())?;
//! let classifier = Classifier::new(PatternTable::builtin()?, registry);
//! let queue = ActionQueue::spawn(Arc::new(DryRunActuator));
//!
//! let mut scheduler = Scheduler::new(classifier, Default::default());
//! scheduler.add_source(ReplaySource::new(["Alice 悄悄的对 我 说: 跳一跳"]));
//! scheduler.on_event("whisper", move |_event| {
//!     let queue = queue.clone();
//!     async move { (wait(Duration::from_secs(2)) + jump(3).step()).run(&queue).await.map_err(Into::into) }
//! });
//! scheduler.run().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod action;
pub mod classify;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod ingest;
pub mod pattern;
pub mod services;

pub use action::{ActionChain, ActionQueue, ActionStep, Actuator, DryRunActuator, StepAction};
pub use classify::Classifier;
pub use config::{AppConfig, IngestMode};
pub use dispatch::{Reactor, Scheduler, SchedulerHandle, SchedulerState, Subscription};
pub use error::{ActionError, ClassifyError, CommandError, ConfigError, HandlerError, IngestError, McError, McResult};
pub use event::{Event, EventPayload, EventRegistry, PayloadKind};
pub use ingest::{source_from_config, FileTail, LineSource, ReplaySource, StreamSource};
pub use pattern::{PatternTable, RuleSetSpec, RuleSpec};
pub use services::{ChannelTracker, IdleGuard, TriggerReactor, TriggerSet};
