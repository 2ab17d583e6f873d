//! Declarative trigger rules.
//!
//! A rule names an event kind, a set of field conditions, and an action built
//! from one of the command builders plus a chain of method calls:
//!
//! ```json
//! { "on": "land-invite", "when": {}, "do": { "action": "land", "chain": [["invite"], ["accept"]] } }
//! ```
//!
//! Rules are compiled when loaded. Unknown actions, methods outside the
//! per-builder allow-list, bad regexes and chains that cannot produce a
//! command are configuration errors. Argument values that only make sense
//! once an event supplies them fail when the rule fires.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, info, warn};

use crate::action::command::{ChatCommand, ClaimCommand, JumpCommand, LandCommand, LandEditor, PayCommand, TrustCommand};
use crate::action::{chat, jump, land, pay, ActionQueue, ActionStep};
use crate::dispatch::{Reactor, Subscription};
use crate::error::{CommandError, ConfigError, HandlerError};
use crate::event::Event;

/// One trigger rule as written in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerSpec {
    /// Event kind name.
    pub on: String,
    /// Field conditions, all of which must hold.
    #[serde(default)]
    pub when: BTreeMap<String, JsonValue>,
    /// What to do.
    #[serde(rename = "do")]
    pub action: TriggerActionSpec,
}

/// The action part of a [`TriggerSpec`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerActionSpec {
    /// Builder name: `chat`, `jump`, `pay` or `land`.
    #[serde(alias = "cmd")]
    pub action: String,
    /// Builder arguments. Missing ones are taken from event fields of the same name.
    #[serde(default)]
    pub args: BTreeMap<String, JsonValue>,
    /// Method calls applied in order, each `[name, args...]`.
    #[serde(default)]
    pub chain: Vec<Vec<JsonValue>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Chat,
    Jump,
    Pay,
    Land,
    LandEdit,
    Trust,
    Claim,
}

impl Stage {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Jump => "jump",
            Self::Pay => "pay",
            Self::Land => "land",
            Self::LandEdit => "land.edit",
            Self::Trust => "land.edit.trust",
            Self::Claim => "land.edit.claim",
        }
    }
}

/// Builder in progress while a rule fires.
enum Building {
    Chat(ChatCommand),
    Jump(JumpCommand),
    Pay(PayCommand),
    Land(LandCommand),
    LandEdit(LandEditor),
    Trust(TrustCommand),
    Claim(ClaimCommand),
}

impl Building {
    fn build(self) -> Result<ActionStep, CommandError> {
        match self {
            Self::Chat(c) => c.build(),
            Self::Jump(c) => Ok(c.step()),
            Self::Pay(c) => c.build(),
            Self::Land(c) => c.build(),
            Self::Trust(c) => c.build(),
            Self::Claim(c) => c.build(),
            Self::LandEdit(_) => Err(CommandError::Incomplete {
                command: "land edit".to_string(),
            }),
        }
    }
}

/// Context a method call may consult.
struct CallContext<'a> {
    channels: &'a BTreeMap<String, String>,
    step_timeout: Duration,
}

type Apply = fn(Building, &[JsonValue], &CallContext<'_>) -> Result<Building, CommandError>;

/// An allow-listed method: callable on `stage`, yields a builder at `next`.
struct Method {
    stage: Stage,
    name: &'static str,
    next: Stage,
    apply: Apply,
}

fn mismatch(method: &str) -> CommandError {
    CommandError::InvalidArgument {
        method: method.to_string(),
        reason: "called on the wrong builder".to_string(),
    }
}

fn arg_text(args: &[JsonValue], method: &str) -> Result<String, CommandError> {
    match args.first() {
        Some(JsonValue::String(s)) => Ok(s.clone()),
        Some(JsonValue::Number(n)) => Ok(n.to_string()),
        other => Err(CommandError::InvalidArgument {
            method: method.to_string(),
            reason: format!("expected text, got {}", describe(other)),
        }),
    }
}

fn arg_seconds(args: &[JsonValue], method: &str) -> Result<Duration, CommandError> {
    args.first()
        .and_then(JsonValue::as_f64)
        .filter(|s| s.is_finite() && *s >= 0.0)
        .map(Duration::from_secs_f64)
        .ok_or_else(|| CommandError::InvalidArgument {
            method: method.to_string(),
            reason: format!("expected non-negative seconds, got {}", describe(args.first())),
        })
}

fn arg_u32(args: &[JsonValue], method: &str) -> Result<u32, CommandError> {
    args.first()
        .and_then(JsonValue::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| CommandError::InvalidArgument {
            method: method.to_string(),
            reason: format!("expected a whole number, got {}", describe(args.first())),
        })
}

fn describe(value: Option<&JsonValue>) -> String {
    value.map_or_else(|| "nothing".to_string(), ToString::to_string)
}

const METHODS: &[Method] = &[
    Method {
        stage: Stage::Chat,
        name: "send_to",
        next: Stage::Chat,
        apply: |b, args, _| match b {
            Building::Chat(c) => Ok(Building::Chat(c.send_to(&arg_text(args, "send_to")?))),
            _ => Err(mismatch("send_to")),
        },
    },
    Method {
        stage: Stage::Chat,
        name: "to_all",
        next: Stage::Chat,
        apply: |b, _, _| match b {
            Building::Chat(c) => Ok(Building::Chat(c.to_all())),
            _ => Err(mismatch("to_all")),
        },
    },
    Method {
        stage: Stage::Chat,
        name: "switch_channel",
        next: Stage::Chat,
        apply: |b, args, ctx| match b {
            Building::Chat(c) => {
                let name = arg_text(args, "switch_channel")?;
                let prefix = ctx.channels.get(&name).cloned().unwrap_or(name);
                Ok(Building::Chat(c.switch_channel(&prefix)))
            }
            _ => Err(mismatch("switch_channel")),
        },
    },
    Method {
        stage: Stage::Chat,
        name: "interval",
        next: Stage::Chat,
        apply: |b, args, _| match b {
            Building::Chat(c) => Ok(Building::Chat(c.interval(arg_seconds(args, "interval")?))),
            _ => Err(mismatch("interval")),
        },
    },
    Method {
        stage: Stage::Jump,
        name: "interval",
        next: Stage::Jump,
        apply: |b, args, _| match b {
            Building::Jump(c) => Ok(Building::Jump(c.interval(arg_seconds(args, "interval")?))),
            _ => Err(mismatch("interval")),
        },
    },
    Method {
        stage: Stage::Pay,
        name: "transfer_to",
        next: Stage::Pay,
        apply: |b, args, _| match b {
            Building::Pay(c) => Ok(Building::Pay(c.transfer_to(&arg_text(args, "transfer_to")?))),
            _ => Err(mismatch("transfer_to")),
        },
    },
    Method {
        stage: Stage::Land,
        name: "invite",
        next: Stage::Land,
        apply: |b, _, _| match b {
            Building::Land(c) => Ok(Building::Land(c.invite())),
            _ => Err(mismatch("invite")),
        },
    },
    Method {
        stage: Stage::Land,
        name: "accept",
        next: Stage::Land,
        apply: |b, _, _| match b {
            Building::Land(c) => Ok(Building::Land(c.accept())),
            _ => Err(mismatch("accept")),
        },
    },
    Method {
        stage: Stage::Land,
        name: "reject",
        next: Stage::Land,
        apply: |b, _, _| match b {
            Building::Land(c) => Ok(Building::Land(c.reject())),
            _ => Err(mismatch("reject")),
        },
    },
    Method {
        stage: Stage::Land,
        name: "deposit",
        next: Stage::Land,
        apply: |b, args, _| match b {
            Building::Land(c) => {
                let value = if args.is_empty() {
                    "all".to_string()
                } else {
                    arg_text(args, "deposit")?
                };
                Ok(Building::Land(c.deposit(value)))
            }
            _ => Err(mismatch("deposit")),
        },
    },
    Method {
        stage: Stage::Land,
        name: "edit",
        next: Stage::LandEdit,
        apply: |b, _, _| match b {
            Building::Land(c) => Ok(Building::LandEdit(c.edit())),
            _ => Err(mismatch("edit")),
        },
    },
    Method {
        stage: Stage::LandEdit,
        name: "trust",
        next: Stage::Trust,
        apply: |b, _, _| match b {
            Building::LandEdit(e) => Ok(Building::Trust(e.trust())),
            _ => Err(mismatch("trust")),
        },
    },
    Method {
        stage: Stage::LandEdit,
        name: "claim",
        next: Stage::Claim,
        apply: |b, _, _| match b {
            Building::LandEdit(e) => Ok(Building::Claim(e.claim())),
            _ => Err(mismatch("claim")),
        },
    },
    Method {
        stage: Stage::Trust,
        name: "add",
        next: Stage::Trust,
        apply: |b, args, _| match b {
            Building::Trust(c) => Ok(Building::Trust(c.add(&arg_text(args, "add")?))),
            _ => Err(mismatch("add")),
        },
    },
    Method {
        stage: Stage::Trust,
        name: "remove",
        next: Stage::Trust,
        apply: |b, args, _| match b {
            Building::Trust(c) => Ok(Building::Trust(c.remove(&arg_text(args, "remove")?))),
            _ => Err(mismatch("remove")),
        },
    },
    Method {
        stage: Stage::Claim,
        name: "draw",
        next: Stage::Claim,
        apply: |b, _, _| match b {
            Building::Claim(c) => Ok(Building::Claim(c.draw())),
            _ => Err(mismatch("draw")),
        },
    },
    Method {
        stage: Stage::Claim,
        name: "erase",
        next: Stage::Claim,
        apply: |b, _, _| match b {
            Building::Claim(c) => Ok(Building::Claim(c.erase())),
            _ => Err(mismatch("erase")),
        },
    },
    Method {
        stage: Stage::Claim,
        name: "radius",
        next: Stage::Claim,
        apply: |b, args, _| match b {
            Building::Claim(c) => Ok(Building::Claim(c.radius(arg_u32(args, "radius")?))),
            _ => Err(mismatch("radius")),
        },
    },
    Method {
        stage: Stage::Claim,
        name: "auto",
        next: Stage::Claim,
        apply: |b, _, _| match b {
            Building::Claim(c) => Ok(Building::Claim(c.auto())),
            _ => Err(mismatch("auto")),
        },
    },
    Method {
        stage: Stage::Claim,
        name: "fill",
        next: Stage::Claim,
        apply: |b, _, _| match b {
            Building::Claim(c) => Ok(Building::Claim(c.fill())),
            _ => Err(mismatch("fill")),
        },
    },
];

fn lookup(stage: Stage, name: &str) -> Option<&'static Method> {
    METHODS.iter().find(|m| m.stage == stage && m.name == name)
}

/// Builder entry points and the argument each takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Constructor {
    Chat,
    Jump,
    Pay,
    Land,
}

impl Constructor {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "chat" => Some(Self::Chat),
            "jump" => Some(Self::Jump),
            "pay" => Some(Self::Pay),
            "land" => Some(Self::Land),
            _ => None,
        }
    }

    const fn stage(self) -> Stage {
        match self {
            Self::Chat => Stage::Chat,
            Self::Jump => Stage::Jump,
            Self::Pay => Stage::Pay,
            Self::Land => Stage::Land,
        }
    }

    /// Names the argument may be given under, preferred first.
    const fn params(self) -> &'static [&'static str] {
        match self {
            Self::Chat => &["content"],
            Self::Jump => &["times"],
            Self::Pay => &["amount"],
            Self::Land => &["land_name", "name"],
        }
    }

    fn start(self, arg: Option<&JsonValue>) -> Result<Building, CommandError> {
        let invalid = |reason: String| CommandError::InvalidArgument {
            method: self.stage().as_str().to_string(),
            reason,
        };
        match self {
            Self::Chat => {
                let text = arg_text(arg.map(std::slice::from_ref).unwrap_or_default(), "chat")?;
                Ok(Building::Chat(chat(text)))
            }
            Self::Jump => match arg {
                None => Ok(Building::Jump(jump(3))),
                Some(v) => Ok(Building::Jump(jump(arg_u32(std::slice::from_ref(v), "jump")?))),
            },
            Self::Pay => {
                let amount = match arg {
                    Some(JsonValue::Number(n)) => n
                        .as_i64()
                        .ok_or_else(|| invalid(format!("amount {n} is not a whole number")))?,
                    Some(JsonValue::String(s)) => s
                        .replace(',', "")
                        .parse::<i64>()
                        .map_err(|_| invalid(format!("amount '{s}' is not a whole number")))?,
                    other => return Err(invalid(format!("expected an amount, got {}", describe(other)))),
                };
                Ok(Building::Pay(pay(amount)))
            }
            Self::Land => {
                let name = arg_text(arg.map(std::slice::from_ref).unwrap_or_default(), "land")?;
                Ok(Building::Land(land(name)))
            }
        }
    }
}

#[derive(Debug)]
enum Condition {
    OneOf(Vec<JsonValue>),
    Matches(Regex),
    Equals(JsonValue),
}

impl Condition {
    fn compile(value: &JsonValue) -> Result<Self, String> {
        match value {
            JsonValue::Array(items) => Ok(Self::OneOf(items.clone())),
            JsonValue::String(s) if s.starts_with("re:") => Regex::new(&s[3..])
                .map(Self::Matches)
                .map_err(|e| format!("invalid regex '{}': {e}", &s[3..])),
            other => Ok(Self::Equals(other.clone())),
        }
    }

    fn holds(&self, field: Option<&JsonValue>) -> bool {
        let field = field.unwrap_or(&JsonValue::Null);
        match self {
            Self::OneOf(items) => items.iter().any(|item| values_equal(item, field)),
            Self::Equals(expected) => values_equal(expected, field),
            Self::Matches(re) => match field {
                JsonValue::String(s) => re.is_match(s),
                JsonValue::Null => false,
                other => re.is_match(&other.to_string()),
            },
        }
    }
}

/// JSON equality where numbers compare by value, so `100` matches `100.0`.
fn values_equal(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}

struct Call {
    method: &'static Method,
    args: Vec<JsonValue>,
}

/// A rule after load-time validation.
struct CompiledTrigger {
    index: usize,
    on: String,
    when: Vec<(String, Condition)>,
    constructor: Constructor,
    args: BTreeMap<String, JsonValue>,
    calls: Vec<Call>,
    timeout: Option<Duration>,
}

impl CompiledTrigger {
    fn compile(index: usize, spec: &TriggerSpec) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidTrigger { index, reason };

        if spec.on.trim().is_empty() {
            return Err(invalid("'on' names no event kind".to_string()));
        }

        let when = spec
            .when
            .iter()
            .map(|(field, value)| Condition::compile(value).map(|c| (field.clone(), c)))
            .collect::<Result<Vec<_>, _>>()
            .map_err(invalid)?;

        let constructor = Constructor::parse(&spec.action.action)
            .ok_or_else(|| invalid(format!("unknown action '{}'", spec.action.action)))?;

        let mut stage = constructor.stage();
        let mut calls = Vec::with_capacity(spec.action.chain.len());
        let mut timeout = None;
        for (pos, entry) in spec.action.chain.iter().enumerate() {
            let Some((JsonValue::String(name), args)) = entry.split_first() else {
                return Err(invalid(format!("chain entry #{pos} must be [method, args...]")));
            };
            if name == "timeout" {
                let d = arg_seconds(args, "timeout").map_err(|e| invalid(e.to_string()))?;
                timeout = Some(d);
                continue;
            }
            let method = lookup(stage, name).ok_or_else(|| {
                invalid(
                    CommandError::NotAllowed {
                        action: stage.as_str().to_string(),
                        method: name.clone(),
                    }
                    .to_string(),
                )
            })?;
            stage = method.next;
            calls.push(Call {
                method,
                args: args.to_vec(),
            });
        }
        if stage == Stage::LandEdit {
            return Err(invalid("'edit' must be followed by 'trust' or 'claim'".to_string()));
        }

        Ok(Self {
            index,
            on: spec.on.clone(),
            when,
            constructor,
            args: spec.action.args.clone(),
            calls,
            timeout,
        })
    }

    fn matches(&self, event: &Event, fields: &Map<String, JsonValue>) -> bool {
        event.kind == self.on && self.when.iter().all(|(name, cond)| cond.holds(fields.get(name)))
    }

    fn build(&self, fields: &Map<String, JsonValue>, ctx: &CallContext<'_>) -> Result<ActionStep, CommandError> {
        let arg = self
            .constructor
            .params()
            .iter()
            .find_map(|p| self.args.get(*p))
            .or_else(|| self.constructor.params().iter().find_map(|p| fields.get(*p)));

        let mut building = self.constructor.start(arg)?;
        for call in &self.calls {
            building = (call.method.apply)(building, &call.args, ctx)?;
        }
        let step = building.build()?;
        Ok(step.timeout(self.timeout.unwrap_or(ctx.step_timeout)))
    }
}

/// Compiled trigger rules.
pub struct TriggerSet {
    rules: Vec<CompiledTrigger>,
    channels: BTreeMap<String, String>,
    step_timeout: Duration,
}

impl std::fmt::Debug for TriggerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerSet")
            .field("rules", &self.rules.len())
            .field("step_timeout", &self.step_timeout)
            .finish_non_exhaustive()
    }
}

impl TriggerSet {
    /// Validates and compiles `specs`. `channels` maps channel names used by
    /// `switch_channel` to command prefixes. Steps built by rules without their
    /// own `timeout` wait at most `step_timeout`.
    pub fn compile(
        specs: &[TriggerSpec],
        channels: &BTreeMap<String, String>,
        step_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let rules = specs
            .iter()
            .enumerate()
            .map(|(i, spec)| CompiledTrigger::compile(i, spec))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            rules,
            channels: channels.clone(),
            step_timeout,
        })
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether there are no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Builds one step per rule that fires for `event`, in rule order.
    /// Each entry carries the rule index.
    #[must_use]
    pub fn fire(&self, event: &Event) -> Vec<(usize, Result<ActionStep, CommandError>)> {
        let fields = event.payload.fields();
        let ctx = CallContext {
            channels: &self.channels,
            step_timeout: self.step_timeout,
        };
        self.rules
            .iter()
            .filter(|rule| rule.matches(event, &fields))
            .map(|rule| (rule.index, rule.build(&fields, &ctx)))
            .collect()
    }
}

/// Reactor that runs [`TriggerSet`] rules against every event.
#[derive(Debug)]
pub struct TriggerReactor {
    triggers: TriggerSet,
    queue: ActionQueue,
}

impl TriggerReactor {
    /// Creates a reactor submitting to `queue`.
    #[must_use]
    pub const fn new(triggers: TriggerSet, queue: ActionQueue) -> Self {
        Self { triggers, queue }
    }
}

#[async_trait]
impl Reactor for TriggerReactor {
    fn name(&self) -> &str {
        "triggers"
    }

    fn subscription(&self) -> Subscription {
        Subscription::All
    }

    async fn react(&self, event: &Event) -> Result<(), HandlerError> {
        let mut first_err = None;
        for (index, built) in self.triggers.fire(event) {
            let outcome = match built {
                Ok(step) => {
                    info!(rule = index, kind = %event.kind, action = %step.action(), "trigger fired");
                    step.run(&self.queue).await.map_err(HandlerError::from)
                }
                Err(err) => Err(HandlerError::from(err)),
            };
            match outcome {
                Ok(()) => debug!(rule = index, "trigger action completed"),
                Err(err) => {
                    warn!(rule = index, kind = %event.kind, error = %err, "trigger failed");
                    first_err.get_or_insert(err);
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::action::{StepAction, DEFAULT_STEP_TIMEOUT};
    use crate::event::EventPayload;

    fn specs(value: JsonValue) -> Vec<TriggerSpec> {
        serde_json::from_value(value).unwrap()
    }

    fn compile(value: JsonValue) -> Result<TriggerSet, ConfigError> {
        let channels = [("交易".to_string(), "tc".to_string())].into_iter().collect();
        TriggerSet::compile(&specs(value), &channels, DEFAULT_STEP_TIMEOUT)
    }

    fn invite(land_name: &str) -> Event {
        Event::new(
            "land-invite",
            EventPayload::LandInvite {
                inviter: "Bob".to_string(),
                land_name: land_name.to_string(),
            },
        )
    }

    fn whisper(sender: &str, text: &str) -> Event {
        Event::new(
            "whisper",
            EventPayload::Whisper {
                sender: sender.to_string(),
                text: text.to_string(),
            },
        )
    }

    fn lines(step: &ActionStep) -> Vec<String> {
        match step.action() {
            StepAction::Type { lines, .. } => lines.clone(),
            other => panic!("expected typing, got {other:?}"),
        }
    }

    #[test]
    fn land_invite_accept_uses_event_land_name() {
        let set = compile(json!([
            {"on": "land-invite", "when": {}, "do": {"action": "land", "chain": [["invite"], ["accept"]]}}
        ]))
        .unwrap();

        let fired = set.fire(&invite("Lakeside"));
        assert_eq!(fired.len(), 1);
        let step = fired[0].1.as_ref().unwrap();
        assert_eq!(lines(step), vec!["/land accept Lakeside"]);
    }

    #[test]
    fn conditions_filter_events() {
        let set = compile(json!([
            {"on": "whisper", "when": {"sender": ["Alice", "Carol"]},
             "do": {"action": "chat", "args": {"content": "hi"}, "chain": [["send_to", "Alice"]]}},
            {"on": "whisper", "when": {"text": "re:^pay me (\\d+)$"},
             "do": {"action": "pay", "args": {"amount": 10}, "chain": [["transfer_to", "Bob"]]}},
            {"on": "whisper", "when": {"sender": "Dave"},
             "do": {"action": "jump", "chain": [["interval", 0.5], ["timeout", 3]]}}
        ]))
        .unwrap();

        assert!(set.fire(&whisper("Mallory", "hello")).is_empty());

        let fired = set.fire(&whisper("Alice", "pay me 10"));
        assert_eq!(fired.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(lines(fired[0].1.as_ref().unwrap()), vec!["/m Alice hi"]);
        assert_eq!(lines(fired[1].1.as_ref().unwrap()), vec!["/pay Bob 10"]);

        let fired = set.fire(&whisper("Dave", "jump"));
        let step = fired[0].1.as_ref().unwrap();
        assert_eq!(
            step.action(),
            &StepAction::Jump {
                times: 3,
                interval: Duration::from_millis(500)
            }
        );
        assert_eq!(step.wait_limit(), Duration::from_secs(3));
    }

    #[test]
    fn chat_content_is_filled_from_event_and_channel_alias_resolved() {
        let set = compile(json!([
            {"on": "message", "do": {"action": "chat", "chain": [["switch_channel", "交易"]]}}
        ]))
        .unwrap();
        let event = Event::new(
            "message",
            EventPayload::Message {
                server_name: "主服".to_string(),
                channel: "global".to_string(),
                tag: "流浪者".to_string(),
                player: "Alex".to_string(),
                content: "wtb iron".to_string(),
            },
        );
        let fired = set.fire(&event);
        assert_eq!(lines(fired[0].1.as_ref().unwrap()), vec!["/tc", "wtb iron"]);
    }

    #[test]
    fn land_edit_chain() {
        let set = compile(json!([
            {"on": "join", "do": {"action": "land", "args": {"name": "Home"},
             "chain": [["edit"], ["trust"], ["add", "Alex"]]}}
        ]))
        .unwrap();
        let fired = set.fire(&Event::new(
            "join",
            EventPayload::Join {
                player: "Alex".to_string(),
            },
        ));
        assert_eq!(
            lines(fired[0].1.as_ref().unwrap()),
            vec!["/land edit Home", "/land trust Alex"]
        );
    }

    #[test]
    fn load_time_rejections() {
        let unknown_action = compile(json!([{"on": "kick", "do": {"action": "explode"}}]));
        assert!(matches!(unknown_action, Err(ConfigError::InvalidTrigger { index: 0, .. })));

        let not_allowed = compile(json!([
            {"on": "kick", "do": {"action": "chat", "chain": [["__class__"]]}}
        ]));
        let Err(ConfigError::InvalidTrigger { reason, .. }) = not_allowed else {
            panic!("expected rejection");
        };
        assert!(reason.contains("__class__"));

        let wrong_stage = compile(json!([
            {"on": "kick", "do": {"action": "land", "chain": [["accept"], ["add", "Bob"]]}}
        ]));
        assert!(wrong_stage.is_err());

        let bad_regex = compile(json!([{"on": "kick", "when": {"x": "re:("}, "do": {"action": "jump"}}]));
        assert!(bad_regex.is_err());

        let dangling_edit = compile(json!([{"on": "kick", "do": {"action": "land", "chain": [["edit"]]}}]));
        assert!(dangling_edit.is_err());

        let second = compile(json!([
            {"on": "kick", "do": {"action": "jump"}},
            {"on": "kick", "do": {"action": "jump", "chain": [[5]]}}
        ]));
        assert!(matches!(second, Err(ConfigError::InvalidTrigger { index: 1, .. })));
    }

    #[test]
    fn fire_time_argument_errors_fail_closed() {
        let set = compile(json!([
            {"on": "whisper", "do": {"action": "pay", "args": {"amount": "lots"}, "chain": [["transfer_to", "Bob"]]}},
            {"on": "whisper", "do": {"action": "land", "chain": [["invite"], ["accept"]]}}
        ]))
        .unwrap();
        let fired = set.fire(&whisper("Alice", "hi"));
        assert!(matches!(fired[0].1, Err(CommandError::InvalidArgument { .. })));
        assert!(fired[1].1.is_err());
    }

    #[test]
    fn cmd_alias_is_accepted() {
        let parsed = specs(json!([{"on": "kick", "do": {"cmd": "jump"}}]));
        assert_eq!(parsed[0].action.action, "jump");
        assert!(parsed[0].when.is_empty());
    }

    fn deposit(in_value: f64) -> Event {
        Event::new(
            "land-deposit",
            EventPayload::LandDeposit {
                land_name: "Lakeside".to_string(),
                player: "Alex".to_string(),
                in_value,
                now_value: "1,100.00".to_string(),
            },
        )
    }

    #[test]
    fn integer_conditions_match_float_fields() {
        let set = compile(json!([
            {"on": "land-deposit", "when": {"in_value": 100},
             "do": {"action": "chat", "args": {"content": "thanks"}}},
            {"on": "land-deposit", "when": {"in_value": [50, 100]},
             "do": {"action": "chat", "args": {"content": "thanks again"}}}
        ]))
        .unwrap();

        assert_eq!(set.fire(&deposit(100.0)).len(), 2);
        assert_eq!(set.fire(&deposit(50.0)).iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![1]);
        assert!(set.fire(&deposit(100.5)).is_empty());
    }

    #[test]
    fn configured_step_timeout_reaches_built_steps() {
        let rules = specs(json!([
            {"on": "land-invite", "do": {"action": "land", "chain": [["invite"], ["accept"]]}},
            {"on": "land-invite", "do": {"action": "jump", "chain": [["timeout", 2]]}}
        ]));
        let set = TriggerSet::compile(&rules, &BTreeMap::new(), Duration::from_millis(1500)).unwrap();

        let fired = set.fire(&invite("Lakeside"));
        assert_eq!(fired[0].1.as_ref().unwrap().wait_limit(), Duration::from_millis(1500));
        assert_eq!(fired[1].1.as_ref().unwrap().wait_limit(), Duration::from_secs(2));
    }
}
