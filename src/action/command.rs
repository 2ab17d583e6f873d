//! Fluent command builders.
//!
//! Builders validate eagerly but report at [`build`](ChatCommand::build) time:
//! the first invalid call is remembered and returned as a [`CommandError`].

use std::time::Duration;

use tracing::debug;

use super::step::{ActionStep, StepAction};
use crate::error::CommandError;

fn blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Jump `times` times, one second apart by default.
#[must_use]
pub const fn jump(times: u32) -> JumpCommand {
    JumpCommand {
        times,
        interval: Duration::from_secs(1),
    }
}

/// Hold the actor for `duration`.
#[must_use]
pub const fn wait(duration: Duration) -> ActionStep {
    ActionStep::new(StepAction::Wait { duration })
}

/// Say `content` in public chat or to a single player.
#[must_use]
pub fn chat(content: impl Into<String>) -> ChatCommand {
    let content = content.into();
    let error = blank(&content).then_some(CommandError::EmptyContent);
    ChatCommand {
        content,
        recipient: None,
        channel: None,
        interval: Duration::ZERO,
        error,
    }
}

/// Transfer `amount` coins.
#[must_use]
pub fn pay(amount: i64) -> PayCommand {
    let error = (amount <= 0).then_some(CommandError::NonPositiveAmount { amount });
    PayCommand {
        amount,
        target: None,
        error,
    }
}

/// Land commands for the land called `name`.
#[must_use]
pub fn land(name: impl Into<String>) -> LandCommand {
    let name = name.into();
    let error = blank(&name).then_some(CommandError::EmptyLandName);
    LandCommand {
        land: name.trim().to_string(),
        sub: LandSub::Unset,
        error,
    }
}

/// Builder for [`jump`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JumpCommand {
    times: u32,
    interval: Duration,
}

impl JumpCommand {
    /// Pause between presses.
    #[must_use]
    pub const fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// The finished step.
    #[must_use]
    pub const fn step(self) -> ActionStep {
        ActionStep::new(StepAction::Jump {
            times: self.times,
            interval: self.interval,
        })
    }
}

impl From<JumpCommand> for ActionStep {
    fn from(cmd: JumpCommand) -> Self {
        cmd.step()
    }
}

/// Builder for [`chat`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatCommand {
    content: String,
    recipient: Option<String>,
    channel: Option<String>,
    interval: Duration,
    error: Option<CommandError>,
}

impl ChatCommand {
    fn fail(&mut self, err: CommandError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    /// Sends the message privately with `/m`.
    #[must_use]
    pub fn send_to(mut self, player: &str) -> Self {
        if blank(player) {
            self.fail(CommandError::EmptyRecipient);
            return self;
        }
        self.recipient = Some(player.trim().to_string());
        self.channel = None;
        self
    }

    /// Sends to public chat, clearing any recipient or channel switch.
    #[must_use]
    pub fn to_all(mut self) -> Self {
        self.recipient = None;
        self.channel = None;
        self
    }

    /// Switches to the channel with command prefix `prefix` before speaking.
    /// Ignored for private messages.
    #[must_use]
    pub fn switch_channel(mut self, prefix: &str) -> Self {
        if self.recipient.is_some() {
            debug!(prefix, "private message, channel switch ignored");
            return self;
        }
        if blank(prefix) {
            self.fail(CommandError::InvalidArgument {
                method: "switch_channel".to_string(),
                reason: "channel prefix is empty".to_string(),
            });
            return self;
        }
        self.channel = Some(prefix.trim().trim_start_matches('/').to_string());
        self
    }

    /// Pause after typing.
    #[must_use]
    pub const fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Lines that will be typed, in order.
    pub fn lines(&self) -> Result<Vec<String>, CommandError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        Ok(match (&self.recipient, &self.channel) {
            (Some(player), _) => vec![format!("/m {player} {}", self.content)],
            (None, Some(prefix)) => vec![format!("/{prefix}"), self.content.clone()],
            (None, None) => vec![self.content.clone()],
        })
    }

    /// The finished step.
    pub fn build(self) -> Result<ActionStep, CommandError> {
        Ok(ActionStep::new(StepAction::Type {
            lines: self.lines()?,
            pause: self.interval,
        }))
    }
}

/// Builder for [`pay`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayCommand {
    amount: i64,
    target: Option<String>,
    error: Option<CommandError>,
}

impl PayCommand {
    /// Recipient of the transfer.
    #[must_use]
    pub fn transfer_to(mut self, player: &str) -> Self {
        if blank(player) {
            if self.error.is_none() {
                self.error = Some(CommandError::EmptyRecipient);
            }
            return self;
        }
        self.target = Some(player.trim().to_string());
        self
    }

    /// The finished step.
    pub fn build(self) -> Result<ActionStep, CommandError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let target = self.target.ok_or(CommandError::EmptyRecipient)?;
        Ok(ActionStep::new(StepAction::command(format!(
            "/pay {target} {}",
            self.amount
        ))))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LandSub {
    Unset,
    Invite(Option<&'static str>),
    Deposit(String),
}

/// Builder for [`land`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandCommand {
    land: String,
    sub: LandSub,
    error: Option<CommandError>,
}

impl LandCommand {
    fn reply(mut self, verb: &'static str, operation: &str) -> Self {
        match self.sub {
            LandSub::Invite(_) => self.sub = LandSub::Invite(Some(verb)),
            _ => {
                if self.error.is_none() {
                    self.error = Some(CommandError::OutOfOrder {
                        operation: operation.to_string(),
                        requires: "invite".to_string(),
                    });
                }
            }
        }
        self
    }

    /// Targets an invitation to this land.
    #[must_use]
    pub fn invite(mut self) -> Self {
        self.sub = LandSub::Invite(None);
        self
    }

    /// Accepts the invitation. Requires [`invite`](Self::invite).
    #[must_use]
    pub fn accept(self) -> Self {
        self.reply("accept", "accept")
    }

    /// Declines the invitation. Requires [`invite`](Self::invite).
    #[must_use]
    pub fn reject(self) -> Self {
        self.reply("deny", "reject")
    }

    /// Deposits `value` (a number or `all`) into the land bank.
    #[must_use]
    pub fn deposit(mut self, value: impl ToString) -> Self {
        self.sub = LandSub::Deposit(value.to_string().trim().to_lowercase());
        self
    }

    /// Enters edit mode for this land.
    #[must_use]
    pub fn edit(self) -> LandEditor {
        LandEditor {
            land: self.land,
            error: self.error,
        }
    }

    /// The finished step.
    pub fn build(self) -> Result<ActionStep, CommandError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let line = match self.sub {
            LandSub::Invite(Some(verb)) => format!("/land {verb} {}", self.land),
            LandSub::Invite(None) => {
                return Err(CommandError::Incomplete {
                    command: "land invite".to_string(),
                })
            }
            LandSub::Deposit(value) if value.is_empty() => {
                return Err(CommandError::InvalidArgument {
                    method: "deposit".to_string(),
                    reason: "deposit value is empty".to_string(),
                })
            }
            LandSub::Deposit(value) => format!("/land deposit {value} {}", self.land),
            LandSub::Unset => {
                return Err(CommandError::Incomplete {
                    command: "land".to_string(),
                })
            }
        };
        Ok(ActionStep::new(StepAction::command(line)))
    }
}

/// Edit-mode context for one land. Every command it builds is preceded by
/// `/land edit <name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandEditor {
    land: String,
    error: Option<CommandError>,
}

impl LandEditor {
    /// Trust management.
    #[must_use]
    pub fn trust(self) -> TrustCommand {
        TrustCommand {
            editor: self,
            line: None,
        }
    }

    /// Claim management.
    #[must_use]
    pub fn claim(self) -> ClaimCommand {
        ClaimCommand {
            editor: self,
            mode: ClaimMode::Claim,
            shape: ClaimShape::Auto,
        }
    }

    fn finish(self, line: String) -> Result<ActionStep, CommandError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        Ok(ActionStep::new(StepAction::Type {
            lines: vec![format!("/land edit {}", self.land), line],
            pause: Duration::ZERO,
        }))
    }
}

/// Builder for [`LandEditor::trust`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustCommand {
    editor: LandEditor,
    line: Option<Result<String, CommandError>>,
}

impl TrustCommand {
    fn set(mut self, verb: &str, player: &str) -> Self {
        self.line = Some(if blank(player) {
            Err(CommandError::EmptyRecipient)
        } else {
            Ok(format!("/land {verb} {}", player.trim()))
        });
        self
    }

    /// Trusts `player`.
    #[must_use]
    pub fn add(self, player: &str) -> Self {
        self.set("trust", player)
    }

    /// Revokes trust from `player`.
    #[must_use]
    pub fn remove(self, player: &str) -> Self {
        self.set("untrust", player)
    }

    /// The finished step.
    pub fn build(self) -> Result<ActionStep, CommandError> {
        let line = self.line.ok_or_else(|| CommandError::Incomplete {
            command: "land trust".to_string(),
        })??;
        self.editor.finish(line)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClaimMode {
    Claim,
    Unclaim,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClaimShape {
    Auto,
    Fill,
    Radius(u32),
}

/// Builder for [`LandEditor::claim`]. Defaults to drawing with `auto`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimCommand {
    editor: LandEditor,
    mode: ClaimMode,
    shape: ClaimShape,
}

impl ClaimCommand {
    /// Adds chunks to the land.
    #[must_use]
    pub fn draw(mut self) -> Self {
        self.mode = ClaimMode::Claim;
        self
    }

    /// Removes chunks from the land.
    #[must_use]
    pub fn erase(mut self) -> Self {
        self.mode = ClaimMode::Unclaim;
        self
    }

    /// Claims a square of `radius` chunks around the player.
    #[must_use]
    pub fn radius(mut self, radius: u32) -> Self {
        self.shape = ClaimShape::Radius(radius);
        self
    }

    /// Claims the chunk the player stands in.
    #[must_use]
    pub fn auto(mut self) -> Self {
        self.shape = ClaimShape::Auto;
        self
    }

    /// Fills the area enclosed by the land.
    #[must_use]
    pub fn fill(mut self) -> Self {
        self.shape = ClaimShape::Fill;
        self
    }

    /// The finished step. Erasing is confirmed in the same command.
    pub fn build(self) -> Result<ActionStep, CommandError> {
        let mode = match self.mode {
            ClaimMode::Claim => "claim",
            ClaimMode::Unclaim => "unclaim",
        };
        let mut line = match self.shape {
            ClaimShape::Auto => format!("/land {mode} auto"),
            ClaimShape::Fill => format!("/land {mode} fill"),
            ClaimShape::Radius(r) => format!("/land {mode} radius {r}"),
        };
        if self.mode == ClaimMode::Unclaim {
            line.push_str(" confirm");
        }
        self.editor.finish(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typed(step: &ActionStep) -> Vec<String> {
        match step.action() {
            StepAction::Type { lines, .. } => lines.clone(),
            other => panic!("expected typing, got {other:?}"),
        }
    }

    #[test]
    fn chat_variants() {
        assert_eq!(typed(&chat("hello").build().unwrap()), vec!["hello"]);
        assert_eq!(
            typed(&chat("hi").send_to("Bob").build().unwrap()),
            vec!["/m Bob hi"]
        );
        assert_eq!(
            typed(&chat("wts").switch_channel("tc").build().unwrap()),
            vec!["/tc", "wts"]
        );
        assert_eq!(
            typed(&chat("hi").send_to("Bob").switch_channel("tc").build().unwrap()),
            vec!["/m Bob hi"]
        );
        assert_eq!(
            typed(&chat("hi").send_to("Bob").to_all().build().unwrap()),
            vec!["hi"]
        );
    }

    #[test]
    fn chat_interval_becomes_pause() {
        let step = chat("hi").interval(Duration::from_secs(2)).build().unwrap();
        assert_eq!(
            step.action(),
            &StepAction::Type {
                lines: vec!["hi".to_string()],
                pause: Duration::from_secs(2)
            }
        );
    }

    #[test]
    fn chat_errors() {
        assert_eq!(chat("  ").build(), Err(CommandError::EmptyContent));
        assert_eq!(chat("x").send_to(" ").build(), Err(CommandError::EmptyRecipient));
    }

    #[test]
    fn pay_command() {
        assert_eq!(
            typed(&pay(50).transfer_to("Alex").build().unwrap()),
            vec!["/pay Alex 50"]
        );
        assert_eq!(
            pay(0).transfer_to("Alex").build(),
            Err(CommandError::NonPositiveAmount { amount: 0 })
        );
        assert_eq!(pay(5).build(), Err(CommandError::EmptyRecipient));
    }

    #[test]
    fn land_invite_replies() {
        assert_eq!(
            typed(&land("Lakeside").invite().accept().build().unwrap()),
            vec!["/land accept Lakeside"]
        );
        assert_eq!(
            typed(&land("Lakeside").invite().reject().build().unwrap()),
            vec!["/land deny Lakeside"]
        );
        assert_eq!(
            land("Lakeside").accept().build(),
            Err(CommandError::OutOfOrder {
                operation: "accept".to_string(),
                requires: "invite".to_string()
            })
        );
        assert!(matches!(
            land("Lakeside").invite().build(),
            Err(CommandError::Incomplete { .. })
        ));
        assert_eq!(land("").invite().accept().build(), Err(CommandError::EmptyLandName));
    }

    #[test]
    fn land_deposit() {
        assert_eq!(
            typed(&land("Home").deposit(200).build().unwrap()),
            vec!["/land deposit 200 Home"]
        );
        assert_eq!(
            typed(&land("Home").deposit("ALL").build().unwrap()),
            vec!["/land deposit all Home"]
        );
    }

    #[test]
    fn land_edit_commands() {
        assert_eq!(
            typed(&land("Home").edit().trust().add("Bob").build().unwrap()),
            vec!["/land edit Home", "/land trust Bob"]
        );
        assert_eq!(
            typed(&land("Home").edit().trust().remove("Bob").build().unwrap()),
            vec!["/land edit Home", "/land untrust Bob"]
        );
        assert!(matches!(
            land("Home").edit().trust().build(),
            Err(CommandError::Incomplete { .. })
        ));
        assert_eq!(
            typed(&land("Home").edit().claim().build().unwrap()),
            vec!["/land edit Home", "/land claim auto"]
        );
        assert_eq!(
            typed(&land("Home").edit().claim().draw().radius(3).build().unwrap()),
            vec!["/land edit Home", "/land claim radius 3"]
        );
        assert_eq!(
            typed(&land("Home").edit().claim().erase().fill().build().unwrap()),
            vec!["/land edit Home", "/land unclaim fill confirm"]
        );
    }

    #[test]
    fn jump_and_wait_steps() {
        assert_eq!(
            jump(3).interval(Duration::from_millis(500)).step().action(),
            &StepAction::Jump {
                times: 3,
                interval: Duration::from_millis(500)
            }
        );
        assert_eq!(
            wait(Duration::from_secs(4)).action(),
            &StepAction::Wait {
                duration: Duration::from_secs(4)
            }
        );
    }
}
