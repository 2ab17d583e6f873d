//! Line classifier.
//!
//! Every line is tested against every rule of every rule-set. Matches are not
//! short-circuited: one line may yield several events of different kinds.
//! Rejected matches are logged and dropped; classification never fails.

use std::collections::BTreeSet;

use regex::Captures;
use tracing::{trace, warn};

use crate::error::ClassifyError;
use crate::event::{CaptureMap, Event, EventRegistry};
use crate::pattern::{PatternTable, Rule};

/// Stateless classifier over a compiled pattern table.
#[derive(Debug, Clone)]
pub struct Classifier {
    table: PatternTable,
    registry: EventRegistry,
}

impl Classifier {
    /// Creates a classifier owning its table and registry.
    #[must_use]
    pub const fn new(table: PatternTable, registry: EventRegistry) -> Self {
        Self { table, registry }
    }

    /// The pattern table.
    #[must_use]
    pub const fn table(&self) -> &PatternTable {
        &self.table
    }

    /// The event registry.
    #[must_use]
    pub const fn registry(&self) -> &EventRegistry {
        &self.registry
    }

    /// Classifies one line into zero or more events.
    #[must_use]
    pub fn classify(&self, line: &str) -> Vec<Event> {
        let mut events = Vec::new();
        for set in self.table.rule_sets() {
            let kind = set.event_kind();
            for rule in set.rules() {
                match self.apply(kind, rule, line) {
                    Ok(Some(event)) => {
                        trace!(kind, event_id = %event.event_id, "line classified");
                        events.push(event);
                    }
                    Ok(None) => {}
                    Err(err) => warn!(kind, line, error = %err, "match discarded"),
                }
            }
        }
        events
    }

    fn apply(&self, kind: &str, rule: &Rule, line: &str) -> Result<Option<Event>, ClassifyError> {
        let Some(caps) = rule.pattern().captures(line) else {
            return Ok(None);
        };

        let captures = capture_map(rule, &caps);
        let required = rule.required_fields();
        if !required.is_empty() {
            let actual: BTreeSet<&String> = captures.keys().collect();
            let expected: BTreeSet<&String> = required.iter().collect();
            if actual != expected {
                return Err(ClassifyError::FieldMismatch {
                    kind: kind.to_string(),
                    expected: required.iter().cloned().collect(),
                    actual: captures.keys().cloned().collect(),
                });
            }
        }

        let payload = self.registry.construct(kind, &captures)?;
        Ok(Some(Event::new(kind, payload)))
    }
}

/// Every named group of the rule, with `None` for groups that did not participate.
fn capture_map(rule: &Rule, caps: &Captures<'_>) -> CaptureMap {
    rule.pattern()
        .capture_names()
        .flatten()
        .map(|name| (name.to_string(), caps.name(name).map(|m| m.as_str().to_string())))
        .collect()
}
