//! Pattern table: named rule-sets that classify raw log lines.
//!
//! The on-disk form is an ordered JSON list of `{name, rules: [{regex, groups}]}`.
//! Rules are compiled once at load time and are read-only afterwards.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ConfigError;

/// Serialized form of a single rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    /// Regular expression with named capture groups.
    pub regex: String,
    /// Capture group names the rule must produce.
    #[serde(default)]
    pub groups: Vec<String>,
}

impl RuleSpec {
    /// Creates a rule spec.
    #[must_use]
    pub fn new(regex: impl Into<String>, groups: &[&str]) -> Self {
        Self {
            regex: regex.into(),
            groups: groups.iter().map(|g| (*g).to_string()).collect(),
        }
    }
}

/// Serialized form of a rule-set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSetSpec {
    /// Event kind produced by every rule in this set.
    pub name: String,
    /// Rules, tried in declaration order.
    pub rules: Vec<RuleSpec>,
}

/// A compiled rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pattern: Regex,
    required_fields: BTreeSet<String>,
}

impl Rule {
    /// Compiles a rule. Patterns are case-insensitive.
    pub fn compile(kind: &str, spec: &RuleSpec) -> Result<Self, ConfigError> {
        let pattern = RegexBuilder::new(&spec.regex)
            .case_insensitive(true)
            .build()
            .map_err(|e| ConfigError::InvalidPattern {
                kind: kind.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            pattern,
            required_fields: spec.groups.iter().cloned().collect(),
        })
    }

    /// The compiled matcher.
    #[must_use]
    pub const fn pattern(&self) -> &Regex {
        &self.pattern
    }

    /// Field names a successful match must produce. Empty means unchecked.
    #[must_use]
    pub const fn required_fields(&self) -> &BTreeSet<String> {
        &self.required_fields
    }
}

/// All rules for one event kind.
#[derive(Debug, Clone)]
pub struct RuleSet {
    event_kind: String,
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Compiles a rule-set.
    pub fn compile(spec: &RuleSetSpec) -> Result<Self, ConfigError> {
        let name = spec.name.trim();
        if name.is_empty() {
            return Err(ConfigError::InvalidPattern {
                kind: spec.name.clone(),
                reason: "event kind name cannot be empty".to_string(),
            });
        }

        let rules = spec
            .rules
            .iter()
            .map(|r| Rule::compile(name, r))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            event_kind: name.to_string(),
            rules,
        })
    }

    /// The event kind this set produces.
    #[must_use]
    pub fn event_kind(&self) -> &str {
        &self.event_kind
    }

    /// Rules in declaration order.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

/// Ordered collection of compiled rule-sets.
#[derive(Debug, Clone, Default)]
pub struct PatternTable {
    sets: Vec<RuleSet>,
}

impl PatternTable {
    /// Compiles a table from its serialized form.
    pub fn compile(specs: &[RuleSetSpec]) -> Result<Self, ConfigError> {
        let mut sets = Vec::with_capacity(specs.len());
        for spec in specs {
            let set = RuleSet::compile(spec)?;
            debug!(kind = set.event_kind(), rules = set.rules().len(), "compiled rule-set");
            sets.push(set);
        }
        Ok(Self { sets })
    }

    /// Compiles the built-in default table.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::compile(&default_rule_sets())
    }

    /// Loads the table from `path`, writing the default table first if the
    /// file does not exist.
    pub fn load_or_init(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let defaults = default_rule_sets();
            let json = serde_json::to_string_pretty(&defaults).map_err(|source| ConfigError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;
            fs::write(path, json).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            info!(path = %path.display(), "wrote default pattern table");
        }

        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let specs: Vec<RuleSetSpec> = serde_json::from_str(&raw).map_err(|source| ConfigError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;

        let table = Self::compile(&specs)?;
        info!(path = %path.display(), rule_sets = table.len(), "pattern table loaded");
        Ok(table)
    }

    /// Rule-sets in declaration order.
    #[must_use]
    pub fn rule_sets(&self) -> &[RuleSet] {
        &self.sets
    }

    /// Number of rule-sets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// Returns true if the table has no rule-sets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

/// The built-in pattern table written on first run.
#[must_use]
pub fn default_rule_sets() -> Vec<RuleSetSpec> {
    const CJK: &str = r"\x{4e00}-\x{9fff}";

    vec![
        RuleSetSpec {
            name: "game-crashed".to_string(),
            rules: vec![
                RuleSpec::new(r"\[\d{2}:\d{2}:\d{2}\] \[.*FATAL\]:.*", &[]),
                RuleSpec::new(
                    r".*(Exception in server tick loop|This crash report has been saved to|---- Minecraft Crash Report ----).*",
                    &[],
                ),
            ],
        },
        RuleSetSpec {
            name: "land-invite".to_string(),
            rules: vec![RuleSpec::new(
                format!(
                    r".*?(?P<inviter>[\w{CJK}]{{2,16}}).*?邀请.*?加入.*?(?P<land_name>[\w{CJK}\s·\-]{{2,32}}).*?领土"
                ),
                &["inviter", "land_name"],
            )],
        },
        RuleSetSpec {
            name: "land-deposit".to_string(),
            rules: vec![RuleSpec::new(
                r"^\[CHAT\]\s+领土>>\s+收件箱\s-\s领土\s+(?P<land_name>[^:]+):\s+玩家\s+(?P<player>\w+)\s+存入了\s+\$(?P<in_value>[\d,]+\.\d{2})\.当前余额:\s+\$(?P<now_value>[\d,]+\.\d{2})$",
                &["land_name", "player", "in_value", "now_value"],
            )],
        },
        RuleSetSpec {
            name: "land-withdraw".to_string(),
            rules: vec![RuleSpec::new(
                r"^\[CHAT\]\s+领土>>\s+收件箱\s-\s领土\s+(?P<land_name>[^:]+):\s+玩家\s+(?P<player>\w+)\s+取出了\s+\$(?P<out_value>[\d,]+\.\d{2})\.当前余额:\s+\$(?P<now_value>[\d,]+\.\d{2})$",
                &["land_name", "player", "out_value", "now_value"],
            )],
        },
        RuleSetSpec {
            name: "whisper".to_string(),
            rules: vec![RuleSpec::new(r"(?P<sender>\w+) 悄悄的对 我 说: (?P<text>.+)", &["sender", "text"])],
        },
        RuleSetSpec {
            name: "message".to_string(),
            rules: vec![RuleSpec::new(
                r"\[CHAT\]\s*?(?:\[(?P<server_name>[^\]]+?)\]\s*)?\[(?P<channel>G|L|交易|RP|国家|[A-Z]{2,})\]\s+(?:(?P<tag>[^\s:]+)\s+)?(?P<player>[A-Za-z0-9_]{3,16})(?:\s*[:>]|\s+说)\s*(?P<content>.*)$",
                &["server_name", "channel", "tag", "player", "content"],
            )],
        },
        RuleSetSpec {
            name: "view-sync".to_string(),
            rules: vec![RuleSpec::new(r"你的视角已与 (?P<admin_name>\w+) 同步", &["admin_name"])],
        },
        RuleSetSpec {
            name: "join".to_string(),
            rules: vec![
                RuleSpec::new(r"(?P<player>\w+) joined the game", &["player"]),
                RuleSpec::new(r"(?P<player>\w+) 加入了游戏", &["player"]),
            ],
        },
        RuleSetSpec {
            name: "quit".to_string(),
            rules: vec![
                RuleSpec::new(r"(?P<player>\w+) left the game", &["player"]),
                RuleSpec::new(r"(?P<player>\w+) 退出了游戏", &["player"]),
            ],
        },
        RuleSetSpec {
            name: "kick".to_string(),
            rules: vec![RuleSpec::new("您已被踢出", &[])],
        },
        RuleSetSpec {
            name: "disconnect".to_string(),
            rules: vec![RuleSpec::new(
                r".*(?:Disconnected|连接断开|Timed out|Connection reset|lost connection).*",
                &[],
            )],
        },
        RuleSetSpec {
            name: "idle".to_string(),
            rules: vec![RuleSpec::new("你暂时离开了", &[])],
        },
        RuleSetSpec {
            name: "idle-resume".to_string(),
            rules: vec![RuleSpec::new("你回来了", &[])],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_compiles() {
        let table = PatternTable::builtin().unwrap();
        assert_eq!(table.len(), default_rule_sets().len());
        assert!(table.rule_sets().iter().any(|s| s.event_kind() == "whisper"));
    }

    #[test]
    fn rule_sets_keep_declaration_order() {
        let specs = vec![
            RuleSetSpec {
                name: "b".to_string(),
                rules: vec![RuleSpec::new("b", &[])],
            },
            RuleSetSpec {
                name: "a".to_string(),
                rules: vec![RuleSpec::new("a1", &[]), RuleSpec::new("a2", &[])],
            },
        ];
        let table = PatternTable::compile(&specs).unwrap();
        let kinds: Vec<&str> = table.rule_sets().iter().map(RuleSet::event_kind).collect();
        assert_eq!(kinds, vec!["b", "a"]);
        assert_eq!(table.rule_sets()[1].rules()[1].pattern().as_str(), "a2");
    }

    #[test]
    fn invalid_regex_is_config_error() {
        let specs = vec![RuleSetSpec {
            name: "broken".to_string(),
            rules: vec![RuleSpec::new("(?P<x>", &["x"])],
        }];
        let err = PatternTable::compile(&specs).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { kind, .. } if kind == "broken"));
    }

    #[test]
    fn patterns_are_case_insensitive() {
        let rule = Rule::compile("join", &RuleSpec::new(r"(?P<player>\w+) joined the game", &["player"])).unwrap();
        assert!(rule.pattern().is_match("Steve JOINED THE GAME"));
    }

    #[test]
    fn load_or_init_writes_defaults_then_reads_them() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patterns.json");
        assert!(!path.exists());

        let table = PatternTable::load_or_init(&path).unwrap();
        assert!(path.exists());
        assert_eq!(table.len(), default_rule_sets().len());

        let on_disk: Vec<RuleSetSpec> = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, default_rule_sets());
    }

    #[test]
    fn load_or_init_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patterns.json");
        fs::write(&path, "{ not json").unwrap();

        let err = PatternTable::load_or_init(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { .. }));
    }
}
