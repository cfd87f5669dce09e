// SPDX-License-Identifier: LGPL-3.0-or-later

use super::schema::{FileInfo, PlayerList, PlayerListEntry, PlayerListSteamId, RuleEntry, RulesList, TextMatchMode};
use crate::model::SteamId;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::io::Write;

pub const LOCAL_ORIGIN: &str = "local";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub origin: String,
    pub attributes: Vec<String>,
}

#[derive(Debug)]
pub struct MarkOptions {
    pub steam_id: SteamId,
    pub attributes: Vec<String>,
    pub name: String,
}

#[derive(Debug, Error)]
pub enum RuleCompileError {
    #[error("invalid pattern {pattern:?} in rule {description:?}: {source}")]
    InvalidPattern {
        description: String,
        pattern: String,
        source: regex::Error,
    },
}

use thiserror::Error;

enum CompiledMatcher {
    Equal { text: String, case_sensitive: bool },
    Contains { text: String, case_sensitive: bool },
    StartsWith { text: String, case_sensitive: bool },
    EndsWith { text: String, case_sensitive: bool },
    Regex(Regex),
}

impl CompiledMatcher {
    fn compile(entry: &RuleEntry) -> Result<Vec<Self>, RuleCompileError> {
        let Some(text_match) = &entry.triggers.username_text_match else {
            return Ok(Vec::new());
        };
        text_match
            .patterns
            .iter()
            .map(|pattern| {
                Ok(match text_match.mode {
                    TextMatchMode::Equal => CompiledMatcher::Equal {
                        text: pattern.clone(),
                        case_sensitive: text_match.case_sensitive,
                    },
                    TextMatchMode::Contains => CompiledMatcher::Contains {
                        text: pattern.clone(),
                        case_sensitive: text_match.case_sensitive,
                    },
                    TextMatchMode::StartsWith => CompiledMatcher::StartsWith {
                        text: pattern.clone(),
                        case_sensitive: text_match.case_sensitive,
                    },
                    TextMatchMode::EndsWith => CompiledMatcher::EndsWith {
                        text: pattern.clone(),
                        case_sensitive: text_match.case_sensitive,
                    },
                    TextMatchMode::Regex => {
                        let built = if text_match.case_sensitive {
                            Regex::new(pattern)
                        } else {
                            Regex::new(&format!("(?i){pattern}"))
                        };
                        CompiledMatcher::Regex(built.map_err(|source| RuleCompileError::InvalidPattern {
                            description: entry.description.clone(),
                            pattern: pattern.clone(),
                            source,
                        })?)
                    }
                })
            })
            .collect()
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            CompiledMatcher::Equal { text, case_sensitive } => {
                if *case_sensitive {
                    name == text
                } else {
                    name.eq_ignore_ascii_case(text)
                }
            }
            CompiledMatcher::Contains { text, case_sensitive } => {
                if *case_sensitive {
                    name.contains(text.as_str())
                } else {
                    name.to_lowercase().contains(&text.to_lowercase())
                }
            }
            CompiledMatcher::StartsWith { text, case_sensitive } => {
                if *case_sensitive {
                    name.starts_with(text.as_str())
                } else {
                    name.to_lowercase().starts_with(&text.to_lowercase())
                }
            }
            CompiledMatcher::EndsWith { text, case_sensitive } => {
                if *case_sensitive {
                    name.ends_with(text.as_str())
                } else {
                    name.to_lowercase().ends_with(&text.to_lowercase())
                }
            }
            CompiledMatcher::Regex(re) => re.is_match(name),
        }
    }
}

struct CompiledRule {
    entry: RuleEntry,
    matchers: Vec<CompiledMatcher>,
}

/// In-memory union of every imported player list and rule list, plus the
/// locally-authored `local` origin that `mark` writes into. Single owner,
/// guarded by a readers-writer lock at the call site (spec.md §4.5/§5).
pub struct RulesEngine {
    player_origins: HashMap<String, HashMap<SteamId, Vec<String>>>,
    rule_origins: HashMap<String, Vec<CompiledRule>>,
    origin_order: Vec<String>,
    tags: HashSet<String>,
}

impl Default for RulesEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RulesEngine {
    pub fn new() -> Self {
        let mut engine = Self {
            player_origins: HashMap::new(),
            rule_origins: HashMap::new(),
            origin_order: vec![LOCAL_ORIGIN.to_string()],
            tags: HashSet::new(),
        };
        engine.player_origins.insert(LOCAL_ORIGIN.to_string(), HashMap::new());
        engine
    }

    fn register_origin(&mut self, origin: &str) {
        if !self.origin_order.iter().any(|o| o == origin) {
            self.origin_order.push(origin.to_string());
        }
    }

    fn recompute_tags(&mut self) {
        self.tags.clear();
        for entries in self.player_origins.values() {
            for attrs in entries.values() {
                self.tags.extend(attrs.iter().cloned());
            }
        }
        for rules in self.rule_origins.values() {
            for rule in rules {
                self.tags.extend(rule.entry.actions.mark.iter().cloned());
            }
        }
    }

    /// Replaces `origin`'s player entries atomically. Duplicate steamIDs
    /// within `list` are de-duplicated, last occurrence wins. Returns the
    /// number of entries imported.
    pub fn import_players(&mut self, origin: &str, list: &PlayerList) -> usize {
        let mut entries = HashMap::new();
        for entry in &list.players {
            if let Some(sid) = entry.steamid.resolve() {
                entries.insert(sid, entry.attributes.clone());
            }
        }
        let count = entries.len();
        self.player_origins.insert(origin.to_string(), entries);
        self.register_origin(origin);
        self.recompute_tags();
        count
    }

    /// Compiles every rule in `list`. On the first invalid pattern, the
    /// whole import fails and the origin's prior rules are left untouched.
    pub fn import_rules(&mut self, origin: &str, list: &RulesList) -> Result<usize, RuleCompileError> {
        let mut compiled = Vec::with_capacity(list.rules.len());
        for entry in &list.rules {
            let matchers = CompiledMatcher::compile(entry)?;
            compiled.push(CompiledRule {
                entry: entry.clone(),
                matchers,
            });
        }
        let count = compiled.len();
        self.rule_origins.insert(origin.to_string(), compiled);
        self.register_origin(origin);
        self.recompute_tags();
        Ok(count)
    }

    pub fn match_steam(&self, sid: SteamId) -> Option<Match> {
        for origin in &self.origin_order {
            if let Some(entries) = self.player_origins.get(origin) {
                if let Some(attributes) = entries.get(&sid) {
                    if !attributes.is_empty() {
                        return Some(Match {
                            origin: origin.clone(),
                            attributes: attributes.clone(),
                        });
                    }
                }
            }
        }
        None
    }

    pub fn match_name(&self, name: &str) -> Option<Match> {
        if name.is_empty() {
            return None;
        }
        for origin in &self.origin_order {
            let Some(rules) = self.rule_origins.get(origin) else {
                continue;
            };
            for rule in rules {
                if rule.matchers.iter().any(|m| m.matches(name)) {
                    return Some(Match {
                        origin: origin.clone(),
                        attributes: rule.entry.actions.mark.clone(),
                    });
                }
            }
        }
        None
    }

    /// Appends to the `local` origin, creating the entry if absent and
    /// union-merging its attribute set otherwise.
    pub fn mark(&mut self, opts: MarkOptions) {
        let local = self.player_origins.entry(LOCAL_ORIGIN.to_string()).or_default();
        let entry = local.entry(opts.steam_id).or_default();
        for attr in opts.attributes {
            if !entry.contains(&attr) {
                entry.push(attr);
            }
        }
        let _ = opts.name;
        self.recompute_tags();
    }

    pub fn unique_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.tags.iter().cloned().collect();
        tags.sort();
        tags
    }

    pub fn export_players(&self, origin: &str, sink: &mut dyn Write) -> Result<(), serde_json::Error> {
        let players = self
            .player_origins
            .get(origin)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(sid, attrs)| PlayerListEntry {
                        steamid: PlayerListSteamId::Numeric(sid.0),
                        attributes: attrs.clone(),
                        last_seen: None,
                    })
                    .collect()
            })
            .unwrap_or_default();
        let list = PlayerList {
            file_info: FileInfo {
                title: origin.to_string(),
                ..Default::default()
            },
            players,
        };
        serde_json::to_writer_pretty(sink, &list)
    }

    pub fn export_rules(&self, origin: &str, sink: &mut dyn Write) -> Result<(), serde_json::Error> {
        let rules = self
            .rule_origins
            .get(origin)
            .map(|compiled| compiled.iter().map(|c| c.entry.clone()).collect())
            .unwrap_or_default();
        let list = RulesList {
            file_info: FileInfo {
                title: origin.to_string(),
                ..Default::default()
            },
            rules,
        };
        serde_json::to_writer_pretty(sink, &list)
    }
}
