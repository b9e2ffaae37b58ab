// Keep rules - glob patterns compiled into root predicates

use crate::analysis::{NodeDescriptor, RootPredicate};
use crate::cache::UnitFingerprint;
use crate::graph::NodeKind;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeepRuleError {
    #[error("Keep rule in counter-set `{counter_set}` has an empty {field} pattern")]
    EmptyPattern { counter_set: String, field: &'static str },

    #[error("Unclosed `[` in pattern `{pattern}`")]
    UnclosedBracket { pattern: String },

    #[error("Pattern `{pattern}` does not compile: {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Unknown access keyword `{keyword}`")]
    UnknownAccess { keyword: String },

    #[error("Unknown counter-set `{0}`")]
    UnknownCounterSet(String),
}

const ACCESS_KEYWORDS: [&str; 10] = [
    "public",
    "private",
    "protected",
    "static",
    "final",
    "native",
    "interface",
    "abstract",
    "annotation",
    "enum",
];

/// One keep rule as written in the config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepRuleConfig {
    /// Class name glob, internal form (`com/example/**`)
    pub class: String,
    /// Member name glob; without it the rule matches the class itself
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<String>,
    /// Annotation type glob the node must carry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotated: Option<String>,
    /// Space separated access keywords, `!` to require absence (`public !static`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access: Option<String>,
    /// Exclude what the rule matches
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub negate: bool,
}

impl KeepRuleConfig {
    pub fn class(pattern: impl Into<String>) -> Self {
        Self {
            class: pattern.into(),
            ..Self::default()
        }
    }

    pub fn member(class: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            member: Some(member.into()),
            ..Self::default()
        }
    }

    pub fn with_descriptor(mut self, pattern: impl Into<String>) -> Self {
        self.descriptor = Some(pattern.into());
        self
    }

    pub fn with_annotation(mut self, pattern: impl Into<String>) -> Self {
        self.annotated = Some(pattern.into());
        self
    }

    pub fn with_access(mut self, access: impl Into<String>) -> Self {
        self.access = Some(access.into());
        self
    }

    pub fn negated(mut self) -> Self {
        self.negate = true;
        self
    }
}

/// Translate a glob into an anchored regex.
///
/// `**` matches anything, `*` anything but `/`, `?` one character but `/`,
/// `[...]` a character class (`[!...]` negated).
pub fn glob_to_regex(pattern: &str) -> Result<Regex, KeepRuleError> {
    translate_glob(pattern, true)
}

/// Like [`glob_to_regex`], but `[` is the array marker of a JVM descriptor,
/// never the start of a character class
pub fn descriptor_glob_to_regex(pattern: &str) -> Result<Regex, KeepRuleError> {
    translate_glob(pattern, false)
}

fn translate_glob(pattern: &str, char_classes: bool) -> Result<Regex, KeepRuleError> {
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');

    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                out.push_str(".*");
                i += 1;
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '[' if char_classes => {
                let close = chars[i + 1..]
                    .iter()
                    .position(|&c| c == ']')
                    .map(|p| p + i + 1)
                    .ok_or_else(|| KeepRuleError::UnclosedBracket {
                        pattern: pattern.to_string(),
                    })?;
                out.push('[');
                let mut body = &chars[i + 1..close];
                if body.first() == Some(&'!') {
                    out.push('^');
                    body = &body[1..];
                }
                for &c in body {
                    if matches!(c, '\\' | '[' | '^') {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out.push(']');
                i = close;
            }
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }
    out.push('$');

    Regex::new(&out).map_err(|source| KeepRuleError::Regex {
        pattern: pattern.to_string(),
        source,
    })
}

/// A rule with its globs compiled
#[derive(Debug, Clone)]
pub struct KeepRule {
    class: Regex,
    member: Option<Regex>,
    descriptor: Option<Regex>,
    annotated: Option<Regex>,
    required: Vec<&'static str>,
    forbidden: Vec<&'static str>,
    negate: bool,
}

fn keyword(word: &str) -> Result<&'static str, KeepRuleError> {
    ACCESS_KEYWORDS
        .iter()
        .copied()
        .find(|k| *k == word)
        .ok_or_else(|| KeepRuleError::UnknownAccess {
            keyword: word.to_string(),
        })
}

impl KeepRule {
    pub fn compile(counter_set: &str, config: &KeepRuleConfig) -> Result<Self, KeepRuleError> {
        let non_empty = |field: &'static str, pattern: &str| -> Result<Regex, KeepRuleError> {
            if pattern.is_empty() {
                return Err(KeepRuleError::EmptyPattern {
                    counter_set: counter_set.to_string(),
                    field,
                });
            }
            match field {
                "descriptor" => descriptor_glob_to_regex(pattern),
                _ => glob_to_regex(pattern),
            }
        };

        let mut required = Vec::new();
        let mut forbidden = Vec::new();
        for word in config.access.as_deref().unwrap_or("").split_whitespace() {
            match word.strip_prefix('!') {
                Some(word) => forbidden.push(keyword(word)?),
                None => required.push(keyword(word)?),
            }
        }

        Ok(Self {
            class: non_empty("class", &config.class)?,
            member: config.member.as_deref().map(|p| non_empty("member", p)).transpose()?,
            descriptor: config.descriptor.as_deref().map(|p| non_empty("descriptor", p)).transpose()?,
            annotated: config.annotated.as_deref().map(|p| non_empty("annotated", p)).transpose()?,
            required,
            forbidden,
            negate: config.negate,
        })
    }

    pub fn matches(&self, node: &NodeDescriptor<'_>) -> bool {
        if !self.class.is_match(node.class_name) {
            return false;
        }

        match (&self.member, node.kind, node.member_name) {
            (None, NodeKind::Class, _) => {}
            (Some(pattern), NodeKind::Method | NodeKind::Field, Some(name)) => {
                if !pattern.is_match(name) {
                    return false;
                }
                if let (Some(pattern), Some(descriptor)) = (&self.descriptor, node.descriptor) {
                    if !pattern.is_match(descriptor) {
                        return false;
                    }
                }
            }
            _ => return false,
        }

        if let Some(pattern) = &self.annotated {
            if !node.annotations.iter().any(|a| pattern.is_match(a)) {
                return false;
            }
        }

        let present = node.modifiers.keywords();
        self.required.iter().all(|k| present.contains(k)) && !self.forbidden.iter().any(|k| present.contains(k))
    }

    pub fn is_negated(&self) -> bool {
        self.negate
    }
}

/// All rules of one counter-set; a node is a root when some rule matches
/// and no negated rule does
#[derive(Debug, Clone)]
pub struct KeepRules {
    name: String,
    rules: Vec<KeepRule>,
    fingerprint: String,
}

impl KeepRules {
    pub fn compile(name: &str, configs: &[KeepRuleConfig]) -> Result<Self, KeepRuleError> {
        let rules = configs
            .iter()
            .map(|c| KeepRule::compile(name, c))
            .collect::<Result<Vec<_>, _>>()?;

        let canonical = serde_json::to_vec(configs).unwrap_or_default();
        Ok(Self {
            name: name.to_string(),
            rules,
            fingerprint: UnitFingerprint::compute_hash(&canonical),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl RootPredicate for KeepRules {
    fn matches(&self, node: &NodeDescriptor<'_>) -> bool {
        let mut kept = false;
        for rule in &self.rules {
            if rule.matches(node) {
                if rule.is_negated() {
                    return false;
                }
                kept = true;
            }
        }
        kept
    }
}
