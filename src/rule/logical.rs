//! Logical (composite) rule.

use serde::{Deserialize, Serialize};

use super::Rule;

/// Combination mode of a logical rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalMode {
    And,
    Or,
}

impl LogicalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalMode::And => "and",
            LogicalMode::Or => "or",
        }
    }
}

/// A rule combining child rules with AND or OR.
///
/// NOT is spelled as an inverted rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalRule {
    pub mode: LogicalMode,
    pub rules: Vec<Rule>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub invert: bool,
}

impl LogicalRule {
    /// Create a logical rule from children.
    pub fn new(mode: LogicalMode, rules: Vec<Rule>) -> Self {
        Self {
            mode,
            rules,
            invert: false,
        }
    }

    /// Create a NOT over a single child, expressed as an inverted AND.
    pub fn not(rule: Rule) -> Self {
        Self {
            mode: LogicalMode::And,
            rules: vec![rule],
            invert: true,
        }
    }
}
