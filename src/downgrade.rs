//! Version-aware compatibility transform for plain rule sets.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::rule::{DefaultRule, Rule};
use crate::version::Version;

/// Rule-set document version understood by client engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum RuleSetVersion {
    V1 = 1,
    V2 = 2,
    V3 = 3,
}

impl RuleSetVersion {
    pub const CURRENT: RuleSetVersion = RuleSetVersion::V3;
}

impl Default for RuleSetVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl From<RuleSetVersion> for u8 {
    fn from(version: RuleSetVersion) -> Self {
        version as u8
    }
}

impl TryFrom<u8> for RuleSetVersion {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(RuleSetVersion::V1),
            2 => Ok(RuleSetVersion::V2),
            3 => Ok(RuleSetVersion::V3),
            other => Err(format!("unsupported rule-set version: {other}")),
        }
    }
}

/// A rule-set document: version tag plus top-level rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlainRuleSet {
    #[serde(default)]
    pub version: RuleSetVersion,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl PlainRuleSet {
    /// Wrap rules at the current version.
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            version: RuleSetVersion::CURRENT,
            rules,
        }
    }
}

/// First engine release that understands network-condition fields.
const NETWORK_CONDITIONS_SINCE: Version = Version::new(1, 11, 0);

/// First engine release that understands rule-set version 2.
const VERSION_2_SINCE: Version = Version::new(1, 10, 0);

/// Rewrite `rule_set` so that a client running `version` can load it.
///
/// Below 1.11.0 the document is tagged version 2 and every top-level rule whose
/// tree uses a network-type, expensive or constrained condition is removed.
/// Below 1.10.0 it is additionally tagged version 1.
pub fn downgrade(rule_set: &mut PlainRuleSet, version: &Version) {
    if *version < NETWORK_CONDITIONS_SINCE {
        rule_set.version = RuleSetVersion::V2;
        let before = rule_set.rules.len();
        rule_set
            .rules
            .retain(|rule| !rule.any_default(&DefaultRule::uses_network_conditions));
        let dropped = before - rule_set.rules.len();
        if dropped > 0 {
            debug!(
                "Dropped {} rules with network conditions for client {}",
                dropped, version
            );
        }
    }
    if *version < VERSION_2_SINCE {
        rule_set.version = RuleSetVersion::V1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{LogicalMode, LogicalRule};

    fn sample() -> PlainRuleSet {
        PlainRuleSet::new(vec![
            Rule::Default(DefaultRule {
                domain: vec!["a.com".into()],
                ..Default::default()
            }),
            Rule::Logical(LogicalRule::new(
                LogicalMode::And,
                vec![
                    Rule::Default(DefaultRule {
                        domain: vec!["b.com".into()],
                        ..Default::default()
                    }),
                    Rule::Default(DefaultRule {
                        network_type: vec!["wifi".into()],
                        ..Default::default()
                    }),
                ],
            )),
            Rule::Default(DefaultRule {
                network_is_expensive: true,
                ..Default::default()
            }),
        ])
    }

    #[test]
    fn test_downgrade_below_1_10() {
        let mut rule_set = sample();
        downgrade(&mut rule_set, &Version::new(1, 9, 0));
        assert_eq!(rule_set.version, RuleSetVersion::V1);
        assert_eq!(rule_set.rules.len(), 1);
    }

    #[test]
    fn test_downgrade_below_1_11() {
        let mut rule_set = sample();
        downgrade(&mut rule_set, &Version::new(1, 10, 5));
        assert_eq!(rule_set.version, RuleSetVersion::V2);
        assert_eq!(rule_set.rules.len(), 1);
    }

    #[test]
    fn test_network_conditions_dropped_under_or_and_not() {
        let metered = || {
            Rule::Default(DefaultRule {
                network_type: vec!["cellular".into()],
                ..Default::default()
            })
        };
        let plain = |domain: &str| {
            Rule::Default(DefaultRule {
                domain: vec![domain.into()],
                ..Default::default()
            })
        };
        let mut rule_set = PlainRuleSet::new(vec![
            Rule::Logical(LogicalRule::new(
                LogicalMode::Or,
                vec![plain("or.com"), metered()],
            )),
            Rule::Logical(LogicalRule::not(metered())),
            Rule::Logical(LogicalRule::not(Rule::Logical(LogicalRule::new(
                LogicalMode::Or,
                vec![plain("deep.com"), metered()],
            )))),
            Rule::Logical(LogicalRule::not(plain("kept.com"))),
        ]);

        downgrade(&mut rule_set, &Version::new(1, 10, 5));
        assert_eq!(rule_set.version, RuleSetVersion::V2);
        assert_eq!(
            rule_set.rules,
            vec![Rule::Logical(LogicalRule::not(plain("kept.com")))]
        );
    }

    #[test]
    fn test_no_downgrade_at_1_11() {
        let mut rule_set = sample();
        downgrade(&mut rule_set, &Version::new(1, 11, 0));
        assert_eq!(rule_set, sample());
    }

    #[test]
    fn test_prerelease_of_threshold_is_downgraded() {
        let mut rule_set = sample();
        downgrade(&mut rule_set, &Version::parse("1.11.0-beta.1").unwrap());
        assert_eq!(rule_set.version, RuleSetVersion::V2);
    }

    #[test]
    fn test_plain_rule_set_json_shape() {
        let rule_set = PlainRuleSet::new(Vec::new());
        assert_eq!(
            serde_json::to_string(&rule_set).unwrap(),
            r#"{"version":3,"rules":[]}"#
        );
        let parsed: PlainRuleSet = serde_json::from_str(r#"{"version":2,"rules":[]}"#).unwrap();
        assert_eq!(parsed.version, RuleSetVersion::V2);
        assert!(serde_json::from_str::<PlainRuleSet>(r#"{"version":9}"#).is_err());
    }
}
