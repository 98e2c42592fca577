//! Canonical rule model.
//!
//! Every format decodes into and encodes from [`Rule`]. The JSON shape follows
//! the source rule-set format: a default rule is a plain object, a logical rule
//! carries `"type": "logical"`.

mod default;
pub(crate) mod listable;
mod logical;

pub use default::DefaultRule;
pub use logical::{LogicalMode, LogicalRule};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A routing rule: either a flat condition set or a logical combination.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Default(DefaultRule),
    Logical(LogicalRule),
}

impl From<DefaultRule> for Rule {
    fn from(rule: DefaultRule) -> Self {
        Rule::Default(rule)
    }
}

impl From<LogicalRule> for Rule {
    fn from(rule: LogicalRule) -> Self {
        Rule::Logical(rule)
    }
}

impl Rule {
    /// True if any default node in this tree satisfies `predicate`.
    pub fn any_default(&self, predicate: &dyn Fn(&DefaultRule) -> bool) -> bool {
        let mut stack = vec![self];
        while let Some(rule) = stack.pop() {
            match rule {
                Rule::Default(default) => {
                    if predicate(default) {
                        return true;
                    }
                }
                Rule::Logical(logical) => stack.extend(logical.rules.iter()),
            }
        }
        false
    }

    /// True if no node references another rule set.
    pub fn is_headlessable(&self) -> bool {
        !self.any_default(&|rule| !rule.rule_set.is_empty())
    }

    /// Copy of this rule with every `rule_set` reference removed.
    pub fn to_headless(&self) -> Rule {
        self.clone().into_headless()
    }

    /// Consuming variant of [`Rule::to_headless`].
    pub fn into_headless(mut self) -> Rule {
        for rule in default_rules_mut(std::slice::from_mut(&mut self)) {
            rule.rule_set.clear();
        }
        self
    }

    /// True if any node carries `ip_asn` or `source_ip_asn`.
    pub fn contains_ip_asn(&self) -> bool {
        self.any_default(&DefaultRule::has_ip_asn)
    }

    /// The inner default rule, if this is one.
    pub fn as_default(&self) -> Option<&DefaultRule> {
        match self {
            Rule::Default(rule) => Some(rule),
            Rule::Logical(_) => None,
        }
    }
}

/// Every default node under `rules`, in document order.
pub fn default_rules_mut(rules: &mut [Rule]) -> Vec<&mut DefaultRule> {
    let mut found = Vec::new();
    let mut stack: Vec<&mut Rule> = rules.iter_mut().rev().collect();
    while let Some(rule) = stack.pop() {
        match rule {
            Rule::Default(default) => found.push(default),
            Rule::Logical(logical) => stack.extend(logical.rules.iter_mut().rev()),
        }
    }
    found
}

impl Serialize for Rule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Tagged<'a> {
            #[serde(rename = "type")]
            kind: &'static str,
            #[serde(flatten)]
            rule: &'a LogicalRule,
        }

        match self {
            Rule::Default(rule) => rule.serialize(serializer),
            Rule::Logical(rule) => Tagged {
                kind: "logical",
                rule,
            }
            .serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Rule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut object = serde_json::Map::deserialize(deserializer)?;
        let kind = match object.remove("type") {
            None => String::new(),
            Some(serde_json::Value::String(kind)) => kind,
            Some(other) => return Err(D::Error::custom(format!("invalid rule type: {other}"))),
        };
        let value = serde_json::Value::Object(object);

        match kind.as_str() {
            "" | "default" => DefaultRule::deserialize(value)
                .map(Rule::Default)
                .map_err(D::Error::custom),
            "logical" => {
                let rule = LogicalRule::deserialize(value).map_err(D::Error::custom)?;
                if rule.rules.is_empty() {
                    return Err(D::Error::custom("logical rule has no child rules"));
                }
                Ok(Rule::Logical(rule))
            }
            other => Err(D::Error::custom(format!("unknown rule type: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain_rule(domain: &str) -> Rule {
        Rule::Default(DefaultRule {
            domain: vec![domain.to_string()],
            ..Default::default()
        })
    }

    #[test]
    fn test_decode_default_rule() {
        let rule: Rule = serde_json::from_str(r#"{"domain":["a.com"],"port":443}"#).unwrap();
        let default = rule.as_default().unwrap();
        assert_eq!(default.domain, vec!["a.com".to_string()]);
        assert_eq!(default.port, vec![443]);
    }

    #[test]
    fn test_decode_explicit_default_type() {
        let rule: Rule = serde_json::from_str(r#"{"type":"default","domain":"a.com"}"#).unwrap();
        assert!(rule.as_default().unwrap().extra.is_empty());
    }

    #[test]
    fn test_decode_logical_rule() {
        let json = r#"{
            "type": "logical",
            "mode": "or",
            "rules": [{"domain": "a.com"}, {"ip_cidr": "10.0.0.0/8"}],
            "invert": true
        }"#;
        let rule: Rule = serde_json::from_str(json).unwrap();
        match rule {
            Rule::Logical(logical) => {
                assert_eq!(logical.mode, LogicalMode::Or);
                assert_eq!(logical.rules.len(), 2);
                assert!(logical.invert);
            }
            Rule::Default(_) => panic!("expected logical rule"),
        }
    }

    #[test]
    fn test_logical_rule_requires_children() {
        let result: std::result::Result<Rule, _> =
            serde_json::from_str(r#"{"type":"logical","mode":"and","rules":[]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_type_rejected() {
        let result: std::result::Result<Rule, _> = serde_json::from_str(r#"{"type":"weird"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_logical_rule_serializes_type_tag() {
        let rule = Rule::Logical(LogicalRule::new(
            LogicalMode::And,
            vec![domain_rule("a.com")],
        ));
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["type"], "logical");
        assert_eq!(json["mode"], "and");
        assert_eq!(json["rules"][0]["domain"], "a.com");
        assert!(json.get("invert").is_none());
    }

    #[test]
    fn test_headlessable() {
        let plain = domain_rule("a.com");
        assert!(plain.is_headlessable());

        let nested = Rule::Logical(LogicalRule::new(
            LogicalMode::Or,
            vec![
                plain.clone(),
                Rule::Default(DefaultRule {
                    rule_set: vec!["geosite-cn".into()],
                    ..Default::default()
                }),
            ],
        ));
        assert!(!nested.is_headlessable());

        let headless = nested.to_headless();
        assert!(headless.is_headlessable());
        assert!(!nested.is_headlessable());
    }

    #[test]
    fn test_headless_keeps_asn() {
        let rule = Rule::Default(DefaultRule {
            ip_asn: vec!["13335".into()],
            rule_set: vec!["other".into()],
            ..Default::default()
        });
        let headless = rule.into_headless();
        assert!(headless.contains_ip_asn());
        assert!(headless.as_default().unwrap().rule_set.is_empty());
    }

    #[test]
    fn test_contains_ip_asn_nested() {
        let rule = Rule::Logical(LogicalRule::not(Rule::Logical(LogicalRule::new(
            LogicalMode::And,
            vec![
                domain_rule("a.com"),
                Rule::Default(DefaultRule {
                    source_ip_asn: vec!["AS15169".into()],
                    ..Default::default()
                }),
            ],
        ))));
        assert!(rule.contains_ip_asn());
        assert!(!domain_rule("a.com").contains_ip_asn());
    }

    #[test]
    fn test_default_rules_mut_document_order() {
        let mut rules = vec![
            domain_rule("first.com"),
            Rule::Logical(LogicalRule::new(
                LogicalMode::And,
                vec![domain_rule("second.com"), domain_rule("third.com")],
            )),
            domain_rule("fourth.com"),
        ];
        let order: Vec<String> = default_rules_mut(&mut rules)
            .into_iter()
            .map(|rule| rule.domain[0].clone())
            .collect();
        assert_eq!(order, ["first.com", "second.com", "third.com", "fourth.com"]);
    }
}
