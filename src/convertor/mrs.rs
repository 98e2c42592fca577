//! MRS trie container format.

use async_trait::async_trait;

use super::{prepare, ConvertOptions, Convertor};
use crate::behavior::Behavior;
use crate::mrs::{read_rules, MrsWriter};
use crate::rule::Rule;
use crate::Result;

#[derive(Debug, Clone, Default)]
pub struct MrsConvertor {
    writer: MrsWriter,
}

impl MrsConvertor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_writer(writer: MrsWriter) -> Self {
        Self { writer }
    }
}

/// Domain when any destination-address rule lists domains, else IP-CIDR.
pub fn infer_behavior(rules: &[Rule]) -> Behavior {
    let has_domains = rules
        .iter()
        .filter_map(Rule::as_default)
        .filter(|rule| rule.is_destination_address_rule())
        .any(|rule| !rule.domain.is_empty() || !rule.domain_suffix.is_empty());
    if has_domains {
        Behavior::Domain
    } else {
        Behavior::IpCidr
    }
}

#[async_trait]
impl Convertor for MrsConvertor {
    fn format_id(&self) -> &'static str {
        "mrs"
    }

    fn content_type(&self, _options: &ConvertOptions) -> &'static str {
        "application/octet-stream"
    }

    fn from_bytes(&self, content: &[u8], _options: &ConvertOptions) -> Result<Vec<Rule>> {
        Ok(read_rules(content)?)
    }

    async fn to_bytes(&self, rules: Vec<Rule>, options: &ConvertOptions) -> Result<Vec<u8>> {
        let rule_set = prepare(rules, options).await?;
        let behavior = options
            .behavior
            .unwrap_or_else(|| infer_behavior(&rule_set.rules));
        self.writer.write(behavior, &rule_set.rules)
    }
}
