//! Rule-set format convertors.
//!
//! A [`Convertor`] decodes one wire format into [`Rule`]s and encodes rules
//! back after running the shared compatibility pipeline in [`prepare`].

mod binary;
mod clash;
mod mrs;
mod source;

pub use self::binary::BinaryConvertor;
pub use self::clash::ClashConvertor;
pub use self::mrs::MrsConvertor;
pub use self::source::SourceConvertor;

use ahash::AHashMap;
use async_trait::async_trait;
use log::{debug, info};
use std::fmt;
use std::sync::Arc;

use crate::adapter::{NativeCodec, RuleSetEmbedder};
use crate::asn::{convert_ip_asn_to_ip_cidr, AsnResolverBuilder, ResolverConfig};
use crate::behavior::Behavior;
use crate::downgrade::{downgrade, PlainRuleSet};
use crate::metadata::{Metadata, Platform};
use crate::rule::Rule;
use crate::{Error, Result};

/// Per-request conversion settings.
#[derive(Clone, Default)]
pub struct ConvertOptions {
    /// Requesting client
    pub metadata: Metadata,
    /// Entry kind for flat formats
    pub behavior: Option<Behavior>,
    /// Provider chain for ASN embedding; the registry defaults when unset
    pub asn: Option<AsnResolverBuilder>,
    /// Resolves `rule_set` references before they are stripped
    pub embedder: Option<Arc<dyn RuleSetEmbedder>>,
}

impl fmt::Debug for ConvertOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConvertOptions")
            .field("metadata", &self.metadata)
            .field("behavior", &self.behavior)
            .field("asn", &self.asn)
            .field("embedder", &self.embedder.is_some())
            .finish()
    }
}

impl ConvertOptions {
    pub fn new(metadata: Metadata) -> Self {
        Self {
            metadata,
            ..Default::default()
        }
    }

    pub fn with_behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = Some(behavior);
        self
    }

    pub fn with_asn(mut self, builder: AsnResolverBuilder) -> Self {
        self.asn = Some(builder);
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn RuleSetEmbedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }
}

/// A rule-set wire format.
#[async_trait]
pub trait Convertor: Send + Sync {
    /// Registry key, e.g. `source` or `mrs`.
    fn format_id(&self) -> &'static str;

    /// MIME type of encoded output.
    fn content_type(&self, options: &ConvertOptions) -> &'static str;

    fn from_bytes(&self, content: &[u8], options: &ConvertOptions) -> Result<Vec<Rule>>;

    async fn to_bytes(&self, rules: Vec<Rule>, options: &ConvertOptions) -> Result<Vec<u8>>;
}

/// Compatibility pipeline shared by every encoder.
///
/// 1. inline referenced rule sets
/// 2. embed ASN conditions as CIDRs for sing-box clients
/// 3. drop rules that still reference other rule sets
/// 4. downgrade for sing-box clients of a known version
pub async fn prepare(rules: Vec<Rule>, options: &ConvertOptions) -> Result<PlainRuleSet> {
    let mut rules = match &options.embedder {
        Some(embedder) => embedder.embed(rules).await?,
        None => rules,
    };

    let sing_box = options.metadata.platform == Platform::SingBox;
    if sing_box && rules.iter().any(Rule::contains_ip_asn) {
        let builder = match &options.asn {
            Some(builder) => builder.clone(),
            None => AsnResolverBuilder::from_config(&ResolverConfig::default())?,
        };
        convert_ip_asn_to_ip_cidr(&mut rules, &builder).await?;
    }

    let total = rules.len();
    let rules: Vec<Rule> = rules
        .into_iter()
        .filter(Rule::is_headlessable)
        .map(Rule::into_headless)
        .collect();
    if rules.len() < total {
        debug!(
            "Dropped {} rules referencing other rule sets",
            total - rules.len()
        );
    }

    let mut rule_set = PlainRuleSet::new(rules);
    if sing_box {
        if let Some(version) = &options.metadata.version {
            downgrade(&mut rule_set, version);
        }
    }
    Ok(rule_set)
}

/// Convertors keyed by format id.
#[derive(Clone, Default)]
pub struct Convertors {
    entries: AHashMap<&'static str, Arc<dyn Convertor>>,
}

impl Convertors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source, MRS and Clash, plus binary when a native codec is available.
    pub fn with_defaults(native_codec: Option<Arc<dyn NativeCodec>>) -> Self {
        let mut convertors = Self::new();
        convertors.register(Arc::new(SourceConvertor));
        convertors.register(Arc::new(MrsConvertor::new()));
        convertors.register(Arc::new(ClashConvertor));
        if let Some(codec) = native_codec {
            convertors.register(Arc::new(BinaryConvertor::new(codec)));
        }
        convertors
    }

    /// Add or replace a convertor under its format id.
    pub fn register(&mut self, convertor: Arc<dyn Convertor>) {
        self.entries.insert(convertor.format_id(), convertor);
    }

    pub fn get(&self, format_id: &str) -> Result<Arc<dyn Convertor>> {
        self.entries
            .get(format_id)
            .cloned()
            .ok_or_else(|| Error::UnknownFormat(format_id.to_string()))
    }

    /// Registered format ids, sorted.
    pub fn formats(&self) -> Vec<&'static str> {
        let mut ids: Vec<&'static str> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Decode `input` as `from` and encode it as `to`.
    pub async fn convert(
        &self,
        input: &[u8],
        from: &str,
        to: &str,
        options: &ConvertOptions,
    ) -> Result<Vec<u8>> {
        let decoder = self.get(from)?;
        let encoder = self.get(to)?;

        let rules = decoder.from_bytes(input, options)?;
        info!(
            "Converting {} rules from {} to {} for {}",
            rules.len(),
            from,
            to,
            options.metadata
        );
        encoder.to_bytes(rules, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downgrade::RuleSetVersion;
    use crate::rule::{DefaultRule, LogicalMode, LogicalRule};
    use crate::version::Version;

    struct InlineEmbedder;

    #[async_trait]
    impl RuleSetEmbedder for InlineEmbedder {
        async fn embed(&self, rules: Vec<Rule>) -> Result<Vec<Rule>> {
            Ok(rules
                .into_iter()
                .map(|rule| match rule {
                    Rule::Default(default) if default.rule_set == ["inline-me"] => {
                        Rule::Default(DefaultRule {
                            domain: vec!["inlined.com".into()],
                            ..Default::default()
                        })
                    }
                    other => other,
                })
                .collect())
        }
    }

    fn reference(tag: &str) -> Rule {
        Rule::Default(DefaultRule {
            rule_set: vec![tag.to_string()],
            ..Default::default()
        })
    }

    fn domain(name: &str) -> Rule {
        Rule::Default(DefaultRule {
            domain: vec![name.to_string()],
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_prepare_drops_references() {
        let rules = vec![
            domain("a.com"),
            reference("geosite-cn"),
            Rule::Logical(LogicalRule::new(
                LogicalMode::Or,
                vec![domain("b.com"), reference("geoip-cn")],
            )),
        ];
        let rule_set = prepare(rules, &ConvertOptions::default()).await.unwrap();
        assert_eq!(rule_set.rules, vec![domain("a.com")]);
        assert_eq!(rule_set.version, RuleSetVersion::CURRENT);
    }

    #[tokio::test]
    async fn test_prepare_runs_embedder_first() {
        let options = ConvertOptions::default().with_embedder(Arc::new(InlineEmbedder));
        let rule_set = prepare(vec![reference("inline-me"), reference("other")], &options)
            .await
            .unwrap();
        assert_eq!(rule_set.rules, vec![domain("inlined.com")]);
    }

    #[tokio::test]
    async fn test_prepare_downgrades_sing_box_only() {
        let rules = vec![Rule::Default(DefaultRule {
            network_type: vec!["cellular".into()],
            ..Default::default()
        })];

        let old_client = ConvertOptions::new(Metadata::sing_box(Some(Version::new(1, 9, 0))));
        let rule_set = prepare(rules.clone(), &old_client).await.unwrap();
        assert_eq!(rule_set.version, RuleSetVersion::V1);
        assert!(rule_set.rules.is_empty());

        let unknown_platform = ConvertOptions::new(Metadata {
            version: Some(Version::new(1, 9, 0)),
            ..Default::default()
        });
        let rule_set = prepare(rules, &unknown_platform).await.unwrap();
        assert_eq!(rule_set.version, RuleSetVersion::CURRENT);
        assert_eq!(rule_set.rules.len(), 1);
    }

    #[tokio::test]
    async fn test_prepare_keeps_asn_for_other_platforms() {
        let rules = vec![Rule::Default(DefaultRule {
            ip_asn: vec!["13335".into()],
            ..Default::default()
        })];
        let rule_set = prepare(rules, &ConvertOptions::default()).await.unwrap();
        assert!(rule_set.rules[0].contains_ip_asn());
    }

    #[test]
    fn test_registry_defaults() {
        let convertors = Convertors::with_defaults(None);
        assert_eq!(convertors.formats(), vec!["clash", "mrs", "source"]);
        assert!(matches!(
            convertors.get("binary"),
            Err(Error::UnknownFormat(id)) if id == "binary"
        ));
    }

    #[tokio::test]
    async fn test_convert_unknown_format() {
        let convertors = Convertors::with_defaults(None);
        let result = convertors
            .convert(b"{}", "source", "srs2", &ConvertOptions::default())
            .await;
        assert!(matches!(result, Err(Error::UnknownFormat(_))));
    }
}
