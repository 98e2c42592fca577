//! JSON source rule-set format.

use async_trait::async_trait;

use super::{prepare, ConvertOptions, Convertor};
use crate::downgrade::PlainRuleSet;
use crate::rule::Rule;
use crate::{Error, Result};

/// `{"version": n, "rules": [...]}` documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceConvertor;

#[async_trait]
impl Convertor for SourceConvertor {
    fn format_id(&self) -> &'static str {
        "source"
    }

    fn content_type(&self, _options: &ConvertOptions) -> &'static str {
        "application/json"
    }

    fn from_bytes(&self, content: &[u8], _options: &ConvertOptions) -> Result<Vec<Rule>> {
        let first = content.iter().find(|b| !b.is_ascii_whitespace());
        if first != Some(&b'{') {
            return Err(Error::InvalidSource(
                "content is not a JSON object".to_string(),
            ));
        }
        let rule_set: PlainRuleSet = serde_json::from_slice(content)?;
        Ok(rule_set.rules)
    }

    async fn to_bytes(&self, rules: Vec<Rule>, options: &ConvertOptions) -> Result<Vec<u8>> {
        let rule_set = prepare(rules, options).await?;
        let mut output = serde_json::to_vec_pretty(&rule_set)?;
        output.push(b'\n');
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Metadata;
    use crate::version::Version;

    #[test]
    fn test_rejects_non_object() {
        let options = ConvertOptions::default();
        for content in [&b"[]"[..], b"", b"   payload:", b"MRS"] {
            assert!(matches!(
                SourceConvertor.from_bytes(content, &options),
                Err(Error::InvalidSource(_))
            ));
        }
    }

    #[test]
    fn test_leading_whitespace_allowed() {
        let rules = SourceConvertor
            .from_bytes(
                b"\n  {\"version\": 2, \"rules\": [{\"domain\": \"a.com\"}]}",
                &ConvertOptions::default(),
            )
            .unwrap();
        assert_eq!(rules.len(), 1);
    }

    #[test]
    fn test_malformed_json() {
        let result = SourceConvertor.from_bytes(b"{\"rules\": [", &ConvertOptions::default());
        assert!(matches!(result, Err(Error::Json(_))));
    }

    #[tokio::test]
    async fn test_pretty_output() {
        let rules = SourceConvertor
            .from_bytes(
                br#"{"version":3,"rules":[{"domain":["a.com"]}]}"#,
                &ConvertOptions::default(),
            )
            .unwrap();
        let output = SourceConvertor
            .to_bytes(rules, &ConvertOptions::default())
            .await
            .unwrap();
        let text = String::from_utf8(output).unwrap();
        assert_eq!(
            text,
            "{\n  \"version\": 3,\n  \"rules\": [\n    {\n      \"domain\": \"a.com\"\n    }\n  ]\n}\n"
        );
    }

    #[tokio::test]
    async fn test_version_tag_follows_client() {
        let options = ConvertOptions::new(Metadata::sing_box(Some(Version::new(1, 10, 2))));
        let output = SourceConvertor.to_bytes(Vec::new(), &options).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(value["version"], 2);
        assert_eq!(
            SourceConvertor.content_type(&options),
            "application/json"
        );
    }
}
