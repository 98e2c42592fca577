//! Collaborator seams supplied by the host engine.

use async_trait::async_trait;

use crate::downgrade::RuleSetVersion;
use crate::rule::Rule;
use crate::Result;

/// Inlines rules that other rule sets contribute by reference.
#[async_trait]
pub trait RuleSetEmbedder: Send + Sync {
    async fn embed(&self, rules: Vec<Rule>) -> Result<Vec<Rule>>;
}

/// Embedder that returns rules unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughEmbedder;

#[async_trait]
impl RuleSetEmbedder for PassthroughEmbedder {
    async fn embed(&self, rules: Vec<Rule>) -> Result<Vec<Rule>> {
        Ok(rules)
    }
}

/// The host engine's native binary rule-set codec.
pub trait NativeCodec: Send + Sync {
    fn read(&self, content: &[u8]) -> Result<Vec<Rule>>;

    fn write(&self, rules: &[Rule], version: RuleSetVersion) -> Result<Vec<u8>>;
}
