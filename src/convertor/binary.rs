//! Native binary rule-set format, delegated to the host codec.

use async_trait::async_trait;
use std::sync::Arc;

use super::{prepare, ConvertOptions, Convertor};
use crate::adapter::NativeCodec;
use crate::rule::Rule;
use crate::Result;

#[derive(Clone)]
pub struct BinaryConvertor {
    codec: Arc<dyn NativeCodec>,
}

impl BinaryConvertor {
    pub fn new(codec: Arc<dyn NativeCodec>) -> Self {
        Self { codec }
    }
}

#[async_trait]
impl Convertor for BinaryConvertor {
    fn format_id(&self) -> &'static str {
        "binary"
    }

    fn content_type(&self, _options: &ConvertOptions) -> &'static str {
        "application/octet-stream"
    }

    fn from_bytes(&self, content: &[u8], _options: &ConvertOptions) -> Result<Vec<Rule>> {
        self.codec.read(content)
    }

    async fn to_bytes(&self, rules: Vec<Rule>, options: &ConvertOptions) -> Result<Vec<u8>> {
        let rule_set = prepare(rules, options).await?;
        self.codec.write(&rule_set.rules, rule_set.version)
    }
}
