//! Gateway configuration.
//!
//! ```yaml
//! asn:
//!   timeout_secs: 10
//!   concurrency: 4
//! source:
//!   url: https://rules.example.com/{name}.json
//!   ttl_secs: 600
//! cache:
//!   capacity: 256
//! ```
//!
//! Every section and field is optional.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::asn::ResolverConfig;
use crate::cache::CacheConfig;
use crate::source::SourceConfig;
use crate::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub asn: ResolverConfig,
    pub source: SourceConfig,
    pub cache: CacheConfig,
}

impl GatewayConfig {
    /// Load from a `.yaml`/`.yml` or `.json` file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        let config: GatewayConfig = match extension.as_deref() {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            Some("json") => serde_json::from_str(&content)?,
            _ => {
                return Err(Error::Config(format!(
                    "unsupported config file extension: {}",
                    path.display()
                )))
            }
        };
        config.validate()?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.asn.concurrency == 0 {
            return Err(Error::Config("asn.concurrency must be at least 1".into()));
        }
        if self.asn.timeout_secs == 0 {
            return Err(Error::Config("asn.timeout_secs must be at least 1".into()));
        }
        if self.cache.capacity == 0 {
            return Err(Error::Config("cache.capacity must be at least 1".into()));
        }
        Ok(())
    }
}
