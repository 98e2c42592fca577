//! Cached, bounded-concurrency ASN resolution.

use ahash::AHashMap;
use log::{debug, info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

use super::provider::{
    AsnProvider, BgpViewProvider, HttpFetcher, RipeProvider, DEFAULT_BGPVIEW_ENDPOINT,
    DEFAULT_RIPE_ENDPOINT,
};
use crate::error::AsnError;

/// Resolutions kept in flight by `resolve_many` unless configured otherwise.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Registry settings for the default provider chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// BGPView URL template containing `{asn}`
    pub bgpview_endpoint: String,
    /// RIPEstat URL template containing `{asn}`
    pub ripe_endpoint: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Maximum response body size in bytes
    pub body_limit: usize,
    pub concurrency: usize,
    pub user_agent: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            bgpview_endpoint: DEFAULT_BGPVIEW_ENDPOINT.to_string(),
            ripe_endpoint: DEFAULT_RIPE_ENDPOINT.to_string(),
            timeout_secs: 15,
            body_limit: 4 << 20,
            concurrency: DEFAULT_CONCURRENCY,
            user_agent: concat!("rulegate/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Normalize an ASN identifier to its decimal digits.
///
/// Accepts surrounding whitespace and an `AS` prefix or suffix in any case.
pub fn normalize_asn(raw: &str) -> Result<String, AsnError> {
    let invalid = |reason| AsnError::InvalidAsn {
        asn: raw.to_string(),
        reason,
    };

    let mut value = raw.trim();
    if value.get(..2).is_some_and(|p| p.eq_ignore_ascii_case("as")) {
        value = &value[2..];
    }
    if value.len() >= 2
        && value
            .get(value.len() - 2..)
            .is_some_and(|s| s.eq_ignore_ascii_case("as"))
    {
        value = &value[..value.len() - 2];
    }
    let value = value.trim();

    if value.is_empty() {
        return Err(invalid("empty"));
    }
    if !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("not a decimal number"));
    }
    if value.parse::<u32>().is_err() {
        return Err(invalid("out of 32-bit range"));
    }
    Ok(value.to_string())
}

/// Builds resolvers that share a provider chain but not a cache.
#[derive(Clone)]
pub struct AsnResolverBuilder {
    providers: Vec<Arc<dyn AsnProvider>>,
    concurrency: usize,
}

impl fmt::Debug for AsnResolverBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.providers.iter().map(|p| p.name()).collect();
        f.debug_struct("AsnResolverBuilder")
            .field("providers", &names)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl Default for AsnResolverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AsnResolverBuilder {
    /// Empty provider chain.
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// BGPView then RIPEstat, configured from `config`.
    pub fn from_config(config: &ResolverConfig) -> crate::Result<Self> {
        let fetcher = HttpFetcher::new(
            Duration::from_secs(config.timeout_secs),
            config.body_limit,
            &config.user_agent,
        )?;
        Ok(Self::new()
            .provider(BgpViewProvider::new(
                config.bgpview_endpoint.clone(),
                fetcher.clone(),
            ))
            .provider(RipeProvider::new(config.ripe_endpoint.clone(), fetcher))
            .concurrency(config.concurrency))
    }

    /// Append a provider; providers are tried in insertion order.
    pub fn provider(self, provider: impl AsnProvider + 'static) -> Self {
        self.shared_provider(Arc::new(provider))
    }

    pub fn shared_provider(mut self, provider: Arc<dyn AsnProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Maximum resolutions in flight during `resolve_many`. Zero means one.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// A resolver with a fresh, empty cache.
    pub fn build(&self) -> AsnResolver {
        AsnResolver {
            inner: Arc::new(Inner {
                cache: RwLock::new(AHashMap::new()),
                providers: self.providers.clone(),
                concurrency: self.concurrency,
            }),
        }
    }
}

struct Inner {
    /// Normalized ASN to prefixes; an empty list records a miss.
    cache: RwLock<AHashMap<String, Vec<String>>>,
    providers: Vec<Arc<dyn AsnProvider>>,
    concurrency: usize,
}

/// Resolves AS numbers through a provider chain, caching every outcome.
///
/// Clones share the cache.
#[derive(Clone)]
pub struct AsnResolver {
    inner: Arc<Inner>,
}

impl fmt::Debug for AsnResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsnResolver")
            .field("cached", &self.inner.cache.read().len())
            .field("concurrency", &self.inner.concurrency)
            .finish()
    }
}

impl AsnResolver {
    fn cached(&self, asn: &str) -> Option<Vec<String>> {
        self.inner.cache.read().get(asn).cloned()
    }

    /// Number of cached identifiers.
    pub fn cache_len(&self) -> usize {
        self.inner.cache.read().len()
    }

    /// Resolve one identifier.
    ///
    /// Providers are tried in order and the first non-empty answer wins.
    /// Recoverable provider failures fall through to the next provider; if
    /// none answers, the empty result is cached and returned.
    pub async fn resolve_asn(&self, raw: &str) -> Result<Vec<String>, AsnError> {
        let asn = normalize_asn(raw)?;
        if let Some(prefixes) = self.cached(&asn) {
            debug!("ASN cache hit for AS{} ({} prefixes)", asn, prefixes.len());
            return Ok(prefixes);
        }

        let mut prefixes = Vec::new();
        for provider in &self.inner.providers {
            match provider.fetch_prefixes(&asn).await {
                Ok(found) if !found.is_empty() => {
                    info!(
                        "Resolved AS{} to {} prefixes via {}",
                        asn,
                        found.len(),
                        provider.name()
                    );
                    prefixes = found;
                    break;
                }
                Ok(_) => debug!("{} has no prefixes for AS{}", provider.name(), asn),
                Err(err) if err.is_recoverable() => {
                    warn!("{} lookup for AS{} failed: {}", provider.name(), asn, err)
                }
                Err(source) => {
                    return Err(AsnError::Provider {
                        provider: provider.name().to_string(),
                        asn,
                        source,
                    })
                }
            }
        }

        self.inner.cache.write().insert(asn, prefixes.clone());
        Ok(prefixes)
    }

    /// Resolve several identifiers concurrently and concatenate the prefixes
    /// in input order.
    ///
    /// At most the configured number of resolutions run at once. The first
    /// failure aborts the rest and reports the prefixes gathered so far.
    pub async fn resolve_many<I, S>(&self, asns: I) -> Result<Vec<String>, AsnError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let asns: Vec<String> = asns.into_iter().map(|s| s.as_ref().to_string()).collect();
        let mut results: Vec<Option<Vec<String>>> = vec![None; asns.len()];
        let mut queue = asns.into_iter().enumerate();
        let mut tasks = JoinSet::new();

        loop {
            while tasks.len() < self.inner.concurrency {
                let Some((index, asn)) = queue.next() else {
                    break;
                };
                let resolver = self.clone();
                tasks.spawn(async move {
                    let result = resolver.resolve_asn(&asn).await;
                    (index, asn, result)
                });
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };
            match joined {
                Ok((index, _, Ok(prefixes))) => results[index] = Some(prefixes),
                Ok((_, asn, Err(err))) => {
                    tasks.abort_all();
                    return Err(AsnError::Resolve {
                        asn,
                        collected: results.into_iter().flatten().flatten().collect(),
                        source: Box::new(err),
                    });
                }
                Err(err) => {
                    tasks.abort_all();
                    return Err(AsnError::Task(err.to_string()));
                }
            }
        }

        Ok(results.into_iter().flatten().flatten().collect())
    }
}
