//! Registry providers that map an AS number to announced prefixes.

use async_trait::async_trait;
use log::debug;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use crate::error::ProviderError;

/// Placeholder replaced by the AS number in endpoint templates.
pub const ASN_PLACEHOLDER: &str = "{asn}";

pub const DEFAULT_BGPVIEW_ENDPOINT: &str = "https://api.bgpview.io/asn/{asn}/prefixes";
pub const DEFAULT_RIPE_ENDPOINT: &str =
    "https://stat.ripe.net/data/announced-prefixes/data.json?resource=AS{asn}";

/// A source of announced prefixes for a normalized AS number.
#[async_trait]
pub trait AsnProvider: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Fetch every announced prefix. An empty list means nothing was found.
    async fn fetch_prefixes(&self, asn: &str) -> Result<Vec<String>, ProviderError>;
}

/// Shared HTTP client with a per-request timeout and a body size limit.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    body_limit: usize,
}

fn classify(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else if err.is_builder() {
        ProviderError::Request(err.to_string())
    } else {
        ProviderError::Transport(err)
    }
}

impl HttpFetcher {
    pub fn new(timeout: Duration, body_limit: usize, user_agent: &str) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client, body_limit })
    }

    /// GET `url` and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ProviderError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| ProviderError::Request(format!("invalid URL {url}: {e}")))?;

        let mut response = self.client.get(parsed).send().await.map_err(classify)?;
        if response.status() != StatusCode::OK {
            return Err(ProviderError::Status(response.status().as_u16()));
        }
        if let Some(length) = response.content_length() {
            if length > self.body_limit as u64 {
                return Err(ProviderError::BodyTooLarge {
                    limit: self.body_limit,
                });
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(classify)? {
            if body.len() + chunk.len() > self.body_limit {
                return Err(ProviderError::BodyTooLarge {
                    limit: self.body_limit,
                });
            }
            body.extend_from_slice(&chunk);
        }
        debug!("Fetched {} bytes from {}", body.len(), url);

        serde_json::from_slice(&body).map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct PrefixEntry {
    #[serde(default)]
    prefix: String,
}

fn collect_prefixes<'a>(entries: impl IntoIterator<Item = &'a PrefixEntry>) -> Vec<String> {
    entries
        .into_iter()
        .map(|entry| entry.prefix.trim())
        .filter(|prefix| !prefix.is_empty())
        .map(str::to_string)
        .collect()
}

fn check_status(status: &str) -> Result<(), ProviderError> {
    if status == "ok" {
        Ok(())
    } else {
        Err(ProviderError::ApiStatus(status.to_string()))
    }
}

#[derive(Debug, Default, Deserialize)]
struct BgpViewData {
    #[serde(default)]
    ipv4_prefixes: Vec<PrefixEntry>,
    #[serde(default)]
    ipv6_prefixes: Vec<PrefixEntry>,
}

#[derive(Debug, Deserialize)]
struct BgpViewEnvelope {
    #[serde(default)]
    status: String,
    #[serde(default)]
    data: BgpViewData,
}

impl BgpViewEnvelope {
    fn into_prefixes(self) -> Result<Vec<String>, ProviderError> {
        check_status(&self.status)?;
        Ok(collect_prefixes(
            self.data
                .ipv4_prefixes
                .iter()
                .chain(self.data.ipv6_prefixes.iter()),
        ))
    }
}

/// BGPView announced-prefix API.
#[derive(Debug, Clone)]
pub struct BgpViewProvider {
    endpoint: String,
    fetcher: HttpFetcher,
}

impl BgpViewProvider {
    pub fn new(endpoint: impl Into<String>, fetcher: HttpFetcher) -> Self {
        Self {
            endpoint: endpoint.into(),
            fetcher,
        }
    }
}

#[async_trait]
impl AsnProvider for BgpViewProvider {
    fn name(&self) -> &str {
        "bgpview"
    }

    async fn fetch_prefixes(&self, asn: &str) -> Result<Vec<String>, ProviderError> {
        let url = self.endpoint.replace(ASN_PLACEHOLDER, asn);
        let envelope: BgpViewEnvelope = self.fetcher.get_json(&url).await?;
        envelope.into_prefixes()
    }
}

#[derive(Debug, Default, Deserialize)]
struct RipeData {
    #[serde(default)]
    prefixes: Vec<PrefixEntry>,
}

#[derive(Debug, Deserialize)]
struct RipeEnvelope {
    #[serde(default)]
    status: String,
    #[serde(default)]
    data: RipeData,
}

impl RipeEnvelope {
    fn into_prefixes(self) -> Result<Vec<String>, ProviderError> {
        check_status(&self.status)?;
        Ok(collect_prefixes(self.data.prefixes.iter()))
    }
}

/// RIPEstat announced-prefixes API.
#[derive(Debug, Clone)]
pub struct RipeProvider {
    endpoint: String,
    fetcher: HttpFetcher,
}

impl RipeProvider {
    pub fn new(endpoint: impl Into<String>, fetcher: HttpFetcher) -> Self {
        Self {
            endpoint: endpoint.into(),
            fetcher,
        }
    }
}

#[async_trait]
impl AsnProvider for RipeProvider {
    fn name(&self) -> &str {
        "ripe"
    }

    async fn fetch_prefixes(&self, asn: &str) -> Result<Vec<String>, ProviderError> {
        let url = self.endpoint.replace(ASN_PLACEHOLDER, asn);
        let envelope: RipeEnvelope = self.fetcher.get_json(&url).await?;
        envelope.into_prefixes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bgpview_envelope() {
        let json = r#"{
            "status": "ok",
            "data": {
                "ipv4_prefixes": [{"prefix": "1.1.1.0/24"}, {"prefix": ""}],
                "ipv6_prefixes": [{"prefix": "2606:4700::/32", "name": "CLOUDFLARENET"}]
            }
        }"#;
        let envelope: BgpViewEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(
            envelope.into_prefixes().unwrap(),
            vec!["1.1.1.0/24", "2606:4700::/32"]
        );
    }

    #[test]
    fn test_ripe_envelope() {
        let json = r#"{
            "status": "ok",
            "data": {"prefixes": [{"prefix": "8.8.8.0/24", "timelines": []}]}
        }"#;
        let envelope: RipeEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.into_prefixes().unwrap(), vec!["8.8.8.0/24"]);
    }

    #[test]
    fn test_api_status_not_ok() {
        let envelope: RipeEnvelope =
            serde_json::from_str(r#"{"status":"error","data":{}}"#).unwrap();
        assert!(matches!(
            envelope.into_prefixes(),
            Err(ProviderError::ApiStatus(status)) if status == "error"
        ));
    }

    #[test]
    fn test_missing_data_is_empty() {
        let envelope: BgpViewEnvelope = serde_json::from_str(r#"{"status":"ok"}"#).unwrap();
        assert!(envelope.into_prefixes().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_url_is_request_error() {
        let fetcher = HttpFetcher::new(Duration::from_secs(1), 1024, "rulegate-test").unwrap();
        let provider = BgpViewProvider::new("not a url/{asn}", fetcher);
        let err = provider.fetch_prefixes("13335").await.unwrap_err();
        assert!(matches!(err, ProviderError::Request(_)));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_endpoint_templates() {
        assert_eq!(
            DEFAULT_RIPE_ENDPOINT.replace(ASN_PLACEHOLDER, "13335"),
            "https://stat.ripe.net/data/announced-prefixes/data.json?resource=AS13335"
        );
        assert_eq!(
            DEFAULT_BGPVIEW_ENDPOINT.replace(ASN_PLACEHOLDER, "13335"),
            "https://api.bgpview.io/asn/13335/prefixes"
        );
    }
}
