//! HTTP rule-set source with TTL and ETag revalidation.

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::time::{Duration, SystemTime};

use super::{FetchRequest, FetchResponse, Source};
use crate::{Error, Result};

/// Replaced by the rule-set name in the URL template.
pub const NAME_PLACEHOLDER: &str = "{name}";

/// Revalidation interval when none is configured.
pub const DEFAULT_TTL_SECS: u64 = 300;

/// Remote source settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// URL template, e.g. `https://example.com/rules/{name}.json`
    pub url: String,
    /// A copy younger than this is served without contacting upstream
    pub ttl_secs: u64,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: NAME_PLACEHOLDER.to_string(),
            ttl_secs: DEFAULT_TTL_SECS,
            timeout_secs: 30,
            user_agent: concat!("rulegate/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Fetches rule sets over HTTP(S) with conditional requests.
///
/// # Example
///
/// ```ignore
/// use rulegate::source::{FetchRequest, RemoteSource, Source, SourceConfig};
///
/// let source = RemoteSource::new(SourceConfig {
///     url: "https://example.com/rules/{name}.json".into(),
///     ..Default::default()
/// });
/// let path = source.path("geosite-cn");
/// let response = source.fetch(&path, &FetchRequest::default())?;
/// ```
pub struct RemoteSource {
    agent: ureq::Agent,
    url_template: String,
    ttl: Duration,
}

impl RemoteSource {
    pub fn new(config: SourceConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(&config.user_agent)
            .build();
        Self {
            agent,
            url_template: config.url,
            ttl: Duration::from_secs(config.ttl_secs),
        }
    }

    /// True if a copy fetched at `last_updated` is still within the TTL.
    fn is_fresh(&self, last_updated: SystemTime, now: SystemTime) -> bool {
        now.duration_since(last_updated)
            .map(|age| age < self.ttl)
            .unwrap_or(true)
    }

    fn read_body(response: ureq::Response) -> Result<Vec<u8>> {
        let mut raw = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut raw)
            .map_err(|e| Error::Fetch(format!("read HTTP response: {}", e)))?;
        decompress(raw)
    }
}

/// Check if data is gzip compressed.
fn is_gzip(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b
}

/// Decode a gzip body, passing anything else through.
fn decompress(raw: Vec<u8>) -> Result<Vec<u8>> {
    if !is_gzip(&raw) {
        return Ok(raw);
    }
    let mut data = Vec::new();
    GzDecoder::new(&raw[..])
        .read_to_end(&mut data)
        .map_err(|e| Error::Fetch(format!("gzip decompression failed: {}", e)))?;
    log::debug!(
        "Decompressed source: {} bytes (compressed: {} bytes)",
        data.len(),
        raw.len()
    );
    Ok(data)
}

impl Source for RemoteSource {
    fn path(&self, name: &str) -> String {
        self.url_template.replace(NAME_PLACEHOLDER, name)
    }

    fn fetch(&self, path: &str, request: &FetchRequest) -> Result<FetchResponse> {
        let now = SystemTime::now();
        if let Some(last_updated) = request.last_updated {
            if self.is_fresh(last_updated, now) {
                log::debug!("Source {} within TTL, skipping fetch", path);
                return Ok(FetchResponse::not_modified(last_updated));
            }
        }

        let mut call = self.agent.get(path);
        if let Some(ref etag) = request.etag {
            call = call.set("If-None-Match", etag);
        }

        let response = match call.call() {
            Ok(response) => response,
            Err(ureq::Error::Status(304, _)) => {
                log::debug!("Source {} not modified (304)", path);
                return Ok(FetchResponse::not_modified(now));
            }
            Err(ureq::Error::Status(code, response)) => {
                return Err(Error::Fetch(format!(
                    "unexpected HTTP response: {} {}",
                    code,
                    response.status_text()
                )));
            }
            Err(ureq::Error::Transport(t)) => {
                return Err(Error::Fetch(format!("exchange HTTP request: {}", t)));
            }
        };

        match response.status() {
            304 => {
                log::debug!("Source {} not modified (304)", path);
                Ok(FetchResponse::not_modified(now))
            }
            200 => {
                let etag = response.header("ETag").map(str::to_string);
                let content = Self::read_body(response)?;
                log::info!("Fetched source {}: {} bytes", path, content.len());
                Ok(FetchResponse {
                    content,
                    etag,
                    last_updated: now,
                    not_modified: false,
                })
            }
            code => Err(Error::Fetch(format!(
                "unexpected HTTP response: {} {}",
                code,
                response.status_text()
            ))),
        }
    }
}
