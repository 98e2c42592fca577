//! Fetch, convert and cache rule sets on behalf of clients.

use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

use crate::adapter::RuleSetEmbedder;
use crate::asn::AsnResolverBuilder;
use crate::behavior::Behavior;
use crate::cache::{Cache, CacheConfig, SavedArtifact};
use crate::convertor::{ConvertOptions, Convertors};
use crate::metadata::Metadata;
use crate::source::{FetchRequest, Source};
use crate::{Error, Result};

/// A client request for one rule set in one format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeRequest {
    /// Rule-set name, expanded into a source path
    pub name: String,
    /// Upstream format id
    pub from: String,
    /// Requested format id
    pub to: String,
    pub behavior: Option<Behavior>,
    pub metadata: Metadata,
}

impl ServeRequest {
    pub fn new(name: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            from: from.into(),
            to: to.into(),
            behavior: None,
            metadata: Metadata::default(),
        }
    }

    pub fn with_behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = Some(behavior);
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Converted content ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeResponse {
    pub content: Vec<u8>,
    pub content_type: &'static str,
    /// True if served from the cache without converting
    pub cached: bool,
}

/// Cache key for a converted artifact.
///
/// Everything that changes the output bytes goes into the digest.
pub fn cache_key(path: &str, request: &ServeRequest) -> String {
    let behavior = request.behavior.map(|b| b.as_str()).unwrap_or_default();
    let version = request
        .metadata
        .version
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();

    let parts: [&str; 6] = [
        path,
        &request.from,
        &request.to,
        behavior,
        request.metadata.platform.as_str(),
        &version,
    ];
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

/// Serves rule sets from a [`Source`] through a [`Cache`].
pub struct ConversionService {
    source: Arc<dyn Source>,
    cache: Arc<dyn Cache>,
    convertors: Convertors,
    cache_ttl: Duration,
    asn: Option<AsnResolverBuilder>,
    embedder: Option<Arc<dyn RuleSetEmbedder>>,
}

impl ConversionService {
    pub fn new(source: Arc<dyn Source>, cache: Arc<dyn Cache>, convertors: Convertors) -> Self {
        Self {
            source,
            cache,
            convertors,
            cache_ttl: CacheConfig::default().ttl(),
            asn: None,
            embedder: None,
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
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

    fn options(&self, request: &ServeRequest) -> ConvertOptions {
        ConvertOptions {
            metadata: request.metadata.clone(),
            behavior: request.behavior,
            asn: self.asn.clone(),
            embedder: self.embedder.clone(),
        }
    }

    fn load_cached(&self, key: &str) -> Result<Option<SavedArtifact>> {
        let Some(bytes) = self.cache.load(key)? else {
            return Ok(None);
        };
        match SavedArtifact::from_bytes(&bytes) {
            Ok(artifact) => Ok(Some(artifact)),
            Err(e) => {
                log::warn!("Discarding unreadable cache entry {}: {}", key, e);
                Ok(None)
            }
        }
    }

    /// Serve one request, converting only when upstream changed.
    pub async fn serve(&self, request: &ServeRequest) -> Result<ServeResponse> {
        let options = self.options(request);
        let encoder = self.convertors.get(&request.to)?;
        let content_type = encoder.content_type(&options);

        let path = self.source.path(&request.name);
        let key = cache_key(&path, request);
        let cached = self.load_cached(&key)?;

        let fetch_request = FetchRequest {
            etag: cached.as_ref().and_then(|a| a.etag.clone()),
            last_updated: cached.as_ref().map(|a| a.last_updated),
        };
        let source = Arc::clone(&self.source);
        let fetch_path = path.clone();
        let response =
            tokio::task::spawn_blocking(move || source.fetch(&fetch_path, &fetch_request))
                .await
                .map_err(|e| Error::Fetch(format!("fetch task failed: {}", e)))??;

        if response.not_modified {
            let Some(mut artifact) = cached else {
                return Err(Error::Fetch(format!(
                    "{} reported not modified without a cached copy",
                    path
                )));
            };
            if artifact.last_updated != response.last_updated {
                artifact.last_updated = response.last_updated;
                self.cache.save(&key, artifact.to_bytes(), self.cache_ttl)?;
            }
            log::debug!("Serving cached {} as {}", request.name, request.to);
            return Ok(ServeResponse {
                content: artifact.content,
                content_type,
                cached: true,
            });
        }

        let content = self
            .convertors
            .convert(&response.content, &request.from, &request.to, &options)
            .await?;
        let artifact = SavedArtifact {
            content,
            etag: response.etag,
            last_updated: response.last_updated,
        };
        self.cache.save(&key, artifact.to_bytes(), self.cache_ttl)?;

        Ok(ServeResponse {
            content: artifact.content,
            content_type,
            cached: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::source::FetchResponse;
    use crate::version::Version;
    use parking_lot::Mutex;
    use std::time::SystemTime;

    const SOURCE: &[u8] = br#"{"version":3,"rules":[{"domain":"a.com"}]}"#;

    /// Serves a fixed document and honours ETags.
    struct FixedSource {
        etag: &'static str,
        requests: Mutex<Vec<FetchRequest>>,
    }

    impl FixedSource {
        fn new(etag: &'static str) -> Arc<Self> {
            Arc::new(Self {
                etag,
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    impl Source for FixedSource {
        fn path(&self, name: &str) -> String {
            format!("mem://{name}")
        }

        fn fetch(&self, _path: &str, request: &FetchRequest) -> Result<FetchResponse> {
            self.requests.lock().push(request.clone());
            if request.etag.as_deref() == Some(self.etag) {
                return Ok(FetchResponse::not_modified(SystemTime::now()));
            }
            Ok(FetchResponse {
                content: SOURCE.to_vec(),
                etag: Some(self.etag.to_string()),
                last_updated: SystemTime::now(),
                not_modified: false,
            })
        }
    }

    fn service(source: Arc<FixedSource>) -> ConversionService {
        ConversionService::new(
            source,
            Arc::new(MemoryCache::new(16)),
            Convertors::with_defaults(None),
        )
    }

    #[tokio::test]
    async fn test_serve_then_revalidate() {
        let source = FixedSource::new("\"v1\"");
        let service = service(Arc::clone(&source));
        let request = ServeRequest::new("geosite", "source", "clash");

        let first = service.serve(&request).await.unwrap();
        assert!(!first.cached);
        assert_eq!(first.content_type, "text/yaml");

        let second = service.serve(&request).await.unwrap();
        assert!(second.cached);
        assert_eq!(second.content, first.content);

        let requests = source.requests.lock();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], FetchRequest::default());
        assert_eq!(requests[1].etag.as_deref(), Some("\"v1\""));
    }

    #[tokio::test]
    async fn test_unknown_target_format() {
        let service = service(FixedSource::new("\"v1\""));
        let result = service
            .serve(&ServeRequest::new("geosite", "source", "srs2"))
            .await;
        assert!(matches!(result, Err(Error::UnknownFormat(_))));
    }

    #[test]
    fn test_cache_key_varies_by_client() {
        let request = ServeRequest::new("geosite", "source", "source");
        let old = request
            .clone()
            .with_metadata(Metadata::sing_box(Some(Version::new(1, 9, 0))));
        let new = request
            .clone()
            .with_metadata(Metadata::sing_box(Some(Version::new(1, 11, 0))));

        let base = cache_key("mem://geosite", &request);
        assert_eq!(base.len(), 64);
        assert_eq!(base, cache_key("mem://geosite", &request));
        assert_ne!(base, cache_key("mem://geosite", &old));
        assert_ne!(cache_key("mem://geosite", &old), cache_key("mem://geosite", &new));
        assert_ne!(
            base,
            cache_key("mem://geosite", &request.clone().with_behavior(Behavior::Domain))
        );
    }
}
