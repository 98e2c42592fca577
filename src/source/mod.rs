//! Upstream rule-set sources.
//!
//! A [`Source`] turns a rule-set name into a fetchable path and retrieves its
//! content conditionally: callers pass the ETag and timestamp of the copy they
//! already hold and get back either new content or `not_modified`.

mod remote;

pub use remote::{RemoteSource, SourceConfig, DEFAULT_TTL_SECS, NAME_PLACEHOLDER};

use std::time::SystemTime;

use crate::Result;

/// Validators of a previously fetched copy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchRequest {
    pub etag: Option<String>,
    pub last_updated: Option<SystemTime>,
}

/// Outcome of a conditional fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    /// Empty when `not_modified` is set
    pub content: Vec<u8>,
    pub etag: Option<String>,
    pub last_updated: SystemTime,
    pub not_modified: bool,
}

impl FetchResponse {
    pub fn not_modified(last_updated: SystemTime) -> Self {
        Self {
            content: Vec::new(),
            etag: None,
            last_updated,
            not_modified: true,
        }
    }
}

/// A blocking upstream of rule-set documents.
pub trait Source: Send + Sync {
    /// Fetchable path for a rule-set name.
    fn path(&self, name: &str) -> String;

    fn fetch(&self, path: &str, request: &FetchRequest) -> Result<FetchResponse>;
}
