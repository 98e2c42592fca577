//! Rulegate - a rule-set format gateway for proxy routing engines.
//!
//! Rule sets are fetched from an upstream source, decoded into a canonical
//! [`Rule`] tree and re-encoded in the format and version the requesting
//! client understands.
//!
//! # Features
//!
//! - **Formats**: JSON source, MRS (zstd-wrapped succinct tries), Clash
//!   rule-provider payloads and the host engine's native binary format
//! - **ASN embedding**: `ip_asn` conditions resolved to CIDRs through
//!   BGPView and RIPEstat with a bounded fan-out
//! - **Downgrade**: rule sets rewritten for older sing-box clients
//! - **Revalidation**: ETag and TTL aware fetching with an artifact cache
//!
//! # Quick Start
//!
//! ```ignore
//! use rulegate::{ConvertOptions, Convertors, Metadata};
//!
//! let convertors = Convertors::with_defaults(None);
//! let options = ConvertOptions::new(Metadata::detect("sing-box 1.10.3"));
//! let mrs = convertors.convert(source_json, "source", "mrs", &options).await?;
//! ```
//!
//! # Serving
//!
//! [`ConversionService`] combines a [`Source`](source::Source), a
//! [`Cache`](cache::Cache) and the convertor registry:
//!
//! ```ignore
//! use rulegate::service::{ConversionService, ServeRequest};
//!
//! let request = ServeRequest::new("geosite-cn", "source", "mrs")
//!     .with_metadata(Metadata::detect(user_agent));
//! let response = service.serve(&request).await?;
//! ```

mod error;

pub mod adapter;
pub mod asn;
pub mod behavior;
pub mod cache;
pub mod config;
pub mod convertor;
pub mod downgrade;
pub mod metadata;
pub mod mrs;
pub mod rule;
pub mod service;
pub mod source;
pub mod version;

// Re-export core types
pub use error::{AsnError, Error, FormatError, ProviderError, Result};
pub use rule::{DefaultRule, LogicalMode, LogicalRule, Rule};

pub use behavior::Behavior;
pub use config::GatewayConfig;
pub use convertor::{ConvertOptions, Convertor, Convertors};
pub use downgrade::{downgrade, PlainRuleSet, RuleSetVersion};
pub use metadata::{Metadata, Platform, System};
pub use service::{ConversionService, ServeRequest, ServeResponse};
pub use version::Version;
