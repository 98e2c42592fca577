//! ASN to IP prefix resolution.
//!
//! [`AsnResolver`] walks a chain of [`AsnProvider`]s, caches each outcome for
//! its own lifetime, and fans batches out over a bounded task group.
//! [`embed_ip_asn`] uses it to turn ASN rule conditions into CIDR conditions.

mod embed;
mod provider;
mod resolver;

pub use embed::{convert_ip_asn_to_ip_cidr, embed_ip_asn};
pub use provider::{
    AsnProvider, BgpViewProvider, HttpFetcher, RipeProvider, ASN_PLACEHOLDER,
    DEFAULT_BGPVIEW_ENDPOINT, DEFAULT_RIPE_ENDPOINT,
};
pub use resolver::{
    normalize_asn, AsnResolver, AsnResolverBuilder, ResolverConfig, DEFAULT_CONCURRENCY,
};
