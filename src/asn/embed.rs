//! Rewrite IP-ASN conditions into IP-CIDR conditions.

use log::debug;

use super::resolver::{AsnResolver, AsnResolverBuilder};
use crate::error::AsnError;
use crate::rule::{default_rules_mut, Rule};

/// Replace every `ip_asn` / `source_ip_asn` list in the tree with the
/// prefixes it resolves to, appended to `ip_cidr` / `source_ip_cidr`.
///
/// Any resolution failure fails the whole call; rules already rewritten
/// stay rewritten.
pub async fn embed_ip_asn(rules: &mut [Rule], resolver: &AsnResolver) -> Result<(), AsnError> {
    for rule in default_rules_mut(rules) {
        if !rule.ip_asn.is_empty() {
            let prefixes = resolver.resolve_many(&rule.ip_asn).await?;
            debug!(
                "Embedded {} prefixes for ip_asn {:?}",
                prefixes.len(),
                rule.ip_asn
            );
            rule.ip_cidr.extend(prefixes);
            rule.ip_asn.clear();
        }
        if !rule.source_ip_asn.is_empty() {
            let prefixes = resolver.resolve_many(&rule.source_ip_asn).await?;
            debug!(
                "Embedded {} prefixes for source_ip_asn {:?}",
                prefixes.len(),
                rule.source_ip_asn
            );
            rule.source_ip_cidr.extend(prefixes);
            rule.source_ip_asn.clear();
        }
    }
    Ok(())
}

/// Embed ASN conditions using a resolver built for this call only.
///
/// Returns immediately when no rule carries an ASN condition.
pub async fn convert_ip_asn_to_ip_cidr(
    rules: &mut [Rule],
    builder: &AsnResolverBuilder,
) -> Result<(), AsnError> {
    if !rules.iter().any(Rule::contains_ip_asn) {
        return Ok(());
    }
    let resolver = builder.build();
    embed_ip_asn(rules, &resolver).await
}
