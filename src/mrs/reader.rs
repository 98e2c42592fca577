//! MRS container reader.

use ahash::AHashSet;

use super::cidr_set::IpCidrSet;
use super::domain_set::DomainSet;
use super::format::*;
use crate::behavior::Behavior;
use crate::error::FormatError;
use crate::rule::{DefaultRule, Rule};

/// Decoded payload of an MRS container.
#[derive(Debug, Clone)]
pub enum MrsPayload {
    Domain(DomainSet),
    IpCidr(IpCidrSet),
}

impl MrsPayload {
    pub fn behavior(&self) -> Behavior {
        match self {
            MrsPayload::Domain(_) => Behavior::Domain,
            MrsPayload::IpCidr(_) => Behavior::IpCidr,
        }
    }
}

/// Decompress and parse a container.
pub fn read_payload(bytes: &[u8]) -> Result<MrsPayload, FormatError> {
    if bytes.is_empty() {
        return Err(FormatError::Truncated { section: "magic" });
    }
    let mut reader = zstd::stream::read::Decoder::new(bytes).map_err(FormatError::Compression)?;

    let magic: [u8; 4] = read_array(&mut reader, "magic")?;
    if magic != MAGIC {
        return Err(FormatError::InvalidMagic { found: magic });
    }
    let behavior = behavior_from_byte(read_u8(&mut reader, "behavior")?)?;

    let reserved = read_i64(&mut reader, "reserved length")?;
    if reserved < 0 {
        return Err(FormatError::InvalidReservedLength(reserved));
    }
    skip(&mut reader, "reserved", reserved as u64)?;

    match behavior {
        Behavior::Domain => DomainSet::read_from(&mut reader).map(MrsPayload::Domain),
        _ => IpCidrSet::read_from(&mut reader).map(MrsPayload::IpCidr),
    }
}

/// Turn sorted domain-set keys into one rule.
///
/// An exact key whose `+.` twin exists is dropped, as is any key carrying
/// `+` or `*` outside the leading marker.
pub fn rule_from_domain_keys(mut keys: Vec<String>) -> DefaultRule {
    keys.sort();
    let present: AHashSet<&str> = keys.iter().map(String::as_str).collect();

    let mut rule = DefaultRule::new();
    for key in &keys {
        if let Some(suffix) = key.strip_prefix("+.") {
            if !suffix.is_empty() && !suffix.contains(['+', '*']) {
                rule.domain_suffix.push(suffix.to_string());
            }
        } else if key.contains(['+', '*']) {
            continue;
        } else if key.starts_with('.') {
            rule.domain_suffix.push(key.clone());
        } else if !present.contains(format!("+.{key}").as_str()) {
            rule.domain.push(key.clone());
        }
    }
    rule
}

/// Decode a container into rules: a single rule, or none when it holds nothing
/// representable.
pub fn read_rules(bytes: &[u8]) -> Result<Vec<Rule>, FormatError> {
    let rule = match read_payload(bytes)? {
        MrsPayload::Domain(set) => rule_from_domain_keys(set.keys()?),
        MrsPayload::IpCidr(set) => DefaultRule {
            ip_cidr: set.to_strings(),
            ..Default::default()
        },
    };
    if rule.is_empty() {
        Ok(Vec::new())
    } else {
        Ok(vec![Rule::Default(rule)])
    }
}

/// Summary of a container for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MrsSummary {
    pub behavior: Behavior,
    /// Domain-set keys or minimal CIDR prefixes
    pub entries: usize,
}

pub fn summarize(bytes: &[u8]) -> Result<MrsSummary, FormatError> {
    let payload = read_payload(bytes)?;
    let entries = match &payload {
        MrsPayload::Domain(set) => set.keys()?.len(),
        MrsPayload::IpCidr(set) => set.cidrs().len(),
    };
    Ok(MrsSummary {
        behavior: payload.behavior(),
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_exact_dropped_when_suffix_present() {
        let rule = rule_from_domain_keys(keys(&["example.com", "+.example.com", "other.com"]));
        assert_eq!(rule.domain, vec!["other.com"]);
        assert_eq!(rule.domain_suffix, vec!["example.com"]);
    }

    #[test]
    fn test_wildcards_dropped() {
        let rule = rule_from_domain_keys(keys(&["*.example.com", "a+b.com", "+.x.*.com", "ok.com"]));
        assert_eq!(rule.domain, vec!["ok.com"]);
        assert!(rule.domain_suffix.is_empty());
    }

    #[test]
    fn test_leading_dot_maps_to_suffix() {
        let rule = rule_from_domain_keys(keys(&[".example.com"]));
        assert_eq!(rule.domain_suffix, vec![".example.com"]);
        assert!(rule.domain.is_empty());
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(
            read_payload(&[]),
            Err(FormatError::Truncated { section: "magic" })
        ));
    }
}
