//! Comprehensive tests for the MRS container.
//!
//! These tests cover the full encode-decode path for both behaviors, the
//! domain-key rules, and the container-level validation errors.

use std::io::Write;

use super::format::*;
use super::{read_payload, read_rules, summarize, DomainSet, MrsPayload, MrsWriter};
use crate::behavior::Behavior;
use crate::error::FormatError;
use crate::rule::{DefaultRule, LogicalMode, LogicalRule, Rule};

fn domains(exact: &[&str], suffix: &[&str]) -> Rule {
    Rule::Default(DefaultRule {
        domain: exact.iter().map(|s| s.to_string()).collect(),
        domain_suffix: suffix.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    })
}

fn cidrs(list: &[&str]) -> Rule {
    Rule::Default(DefaultRule {
        ip_cidr: list.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    })
}

/// Helper to encode with a fast level and decode again
fn encode_decode(behavior: Behavior, rules: &[Rule]) -> Vec<Rule> {
    let bytes = MrsWriter::new()
        .with_level(3)
        .write(behavior, rules)
        .expect("Failed to write container");
    read_rules(&bytes).expect("Failed to read container")
}

/// Compress a hand-built plain container
fn compress(plain: &[u8]) -> Vec<u8> {
    let mut encoder = zstd::stream::write::Encoder::new(Vec::new(), 1).unwrap();
    encoder.write_all(plain).unwrap();
    encoder.finish().unwrap()
}

fn single(rules: &[Rule]) -> &DefaultRule {
    assert_eq!(rules.len(), 1);
    rules[0].as_default().unwrap()
}

// ============================================================================
// Domain Behavior Tests
// ============================================================================

#[test]
fn test_domain_round_trip() {
    let rules = vec![domains(&["example.com", "test.org"], &["google.com"])];
    let decoded = encode_decode(Behavior::Domain, &rules);
    let rule = single(&decoded);

    assert_eq!(rule.domain, vec!["example.com", "test.org"]);
    assert_eq!(rule.domain_suffix, vec!["google.com"]);
}

#[test]
fn test_domain_keys_normalized() {
    let rules = vec![domains(&["  Example.COM "], &["Google.Com"])];
    let decoded = encode_decode(Behavior::Domain, &rules);
    let rule = single(&decoded);

    assert_eq!(rule.domain, vec!["example.com"]);
    assert_eq!(rule.domain_suffix, vec!["google.com"]);
}

#[test]
fn test_suffix_subsumes_exact() {
    let rules = vec![domains(&["example.com"], &["example.com"])];
    let decoded = encode_decode(Behavior::Domain, &rules);
    let rule = single(&decoded);

    assert!(rule.domain.is_empty());
    assert_eq!(rule.domain_suffix, vec!["example.com"]);
}

#[test]
fn test_leading_dot_suffix_round_trip() {
    let rules = vec![domains(&[], &[".example.com"])];
    let decoded = encode_decode(Behavior::Domain, &rules);

    assert_eq!(single(&decoded).domain_suffix, vec![".example.com"]);
}

#[test]
fn test_wildcard_domains_dropped() {
    let rules = vec![domains(&["*.example.com", "fine.com"], &[])];
    let decoded = encode_decode(Behavior::Domain, &rules);

    assert_eq!(single(&decoded).domain, vec!["fine.com"]);
}

#[test]
fn test_domain_union_across_rules() {
    let rules = vec![
        domains(&["a.com"], &[]),
        domains(&[], &["b.com"]),
        domains(&["c.com"], &[]),
    ];
    let decoded = encode_decode(Behavior::Domain, &rules);
    let rule = single(&decoded);

    assert_eq!(rule.domain, vec!["a.com", "c.com"]);
    assert_eq!(rule.domain_suffix, vec!["b.com"]);
}

#[test]
fn test_non_destination_rules_excluded() {
    let rules = vec![
        domains(&["kept.com"], &[]),
        Rule::Default(DefaultRule {
            domain: vec!["dropped.com".into()],
            process_name: vec!["curl".into()],
            ..Default::default()
        }),
        Rule::Logical(LogicalRule::new(
            LogicalMode::Or,
            vec![domains(&["nested.com"], &[])],
        )),
    ];
    let decoded = encode_decode(Behavior::Domain, &rules);

    assert_eq!(single(&decoded).domain, vec!["kept.com"]);
}

#[test]
fn test_domain_encode_idempotent() {
    let rules = vec![domains(&["x.com", "y.com"], &["x.com", "z.net"])];
    let writer = MrsWriter::new().with_level(3);

    let first = writer.write(Behavior::Domain, &rules).unwrap();
    let decoded = read_rules(&first).unwrap();
    let second = writer.write(Behavior::Domain, &decoded).unwrap();

    assert_eq!(read_rules(&second).unwrap(), decoded);
}

#[test]
fn test_many_domains() {
    let exact: Vec<String> = (0..500).map(|i| format!("host{i}.example.net")).collect();
    let rules = vec![Rule::Default(DefaultRule {
        domain: exact.clone(),
        ..Default::default()
    })];
    let decoded = encode_decode(Behavior::Domain, &rules);

    let mut expected = exact;
    expected.sort();
    assert_eq!(single(&decoded).domain, expected);
}

// ============================================================================
// IP-CIDR Behavior Tests
// ============================================================================

#[test]
fn test_cidr_round_trip_minimal() {
    let rules = vec![cidrs(&[
        "10.0.0.0/8",
        "10.1.0.0/16",
        "192.168.0.0/25",
        "192.168.0.128/25",
        "2001:db8::/32",
    ])];
    let decoded = encode_decode(Behavior::IpCidr, &rules);

    assert_eq!(
        single(&decoded).ip_cidr,
        vec!["10.0.0.0/8", "192.168.0.0/24", "2001:db8::/32"]
    );
}

#[test]
fn test_cidr_union_skips_invalid() {
    let rules = vec![cidrs(&["1.1.1.1", "garbage"]), cidrs(&["8.8.8.0/24"])];
    let decoded = encode_decode(Behavior::IpCidr, &rules);

    assert_eq!(single(&decoded).ip_cidr, vec!["1.1.1.1/32", "8.8.8.0/24"]);
}

#[test]
fn test_cidr_encode_idempotent() {
    let rules = vec![cidrs(&["172.16.0.0/12", "fd00::/8", "::ffff:1.2.3.0/120"])];
    let writer = MrsWriter::new().with_level(3);

    let first = writer.write(Behavior::IpCidr, &rules).unwrap();
    let decoded = read_rules(&first).unwrap();
    let second = writer.write(Behavior::IpCidr, &decoded).unwrap();

    assert_eq!(read_rules(&second).unwrap(), decoded);
}

#[test]
fn test_cidr_v6_over_mapped_block_gains_no_ipv4() {
    let decoded = encode_decode(Behavior::IpCidr, &[cidrs(&["::/80"])]);
    let ip_cidr = &single(&decoded).ip_cidr;

    assert!(!ip_cidr.contains(&"0.0.0.0/0".to_string()));
    assert!(ip_cidr.iter().all(|cidr| cidr.contains(':')));
    assert_eq!(encode_decode(Behavior::IpCidr, &decoded), decoded);
}

#[test]
fn test_empty_cidr_set_encodes_empty() {
    let bytes = MrsWriter::new()
        .write(Behavior::IpCidr, &[cidrs(&["bogus"])])
        .unwrap();
    assert!(bytes.is_empty());
}

// ============================================================================
// Container Validation Tests
// ============================================================================

#[test]
fn test_invalid_magic() {
    let bytes = compress(b"MRS\x02\x00\x00\x00\x00\x00\x00\x00\x00\x00");
    assert!(matches!(
        read_payload(&bytes),
        Err(FormatError::InvalidMagic { found }) if &found == b"MRS\x02"
    ));
}

#[test]
fn test_invalid_behavior() {
    let mut plain = MAGIC.to_vec();
    plain.push(7);
    plain.extend_from_slice(&0i64.to_be_bytes());
    assert!(matches!(
        read_payload(&compress(&plain)),
        Err(FormatError::InvalidBehavior(7))
    ));
}

#[test]
fn test_negative_reserved_length() {
    let mut plain = MAGIC.to_vec();
    plain.push(BEHAVIOR_DOMAIN);
    plain.extend_from_slice(&(-5i64).to_be_bytes());
    assert!(matches!(
        read_payload(&compress(&plain)),
        Err(FormatError::InvalidReservedLength(-5))
    ));
}

#[test]
fn test_reserved_bytes_skipped() {
    let set = DomainSet::build(["example.com"]).unwrap();
    let mut plain = MAGIC.to_vec();
    plain.push(BEHAVIOR_DOMAIN);
    plain.extend_from_slice(&3i64.to_be_bytes());
    plain.extend_from_slice(b"xyz");
    set.write_to(&mut plain).unwrap();

    let rules = read_rules(&compress(&plain)).unwrap();
    assert_eq!(single(&rules).domain, vec!["example.com"]);
}

#[test]
fn test_reserved_truncated() {
    let mut plain = MAGIC.to_vec();
    plain.push(BEHAVIOR_IPCIDR);
    plain.extend_from_slice(&100i64.to_be_bytes());
    plain.extend_from_slice(&[0u8; 10]);
    assert!(matches!(
        read_payload(&compress(&plain)),
        Err(FormatError::Truncated { section: "reserved" })
    ));
}

#[test]
fn test_truncated_header() {
    assert!(matches!(
        read_payload(&compress(b"MR")),
        Err(FormatError::Truncated { section: "magic" })
    ));
}

#[test]
fn test_not_zstd() {
    assert!(read_payload(b"definitely not zstd").is_err());
}

#[test]
fn test_unknown_payload_version() {
    let mut plain = MAGIC.to_vec();
    plain.push(BEHAVIOR_IPCIDR);
    plain.extend_from_slice(&0i64.to_be_bytes());
    plain.push(9);
    assert!(matches!(
        read_payload(&compress(&plain)),
        Err(FormatError::UnsupportedPayloadVersion { version: 9, .. })
    ));
}

#[test]
fn test_summarize() {
    let bytes = MrsWriter::new()
        .with_level(3)
        .write(Behavior::IpCidr, &[cidrs(&["10.0.0.0/8", "2001:db8::/32"])])
        .unwrap();
    let summary = summarize(&bytes).unwrap();
    assert_eq!(summary.behavior, Behavior::IpCidr);
    assert_eq!(summary.entries, 2);

    assert!(matches!(
        read_payload(&bytes).unwrap(),
        MrsPayload::IpCidr(_)
    ));
}
