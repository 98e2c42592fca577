//! Flat condition rule.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::listable;

/// A rule made of independent, optional condition lists and flags.
///
/// An empty list or a `false` flag means the condition is not specified.
/// Fields this crate does not model are carried in `extra` unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefaultRule {
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "listable")]
    pub network: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "listable")]
    pub domain: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "listable")]
    pub domain_suffix: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "listable")]
    pub domain_keyword: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "listable")]
    pub domain_regex: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "listable")]
    pub source_ip_cidr: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "listable")]
    pub ip_cidr: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "listable")]
    pub ip_asn: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "listable")]
    pub source_ip_asn: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "listable")]
    pub source_port: Vec<u16>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "listable")]
    pub source_port_range: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "listable")]
    pub port: Vec<u16>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "listable")]
    pub port_range: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "listable")]
    pub process_name: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "listable")]
    pub process_path: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "listable")]
    pub package_name: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "listable")]
    pub network_type: Vec<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub network_is_expensive: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub network_is_constrained: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "listable")]
    pub wifi_ssid: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "listable")]
    pub wifi_bssid: Vec<String>,
    /// Cross rule-set references; only meaningful at top level.
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "listable")]
    pub rule_set: Vec<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub invert: bool,
    /// Pass-through fields.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Fields a destination-address rule may populate.
const DESTINATION_ADDRESS_FIELDS: [&str; 3] = ["domain", "domain_suffix", "ip_cidr"];

impl DefaultRule {
    /// Create an empty rule.
    pub fn new() -> Self {
        Self::default()
    }

    fn populated_fields(&self) -> [(&'static str, bool); 23] {
        [
            ("network", !self.network.is_empty()),
            ("domain", !self.domain.is_empty()),
            ("domain_suffix", !self.domain_suffix.is_empty()),
            ("domain_keyword", !self.domain_keyword.is_empty()),
            ("domain_regex", !self.domain_regex.is_empty()),
            ("source_ip_cidr", !self.source_ip_cidr.is_empty()),
            ("ip_cidr", !self.ip_cidr.is_empty()),
            ("ip_asn", !self.ip_asn.is_empty()),
            ("source_ip_asn", !self.source_ip_asn.is_empty()),
            ("source_port", !self.source_port.is_empty()),
            ("source_port_range", !self.source_port_range.is_empty()),
            ("port", !self.port.is_empty()),
            ("port_range", !self.port_range.is_empty()),
            ("process_name", !self.process_name.is_empty()),
            ("process_path", !self.process_path.is_empty()),
            ("package_name", !self.package_name.is_empty()),
            ("network_type", !self.network_type.is_empty()),
            ("network_is_expensive", self.network_is_expensive),
            ("network_is_constrained", self.network_is_constrained),
            ("wifi_ssid", !self.wifi_ssid.is_empty()),
            ("wifi_bssid", !self.wifi_bssid.is_empty()),
            ("rule_set", !self.rule_set.is_empty()),
            ("invert", self.invert),
        ]
    }

    /// True if no condition at all is specified.
    pub fn is_empty(&self) -> bool {
        self.extra.is_empty() && self.populated_fields().iter().all(|(_, set)| !set)
    }

    /// True if the only populated fields are domain, domain suffix and IP-CIDR.
    ///
    /// Only these rules are representable in the MRS trie container.
    pub fn is_destination_address_rule(&self) -> bool {
        self.extra.is_empty()
            && self
                .populated_fields()
                .iter()
                .all(|(name, set)| !set || DESTINATION_ADDRESS_FIELDS.contains(name))
    }

    /// True if the rule carries an IP-ASN condition on either axis.
    pub fn has_ip_asn(&self) -> bool {
        !self.ip_asn.is_empty() || !self.source_ip_asn.is_empty()
    }

    /// True if the rule uses a network-type, expensive or constrained condition.
    pub fn uses_network_conditions(&self) -> bool {
        !self.network_type.is_empty() || self.network_is_expensive || self.network_is_constrained
    }
}
