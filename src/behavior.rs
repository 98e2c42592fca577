//! Rule-set behavior tag.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// What kind of entries a flat rule-set container holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Behavior {
    /// Exact domains and domain suffixes
    Domain,
    /// IP-CIDR prefixes
    #[serde(alias = "ip-cidr", alias = "ip_cidr")]
    IpCidr,
    /// Arbitrary rules, one per line
    Classical,
}

impl Behavior {
    /// Parse a behavior name, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "domain" => Some(Behavior::Domain),
            "ipcidr" | "ip-cidr" | "ip_cidr" => Some(Behavior::IpCidr),
            "classical" => Some(Behavior::Classical),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Behavior::Domain => "domain",
            Behavior::IpCidr => "ipcidr",
            Behavior::Classical => "classical",
        }
    }
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Behavior {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Behavior::parse(s).ok_or_else(|| Error::Config(format!("unknown behavior: {s}")))
    }
}
