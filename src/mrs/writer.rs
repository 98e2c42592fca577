//! MRS container writer.

use log::debug;
use std::io::Write;

use super::cidr_set::IpCidrSet;
use super::domain_set::DomainSet;
use super::format::*;
use crate::behavior::Behavior;
use crate::rule::{DefaultRule, Rule};
use crate::{Error, Result};

/// Encodes destination-address rules into a compressed MRS container.
#[derive(Debug, Clone)]
pub struct MrsWriter {
    level: i32,
}

impl Default for MrsWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Domain-set key for an exact domain.
fn exact_key(domain: &str) -> Option<String> {
    let key = domain.trim().to_lowercase();
    (!key.is_empty()).then_some(key)
}

/// Domain-set key for a suffix. A leading dot is kept as-is.
fn suffix_key(suffix: &str) -> Option<String> {
    let suffix = suffix.trim().to_lowercase();
    if suffix.is_empty() || suffix == "." {
        None
    } else if suffix.starts_with('.') {
        Some(suffix)
    } else {
        Some(format!("+.{suffix}"))
    }
}

impl MrsWriter {
    /// Create a writer using the default compression level.
    pub fn new() -> Self {
        Self {
            level: COMPRESSION_LEVEL,
        }
    }

    /// Override the zstd compression level.
    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    /// Encode every destination-address rule in `rules`.
    ///
    /// Entries of all qualifying rules are merged into one set. Returns an
    /// empty vector when nothing qualifies.
    pub fn write(&self, behavior: Behavior, rules: &[Rule]) -> Result<Vec<u8>> {
        let behavior_byte =
            behavior_byte(behavior).ok_or_else(|| Error::UnsupportedBehavior {
                format: "mrs",
                behavior: behavior.to_string(),
            })?;

        let selected: Vec<&DefaultRule> = rules
            .iter()
            .filter_map(Rule::as_default)
            .filter(|rule| rule.is_destination_address_rule())
            .collect();
        debug!(
            "Encoding {} of {} rules as MRS {}",
            selected.len(),
            rules.len(),
            behavior
        );

        let mut payload = Vec::new();
        match behavior {
            Behavior::Domain => {
                let keys = selected.iter().flat_map(|rule| {
                    let exact = rule.domain.iter().filter_map(|d| exact_key(d));
                    let suffix = rule.domain_suffix.iter().filter_map(|s| suffix_key(s));
                    exact.chain(suffix)
                });
                match DomainSet::build(keys) {
                    Some(set) => set.write_to(&mut payload)?,
                    None => return Ok(Vec::new()),
                }
            }
            _ => {
                let mut set = IpCidrSet::new();
                for cidr in selected.iter().flat_map(|rule| rule.ip_cidr.iter()) {
                    set.insert_str(cidr);
                }
                if set.is_empty() {
                    return Ok(Vec::new());
                }
                set.write_to(&mut payload)?;
            }
        }

        let mut encoder = zstd::stream::write::Encoder::new(Vec::new(), self.level)?;
        encoder.write_all(&MAGIC)?;
        encoder.write_all(&[behavior_byte])?;
        // the reserved block is always empty
        write_i64(&mut encoder, 0)?;
        encoder.write_all(&payload)?;
        Ok(encoder.finish()?)
    }
}
