//! MRS trie container for domain and IP-CIDR rule sets.
//!
//! The whole container is one zstd stream. Integers are big-endian.
//!
//! # Container Structure
//!
//! ```text
//! +---------------------------+
//! | MAGIC      "MRS" 0x01     |  4 bytes
//! +---------------------------+
//! | BEHAVIOR   0=domain 1=ip  |  1 byte
//! +---------------------------+
//! | RESERVED LENGTH (i64)     |  8 bytes, written as 0
//! +---------------------------+
//! | RESERVED                  |  skipped on read
//! +---------------------------+
//! | PAYLOAD                   |  domain set or CIDR set
//! +---------------------------+
//! ```
//!
//! Domain set payload:
//!
//! ```text
//! [u8 version=1][i64 n][n x u64 leaves][i64 m][m x u64 label bitmap][i64 k][k labels]
//! ```
//!
//! CIDR set payload:
//!
//! ```text
//! [u8 version=1][i64 n][n x (16-byte from, 16-byte to)]
//! ```

mod cidr_set;
mod domain_set;
pub mod format;
mod reader;
mod writer;

#[cfg(test)]
mod tests;

pub use cidr_set::IpCidrSet;
pub use domain_set::DomainSet;
pub use reader::{read_payload, read_rules, rule_from_domain_keys, summarize, MrsPayload, MrsSummary};
pub use writer::MrsWriter;
