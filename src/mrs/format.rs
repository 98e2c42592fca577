//! MRS container constants and big-endian primitives.

use std::io::{self, Read, Write};

use crate::behavior::Behavior;
use crate::error::FormatError;

/// Magic bytes opening every decompressed container.
pub const MAGIC: [u8; 4] = *b"MRS\x01";

/// Behavior byte for a domain-set payload.
pub const BEHAVIOR_DOMAIN: u8 = 0;

/// Behavior byte for a CIDR-set payload.
pub const BEHAVIOR_IPCIDR: u8 = 1;

/// Version byte at the start of both payload kinds.
pub const PAYLOAD_VERSION: u8 = 1;

/// Zstandard level used when encoding.
pub const COMPRESSION_LEVEL: i32 = 19;

/// Map a behavior to its header byte. Classical has none.
pub fn behavior_byte(behavior: Behavior) -> Option<u8> {
    match behavior {
        Behavior::Domain => Some(BEHAVIOR_DOMAIN),
        Behavior::IpCidr => Some(BEHAVIOR_IPCIDR),
        Behavior::Classical => None,
    }
}

/// Map a header byte back to a behavior.
pub fn behavior_from_byte(byte: u8) -> Result<Behavior, FormatError> {
    match byte {
        BEHAVIOR_DOMAIN => Ok(Behavior::Domain),
        BEHAVIOR_IPCIDR => Ok(Behavior::IpCidr),
        other => Err(FormatError::InvalidBehavior(other)),
    }
}

pub(crate) fn read_array<R: Read, const N: usize>(
    reader: &mut R,
    section: &'static str,
) -> Result<[u8; N], FormatError> {
    let mut buf = [0u8; N];
    reader
        .read_exact(&mut buf)
        .map_err(|e| FormatError::from_read(section, e))?;
    Ok(buf)
}

pub(crate) fn read_u8<R: Read>(reader: &mut R, section: &'static str) -> Result<u8, FormatError> {
    let [byte] = read_array(reader, section)?;
    Ok(byte)
}

pub(crate) fn read_i64<R: Read>(reader: &mut R, section: &'static str) -> Result<i64, FormatError> {
    read_array(reader, section).map(i64::from_be_bytes)
}

/// Read an `i64` element count.
pub(crate) fn read_count<R: Read>(
    reader: &mut R,
    section: &'static str,
) -> Result<usize, FormatError> {
    let count = read_i64(reader, section)?;
    if count < 0 {
        return Err(FormatError::corrupt(
            section,
            format!("negative length {count}"),
        ));
    }
    usize::try_from(count)
        .map_err(|_| FormatError::corrupt(section, format!("oversized length {count}")))
}

/// Read exactly `len` bytes without trusting `len` for preallocation.
pub(crate) fn read_bytes<R: Read>(
    reader: &mut R,
    section: &'static str,
    len: usize,
) -> Result<Vec<u8>, FormatError> {
    let mut buf = Vec::new();
    reader
        .take(len as u64)
        .read_to_end(&mut buf)
        .map_err(|e| FormatError::from_read(section, e))?;
    if buf.len() < len {
        return Err(FormatError::Truncated { section });
    }
    Ok(buf)
}

/// Read a count-prefixed run of big-endian `u64` words.
pub(crate) fn read_words<R: Read>(
    reader: &mut R,
    section: &'static str,
) -> Result<Vec<u64>, FormatError> {
    let count = read_count(reader, section)?;
    let len = count
        .checked_mul(8)
        .ok_or_else(|| FormatError::corrupt(section, format!("oversized length {count}")))?;
    let bytes = read_bytes(reader, section, len)?;
    Ok(bytes
        .chunks_exact(8)
        .map(|chunk| {
            let mut word = [0u8; 8];
            word.copy_from_slice(chunk);
            u64::from_be_bytes(word)
        })
        .collect())
}

/// Discard `len` bytes.
pub(crate) fn skip<R: Read>(
    reader: &mut R,
    section: &'static str,
    len: u64,
) -> Result<(), FormatError> {
    let skipped = io::copy(&mut reader.take(len), &mut io::sink())
        .map_err(|e| FormatError::from_read(section, e))?;
    if skipped < len {
        return Err(FormatError::Truncated { section });
    }
    Ok(())
}

pub(crate) fn write_i64<W: Write>(writer: &mut W, value: i64) -> io::Result<()> {
    writer.write_all(&value.to_be_bytes())
}

pub(crate) fn write_words<W: Write>(writer: &mut W, words: &[u64]) -> io::Result<()> {
    write_i64(writer, words.len() as i64)?;
    for word in words {
        writer.write_all(&word.to_be_bytes())?;
    }
    Ok(())
}
