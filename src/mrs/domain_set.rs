//! Succinct (LOUDS) trie over byte-reversed domain keys.
//!
//! Nodes are numbered breadth-first. In `label_bitmap` each node owns a block
//! of 0-bits, one per child, closed by a single 1-bit. The child reached
//! through the j-th 0-bit overall is node j+1, and its edge label is
//! `labels[j]`. Bit i of `leaves` marks node i as the end of a key.

use std::io::{self, Read, Write};

use super::format::{self, PAYLOAD_VERSION};
use crate::error::FormatError;

const SECTION: &str = "domain set";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainSet {
    leaves: Vec<u64>,
    label_bitmap: Vec<u64>,
    labels: Vec<u8>,
}

fn set_bit(bitmap: &mut Vec<u64>, index: usize, on: bool) {
    let word = index >> 6;
    if bitmap.len() <= word {
        bitmap.resize(word + 1, 0);
    }
    if on {
        bitmap[word] |= 1 << (index & 63);
    }
}

fn get_bit(bitmap: &[u64], index: usize) -> Option<bool> {
    bitmap
        .get(index >> 6)
        .map(|word| word & (1 << (index & 63)) != 0)
}

impl DomainSet {
    /// Build a set from keys. Empty keys are ignored.
    ///
    /// Returns `None` when no key remains, since an empty set is never written.
    pub fn build<I, S>(keys: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keys: Vec<Vec<u8>> = keys
            .into_iter()
            .map(|key| key.as_ref().bytes().rev().collect::<Vec<u8>>())
            .filter(|key| !key.is_empty())
            .collect();
        if keys.is_empty() {
            return None;
        }
        // Shared prefixes must be contiguous, shorter keys first.
        keys.sort_unstable();
        keys.dedup();

        let mut set = DomainSet::default();
        let mut bit = 0;
        // (first key, end key, column) spans, one per node in BFS order.
        let mut queue = vec![(0usize, keys.len(), 0usize)];
        let mut node = 0;
        while node < queue.len() {
            let (mut start, end, column) = queue[node];
            if keys[start].len() == column {
                start += 1;
                set_bit(&mut set.leaves, node, true);
            }

            let mut cursor = start;
            while cursor < end {
                let from = cursor;
                let label = keys[from][column];
                while cursor < end && keys[cursor][column] == label {
                    cursor += 1;
                }
                queue.push((from, cursor, column + 1));
                set.labels.push(label);
                set_bit(&mut set.label_bitmap, bit, false);
                bit += 1;
            }
            set_bit(&mut set.label_bitmap, bit, true);
            bit += 1;
            node += 1;
        }

        Some(set)
    }

    /// Number of trie edges.
    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    /// Start position of every node's block in the label bitmap.
    fn block_starts(&self) -> Result<Vec<usize>, FormatError> {
        let nodes = self.labels.len() + 1;
        let mut starts = Vec::with_capacity(nodes);
        starts.push(0);
        let mut zeros = 0;
        let mut position = 0;
        let mut closed = 0;
        while closed < nodes {
            match get_bit(&self.label_bitmap, position) {
                None => return Err(FormatError::corrupt(SECTION, "label bitmap exhausted")),
                Some(true) => {
                    closed += 1;
                    if closed < nodes {
                        starts.push(position + 1);
                    }
                }
                Some(false) => {
                    zeros += 1;
                    if zeros > self.labels.len() {
                        return Err(FormatError::corrupt(SECTION, "label count mismatch"));
                    }
                }
            }
            position += 1;
        }
        if zeros != self.labels.len() {
            return Err(FormatError::corrupt(SECTION, "label count mismatch"));
        }
        Ok(starts)
    }

    /// Enumerate every stored key in ascending reversed-byte order.
    pub fn keys(&self) -> Result<Vec<String>, FormatError> {
        let starts = self.block_starts()?;
        let is_leaf = |node: usize| get_bit(&self.leaves, node).unwrap_or(false);

        let mut keys = Vec::new();
        let mut current: Vec<u8> = Vec::new();
        // (node, next bitmap position within its block)
        let mut stack = vec![(0usize, starts[0])];
        while let Some((node, position)) = stack.last_mut() {
            let node = *node;
            if get_bit(&self.label_bitmap, *position) != Some(false) {
                stack.pop();
                current.pop();
                continue;
            }
            let label_index = *position - node;
            let child = label_index + 1;
            *position += 1;
            if child <= node {
                return Err(FormatError::corrupt(
                    SECTION,
                    format!("child {child} does not follow parent {node}"),
                ));
            }
            let (label, start) = match (self.labels.get(label_index), starts.get(child)) {
                (Some(label), Some(start)) => (*label, *start),
                _ => return Err(FormatError::corrupt(SECTION, "label count mismatch")),
            };

            current.push(label);
            if is_leaf(child) {
                let key: Vec<u8> = current.iter().rev().copied().collect();
                let key = String::from_utf8(key)
                    .map_err(|_| FormatError::corrupt(SECTION, "non-UTF-8 key"))?;
                keys.push(key);
            }
            stack.push((child, start));
        }

        Ok(keys)
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&[PAYLOAD_VERSION])?;
        format::write_words(writer, &self.leaves)?;
        format::write_words(writer, &self.label_bitmap)?;
        format::write_i64(writer, self.labels.len() as i64)?;
        writer.write_all(&self.labels)
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, FormatError> {
        let version = format::read_u8(reader, SECTION)?;
        if version != PAYLOAD_VERSION {
            return Err(FormatError::UnsupportedPayloadVersion {
                section: SECTION,
                version,
            });
        }
        let leaves = format::read_words(reader, "domain set leaves")?;
        let label_bitmap = format::read_words(reader, "domain set label bitmap")?;
        let label_count = format::read_count(reader, "domain set labels")?;
        let labels = format::read_bytes(reader, "domain set labels", label_count)?;

        Ok(Self {
            leaves,
            label_bitmap,
            labels,
        })
    }
}
