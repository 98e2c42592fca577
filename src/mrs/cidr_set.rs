//! Aggregating IP-CIDR set with a range-list wire form.

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use log::warn;
use std::io::{self, Read, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use super::format::{self, PAYLOAD_VERSION};
use crate::error::FormatError;

const SECTION: &str = "cidr set";

/// `::ffff:0:0`, the base of the IPv4-mapped block.
const MAPPED_BASE: u128 = 0xffff_0000_0000;
const MAPPED_LAST: u128 = 0xffff_ffff_ffff;

#[derive(Debug, Clone, Copy, Default)]
struct Node {
    /// Arena indices; 0 means absent since the root is never a child.
    children: [u32; 2],
    terminal: bool,
}

/// Binary prefix trie for one address family.
#[derive(Debug, Clone)]
struct PrefixTrie {
    width: u8,
    nodes: Vec<Node>,
}

fn host_mask(host_bits: u8) -> u128 {
    if host_bits >= 128 {
        u128::MAX
    } else {
        (1u128 << host_bits) - 1
    }
}

impl PrefixTrie {
    fn new(width: u8) -> Self {
        Self {
            width,
            nodes: vec![Node::default()],
        }
    }

    fn is_empty(&self) -> bool {
        let root = &self.nodes[0];
        !root.terminal && root.children == [0, 0]
    }

    fn bit(&self, addr: u128, depth: u8) -> usize {
        ((addr >> (self.width - 1 - depth)) & 1) as usize
    }

    /// Insert `addr/len`. Covered prefixes are ignored, covered children
    /// absorbed, and complete sibling pairs merged into their parent.
    fn insert(&mut self, addr: u128, len: u8) {
        let len = len.min(self.width);
        let mut path = Vec::with_capacity(len as usize);
        let mut node = 0;
        for depth in 0..len {
            if self.nodes[node].terminal {
                return;
            }
            path.push(node);
            let bit = self.bit(addr, depth);
            node = match self.nodes[node].children[bit] {
                0 => {
                    let id = self.nodes.len();
                    self.nodes.push(Node::default());
                    self.nodes[node].children[bit] = id as u32;
                    id
                }
                child => child as usize,
            };
        }
        if self.nodes[node].terminal {
            return;
        }
        self.nodes[node] = Node {
            children: [0, 0],
            terminal: true,
        };

        while let Some(parent) = path.pop() {
            let [left, right] = self.nodes[parent].children;
            let complete = left != 0
                && right != 0
                && self.nodes[left as usize].terminal
                && self.nodes[right as usize].terminal;
            if !complete {
                break;
            }
            self.nodes[parent] = Node {
                children: [0, 0],
                terminal: true,
            };
        }
    }

    /// Minimal prefix list in ascending address order.
    fn prefixes(&self) -> Vec<(u128, u8)> {
        let mut found = Vec::new();
        let mut stack = vec![(0usize, 0u128, 0u8)];
        while let Some((node, addr, depth)) = stack.pop() {
            let current = self.nodes[node];
            if current.terminal {
                found.push((addr, depth));
                continue;
            }
            for bit in [1u32, 0] {
                let child = current.children[bit as usize];
                if child != 0 {
                    let child_addr = addr | (u128::from(bit) << (self.width - 1 - depth));
                    stack.push((child as usize, child_addr, depth + 1));
                }
            }
        }
        found
    }

    /// Inclusive ranges of the stored prefixes, adjacent ones coalesced.
    fn ranges(&self) -> Vec<(u128, u128)> {
        let mut ranges: Vec<(u128, u128)> = Vec::new();
        for (addr, len) in self.prefixes() {
            let last = addr | host_mask(self.width - len);
            match ranges.last_mut() {
                Some((_, end)) if end.checked_add(1) == Some(addr) => *end = last,
                _ => ranges.push((addr, last)),
            }
        }
        ranges
    }

    /// Insert the minimal prefix cover of `from..=to`.
    fn insert_range(&mut self, from: u128, to: u128) {
        let mut start = from;
        loop {
            let mut host_bits = if start == 0 {
                self.width
            } else {
                (start.trailing_zeros() as u8).min(self.width)
            };
            while host_bits > 0 && start + host_mask(host_bits) > to {
                host_bits -= 1;
            }
            let end = start + host_mask(host_bits);
            self.insert(start, self.width - host_bits);
            if end >= to {
                break;
            }
            start = end + 1;
        }
    }
}

/// The parts of `from..=to` below and above the mapped block.
fn outside_mapped(from: u128, to: u128) -> impl Iterator<Item = (u128, u128)> {
    let below = (from < MAPPED_BASE).then(|| (from, to.min(MAPPED_BASE - 1)));
    let above = (to > MAPPED_LAST).then(|| (from.max(MAPPED_LAST + 1), to));
    below.into_iter().chain(above)
}

/// A set of IPv4 and IPv6 prefixes kept in minimal form.
#[derive(Debug, Clone)]
pub struct IpCidrSet {
    v4: PrefixTrie,
    v6: PrefixTrie,
}

impl Default for IpCidrSet {
    fn default() -> Self {
        Self::new()
    }
}

impl IpCidrSet {
    pub fn new() -> Self {
        Self {
            v4: PrefixTrie::new(32),
            v6: PrefixTrie::new(128),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.v4.is_empty() && self.v6.is_empty()
    }

    /// Insert a network. IPv4-mapped IPv6 prefixes of length 96 or more are
    /// stored as IPv4.
    pub fn insert(&mut self, net: IpNet) {
        match net.trunc() {
            IpNet::V4(net) => self
                .v4
                .insert(u128::from(u32::from(net.network())), net.prefix_len()),
            IpNet::V6(net) => {
                let addr = u128::from(net.network());
                let len = net.prefix_len();
                if len >= 96 && addr >> 32 == 0xffff {
                    self.v4.insert(addr & u128::from(u32::MAX), len - 96);
                } else {
                    self.v6.insert(addr, len);
                }
            }
        }
    }

    /// Insert a CIDR string or bare address. Returns false if it does not
    /// parse, after logging a warning.
    pub fn insert_str(&mut self, cidr: &str) -> bool {
        let cidr = cidr.trim();
        let net = cidr
            .parse::<IpNet>()
            .ok()
            .or_else(|| cidr.parse::<IpAddr>().ok().map(IpNet::from));
        match net {
            Some(net) => {
                self.insert(net);
                true
            }
            None => {
                warn!("Skipping invalid CIDR: {}", cidr);
                false
            }
        }
    }

    /// Minimal sorted prefix list, IPv4 first.
    pub fn cidrs(&self) -> Vec<IpNet> {
        let v4 = self.v4.prefixes().into_iter().filter_map(|(addr, len)| {
            Ipv4Net::new(Ipv4Addr::from(addr as u32), len)
                .ok()
                .map(IpNet::V4)
        });
        let v6 = self.v6.prefixes().into_iter().filter_map(|(addr, len)| {
            Ipv6Net::new(Ipv6Addr::from(addr), len).ok().map(IpNet::V6)
        });
        v4.chain(v6).collect()
    }

    /// [`IpCidrSet::cidrs`] rendered as strings.
    pub fn to_strings(&self) -> Vec<String> {
        self.cidrs().iter().map(|net| net.to_string()).collect()
    }

    /// Wire ranges as IPv6 integers: IPv4 (mapped) ranges first, then IPv6.
    ///
    /// The mapped block is cut out of IPv6 ranges since a reader takes any
    /// address inside it as IPv4.
    fn wire_ranges(&self) -> Vec<(u128, u128)> {
        let v4 = self
            .v4
            .ranges()
            .into_iter()
            .map(|(from, to)| (MAPPED_BASE | from, MAPPED_BASE | to));
        let v6 = self
            .v6
            .ranges()
            .into_iter()
            .flat_map(|(from, to)| outside_mapped(from, to));
        v4.chain(v6).collect()
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let ranges = self.wire_ranges();
        writer.write_all(&[PAYLOAD_VERSION])?;
        format::write_i64(writer, ranges.len() as i64)?;
        for (from, to) in ranges {
            writer.write_all(&from.to_be_bytes())?;
            writer.write_all(&to.to_be_bytes())?;
        }
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, FormatError> {
        let version = format::read_u8(reader, SECTION)?;
        if version != PAYLOAD_VERSION {
            return Err(FormatError::UnsupportedPayloadVersion {
                section: SECTION,
                version,
            });
        }
        let count = format::read_count(reader, SECTION)?;

        let mut set = Self::new();
        for _ in 0..count {
            let from = u128::from_be_bytes(format::read_array(reader, "cidr set ranges")?);
            let to = u128::from_be_bytes(format::read_array(reader, "cidr set ranges")?);
            if from > to {
                return Err(FormatError::corrupt(
                    SECTION,
                    format!("range start {} after end {}", Ipv6Addr::from(from), Ipv6Addr::from(to)),
                ));
            }
            set.insert_wire_range(from, to);
        }
        Ok(set)
    }

    fn insert_wire_range(&mut self, from: u128, to: u128) {
        let mapped = |addr: u128| (MAPPED_BASE..=MAPPED_LAST).contains(&addr);
        match (mapped(from), mapped(to)) {
            (true, true) => self
                .v4
                .insert_range(from - MAPPED_BASE, to - MAPPED_BASE),
            (true, false) => {
                self.v4.insert_range(from - MAPPED_BASE, u128::from(u32::MAX));
                self.v6.insert_range(MAPPED_LAST + 1, to);
            }
            (false, true) => {
                self.v6.insert_range(from, MAPPED_BASE - 1);
                self.v4.insert_range(0, to - MAPPED_BASE);
            }
            (false, false) => self.v6.insert_range(from, to),
        }
    }
}
