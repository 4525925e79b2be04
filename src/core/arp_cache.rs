use crate::core::addr::Address;

/// Index of the entry reserved for the default gateway.
pub const GATEWAY_INDEX: usize = 0;

/// Index of the entry reserved for the DNS server.
pub const DNS_INDEX: usize = 1;

const RESERVED: usize = 2;

/// An IPv4 -> ethernet address mapping. An all zero ethernet address means
/// the mapping has not been resolved yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArpEntry {
    pub ipv4_addr: Address,
    pub eth_addr: Address,
}

impl ArpEntry {
    fn empty() -> ArpEntry {
        ArpEntry {
            ipv4_addr: Address::IPV4_UNSPECIFIED,
            eth_addr: Address::mac([0; 6]),
        }
    }

    /// Checks if the entry holds a resolved mapping.
    pub fn is_resolved(&self) -> bool {
        !self.ipv4_addr.is_unspecified() && !self.eth_addr.is_unspecified()
    }
}

/// Maintains a fixed set of IPv4 -> ethernet address mappings.
///
/// The first two entries are reserved for the gateway and DNS server and are
/// only written through `set_reserved(...)` or by resolving their address.
/// The remaining entries are recycled round robin.
#[derive(Debug)]
pub struct ArpTable {
    entries: Vec<ArpEntry>,
    cursor: usize,
}

impl ArpTable {
    /// Creates a table with the reserved entries and extra_entries round
    /// robin entries.
    pub fn new(extra_entries: usize) -> ArpTable {
        ArpTable {
            entries: vec![ArpEntry::empty(); RESERVED + extra_entries],
            cursor: RESERVED,
        }
    }

    /// Returns the total number of entries, including reserved ones.
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Returns the index of the next round robin entry to be overwritten.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn entry(&self, index: usize) -> Option<&ArpEntry> {
        self.entries.get(index)
    }

    /// Lookup the ethernet address for an IPv4 address. Pending mappings are
    /// treated as missing.
    pub fn eth_addr_for_ip(&self, ipv4_addr: &Address) -> Option<Address> {
        self.entries
            .iter()
            .find(|entry| entry.is_resolved() && entry.ipv4_addr == *ipv4_addr)
            .map(|entry| entry.eth_addr)
    }

    /// Returns the index of the entry holding an IPv4 address, resolved or not.
    pub fn index_of(&self, ipv4_addr: &Address) -> Option<usize> {
        if ipv4_addr.is_unspecified() {
            return None;
        }
        self.entries
            .iter()
            .position(|entry| entry.ipv4_addr == *ipv4_addr)
    }

    /// Records an IPv4 address awaiting resolution in the next round robin
    /// entry, unless the table already holds it. Returns the index used, or
    /// None if the address is unspecified or the table has no round robin
    /// entries.
    pub fn insert_pending(&mut self, ipv4_addr: &Address) -> Option<usize> {
        if ipv4_addr.is_unspecified() {
            return None;
        }

        if let Some(index) = self.index_of(ipv4_addr) {
            return Some(index);
        }

        if self.entries.len() <= RESERVED {
            return None;
        }

        let index = self.cursor;
        self.entries[index] = ArpEntry {
            ipv4_addr: *ipv4_addr,
            eth_addr: Address::mac([0; 6]),
        };

        self.cursor += 1;
        if self.cursor >= self.entries.len() {
            self.cursor = RESERVED;
        }

        Some(index)
    }

    /// Updates the ethernet address of every entry matching the IPv4 address,
    /// regardless of the round robin position. Returns the first index
    /// updated, or None if the address is not in the table.
    pub fn set_eth_addr_for_ip(&mut self, ipv4_addr: &Address, eth_addr: &Address) -> Option<usize> {
        if ipv4_addr.is_unspecified() {
            return None;
        }

        let mut updated = None;
        for (i, entry) in self.entries.iter_mut().enumerate() {
            if entry.ipv4_addr == *ipv4_addr {
                entry.eth_addr = *eth_addr;
                updated = updated.or(Some(i));
            }
        }
        updated
    }

    /// Sets the IPv4 address of a reserved entry. The ethernet address is
    /// forgotten unless the IPv4 address is unchanged.
    pub fn set_reserved(&mut self, index: usize, ipv4_addr: &Address) {
        debug_assert!(index < RESERVED);
        let entry = &mut self.entries[index];
        if entry.ipv4_addr != *ipv4_addr {
            *entry = ArpEntry {
                ipv4_addr: *ipv4_addr,
                eth_addr: Address::mac([0; 6]),
            };
        }
    }
}
