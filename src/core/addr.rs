//! Network addresses tagged with their kind.

use std::fmt::{
    Display,
    Formatter,
    Result as FmtResult,
};
use std::str::FromStr;

use crate::{
    Error,
    Result,
};

const MAX_ADDR_LEN: usize = 16;

/// The kind of an address which determines its size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    None,
    /// [MAC address](https://en.wikipedia.org/wiki/MAC_address).
    Mac,
    /// [IPv4 address](https://en.wikipedia.org/wiki/IPv4).
    Ipv4,
    /// [IPv6 address](https://en.wikipedia.org/wiki/IPv6).
    Ipv6,
}

impl Kind {
    /// Returns the canonical size in bytes of an address of this kind.
    pub const fn size(&self) -> usize {
        match *self {
            Kind::None => 0,
            Kind::Mac => 6,
            Kind::Ipv4 => 4,
            Kind::Ipv6 => 16,
        }
    }
}

/// Fixed length address in network byte order.
///
/// The kind of an address is fixed at construction. Bytes past the canonical
/// size of the kind are always zero.
#[derive(Clone, Copy, Debug)]
pub struct Address {
    kind: Kind,
    bytes: [u8; MAX_ADDR_LEN],
}

impl Address {
    pub const MAC_BROADCAST: Address = Address::mac([0xFF; 6]);

    pub const IPV4_BROADCAST: Address = Address::ipv4([0xFF; 4]);

    pub const IPV4_UNSPECIFIED: Address = Address::ipv4([0; 4]);

    /// Creates an address of the specified kind, copying bytes from addr or
    /// zero filling if addr is None.
    ///
    /// Fails if addr is not exactly the canonical size of the kind.
    pub fn new(kind: Kind, addr: Option<&[u8]>) -> Result<Address> {
        let mut bytes = [0; MAX_ADDR_LEN];

        if let Some(addr) = addr {
            if addr.len() != kind.size() {
                return Err(Error::Malformed);
            }
            bytes[.. kind.size()].copy_from_slice(addr);
        }

        Ok(Address { kind, bytes })
    }

    /// Creates a MAC address from a network byte order buffer.
    pub const fn mac(addr: [u8; 6]) -> Address {
        let mut bytes = [0; MAX_ADDR_LEN];
        let mut i = 0;
        while i < 6 {
            bytes[i] = addr[i];
            i += 1;
        }
        Address {
            kind: Kind::Mac,
            bytes,
        }
    }

    /// Creates an IPv4 address from a network byte order buffer.
    pub const fn ipv4(addr: [u8; 4]) -> Address {
        let mut bytes = [0; MAX_ADDR_LEN];
        let mut i = 0;
        while i < 4 {
            bytes[i] = addr[i];
            i += 1;
        }
        Address {
            kind: Kind::Ipv4,
            bytes,
        }
    }

    /// Creates an IPv6 address from a network byte order buffer.
    pub const fn ipv6(addr: [u8; 16]) -> Address {
        Address {
            kind: Kind::Ipv6,
            bytes: addr,
        }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn size(&self) -> usize {
        self.kind.size()
    }

    /// Returns a reference to the network byte order representation of the
    /// address.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[.. self.kind.size()]
    }

    /// Copies the address into the front of buffer.
    pub fn get_into(&self, buffer: &mut [u8]) -> Result<()> {
        if buffer.len() < self.size() {
            return Err(Error::Exhausted);
        }
        buffer[.. self.size()].copy_from_slice(self.as_bytes());
        Ok(())
    }

    /// Overwrites the address with a network byte order slice of the same
    /// canonical size.
    pub fn set(&mut self, addr: &[u8]) -> Result<()> {
        if addr.len() != self.size() {
            return Err(Error::Malformed);
        }
        let size = self.size();
        self.bytes[.. size].copy_from_slice(addr);
        Ok(())
    }

    /// Copies another address into this one. Both must be the same kind.
    pub fn assign(&mut self, other: &Address) -> Result<()> {
        if self.kind != other.kind {
            return Err(Error::KindMismatch);
        }
        self.bytes = other.bytes;
        Ok(())
    }

    /// Checks if the address consists of only zeros.
    pub fn is_unspecified(&self) -> bool {
        self.as_bytes().iter().all(|byte| *byte == 0)
    }

    /// Checks if this is a broadcast address, i.e. all ones.
    pub fn is_broadcast(&self) -> bool {
        self.kind != Kind::None && self.as_bytes().iter().all(|byte| *byte == 0xFF)
    }

    /// Checks if this is a multicast address.
    pub fn is_multicast(&self) -> bool {
        match self.kind {
            Kind::Mac => (self.bytes[0] & 0b00000001) > 0 && !self.is_broadcast(),
            Kind::Ipv4 => (self.bytes[0] & 0xF0) == 0xE0,
            Kind::Ipv6 => self.bytes[0] == 0xFF,
            Kind::None => false,
        }
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Address) -> bool {
        self.kind == other.kind && self.as_bytes() == other.as_bytes()
    }
}

impl Eq for Address {}

impl PartialEq<[u8]> for Address {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_bytes() == other
    }
}

impl<'a> PartialEq<&'a [u8]> for Address {
    fn eq(&self, other: &&'a [u8]) -> bool {
        self.as_bytes() == *other
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        let bytes = self.as_bytes();
        match self.kind {
            Kind::None => Ok(()),
            Kind::Mac => write!(
                f,
                "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5],
            ),
            Kind::Ipv4 => write!(f, "{}.{}.{}.{}", bytes[0], bytes[1], bytes[2], bytes[3]),
            Kind::Ipv6 => {
                for (i, group) in bytes.chunks(2).enumerate() {
                    if i > 0 {
                        write!(f, ":")?;
                    }
                    write!(f, "{:02X}{:02X}", group[0], group[1])?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for Address {
    type Err = ();

    /// Parses an address from an A.B.C.D (IPv4), AA:BB:CC:DD:EE:FF (MAC) or
    /// eight group AAAA:BBBB:... (IPv6) style string.
    fn from_str(addr: &str) -> std::result::Result<Address, Self::Err> {
        let mut bytes = [0; MAX_ADDR_LEN];

        if addr.contains('.') {
            let tokens: Vec<_> = addr.split('.').collect();
            if tokens.len() != 4 {
                return Err(());
            }
            for (i, token) in tokens.iter().enumerate() {
                bytes[i] = token.parse::<u8>().map_err(|_| ())?;
            }
            return Ok(Address {
                kind: Kind::Ipv4,
                bytes,
            });
        }

        let tokens: Vec<_> = addr.split(':').collect();
        match tokens.len() {
            6 => {
                for (i, token) in tokens.iter().enumerate() {
                    bytes[i] = u8::from_str_radix(token, 16).map_err(|_| ())?;
                }
                Ok(Address {
                    kind: Kind::Mac,
                    bytes,
                })
            }
            8 => {
                for (i, token) in tokens.iter().enumerate() {
                    let group = u16::from_str_radix(token, 16).map_err(|_| ())?;
                    bytes[i * 2] = (group >> 8) as u8;
                    bytes[i * 2 + 1] = group as u8;
                }
                Ok(Address {
                    kind: Kind::Ipv6,
                    bytes,
                })
            }
            _ => Err(()),
        }
    }
}
