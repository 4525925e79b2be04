use byteorder::{
    ByteOrder,
    NetworkEndian,
};

use crate::core::addr::{
    Address,
    Kind,
};
use crate::core::repr::ethernet::mac_from_slice;
use crate::{
    Error,
    Result,
};

#[repr(u16)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
// https://www.iana.org/assignments/arp-parameters/arp-parameters.xhtml#arp-parameters-1
pub enum Op {
    Request = 0x0001,
    Reply = 0x0002,
}

// https://www.iana.org/assignments/arp-parameters/arp-parameters.xhtml#arp-parameters-2
pub mod hw_types {
    pub const ETHERNET: u16 = 0x0001;
}

// https://www.iana.org/assignments/arp-parameters/arp-parameters.xhtml#arp-parameters-3
pub mod proto_types {
    pub const IPV4: u16 = 0x0800;
}

mod fields {
    use std::ops::Range;

    pub const HW_TYPE: Range<usize> = 0 .. 2;

    pub const PROTO_TYPE: Range<usize> = 2 .. 4;

    pub const HW_LEN: usize = 4;

    pub const PROTO_LEN: usize = 5;

    pub const OP: Range<usize> = 6 .. 8;

    pub const SOURCE_HW_ADDR: Range<usize> = 8 .. 14;

    pub const SOURCE_PROTO_ADDR: Range<usize> = 14 .. 18;

    pub const TARGET_HW_ADDR: Range<usize> = 18 .. 24;

    pub const TARGET_PROTO_ADDR: Range<usize> = 24 .. 28;
}

/// An IPv4 over Ethernet ARP message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Arp {
    pub op: Op,
    pub source_hw_addr: Address,
    pub source_proto_addr: Address,
    pub target_hw_addr: Address,
    pub target_proto_addr: Address,
}

impl Arp {
    /// Size of an IPv4 over Ethernet ARP message.
    pub const BUFFER_LEN: usize = 28;

    /// Returns the size of the ARP packet when serialized to a buffer.
    pub fn buffer_len(&self) -> usize {
        Self::BUFFER_LEN
    }

    /// Deserializes an IPv4 over Ethernet ARP message.
    pub fn deserialize(buffer: &[u8]) -> Result<Arp> {
        if buffer.len() < Self::BUFFER_LEN {
            return Err(Error::Exhausted);
        }

        if NetworkEndian::read_u16(&buffer[fields::HW_TYPE]) != hw_types::ETHERNET
            || NetworkEndian::read_u16(&buffer[fields::PROTO_TYPE]) != proto_types::IPV4
            || buffer[fields::HW_LEN] != 6 || buffer[fields::PROTO_LEN] != 4
        {
            return Err(Error::Malformed);
        }

        let op = match NetworkEndian::read_u16(&buffer[fields::OP]) {
            0x0001 => Op::Request,
            0x0002 => Op::Reply,
            _ => return Err(Error::Malformed),
        };

        Ok(Arp {
            op,
            source_hw_addr: mac_from_slice(&buffer[fields::SOURCE_HW_ADDR]),
            source_proto_addr: Address::new(Kind::Ipv4, Some(&buffer[fields::SOURCE_PROTO_ADDR]))?,
            target_hw_addr: mac_from_slice(&buffer[fields::TARGET_HW_ADDR]),
            target_proto_addr: Address::new(Kind::Ipv4, Some(&buffer[fields::TARGET_PROTO_ADDR]))?,
        })
    }

    /// Serializes the ARP packet into a buffer.
    ///
    /// You should ensure buffer has at least buffer_len() bytes to avoid errors.
    pub fn serialize(&self, buffer: &mut [u8]) -> Result<()> {
        if self.buffer_len() > buffer.len() {
            return Err(Error::Exhausted);
        }

        if self.source_hw_addr.kind() != Kind::Mac || self.target_hw_addr.kind() != Kind::Mac
            || self.source_proto_addr.kind() != Kind::Ipv4
            || self.target_proto_addr.kind() != Kind::Ipv4
        {
            return Err(Error::KindMismatch);
        }

        NetworkEndian::write_u16(&mut buffer[fields::HW_TYPE], hw_types::ETHERNET);
        NetworkEndian::write_u16(&mut buffer[fields::PROTO_TYPE], proto_types::IPV4);
        buffer[fields::HW_LEN] = 6;
        buffer[fields::PROTO_LEN] = 4;
        NetworkEndian::write_u16(&mut buffer[fields::OP], self.op as u16);
        buffer[fields::SOURCE_HW_ADDR].copy_from_slice(self.source_hw_addr.as_bytes());
        buffer[fields::SOURCE_PROTO_ADDR].copy_from_slice(self.source_proto_addr.as_bytes());
        buffer[fields::TARGET_HW_ADDR].copy_from_slice(self.target_hw_addr.as_bytes());
        buffer[fields::TARGET_PROTO_ADDR].copy_from_slice(self.target_proto_addr.as_bytes());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLY: [u8; 28] = [
        0x00, 0x01, // Ethernet
        0x08, 0x00, // IPv4
        0x06, 0x04, // Lengths
        0x00, 0x02, // Reply
        0x78, 0x44, 0x76, 0xD9, 0x6A, 0x7C, // SHA
        0xC0, 0xA8, 0x01, 0x01, // SPA
        0x20, 0x18, 0x03, 0x01, 0x00, 0x00, // THA
        0xC0, 0xA8, 0x01, 0x21, // TPA
    ];

    #[test]
    fn test_deserialize() {
        let arp = Arp::deserialize(&REPLY).unwrap();
        assert_eq!(arp.op, Op::Reply);
        assert_eq!(
            arp.source_hw_addr,
            Address::mac([0x78, 0x44, 0x76, 0xD9, 0x6A, 0x7C])
        );
        assert_eq!(arp.source_proto_addr, Address::ipv4([192, 168, 1, 1]));
        assert_eq!(
            arp.target_hw_addr,
            Address::mac([0x20, 0x18, 0x03, 0x01, 0x00, 0x00])
        );
        assert_eq!(arp.target_proto_addr, Address::ipv4([192, 168, 1, 33]));
    }

    #[test]
    fn test_serialize_matches_wire_format() {
        let arp = Arp::deserialize(&REPLY).unwrap();
        let mut buffer = [0; 28];
        arp.serialize(&mut buffer).unwrap();
        assert_eq!(&buffer[..], &REPLY[..]);
    }

    #[test]
    fn test_deserialize_bad_op() {
        let mut buffer = REPLY;
        buffer[7] = 0x03;
        assert_matches!(Arp::deserialize(&buffer), Err(Error::Malformed));
    }

    #[test]
    fn test_deserialize_bad_proto_type() {
        let mut buffer = REPLY;
        buffer[2] = 0x86;
        buffer[3] = 0xDD;
        assert_matches!(Arp::deserialize(&buffer), Err(Error::Malformed));
    }

    #[test]
    fn test_deserialize_too_short() {
        assert_matches!(Arp::deserialize(&REPLY[.. 27]), Err(Error::Exhausted));
    }
}
