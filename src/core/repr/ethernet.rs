use byteorder::{
    ByteOrder,
    NetworkEndian,
};

use crate::core::addr::{
    Address,
    Kind,
};
use crate::{
    Error,
    Result,
};

/// [https://en.wikipedia.org/wiki/EtherType](https://en.wikipedia.org/wiki/EtherType)
pub mod eth_types {
    pub const IPV4: u16 = 0x800;

    pub const ARP: u16 = 0x806;

    pub const IPV6: u16 = 0x86DD;
}

pub mod fields {
    use std::ops::{
        Range,
        RangeFrom,
    };

    pub const DST_ADDR: Range<usize> = 0 .. 6;

    pub const SRC_ADDR: Range<usize> = 6 .. 12;

    pub const PAYLOAD_TYPE: Range<usize> = 12 .. 14;

    pub const PAYLOAD: RangeFrom<usize> = 14 ..;
}

/// View of a byte buffer as an Ethernet frame.
#[derive(Debug)]
pub struct Frame<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> AsRef<[u8]> for Frame<T> {
    fn as_ref(&self) -> &[u8] {
        self.buffer.as_ref()
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> AsMut<[u8]> for Frame<T> {
    fn as_mut(&mut self) -> &mut [u8] {
        self.buffer.as_mut()
    }
}

impl<T: AsRef<[u8]>> Frame<T> {
    pub const HEADER_LEN: usize = 14;

    /// Shortest frame on the wire, excluding the FCS.
    pub const MIN_FRAME_LEN: usize = 60;

    pub const MAX_FRAME_LEN: usize = 1518;

    /// Tries to create an Ethernet frame view over a byte buffer.
    pub fn try_new(buffer: T) -> Result<Frame<T>> {
        if buffer.as_ref().len() < Self::HEADER_LEN || buffer.as_ref().len() > Self::MAX_FRAME_LEN {
            Err(Error::Exhausted)
        } else {
            Ok(Frame { buffer })
        }
    }

    /// Returns the length of an Ethernet frame with the specified payload size.
    pub fn buffer_len(payload_len: usize) -> usize {
        Self::HEADER_LEN + payload_len
    }

    pub fn dst_addr(&self) -> Address {
        mac_from_slice(&self.buffer.as_ref()[fields::DST_ADDR])
    }

    pub fn src_addr(&self) -> Address {
        mac_from_slice(&self.buffer.as_ref()[fields::SRC_ADDR])
    }

    pub fn payload_type(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[fields::PAYLOAD_TYPE])
    }

    pub fn payload(&self) -> &[u8] {
        &self.buffer.as_ref()[fields::PAYLOAD]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Frame<T> {
    pub fn set_dst_addr(&mut self, addr: &Address) -> Result<()> {
        if addr.kind() != Kind::Mac {
            return Err(Error::KindMismatch);
        }
        self.buffer.as_mut()[fields::DST_ADDR].copy_from_slice(addr.as_bytes());
        Ok(())
    }

    pub fn set_src_addr(&mut self, addr: &Address) -> Result<()> {
        if addr.kind() != Kind::Mac {
            return Err(Error::KindMismatch);
        }
        self.buffer.as_mut()[fields::SRC_ADDR].copy_from_slice(addr.as_bytes());
        Ok(())
    }

    pub fn set_payload_type(&mut self, payload_type: u16) {
        NetworkEndian::write_u16(
            &mut self.buffer.as_mut()[fields::PAYLOAD_TYPE],
            payload_type,
        );
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.buffer.as_mut()[fields::PAYLOAD]
    }
}

/// Creates a MAC address from a 6 byte field.
pub(crate) fn mac_from_slice(bytes: &[u8]) -> Address {
    let mut mac = [0; 6];
    mac.copy_from_slice(bytes);
    Address::mac(mac)
}

/// Maps an IPv4 multicast group to its Ethernet multicast address per
/// [RFC1112](https://tools.ietf.org/html/rfc1112#section-6.4).
pub fn ipv4_multicast_addr(group: &Address) -> Address {
    let group = group.as_bytes();
    if group.len() != 4 {
        return Address::MAC_BROADCAST;
    }
    Address::mac([0x01, 0x00, 0x5E, group[1] & 0x7F, group[2], group[3]])
}
