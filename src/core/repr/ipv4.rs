use byteorder::{
    ByteOrder,
    NetworkEndian,
};

use crate::core::addr::{
    Address,
    Kind,
};
use crate::core::check::internet_checksum;
use crate::{
    Error,
    Result,
};

/// [https://en.wikipedia.org/wiki/List_of_IP_protocol_numbers](https://en.wikipedia.org/wiki/List_of_IP_protocol_numbers)
pub mod protocols {
    pub const ICMP: u8 = 1;

    pub const TCP: u8 = 6;

    pub const UDP: u8 = 17;
}

/// Byte offsets of the IPv4 header fields.
pub mod fields {
    use std::ops::Range;

    pub const VERSION_IHL: usize = 0;

    pub const LENGTH: Range<usize> = 2 .. 4;

    pub const IDENTIFICATION: Range<usize> = 4 .. 6;

    pub const TTL: usize = 8;

    pub const PROTOCOL: usize = 9;

    pub const CHECKSUM: Range<usize> = 10 .. 12;

    pub const SRC_ADDR: Range<usize> = 12 .. 16;

    pub const DST_ADDR: Range<usize> = 16 .. 20;
}

fn ipv4_from_slice(bytes: &[u8]) -> Address {
    let mut ipv4 = [0; 4];
    ipv4.copy_from_slice(&bytes[.. 4]);
    Address::ipv4(ipv4)
}

/// View of a byte buffer as an IPv4 packet.
#[derive(Debug)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> AsRef<[u8]> for Packet<T> {
    fn as_ref(&self) -> &[u8] {
        self.buffer.as_ref()
    }
}

impl<T: AsRef<[u8]>> Packet<T> {
    /// Length of a header without options.
    pub const HEADER_LEN: usize = 20;

    pub const MAX_PACKET_LEN: usize = 65535;

    /// Tries to create an IPv4 packet view over a byte buffer.
    pub fn try_new(buffer: T) -> Result<Packet<T>> {
        if buffer.as_ref().len() < Self::HEADER_LEN || buffer.as_ref().len() > Self::MAX_PACKET_LEN
        {
            Err(Error::Exhausted)
        } else {
            Ok(Packet { buffer })
        }
    }

    /// Returns the length of an IPv4 packet with no options and the specified
    /// payload size.
    pub fn buffer_len(payload_len: usize) -> usize {
        Self::HEADER_LEN + payload_len
    }

    /// Checks if the packet has a valid encoding. This includes the header
    /// checksum and length consistency.
    pub fn check_encoding(&self) -> Result<()> {
        let header_len = self.header_len() as usize;
        if self.ip_version() != 4 || header_len < Self::HEADER_LEN
            || header_len > self.packet_len() as usize
            || self.packet_len() as usize > self.buffer.as_ref().len()
        {
            Err(Error::Malformed)
        } else if internet_checksum(&self.buffer.as_ref()[.. header_len]) != 0 {
            Err(Error::Checksum)
        } else {
            Ok(())
        }
    }

    pub fn ip_version(&self) -> u8 {
        self.buffer.as_ref()[fields::VERSION_IHL] >> 4
    }

    pub fn header_len(&self) -> u8 {
        (self.buffer.as_ref()[fields::VERSION_IHL] & 0x0F) * 4
    }

    pub fn packet_len(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[fields::LENGTH])
    }

    pub fn identification(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[fields::IDENTIFICATION])
    }

    pub fn ttl(&self) -> u8 {
        self.buffer.as_ref()[fields::TTL]
    }

    pub fn protocol(&self) -> u8 {
        self.buffer.as_ref()[fields::PROTOCOL]
    }

    pub fn header_checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[fields::CHECKSUM])
    }

    pub fn src_addr(&self) -> Address {
        ipv4_from_slice(&self.buffer.as_ref()[fields::SRC_ADDR])
    }

    pub fn dst_addr(&self) -> Address {
        ipv4_from_slice(&self.buffer.as_ref()[fields::DST_ADDR])
    }

    /// Returns an immutable view of the payload, bounded by the packet length.
    pub fn payload(&self) -> &[u8] {
        let end = std::cmp::min(self.packet_len() as usize, self.buffer.as_ref().len());
        let start = std::cmp::min(self.header_len() as usize, end);
        &self.buffer.as_ref()[start .. end]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    /// Writes version 4 and a header length in bytes.
    pub fn set_version_and_header_len(&mut self, header_len: u8) {
        self.buffer.as_mut()[fields::VERSION_IHL] = 0x40 | ((header_len / 4) & 0x0F);
    }

    pub fn set_packet_len(&mut self, packet_len: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[fields::LENGTH], packet_len);
    }

    pub fn set_identification(&mut self, identification: u16) {
        NetworkEndian::write_u16(
            &mut self.buffer.as_mut()[fields::IDENTIFICATION],
            identification,
        );
    }

    pub fn set_ttl(&mut self, ttl: u8) {
        self.buffer.as_mut()[fields::TTL] = ttl;
    }

    pub fn set_protocol(&mut self, protocol: u8) {
        self.buffer.as_mut()[fields::PROTOCOL] = protocol;
    }

    pub fn set_src_addr(&mut self, addr: &Address) -> Result<()> {
        if addr.kind() != Kind::Ipv4 {
            return Err(Error::KindMismatch);
        }
        self.buffer.as_mut()[fields::SRC_ADDR].copy_from_slice(addr.as_bytes());
        Ok(())
    }

    pub fn set_dst_addr(&mut self, addr: &Address) -> Result<()> {
        if addr.kind() != Kind::Ipv4 {
            return Err(Error::KindMismatch);
        }
        self.buffer.as_mut()[fields::DST_ADDR].copy_from_slice(addr.as_bytes());
        Ok(())
    }

    /// Calculates and writes the header checksum.
    pub fn fill_checksum(&mut self) {
        let header_len = self.header_len() as usize;
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[fields::CHECKSUM], 0);
        let checksum = internet_checksum(&self.buffer.as_ref()[.. header_len]);
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[fields::CHECKSUM], checksum);
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        let start = self.header_len() as usize;
        &mut self.buffer.as_mut()[start ..]
    }
}
