use std::time::Instant;

use byteorder::{
    ByteOrder,
    NetworkEndian,
};

use crate::core::addr::{
    Address,
    Kind,
};
use crate::core::arp_cache::{
    ArpTable,
    DNS_INDEX,
    GATEWAY_INDEX,
};
use crate::core::dev::Device;
use crate::core::repr::ipv4::fields;
use crate::core::repr::{
    eth_types,
    ethernet,
    ipv4_protocols,
    EthernetFrame,
    Ipv4Packet,
};
use crate::core::service::dhcp::DhcpStatus;
use crate::core::service::Config;
use crate::core::time::{
    Env,
    SystemEnv,
};
use crate::{
    Error,
    Result,
};

pub(crate) const ETH_HEADER_LEN: usize = EthernetFrame::<&'static [u8]>::HEADER_LEN;

pub(crate) const IPV4_HEADER_LEN: usize = Ipv4Packet::<&'static [u8]>::HEADER_LEN;

/// Offset of the IPv4 payload in a frame built with `Ipv4::tx_begin(...)`.
pub(crate) const TX_PAYLOAD_OFFSET: usize = ETH_HEADER_LEN + IPV4_HEADER_LEN;

#[derive(Clone, Copy, Debug, Default)]
struct TxState {
    open: bool,
    payload_len: usize,
    overflow: bool,
}

/// An IPv4 host with ARP, ICMP echo and a DHCP client.
///
/// The engine does not own a device. Every operation borrows the device for
/// its duration, so the same device can carry raw frames for other protocols.
pub struct Ipv4<E: Env = SystemEnv> {
    pub(crate) env: E,
    pub(crate) config: Config,
    pub(crate) local: Address,
    pub(crate) remote: Address,
    pub(crate) netmask: Address,
    pub(crate) subnet: Address,
    pub(crate) broadcast: Address,
    pub(crate) dhcp_server: Address,
    pub(crate) offered: Address,
    pub(crate) dhcp_status: DhcpStatus,
    pub(crate) dhcp_xid: u32,
    pub(crate) dhcp_renew_at: Option<Instant>,
    pub(crate) icmp_enabled: bool,
    pub(crate) ping_seq: u16,
    pub(crate) echo_handler: Option<Box<dyn FnMut(u16)>>,
    pub(crate) arp_table: ArpTable,
    identification: u16,
    tx: TxState,
}

impl<E: Env> Ipv4<E> {
    pub fn new(env: E, config: Config) -> Ipv4<E> {
        let mut ipv4 = Ipv4 {
            env,
            local: Address::IPV4_UNSPECIFIED,
            remote: Address::IPV4_UNSPECIFIED,
            netmask: Address::IPV4_UNSPECIFIED,
            subnet: Address::IPV4_UNSPECIFIED,
            broadcast: Address::IPV4_BROADCAST,
            dhcp_server: Address::IPV4_UNSPECIFIED,
            offered: Address::IPV4_UNSPECIFIED,
            dhcp_status: DhcpStatus::Disabled,
            dhcp_xid: 0,
            dhcp_renew_at: None,
            icmp_enabled: config.icmp_enabled,
            ping_seq: 0,
            echo_handler: None,
            arp_table: ArpTable::new(config.arp_entries),
            identification: 0,
            tx: TxState::default(),
            config,
        };
        ipv4.update_subnet();
        ipv4
    }

    pub fn ip(&self) -> Address {
        self.local
    }

    pub fn gateway(&self) -> Address {
        self.reserved_addr(GATEWAY_INDEX)
    }

    pub fn dns(&self) -> Address {
        self.reserved_addr(DNS_INDEX)
    }

    pub fn netmask(&self) -> Address {
        self.netmask
    }

    pub fn subnet(&self) -> Address {
        self.subnet
    }

    pub fn broadcast(&self) -> Address {
        self.broadcast
    }

    /// Returns the source address of the last received IPv4 datagram.
    pub fn remote_ip(&self) -> Address {
        self.remote
    }

    pub fn dhcp_server(&self) -> Address {
        self.dhcp_server
    }

    /// Returns the address offered by the DHCP server during discovery.
    pub fn offered_ip(&self) -> Address {
        self.offered
    }

    pub fn dhcp_status(&self) -> DhcpStatus {
        self.dhcp_status
    }

    pub fn is_using_dhcp(&self) -> bool {
        self.dhcp_status != DhcpStatus::Disabled
    }

    pub fn arp_table(&self) -> &ArpTable {
        &self.arp_table
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    fn reserved_addr(&self, index: usize) -> Address {
        self.arp_table
            .entry(index)
            .map(|entry| entry.ipv4_addr)
            .unwrap_or(Address::IPV4_UNSPECIFIED)
    }

    /// Recomputes the subnet and broadcast addresses from the local address
    /// and netmask.
    pub(crate) fn update_subnet(&mut self) {
        let (local, mask) = (self.local.as_bytes(), self.netmask.as_bytes());
        let mut subnet = [0; 4];
        let mut broadcast = [0; 4];
        for i in 0 .. 4 {
            subnet[i] = local[i] & mask[i];
            broadcast[i] = local[i] | !mask[i];
        }
        self.subnet = Address::ipv4(subnet);
        self.broadcast = Address::ipv4(broadcast);
    }

    /// Checks if an address is the limited broadcast address or the directed
    /// broadcast address of the local subnet.
    pub fn is_broadcast(&self, ipv4_addr: &Address) -> bool {
        ipv4_addr.is_broadcast() || *ipv4_addr == self.broadcast
    }

    pub fn is_on_local_subnet(&self, ipv4_addr: &Address) -> bool {
        if ipv4_addr.kind() != Kind::Ipv4 {
            return false;
        }
        let (addr, mask) = (ipv4_addr.as_bytes(), self.netmask.as_bytes());
        let subnet = self.subnet.as_bytes();
        (0 .. 4).all(|i| addr[i] & mask[i] == subnet[i])
    }

    /// Processes an IPv4 datagram in the receive buffer. The length excludes
    /// the Ethernet header.
    pub fn process<D: Device>(&mut self, dev: &mut D, len: usize) -> Result<()> {
        if len < IPV4_HEADER_LEN {
            debug!("Dropping IPv4 packet with length {}.", len);
            return Err(Error::Malformed);
        }

        let version_ihl = dev.rx_byte(ETH_HEADER_LEN + fields::VERSION_IHL)?;
        let header_len = ((version_ihl & 0x0F) as usize) * 4;
        let packet_len = dev.rx_word(ETH_HEADER_LEN + fields::LENGTH.start)? as usize;

        if version_ihl >> 4 != 4 || header_len < IPV4_HEADER_LEN || header_len > packet_len
            || packet_len > len
        {
            debug!(
                "Dropping IPv4 packet with header length {}, length {} and {} bytes available.",
                header_len, packet_len, len
            );
            return Err(Error::Malformed);
        }

        let protocol = dev.rx_byte(ETH_HEADER_LEN + fields::PROTOCOL)?;
        let mut src_addr = [0; 4];
        dev.rx_read(ETH_HEADER_LEN + fields::SRC_ADDR.start, &mut src_addr)?;
        self.remote = Address::ipv4(src_addr);

        let payload_offset = ETH_HEADER_LEN + header_len;
        let payload_len = packet_len - header_len;

        match protocol {
            ipv4_protocols::ICMP => self.process_icmp(dev, payload_offset, payload_len),
            ipv4_protocols::UDP => self.process_udp(dev, payload_offset, payload_len),
            ipv4_protocols::TCP => {
                debug!("Ignoring TCP packet from {}.", self.remote);
                Err(Error::Ignored)
            }
            i => {
                debug!("Ignoring IPv4 packet with protocol {}.", i);
                Err(Error::Ignored)
            }
        }
    }

    /// Picks the ethernet address for a datagram to ipv4_addr without waiting
    /// on ARP. Unresolved destinations go to the broadcast address while the
    /// ARP request is outstanding.
    fn eth_addr_for_route<D: Device>(&mut self, dev: &mut D, ipv4_addr: &Address) -> Address {
        if self.is_broadcast(ipv4_addr) {
            return Address::MAC_BROADCAST;
        }

        if ipv4_addr.is_multicast() {
            return ethernet::ipv4_multicast_addr(ipv4_addr);
        }

        let next_hop = if self.is_on_local_subnet(ipv4_addr) {
            *ipv4_addr
        } else {
            self.gateway()
        };

        if next_hop.is_unspecified() {
            debug!("No route to {}, using broadcast.", ipv4_addr);
            return Address::MAC_BROADCAST;
        }

        match self.arp_lookup(dev, &next_hop, None) {
            Ok(eth_addr) => eth_addr,
            Err(_) => {
                debug!("{} is not resolved yet, using broadcast.", next_hop);
                Address::MAC_BROADCAST
            }
        }
    }

    /// Opens an IPv4 datagram for transmission.
    ///
    /// If ipv4_addr is None the datagram is addressed to the sender of the
    /// frame in the receive buffer, which must still be held.
    pub fn tx_begin<D: Device>(
        &mut self,
        dev: &mut D,
        ipv4_addr: Option<&Address>,
        protocol: u8,
    ) -> Result<()> {
        if self.tx.open {
            return Err(Error::Busy);
        }

        let eth_addr = match ipv4_addr {
            Some(ipv4_addr) => {
                if ipv4_addr.kind() != Kind::Ipv4 {
                    return Err(Error::KindMismatch);
                }
                self.eth_addr_for_route(dev, ipv4_addr)
            }
            None => {
                let mut eth_addr = [0; 6];
                dev.rx_read(ethernet::fields::SRC_ADDR.start, &mut eth_addr)?;
                Address::mac(eth_addr)
            }
        };

        dev.tx_begin(&eth_addr, eth_types::IPV4)?;

        if let Err(err) = self.fill_header(dev, ipv4_addr, protocol) {
            dev.tx_abort();
            return Err(err);
        }

        self.tx = TxState {
            open: true,
            payload_len: 0,
            overflow: false,
        };

        Ok(())
    }

    fn fill_header<D: Device>(
        &self,
        dev: &mut D,
        ipv4_addr: Option<&Address>,
        protocol: u8,
    ) -> Result<()> {
        dev.tx_append(&[0; IPV4_HEADER_LEN])?;
        dev.tx_write_byte(ETH_HEADER_LEN + fields::VERSION_IHL, 0x45)?;
        dev.tx_write_byte(ETH_HEADER_LEN + fields::TTL, self.config.ttl)?;
        dev.tx_write_byte(ETH_HEADER_LEN + fields::PROTOCOL, protocol)?;
        dev.tx_write(ETH_HEADER_LEN + fields::SRC_ADDR.start, self.local.as_bytes())?;
        match ipv4_addr {
            Some(ipv4_addr) => dev.tx_write(
                ETH_HEADER_LEN + fields::DST_ADDR.start,
                ipv4_addr.as_bytes(),
            ),
            None => dev.dma_copy(
                ETH_HEADER_LEN + fields::DST_ADDR.start,
                ETH_HEADER_LEN + fields::SRC_ADDR.start,
                4,
            ),
        }
    }

    fn check_tx_open(&self) -> Result<()> {
        if self.tx.open {
            Ok(())
        } else {
            Err(Error::Busy)
        }
    }

    /// Returns the number of payload bytes in the open datagram.
    pub fn tx_payload_len(&self) -> usize {
        self.tx.payload_len
    }

    pub fn tx_is_open(&self) -> bool {
        self.tx.open
    }

    /// Appends to the payload. On failure nothing is appended and the
    /// datagram will be discarded by `tx_end(...)`.
    pub fn tx_append<D: Device>(&mut self, dev: &mut D, data: &[u8]) -> Result<()> {
        self.check_tx_open()?;
        match dev.tx_append(data) {
            Ok(()) => {
                self.tx.payload_len += data.len();
                Ok(())
            }
            Err(err) => {
                debug!("Failed to append {} bytes with {:?}.", data.len(), err);
                self.tx.overflow = true;
                Err(err)
            }
        }
    }

    pub fn tx_append_byte<D: Device>(&mut self, dev: &mut D, data: u8) -> Result<()> {
        self.tx_append(dev, &[data])
    }

    pub fn tx_append_word<D: Device>(&mut self, dev: &mut D, data: u16) -> Result<()> {
        let mut buffer = [0; 2];
        NetworkEndian::write_u16(&mut buffer, data);
        self.tx_append(dev, &buffer)
    }

    /// Overwrites payload bytes at an offset from the start of the payload.
    /// The payload length grows if the write ends past it.
    pub fn tx_write<D: Device>(&mut self, dev: &mut D, offset: usize, data: &[u8]) -> Result<()> {
        self.check_tx_open()?;
        let end = offset.checked_add(data.len()).ok_or(Error::Exhausted)?;
        let dev_offset = TX_PAYLOAD_OFFSET
            .checked_add(offset)
            .ok_or(Error::Exhausted)?;
        dev.tx_write(dev_offset, data)?;
        self.tx.payload_len = std::cmp::max(self.tx.payload_len, end);
        Ok(())
    }

    pub fn tx_write_byte<D: Device>(&mut self, dev: &mut D, offset: usize, data: u8) -> Result<()> {
        self.tx_write(dev, offset, &[data])
    }

    pub fn tx_write_word<D: Device>(
        &mut self,
        dev: &mut D,
        offset: usize,
        data: u16,
    ) -> Result<()> {
        let mut buffer = [0; 2];
        NetworkEndian::write_u16(&mut buffer, data);
        self.tx_write(dev, offset, &buffer)
    }

    /// Discards the open datagram.
    pub fn tx_abort<D: Device>(&mut self, dev: &mut D) {
        if self.tx.open {
            self.tx = TxState::default();
            dev.tx_abort();
        }
    }

    /// Fills the identification, length and checksum of the open datagram and
    /// sends it.
    pub fn tx_end<D: Device>(&mut self, dev: &mut D) -> Result<()> {
        self.check_tx_open()?;
        let tx = self.tx;
        self.tx = TxState::default();

        if tx.overflow || IPV4_HEADER_LEN + tx.payload_len > Ipv4Packet::<&[u8]>::MAX_PACKET_LEN {
            warn!(
                "Discarding IPv4 packet with payload of {} bytes that did not fit.",
                tx.payload_len
            );
            dev.tx_abort();
            return Err(Error::Exhausted);
        }

        let identification = self.identification;
        self.identification = self.identification.wrapping_add(1);

        if let Err(err) = Self::fill_trailer(dev, identification, tx.payload_len) {
            dev.tx_abort();
            return Err(err);
        }

        dev.tx_end()
    }

    fn fill_trailer<D: Device>(dev: &mut D, identification: u16, payload_len: usize) -> Result<()> {
        dev.tx_write_word(
            ETH_HEADER_LEN + fields::IDENTIFICATION.start,
            identification,
        )?;
        dev.tx_write_word(
            ETH_HEADER_LEN + fields::LENGTH.start,
            (IPV4_HEADER_LEN + payload_len) as u16,
        )?;
        dev.tx_write_word(ETH_HEADER_LEN + fields::CHECKSUM.start, 0)?;
        let checksum = dev.tx_checksum(ETH_HEADER_LEN, IPV4_HEADER_LEN)?;
        dev.tx_write_word(ETH_HEADER_LEN + fields::CHECKSUM.start, checksum)
    }
}
