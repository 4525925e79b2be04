use std::time::Duration;

use byteorder::{
    ByteOrder,
    NetworkEndian,
};

use crate::core::addr::{
    Address,
    Kind,
};
use crate::core::arp_cache::{
    DNS_INDEX,
    GATEWAY_INDEX,
};
use crate::core::dev::Device;
use crate::core::repr::dhcp::{
    self,
    fields,
    message_types,
    ops,
    options,
};
use crate::core::repr::{
    arp_hw_types,
    ethernet,
    ipv4_protocols,
    udp,
};
use crate::core::service::ipv4::Ipv4;
use crate::core::time::Env;
use crate::{
    Error,
    Result,
};

/// Options asked from the server in every request.
const PARAMETER_REQUEST_LIST: [u8; 4] = [
    options::SUBNET_MASK,
    options::ROUTER,
    options::DNS,
    options::LEASE_TIME,
];

/// Lease time meaning the lease never expires.
const INFINITE_LEASE: u32 = 0xFFFF_FFFF;

/// State of the DHCP client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DhcpStatus {
    /// Addresses are configured statically.
    Disabled,
    /// DHCP is enabled but no DISCOVER has been sent yet.
    Reset,
    /// A DISCOVER was sent, waiting on an OFFER.
    Discovery,
    /// A REQUEST for an offered address was sent, waiting on an ACK.
    Requested,
    /// The lease was acknowledged.
    Bound,
    /// A REQUEST to extend the lease was sent, waiting on an ACK.
    Renewing,
}

impl<E: Env> Ipv4<E> {
    /// Configures addresses statically and disables DHCP. Addresses that are
    /// None keep their current value.
    ///
    /// ARP requests are sent for the gateway and DNS server when they are on
    /// the local subnet. With a non zero `Config::arp_timeout` each one is
    /// waited on in turn.
    pub fn configure_static_ip<D: Device>(
        &mut self,
        dev: &mut D,
        ipv4_addr: Option<&Address>,
        gateway: Option<&Address>,
        dns: Option<&Address>,
        netmask: Option<&Address>,
    ) -> Result<()> {
        let addrs = [ipv4_addr, gateway, dns, netmask];
        if addrs
            .iter()
            .any(|addr| addr.map_or(false, |addr| addr.kind() != Kind::Ipv4))
        {
            return Err(Error::KindMismatch);
        }

        self.dhcp_status = DhcpStatus::Disabled;
        self.dhcp_renew_at = None;

        if let Some(ipv4_addr) = ipv4_addr {
            self.local = *ipv4_addr;
        }
        if let Some(gateway) = gateway {
            self.arp_table.set_reserved(GATEWAY_INDEX, gateway);
        }
        if let Some(dns) = dns {
            self.arp_table.set_reserved(DNS_INDEX, dns);
        }
        if let Some(netmask) = netmask {
            self.netmask = *netmask;
        }
        self.update_subnet();

        debug!(
            "Configured static address {}/{} with gateway {} and DNS {}.",
            self.local,
            self.netmask,
            self.gateway(),
            self.dns()
        );

        let timeout = match self.config.arp_timeout {
            timeout if timeout > Duration::from_secs(0) => Some(timeout),
            _ => None,
        };

        for server in [self.gateway(), self.dns()].iter() {
            if server.is_unspecified() || !self.is_on_local_subnet(server) {
                continue;
            }
            match self.arp_lookup(dev, server, timeout) {
                Ok(eth_addr) => debug!("Resolved {} to {}.", server, eth_addr),
                Err(err) => debug!("{} is not resolved yet ({:?}).", server, err),
            }
        }

        Ok(())
    }

    /// Enables DHCP and broadcasts a DISCOVER.
    ///
    /// The local address reads as unspecified until the server acknowledges
    /// a request. If the DISCOVER can not be sent it is retried by
    /// `poll(...)`.
    pub fn configure_dhcp<D: Device>(&mut self, dev: &mut D) -> Result<()> {
        self.dhcp_status = DhcpStatus::Reset;
        self.dhcp_renew_at = None;
        self.dhcp_xid = self.config.dhcp_xid.unwrap_or_else(rand::random);
        self.local = Address::IPV4_UNSPECIFIED;
        self.netmask = Address::IPV4_UNSPECIFIED;
        self.offered = Address::IPV4_UNSPECIFIED;
        self.dhcp_server = Address::IPV4_UNSPECIFIED;
        self.update_subnet();

        self.send_dhcp(dev, DhcpStatus::Discovery)
    }

    /// Runs the DHCP timers.
    pub fn poll<D: Device>(&mut self, dev: &mut D) -> Result<()> {
        match self.dhcp_status {
            DhcpStatus::Reset => self.send_dhcp(dev, DhcpStatus::Discovery),
            DhcpStatus::Bound => match self.dhcp_renew_at {
                Some(renew_at) if self.env.now_instant() >= renew_at => {
                    debug!("Renewing DHCP lease with {}.", self.dhcp_server);
                    self.send_dhcp(dev, DhcpStatus::Renewing)?;
                    self.dhcp_renew_at = None;
                    Ok(())
                }
                _ => Ok(()),
            },
            _ => Ok(()),
        }
    }

    /// Sends the DHCP message leading to status and moves to status on
    /// success.
    fn send_dhcp<D: Device>(&mut self, dev: &mut D, status: DhcpStatus) -> Result<()> {
        let dst_addr = match status {
            DhcpStatus::Renewing => self.dhcp_server,
            _ => Address::IPV4_BROADCAST,
        };

        self.tx_begin(dev, Some(&dst_addr), ipv4_protocols::UDP)?;
        if let Err(err) = self.append_dhcp(dev, status) {
            self.tx_abort(dev);
            return Err(err);
        }
        self.tx_end(dev)?;

        self.dhcp_status = status;
        Ok(())
    }

    fn append_dhcp<D: Device>(&mut self, dev: &mut D, status: DhcpStatus) -> Result<()> {
        let message_type = match status {
            DhcpStatus::Discovery => message_types::DISCOVER,
            DhcpStatus::Requested | DhcpStatus::Renewing => message_types::REQUEST,
            _ => return Err(Error::Ignored),
        };

        // Fields without a value stay zero, as does the UDP checksum.
        self.tx_append(dev, &[0; udp::HEADER_LEN])?;
        self.tx_write_word(dev, udp::fields::SRC_PORT.start, dhcp::CLIENT_PORT)?;
        self.tx_write_word(dev, udp::fields::DST_PORT.start, dhcp::SERVER_PORT)?;

        let base = udp::HEADER_LEN;
        let eth_addr = dev.ethernet_addr();
        let mut xid = [0; 4];
        NetworkEndian::write_u32(&mut xid, self.dhcp_xid);

        self.tx_append(dev, &[0; fields::OPTIONS])?;
        self.tx_write_byte(dev, base + fields::OP, ops::BOOT_REQUEST)?;
        self.tx_write_byte(dev, base + fields::HTYPE, arp_hw_types::ETHERNET as u8)?;
        self.tx_write_byte(dev, base + fields::HLEN, eth_addr.size() as u8)?;
        self.tx_write(dev, base + fields::XID.start, &xid)?;
        if status == DhcpStatus::Renewing {
            let ciaddr = self.local;
            self.tx_write(dev, base + fields::CIADDR.start, ciaddr.as_bytes())?;
        }
        self.tx_write(dev, base + fields::CHADDR.start, eth_addr.as_bytes())?;
        self.tx_write(dev, base + fields::MAGIC_COOKIE.start, &dhcp::MAGIC_COOKIE)?;

        self.tx_append(dev, &[options::MESSAGE_TYPE, 1, message_type])?;
        if status == DhcpStatus::Requested {
            let (offered, server) = (self.offered, self.dhcp_server);
            self.tx_append(dev, &[options::REQUESTED_IP, 4])?;
            self.tx_append(dev, offered.as_bytes())?;
            if !server.is_unspecified() {
                self.tx_append(dev, &[options::SERVER_ID, 4])?;
                self.tx_append(dev, server.as_bytes())?;
            }
        }
        self.tx_append(dev, &[
            options::PARAMETER_REQUEST_LIST,
            PARAMETER_REQUEST_LIST.len() as u8,
        ])?;
        self.tx_append(dev, &PARAMETER_REQUEST_LIST)?;
        self.tx_append_byte(dev, options::END)?;

        let udp_len = self.tx_payload_len() as u16;
        self.tx_write_word(dev, udp::fields::LENGTH.start, udp_len)
    }

    /// Processes a UDP datagram at offset in the receive buffer. Only DHCP
    /// replies to the client port are handled.
    pub(crate) fn process_udp<D: Device>(
        &mut self,
        dev: &mut D,
        offset: usize,
        len: usize,
    ) -> Result<()> {
        if len < udp::HEADER_LEN {
            debug!("Dropping UDP packet with length {}.", len);
            return Err(Error::Malformed);
        }

        let dst_port = dev.rx_word(offset + udp::fields::DST_PORT.start)?;
        if dst_port != dhcp::CLIENT_PORT {
            debug!("Ignoring UDP packet to port {}.", dst_port);
            return Err(Error::Ignored);
        }

        let msg = Message {
            offset: offset + udp::HEADER_LEN,
            len: len - udp::HEADER_LEN,
        };

        match self.dhcp_status {
            DhcpStatus::Discovery => self.process_dhcp_offer(dev, &msg),
            DhcpStatus::Requested | DhcpStatus::Renewing => self.process_dhcp_ack(dev, &msg),
            status => {
                debug!("Ignoring DHCP message in status {:?}.", status);
                Err(Error::Ignored)
            }
        }
    }

    /// Checks a DHCP message is a reply to our transaction.
    fn check_dhcp_reply<D: Device>(&self, dev: &D, msg: &Message) -> Result<()> {
        if msg.len < fields::OPTIONS {
            debug!("Dropping DHCP message with length {}.", msg.len);
            return Err(Error::Malformed);
        }

        let mut cookie = [0; 4];
        dev.rx_read(msg.offset + fields::MAGIC_COOKIE.start, &mut cookie)?;
        if dev.rx_byte(msg.offset + fields::OP)? != ops::BOOT_REPLY
            || cookie != dhcp::MAGIC_COOKIE
        {
            debug!("Dropping DHCP message that is not a BOOTP reply.");
            return Err(Error::Malformed);
        }

        let mut xid = [0; 4];
        dev.rx_read(msg.offset + fields::XID.start, &mut xid)?;
        if NetworkEndian::read_u32(&xid) != self.dhcp_xid {
            debug!(
                "Ignoring DHCP message with transaction {:08X}.",
                NetworkEndian::read_u32(&xid)
            );
            return Err(Error::Ignored);
        }

        Ok(())
    }

    fn process_dhcp_offer<D: Device>(&mut self, dev: &mut D, msg: &Message) -> Result<()> {
        self.check_dhcp_reply(dev, msg)?;

        match msg.message_type(dev)? {
            Some(message_types::OFFER) => {}
            message_type => {
                debug!("Ignoring DHCP message type {:?} during discovery.", message_type);
                return Err(Error::Ignored);
            }
        }

        let offered = msg.read_addr(dev, fields::YIADDR.start)?;
        if offered.is_unspecified() {
            debug!("Dropping DHCP offer without an address.");
            return Err(Error::Malformed);
        }

        let server = match msg.option_addr(dev, options::SERVER_ID)? {
            Some(server) if !server.is_unspecified() => server,
            _ => {
                let siaddr = msg.read_addr(dev, fields::SIADDR.start)?;
                if siaddr.is_unspecified() {
                    self.remote
                } else {
                    siaddr
                }
            }
        };
        if server.is_unspecified() {
            debug!("Dropping DHCP offer without a server address.");
            return Err(Error::Malformed);
        }

        debug!("Received DHCP offer of {} from {}.", offered, server);

        self.offered = offered;
        self.dhcp_server = server;
        self.arp_table.insert_pending(&server);
        if self.remote == server {
            let mut eth_addr = [0; 6];
            dev.rx_read(ethernet::fields::SRC_ADDR.start, &mut eth_addr)?;
            self.arp_table
                .set_eth_addr_for_ip(&server, &Address::mac(eth_addr));
        }

        self.send_dhcp(dev, DhcpStatus::Requested)
    }

    fn process_dhcp_ack<D: Device>(&mut self, dev: &mut D, msg: &Message) -> Result<()> {
        self.check_dhcp_reply(dev, msg)?;

        match msg.message_type(dev)? {
            Some(message_types::ACK) => {}
            Some(message_types::NAK) => {
                warn!("DHCP server {} refused request, restarting discovery.", self.dhcp_server);
                return self.configure_dhcp(dev);
            }
            message_type => {
                debug!("Ignoring DHCP message type {:?} while requesting.", message_type);
                return Err(Error::Ignored);
            }
        }

        let local = msg.read_addr(dev, fields::YIADDR.start)?;
        let local = if local.is_unspecified() {
            self.offered
        } else {
            local
        };
        if local.is_unspecified() {
            debug!("Dropping DHCP ACK without an address.");
            return Err(Error::Malformed);
        }

        if let Some(netmask) = msg.option_addr(dev, options::SUBNET_MASK)? {
            self.netmask = netmask;
        }
        if let Some(gateway) = msg.option_addr(dev, options::ROUTER)? {
            self.arp_table.set_reserved(GATEWAY_INDEX, &gateway);
        }
        if let Some(dns) = msg.option_addr(dev, options::DNS)? {
            self.arp_table.set_reserved(DNS_INDEX, &dns);
        }

        self.dhcp_renew_at = match msg.option(dev, options::LEASE_TIME)? {
            Some((value, 4)) => {
                let mut lease = [0; 4];
                dev.rx_read(value, &mut lease)?;
                match NetworkEndian::read_u32(&lease) {
                    INFINITE_LEASE => None,
                    lease => Some(self.env.now_instant() + Duration::from_secs(lease as u64 / 2)),
                }
            }
            _ => None,
        };

        self.local = local;
        self.offered = local;
        self.update_subnet();
        self.dhcp_status = DhcpStatus::Bound;

        debug!(
            "DHCP bound to {}/{} with gateway {} and DNS {}.",
            self.local,
            self.netmask,
            self.gateway(),
            self.dns()
        );

        Ok(())
    }
}

/// Location of a DHCP message in the receive buffer.
struct Message {
    offset: usize,
    len: usize,
}

impl Message {
    fn read_addr<D: Device>(&self, dev: &D, field: usize) -> Result<Address> {
        let mut addr = [0; 4];
        dev.rx_read(self.offset + field, &mut addr)?;
        Ok(Address::ipv4(addr))
    }

    /// Finds an option, returning the offset of its value in the receive
    /// buffer and its length.
    fn option<D: Device>(&self, dev: &D, code: u8) -> Result<Option<(usize, usize)>> {
        let end = self.offset + self.len;
        let mut i = self.offset + fields::OPTIONS;

        while i < end {
            match dev.rx_byte(i)? {
                options::END => break,
                options::PAD => {
                    i += 1;
                    continue;
                }
                _ => {}
            }

            if i + 2 > end {
                return Err(Error::Malformed);
            }

            let option_len = dev.rx_byte(i + 1)? as usize;
            if i + 2 + option_len > end {
                debug!("Dropping DHCP message with truncated option at {}.", i);
                return Err(Error::Malformed);
            }

            if dev.rx_byte(i)? == code {
                return Ok(Some((i + 2, option_len)));
            }

            i += 2 + option_len;
        }

        Ok(None)
    }

    fn message_type<D: Device>(&self, dev: &D) -> Result<Option<u8>> {
        match self.option(dev, options::MESSAGE_TYPE)? {
            Some((value, len)) if len >= 1 => Ok(Some(dev.rx_byte(value)?)),
            _ => Ok(None),
        }
    }

    /// Reads the first address of an address option.
    fn option_addr<D: Device>(&self, dev: &D, code: u8) -> Result<Option<Address>> {
        match self.option(dev, code)? {
            Some((value, len)) if len >= 4 => {
                let mut addr = [0; 4];
                dev.rx_read(value, &mut addr)?;
                Ok(Some(Address::ipv4(addr)))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dev::Standard;
    use crate::core::link::Memory;
    use crate::core::service::ipv4::TX_PAYLOAD_OFFSET;
    use crate::core::service::Config;
    use crate::core::time::MockEnv;

    const MAC: Address = Address::mac([0x02, 0, 0, 0, 0, 1]);

    fn setup() -> (Standard<Memory>, Ipv4<MockEnv>) {
        let dev = Standard::new(Memory::new(), MAC).unwrap();
        let config = Config {
            dhcp_xid: Some(0xDEADBEEF),
            ..Config::default()
        };
        (dev, Ipv4::new(MockEnv::new(), config))
    }

    /// Returns the DHCP message of a frame sent by the client.
    fn dhcp_message(frame: &[u8]) -> &[u8] {
        &frame[TX_PAYLOAD_OFFSET + udp::HEADER_LEN ..]
    }

    #[test]
    fn test_discover_layout() {
        let (mut dev, mut ipv4) = setup();
        ipv4.configure_dhcp(&mut dev).unwrap();
        assert_eq!(ipv4.dhcp_status(), DhcpStatus::Discovery);

        let frames = dev.link_mut().take_tx();
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(&frame[.. 6], Address::MAC_BROADCAST.as_bytes());

        let udp_header = &frame[TX_PAYLOAD_OFFSET .. TX_PAYLOAD_OFFSET + 8];
        assert_eq!(&udp_header[.. 4], &[0, 68, 0, 67]);
        let udp_len = NetworkEndian::read_u16(&udp_header[4 .. 6]) as usize;
        assert_eq!(udp_len, 8 + 240 + 3 + 6 + 1);

        let msg = dhcp_message(frame);
        assert_eq!(&msg[.. 8], &[1, 1, 6, 0, 0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(&msg[fields::CHADDR.start .. fields::CHADDR.start + 6], MAC.as_bytes());
        assert_eq!(&msg[fields::MAGIC_COOKIE], &dhcp::MAGIC_COOKIE);
        assert_eq!(
            &msg[fields::OPTIONS .. fields::OPTIONS + 10],
            &[53, 1, 1, 55, 4, 1, 3, 6, 51, 255]
        );
    }

    #[test]
    fn test_static_ip_disables_dhcp() {
        let (mut dev, mut ipv4) = setup();
        ipv4.configure_dhcp(&mut dev).unwrap();
        assert!(ipv4.is_using_dhcp());

        ipv4.configure_static_ip(
            &mut dev,
            Some(&Address::ipv4([10, 0, 0, 7])),
            None,
            None,
            Some(&Address::ipv4([255, 0, 0, 0])),
        ).unwrap();
        assert_eq!(ipv4.dhcp_status(), DhcpStatus::Disabled);
        assert_eq!(ipv4.ip(), Address::ipv4([10, 0, 0, 7]));
        assert_eq!(ipv4.subnet(), Address::ipv4([10, 0, 0, 0]));
        assert_eq!(ipv4.broadcast(), Address::ipv4([10, 255, 255, 255]));

        // Only some addresses supplied, subnet is still recomputed.
        ipv4.configure_static_ip(&mut dev, None, None, None, Some(&Address::ipv4([255, 255, 0, 0])))
            .unwrap();
        assert_eq!(ipv4.ip(), Address::ipv4([10, 0, 0, 7]));
        assert_eq!(ipv4.broadcast(), Address::ipv4([10, 0, 255, 255]));
    }

    #[test]
    fn test_static_ip_kind_mismatch() {
        let (mut dev, mut ipv4) = setup();
        assert_matches!(
            ipv4.configure_static_ip(&mut dev, Some(&MAC), None, None, None),
            Err(Error::KindMismatch)
        );
        assert_eq!(ipv4.ip(), Address::IPV4_UNSPECIFIED);
    }

    #[test]
    fn test_static_ip_resolves_gateway() {
        let (mut dev, mut ipv4) = setup();
        ipv4.configure_static_ip(
            &mut dev,
            Some(&Address::ipv4([10, 0, 0, 7])),
            Some(&Address::ipv4([10, 0, 0, 1])),
            Some(&Address::ipv4([8, 8, 8, 8])),
            Some(&Address::ipv4([255, 255, 255, 0])),
        ).unwrap();

        // The off subnet DNS server is reached through the gateway.
        let frames = dev.link_mut().take_tx();
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][12 .. 14], &[0x08, 0x06]);
        assert_eq!(&frames[0][38 .. 42], &[10, 0, 0, 1]);
        assert_eq!(ipv4.gateway(), Address::ipv4([10, 0, 0, 1]));
        assert_eq!(ipv4.dns(), Address::ipv4([8, 8, 8, 8]));
    }

    #[test]
    fn test_udp_to_other_port_is_ignored() {
        let (mut dev, mut ipv4) = setup();
        ipv4.configure_dhcp(&mut dev).unwrap();

        let mut frame = vec![0; TX_PAYLOAD_OFFSET + 8];
        frame[12] = 0x08;
        frame[14] = 0x45;
        frame[17] = 28;
        frame[23] = ipv4_protocols::UDP;
        frame[TX_PAYLOAD_OFFSET + 3] = 53;
        dev.link_mut().push_rx(&frame);
        let len = dev.rx_begin();

        assert_matches!(ipv4.process(&mut dev, len - 14), Err(Error::Ignored));
        assert_eq!(ipv4.dhcp_status(), DhcpStatus::Discovery);
    }
}
