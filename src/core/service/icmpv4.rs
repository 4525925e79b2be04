use crate::core::addr::Address;
use crate::core::dev::Device;
use crate::core::repr::icmpv4::fields;
use crate::core::repr::ipv4::fields as ipv4_fields;
use crate::core::repr::{
    eth_types,
    ethernet,
    icmpv4_types,
    ipv4_protocols,
    Icmpv4Packet,
};
use crate::core::service::ipv4::{
    Ipv4,
    ETH_HEADER_LEN,
};
use crate::core::time::Env;
use crate::{
    Error,
    Result,
};

/// Size of an echo request sent by `ping(...)`, including the ICMP header.
pub const PING_LEN: usize = 32;

impl<E: Env> Ipv4<E> {
    /// Enables or disables responding to echo requests.
    pub fn enable_icmp(&mut self, enable: bool) {
        self.icmp_enabled = enable;
    }

    pub fn is_icmp_enabled(&self) -> bool {
        self.icmp_enabled
    }

    /// Returns the sequence number the next `ping(...)` will use.
    pub fn ping_sequence(&self) -> u16 {
        self.ping_seq
    }

    /// Sends an echo request and returns its sequence number.
    ///
    /// Once the request is sent, the handler replaces any previous one and is
    /// called with the sequence number of every echo reply received
    /// afterwards. A failed send leaves the sequence number and handler as
    /// they were.
    pub fn ping<D, F>(&mut self, dev: &mut D, ipv4_addr: &Address, handler: F) -> Result<u16>
    where
        D: Device,
        F: FnMut(u16) + 'static,
    {
        let seq = self.ping_seq;
        let mut buffer = [0; PING_LEN];
        Icmpv4Packet::try_new(&mut buffer[..])?.fill_echo_request(0, seq);

        debug!("Sending ping {} to {}.", seq, ipv4_addr);
        self.tx_begin(dev, Some(ipv4_addr), ipv4_protocols::ICMP)?;
        if let Err(err) = self.tx_append(dev, &buffer) {
            self.tx_abort(dev);
            return Err(err);
        }
        self.tx_end(dev)?;

        self.ping_seq = seq.wrapping_add(1);
        self.echo_handler = Some(Box::new(handler));
        Ok(seq)
    }

    /// Processes an ICMP message at offset in the receive buffer.
    pub(crate) fn process_icmp<D: Device>(
        &mut self,
        dev: &mut D,
        offset: usize,
        len: usize,
    ) -> Result<()> {
        if len < Icmpv4Packet::<&[u8]>::HEADER_LEN {
            debug!("Dropping ICMP packet with length {}.", len);
            return Err(Error::Malformed);
        }

        if dev.rx_checksum(offset, len)? != 0 {
            debug!("Dropping ICMP packet from {} with bad checksum.", self.remote);
            return Err(Error::Checksum);
        }

        match dev.rx_byte(offset + fields::TYPE)? {
            icmpv4_types::ECHO_REPLY => {
                let seq = dev.rx_word(offset + fields::ECHO_SEQ.start)?;
                debug!("Received ping {} reply from {}.", seq, self.remote);
                if let Some(handler) = self.echo_handler.as_mut() {
                    handler(seq);
                }
                Ok(())
            }
            icmpv4_types::ECHO_REQUEST => {
                if !self.icmp_enabled {
                    debug!("Ignoring ping from {}, ICMP is disabled.", self.remote);
                    return Err(Error::Ignored);
                }
                debug!("Got a ping from {}; Sending response...", self.remote);
                self.send_echo_reply(dev, offset, len)
            }
            i => {
                debug!("Ignoring ICMP packet with type {}.", i);
                Err(Error::Ignored)
            }
        }
    }

    /// Turns the received echo request into a reply in the transmit buffer.
    fn send_echo_reply<D: Device>(&mut self, dev: &mut D, offset: usize, len: usize) -> Result<()> {
        let mut eth_addr = [0; 6];
        dev.rx_read(ethernet::fields::SRC_ADDR.start, &mut eth_addr)?;

        let mut dst_addr = [0; 4];
        dev.rx_read(ETH_HEADER_LEN + ipv4_fields::DST_ADDR.start, &mut dst_addr)?;
        let local = self.local;

        dev.tx_begin(&Address::mac(eth_addr), eth_types::IPV4)?;

        let res = (|| -> Result<()> {
            let header_len = offset - ETH_HEADER_LEN;
            dev.dma_copy(ETH_HEADER_LEN, ETH_HEADER_LEN, header_len + len)?;
            dev.tx_swap(
                ETH_HEADER_LEN + ipv4_fields::SRC_ADDR.start,
                ETH_HEADER_LEN + ipv4_fields::DST_ADDR.start,
                4,
            )?;

            // Echo requests to a broadcast or multicast address are answered
            // from the local address.
            if local != dst_addr[..] {
                dev.tx_write(
                    ETH_HEADER_LEN + ipv4_fields::SRC_ADDR.start,
                    local.as_bytes(),
                )?;
                dev.tx_write_word(ETH_HEADER_LEN + ipv4_fields::CHECKSUM.start, 0)?;
                let checksum = dev.tx_checksum(ETH_HEADER_LEN, header_len)?;
                dev.tx_write_word(ETH_HEADER_LEN + ipv4_fields::CHECKSUM.start, checksum)?;
            }

            dev.tx_write_byte(offset + fields::TYPE, icmpv4_types::ECHO_REPLY)?;
            dev.tx_write_word(offset + fields::CHECKSUM.start, 0)?;
            let checksum = dev.tx_checksum(offset, len)?;
            dev.tx_write_word(offset + fields::CHECKSUM.start, checksum)
        })();

        match res {
            Ok(()) => dev.tx_end(),
            Err(err) => {
                dev.tx_abort();
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::core::check::internet_checksum;
    use crate::core::dev::Standard;
    use crate::core::link::Memory;
    use crate::core::repr::{
        EthernetFrame,
        Ipv4Packet,
    };
    use crate::core::service::Config;
    use crate::core::time::MockEnv;

    const MAC: Address = Address::mac([0x02, 0, 0, 0, 0, 1]);

    const PEER_MAC: Address = Address::mac([0x02, 0, 0, 0, 0, 2]);

    fn setup() -> (Standard<Memory>, Ipv4<MockEnv>) {
        let dev = Standard::new(Memory::new(), MAC).unwrap();
        let mut ipv4 = Ipv4::new(MockEnv::new(), Config::default());
        ipv4.local = Address::ipv4([192, 168, 0, 2]);
        ipv4.netmask = Address::ipv4([255, 255, 255, 0]);
        ipv4.update_subnet();
        (dev, ipv4)
    }

    /// Builds an ICMP packet in a frame from PEER_MAC and 192.168.0.6.
    fn icmp_frame(_type: u8, seq: u16, dst_addr: [u8; 4]) -> Vec<u8> {
        let ip_len = 20 + PING_LEN;
        let mut buffer = vec![0; ETH_HEADER_LEN + ip_len];
        {
            let mut frame = EthernetFrame::try_new(&mut buffer[..]).unwrap();
            frame.set_dst_addr(&MAC).unwrap();
            frame.set_src_addr(&PEER_MAC).unwrap();
            frame.set_payload_type(eth_types::IPV4);

            let mut packet = Ipv4Packet::try_new(frame.payload_mut()).unwrap();
            packet.set_version_and_header_len(20);
            packet.set_packet_len(ip_len as u16);
            packet.set_ttl(64);
            packet.set_protocol(ipv4_protocols::ICMP);
            packet.set_src_addr(&Address::ipv4([192, 168, 0, 6])).unwrap();
            packet.set_dst_addr(&Address::ipv4(dst_addr)).unwrap();
            packet.fill_checksum();

            let mut icmp = Icmpv4Packet::try_new(packet.payload_mut()).unwrap();
            icmp.fill_echo_request(0x1234, seq);
            icmp.set_type(_type);
            icmp.fill_checksum();
        }
        buffer
    }

    fn recv(dev: &mut Standard<Memory>, ipv4: &mut Ipv4<MockEnv>, frame: &[u8]) -> Result<()> {
        dev.link_mut().push_rx(frame);
        let len = dev.rx_begin();
        let res = ipv4.process(dev, len - ETH_HEADER_LEN);
        dev.rx_end();
        res
    }

    #[test]
    fn test_ping_sequence() {
        let (mut dev, mut ipv4) = setup();
        let target = Address::ipv4([192, 168, 0, 6]);
        assert_eq!(ipv4.ping(&mut dev, &target, |_| {}).unwrap(), 0);
        assert_eq!(ipv4.ping(&mut dev, &target, |_| {}).unwrap(), 1);
        assert_eq!(ipv4.ping_sequence(), 2);

        let frames: Vec<Vec<u8>> = dev.link_mut()
            .take_tx()
            .into_iter()
            .filter(|frame| frame[12 .. 14] == [0x08, 0x00])
            .collect();
        assert_eq!(frames.len(), 2);

        for (seq, frame) in frames.iter().enumerate() {
            let icmp = &frame[ETH_HEADER_LEN + 20 .. ETH_HEADER_LEN + 20 + PING_LEN];
            assert_eq!(icmp[0], icmpv4_types::ECHO_REQUEST);
            assert_eq!(&icmp[6 .. 8], &[0, seq as u8]);
            assert_eq!(internet_checksum(icmp), 0);
        }
    }

    #[test]
    fn test_ping_send_failure() {
        let (mut dev, mut ipv4) = setup();
        let replies = Rc::new(RefCell::new(Vec::new()));
        let broadcast = Address::ipv4([192, 168, 0, 255]);
        {
            let replies = replies.clone();
            ipv4.ping(&mut dev, &broadcast, move |seq| replies.borrow_mut().push(seq))
                .unwrap();
        }

        dev.link_mut().fail_sends(1);
        assert_matches!(
            ipv4.ping(&mut dev, &broadcast, |_| panic!("handler replaced")),
            Err(Error::Link(_))
        );
        assert_eq!(ipv4.ping_sequence(), 1);

        recv(
            &mut dev,
            &mut ipv4,
            &icmp_frame(icmpv4_types::ECHO_REPLY, 0, [192, 168, 0, 2]),
        ).unwrap();
        assert_eq!(*replies.borrow(), vec![0]);
        assert_eq!(ipv4.ping(&mut dev, &broadcast, |_| {}).unwrap(), 1);
    }

    #[test]
    fn test_echo_reply_calls_handler() {
        let (mut dev, mut ipv4) = setup();
        let replies = Rc::new(RefCell::new(Vec::new()));
        {
            let replies = replies.clone();
            ipv4.ping(&mut dev, &Address::ipv4([192, 168, 0, 6]), move |seq| {
                replies.borrow_mut().push(seq)
            }).unwrap();
        }

        recv(
            &mut dev,
            &mut ipv4,
            &icmp_frame(icmpv4_types::ECHO_REPLY, 0, [192, 168, 0, 2]),
        ).unwrap();
        assert_eq!(*replies.borrow(), vec![0]);
    }

    #[test]
    fn test_bad_checksum_is_dropped() {
        let (mut dev, mut ipv4) = setup();
        let mut frame = icmp_frame(icmpv4_types::ECHO_REQUEST, 3, [192, 168, 0, 2]);
        let last = frame.len() - 1;
        frame[last] ^= 0x01;

        assert_matches!(recv(&mut dev, &mut ipv4, &frame), Err(Error::Checksum));
        assert!(dev.link_mut().take_tx().is_empty());
    }

    #[test]
    fn test_echo_request_is_answered() {
        let (mut dev, mut ipv4) = setup();
        let request = icmp_frame(icmpv4_types::ECHO_REQUEST, 3, [192, 168, 0, 2]);
        recv(&mut dev, &mut ipv4, &request).unwrap();

        let frames = dev.link_mut().take_tx();
        assert_eq!(frames.len(), 1);
        let frame = EthernetFrame::try_new(&frames[0][..]).unwrap();
        assert_eq!(frame.dst_addr(), PEER_MAC);
        assert_eq!(frame.src_addr(), MAC);

        let packet = Ipv4Packet::try_new(frame.payload()).unwrap();
        assert_matches!(packet.check_encoding(), Ok(()));
        assert_eq!(packet.src_addr(), Address::ipv4([192, 168, 0, 2]));
        assert_eq!(packet.dst_addr(), Address::ipv4([192, 168, 0, 6]));

        let icmp = Icmpv4Packet::try_new(packet.payload()).unwrap();
        assert_matches!(icmp.check_encoding(), Ok(()));
        assert_eq!(icmp._type(), icmpv4_types::ECHO_REPLY);
        assert_eq!(icmp.echo_id(), 0x1234);
        assert_eq!(icmp.echo_seq(), 3);
        assert_eq!(icmp.payload(), &request[ETH_HEADER_LEN + 28 ..]);
    }

    #[test]
    fn test_broadcast_echo_request_answered_from_local() {
        let (mut dev, mut ipv4) = setup();
        recv(
            &mut dev,
            &mut ipv4,
            &icmp_frame(icmpv4_types::ECHO_REQUEST, 3, [192, 168, 0, 255]),
        ).unwrap();

        let frames = dev.link_mut().take_tx();
        let packet = Ipv4Packet::try_new(&frames[0][ETH_HEADER_LEN ..]).unwrap();
        assert_matches!(packet.check_encoding(), Ok(()));
        assert_eq!(packet.src_addr(), Address::ipv4([192, 168, 0, 2]));
    }

    #[test]
    fn test_echo_request_ignored_when_disabled() {
        let (mut dev, mut ipv4) = setup();
        ipv4.enable_icmp(false);
        let request = icmp_frame(icmpv4_types::ECHO_REQUEST, 3, [192, 168, 0, 2]);
        assert_matches!(recv(&mut dev, &mut ipv4, &request), Err(Error::Ignored));
        assert!(dev.link_mut().take_tx().is_empty());
    }
}
