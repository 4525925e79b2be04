#![allow(dead_code)]

use std::time::Duration;

use byteorder::{
    ByteOrder,
    NetworkEndian,
};

use tinynet::core::addr::Address;
use tinynet::core::dev::Standard;
use tinynet::core::link::Memory;
use tinynet::core::repr::{
    eth_types,
    ipv4_protocols,
    Arp,
    ArpOp,
    EthernetFrame,
    Icmpv4Packet,
    Ipv4Packet,
};
use tinynet::core::service::{
    Config,
    Interface,
};
use tinynet::core::time::MockEnv;

lazy_static! {
    pub static ref MAC: Address = Address::mac([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
    pub static ref IPV4: Address = Address::ipv4([192, 168, 0, 2]);
    pub static ref NETMASK: Address = Address::ipv4([255, 255, 255, 0]);
    pub static ref GATEWAY: Address = Address::ipv4([192, 168, 0, 1]);
    pub static ref GATEWAY_MAC: Address = Address::mac([0x02, 0x00, 0x00, 0x00, 0x00, 0xFE]);
    pub static ref PEER: Address = Address::ipv4([192, 168, 0, 6]);
    pub static ref PEER_MAC: Address = Address::mac([0x02, 0x00, 0x00, 0x00, 0x00, 0x06]);
    pub static ref TICK: Duration = Duration::from_millis(1);
}

pub type TestInterface = Interface<Standard<Memory>, MockEnv>;

/// Runs a function f with an unconfigured interface over an in memory link.
pub fn run<F, R>(f: F) -> R
where
    F: FnOnce(&mut TestInterface) -> R,
{
    run_with_config(Config::default(), f)
}

pub fn run_with_config<F, R>(config: Config, f: F) -> R
where
    F: FnOnce(&mut TestInterface) -> R,
{
    let _ = env_logger::try_init();

    let dev = Standard::new(Memory::new(), *MAC).unwrap();
    let mut interface = Interface::new(dev, MockEnv::with_tick(*TICK), config);
    f(&mut interface)
}

/// Configures IPV4/NETMASK with GATEWAY and drops the frames this sends.
pub fn configure_static(interface: &mut TestInterface) {
    interface
        .configure_static_ip(Some(&*IPV4), Some(&*GATEWAY), None, Some(&*NETMASK))
        .unwrap();
    sent(interface);
}

/// Queues frames on the link and polls the interface.
pub fn recv(interface: &mut TestInterface, frames: &[Vec<u8>]) -> usize {
    for frame in frames {
        interface.dev_mut().link_mut().push_rx(frame);
    }
    interface.poll()
}

/// Removes and returns the frames sent by the interface.
pub fn sent(interface: &mut TestInterface) -> Vec<Vec<u8>> {
    interface.dev_mut().link_mut().take_tx()
}

/// Returns the frames of an EtherType.
pub fn sent_of_type(interface: &mut TestInterface, ether_type: u16) -> Vec<Vec<u8>> {
    sent(interface)
        .into_iter()
        .filter(|frame| NetworkEndian::read_u16(&frame[12 .. 14]) == ether_type)
        .collect()
}

pub fn eth_frame(dst_addr: &Address, src_addr: &Address, ether_type: u16, payload: &[u8]) -> Vec<u8> {
    let mut buffer = vec![0; EthernetFrame::<&[u8]>::buffer_len(payload.len())];
    {
        let mut frame = EthernetFrame::try_new(&mut buffer[..]).unwrap();
        frame.set_dst_addr(dst_addr).unwrap();
        frame.set_src_addr(src_addr).unwrap();
        frame.set_payload_type(ether_type);
        frame.payload_mut().copy_from_slice(payload);
    }
    buffer
}

pub fn arp_frame(arp: &Arp, dst_addr: &Address) -> Vec<u8> {
    let mut payload = [0; Arp::BUFFER_LEN];
    arp.serialize(&mut payload).unwrap();
    eth_frame(dst_addr, &arp.source_hw_addr, eth_types::ARP, &payload)
}

/// An ARP reply from ipv4_addr/eth_addr to the interface.
pub fn arp_reply(ipv4_addr: &Address, eth_addr: &Address) -> Vec<u8> {
    let arp = Arp {
        op: ArpOp::Reply,
        source_hw_addr: *eth_addr,
        source_proto_addr: *ipv4_addr,
        target_hw_addr: *MAC,
        target_proto_addr: *IPV4,
    };
    arp_frame(&arp, &*MAC)
}

/// An IPv4 packet with a 20 byte header in an Ethernet frame.
pub fn ipv4_frame(
    dst_addr: (&Address, &Address),
    src_addr: (&Address, &Address),
    protocol: u8,
    payload: &[u8],
) -> Vec<u8> {
    let mut buffer = vec![0; Ipv4Packet::<&[u8]>::buffer_len(payload.len())];
    {
        let mut packet = Ipv4Packet::try_new(&mut buffer[..]).unwrap();
        packet.set_version_and_header_len(20);
        packet.set_packet_len((20 + payload.len()) as u16);
        packet.set_ttl(64);
        packet.set_protocol(protocol);
        packet.set_src_addr(src_addr.1).unwrap();
        packet.set_dst_addr(dst_addr.1).unwrap();
        packet.fill_checksum();
        packet.payload_mut().copy_from_slice(payload);
    }
    eth_frame(dst_addr.0, src_addr.0, eth_types::IPV4, &buffer)
}

/// An ICMP echo message of len bytes with a valid checksum.
pub fn icmp_echo(_type: u8, id: u16, seq: u16, len: usize) -> Vec<u8> {
    let mut buffer = vec![0; len];
    {
        let mut packet = Icmpv4Packet::try_new(&mut buffer[..]).unwrap();
        packet.fill_echo_request(id, seq);
        packet.set_type(_type);
        packet.fill_checksum();
    }
    buffer
}

/// An ICMP echo message from PEER to the interface.
pub fn icmp_frame(_type: u8, id: u16, seq: u16) -> Vec<u8> {
    ipv4_frame(
        (&*MAC, &*IPV4),
        (&*PEER_MAC, &*PEER),
        ipv4_protocols::ICMP,
        &icmp_echo(_type, id, seq, 40),
    )
}

/// The IPv4 packet of an Ethernet frame.
pub fn ipv4_packet(frame: &[u8]) -> Ipv4Packet<&[u8]> {
    Ipv4Packet::try_new(&frame[14 ..]).unwrap()
}

pub mod dhcp {
    use super::*;

    lazy_static! {
        pub static ref XID: u32 = 0x1234_5678;
        pub static ref SERVER: Address = Address::ipv4([10, 0, 0, 1]);
        pub static ref SERVER_MAC: Address = Address::mac([0x02, 0x00, 0x00, 0x00, 0x00, 0x10]);
        pub static ref OFFERED: Address = Address::ipv4([10, 0, 0, 5]);
    }

    pub fn config() -> Config {
        Config {
            dhcp_xid: Some(*XID),
            ..Config::default()
        }
    }

    /// A BOOTP reply in a UDP datagram from the server to the client port.
    pub fn reply(xid: u32, yiaddr: &Address, siaddr: &Address, options: &[u8]) -> Vec<u8> {
        let mut msg = vec![0; 240];
        msg[0] = 2;
        msg[1] = 1;
        msg[2] = 6;
        NetworkEndian::write_u32(&mut msg[4 .. 8], xid);
        msg[16 .. 20].copy_from_slice(yiaddr.as_bytes());
        msg[20 .. 24].copy_from_slice(siaddr.as_bytes());
        msg[28 .. 34].copy_from_slice(MAC.as_bytes());
        msg[236 .. 240].copy_from_slice(&[0x63, 0x82, 0x53, 0x63]);
        msg.extend_from_slice(options);

        let mut udp = vec![0; 8];
        NetworkEndian::write_u16(&mut udp[0 .. 2], 67);
        NetworkEndian::write_u16(&mut udp[2 .. 4], 68);
        NetworkEndian::write_u16(&mut udp[4 .. 6], (8 + msg.len()) as u16);
        udp.extend_from_slice(&msg);

        ipv4_frame(
            (&Address::MAC_BROADCAST, &Address::IPV4_BROADCAST),
            (&*SERVER_MAC, &*SERVER),
            ipv4_protocols::UDP,
            &udp,
        )
    }

    pub fn offer(xid: u32) -> Vec<u8> {
        reply(
            xid,
            &*OFFERED,
            &Address::IPV4_UNSPECIFIED,
            &[53, 1, 2, 54, 4, 10, 0, 0, 1, 255],
        )
    }

    /// An ACK for OFFERED with a one hour lease.
    pub fn ack() -> Vec<u8> {
        reply(
            *XID,
            &*OFFERED,
            &*SERVER,
            &[
                53, 1, 5, // ACK
                1, 4, 255, 255, 255, 0, // Subnet mask
                3, 4, 10, 0, 0, 1, // Router
                6, 8, 10, 0, 0, 53, 10, 0, 0, 54, // DNS
                51, 4, 0x00, 0x00, 0x0E, 0x10, // Lease time
                255,
            ],
        )
    }

    pub fn nak() -> Vec<u8> {
        reply(*XID, &Address::IPV4_UNSPECIFIED, &*SERVER, &[53, 1, 6, 255])
    }

    /// Returns the DHCP message of a frame sent by the client.
    pub fn message(frame: &[u8]) -> &[u8] {
        &frame[14 + 20 + 8 ..]
    }

    /// Returns the value of an option in a DHCP message sent by the client.
    pub fn option(frame: &[u8], code: u8) -> Option<Vec<u8>> {
        let msg = message(frame);
        let mut i = 240;
        while i < msg.len() && msg[i] != 255 {
            if msg[i] == 0 {
                i += 1;
                continue;
            }
            let len = msg[i + 1] as usize;
            if msg[i] == code {
                return Some(msg[i + 2 .. i + 2 + len].to_vec());
            }
            i += 2 + len;
        }
        None
    }
}
