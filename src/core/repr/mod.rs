//! Serialization and deserialization of network packets.
//!
//! The `repr` module provides wire constants and in place views for packets
//! and frames at different network layers.

pub mod arp;
pub mod dhcp;
pub mod ethernet;
pub mod icmpv4;
pub mod ipv4;
pub mod udp;

pub use self::arp::{
    hw_types as arp_hw_types,
    proto_types as arp_proto_types,
    Arp,
    Op as ArpOp,
};
pub use self::ethernet::{
    eth_types,
    Frame as EthernetFrame,
};
pub use self::icmpv4::{
    types as icmpv4_types,
    Packet as Icmpv4Packet,
};
pub use self::ipv4::{
    protocols as ipv4_protocols,
    Packet as Ipv4Packet,
};
