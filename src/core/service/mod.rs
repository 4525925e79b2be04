//! Packet processing services for the network stack.
//!
//! The `service` module deals with packet transmission and reception logic.
//! An `Interface` owns a device and an IPv4 engine and dispatches received
//! frames between them.

pub mod arp;
pub mod dhcp;
pub mod icmpv4;
pub mod ipv4;

use std::time::Duration;

use crate::core::addr::Address;
use crate::core::dev::{
    Device,
    TxStatus,
};
use crate::core::repr::eth_types;
use crate::core::repr::ethernet::fields;
use crate::core::time::{
    Env,
    SystemEnv,
};
use crate::{
    Error,
    Result,
};

pub use self::dhcp::DhcpStatus;
pub use self::ipv4::Ipv4;

/// Tunables for an `Interface`.
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of ARP table entries in addition to the gateway and DNS ones.
    pub arp_entries: usize,
    /// Time to wait on ARP replies for the gateway and DNS server when
    /// configuring static addresses. Zero does not wait.
    pub arp_timeout: Duration,
    /// Answer echo requests.
    pub icmp_enabled: bool,
    pub ttl: u8,
    /// DHCP transaction ID, a random one is used if None.
    pub dhcp_xid: Option<u32>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            arp_entries: 6,
            arp_timeout: Duration::from_secs(0),
            icmp_enabled: true,
            ttl: 64,
            dhcp_xid: None,
        }
    }
}

/// An interface for sending and receiving network packets.
pub struct Interface<D: Device, E: Env = SystemEnv> {
    dev: D,
    ipv4: Ipv4<E>,
    tx_error_handler: Option<Box<dyn FnMut()>>,
}

impl<D: Device, E: Env> Interface<D, E> {
    pub fn new(dev: D, env: E, config: Config) -> Interface<D, E> {
        Interface {
            dev,
            ipv4: Ipv4::new(env, config),
            tx_error_handler: None,
        }
    }

    pub fn dev(&self) -> &D {
        &self.dev
    }

    pub fn dev_mut(&mut self) -> &mut D {
        &mut self.dev
    }

    pub fn ipv4(&self) -> &Ipv4<E> {
        &self.ipv4
    }

    /// Returns the device and IPv4 engine, e.g. to build a datagram with
    /// `Ipv4::tx_begin(...)`.
    pub fn parts_mut(&mut self) -> (&mut D, &mut Ipv4<E>) {
        (&mut self.dev, &mut self.ipv4)
    }

    pub fn ethernet_addr(&self) -> Address {
        self.dev.ethernet_addr()
    }

    /// Sets the handler called when the device reports a failed
    /// transmission, replacing any previous one.
    pub fn set_tx_error_handler<F>(&mut self, handler: F)
    where
        F: FnMut() + 'static,
    {
        self.tx_error_handler = Some(Box::new(handler));
    }

    /// Runs timers and processes every frame available from the device.
    /// Returns the number of frames received.
    pub fn poll(&mut self) -> usize {
        if let Err(err) = self.ipv4.poll(&mut self.dev) {
            debug!("IPv4 timers failed with {:?}.", err);
        }
        self.check_tx_status();

        let mut count = 0;
        loop {
            let rx_len = self.dev.rx_begin();
            if rx_len == 0 {
                break;
            }

            if let Err(err) = self.recv(rx_len) {
                debug!("Dropping frame of {} bytes with {:?}.", rx_len, err);
            }

            self.check_tx_status();
            self.dev.rx_end();
            count += 1;
        }

        count
    }

    fn recv(&mut self, rx_len: usize) -> Result<()> {
        if rx_len < fields::PAYLOAD.start {
            return Err(Error::Malformed);
        }

        let mut dst_addr = [0; 6];
        self.dev.rx_read(fields::DST_ADDR.start, &mut dst_addr)?;
        let dst_addr = Address::mac(dst_addr);
        if dst_addr != self.dev.ethernet_addr() && !dst_addr.is_broadcast()
            && !dst_addr.is_multicast()
        {
            debug!("Ignoring frame for {}.", dst_addr);
            return Err(Error::Ignored);
        }

        let ether_type = self.dev.rx_word(fields::PAYLOAD_TYPE.start)?;
        self.dispatch(ether_type, rx_len)
    }

    /// Routes the frame in the receive buffer to a protocol handler by
    /// EtherType. The length includes the Ethernet header.
    pub fn dispatch(&mut self, ether_type: u16, len: usize) -> Result<()> {
        match ether_type {
            eth_types::ARP => self.ipv4.process_arp(&mut self.dev, len),
            eth_types::IPV4 => {
                let payload_len = len
                    .checked_sub(fields::PAYLOAD.start)
                    .ok_or(Error::Malformed)?;
                self.ipv4.process(&mut self.dev, payload_len)
            }
            i => {
                debug!("Ignoring frame with EtherType 0x{:04X}.", i);
                Err(Error::Ignored)
            }
        }
    }

    fn check_tx_status(&mut self) {
        if self.dev.tx_status() == TxStatus::Failed {
            warn!("Device failed to transmit a frame.");
            if let Some(handler) = self.tx_error_handler.as_mut() {
                handler();
            }
            self.dev.tx_clear_error();
        }
    }

    /// Opens a raw Ethernet frame for transmission.
    pub fn tx_begin(&mut self, dst_addr: &Address, ether_type: u16) -> Result<()> {
        self.dev.tx_begin(dst_addr, ether_type)
    }

    pub fn tx_append(&mut self, data: &[u8]) -> Result<()> {
        self.dev.tx_append(data)
    }

    pub fn tx_end(&mut self) -> Result<()> {
        self.dev.tx_end()
    }

    pub fn configure_static_ip(
        &mut self,
        ipv4_addr: Option<&Address>,
        gateway: Option<&Address>,
        dns: Option<&Address>,
        netmask: Option<&Address>,
    ) -> Result<()> {
        self.ipv4
            .configure_static_ip(&mut self.dev, ipv4_addr, gateway, dns, netmask)
    }

    pub fn configure_dhcp(&mut self) -> Result<()> {
        self.ipv4.configure_dhcp(&mut self.dev)
    }

    pub fn enable_icmp(&mut self, enable: bool) {
        self.ipv4.enable_icmp(enable)
    }

    pub fn ping<F>(&mut self, ipv4_addr: &Address, handler: F) -> Result<u16>
    where
        F: FnMut(u16) + 'static,
    {
        self.ipv4.ping(&mut self.dev, ipv4_addr, handler)
    }

    pub fn arp_lookup(&mut self, ipv4_addr: &Address, timeout: Option<Duration>) -> Result<Address> {
        self.ipv4.arp_lookup(&mut self.dev, ipv4_addr, timeout)
    }
}
