use std::time::Duration;

use crate::core::addr::Address;
use crate::core::dev::Device;
use crate::core::repr::{
    eth_types,
    Arp,
    ArpOp,
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

impl<E: Env> Ipv4<E> {
    /// Tries to retrieve the ethernet address for an IPv4 address.
    ///
    /// On a miss the address is recorded as pending and an ARP request is
    /// broadcast. Without a timeout an error is returned right away and the
    /// reply, if any, is picked up later by `process_arp(...)`.
    ///
    /// With a timeout the receive path is polled until the reply arrives or
    /// the timeout expires. Every other frame received meanwhile is dropped,
    /// and a frame held in the receive buffer when called is consumed.
    pub fn arp_lookup<D: Device>(
        &mut self,
        dev: &mut D,
        ipv4_addr: &Address,
        timeout: Option<Duration>,
    ) -> Result<Address> {
        if let Some(eth_addr) = self.arp_table.eth_addr_for_ip(ipv4_addr) {
            return Ok(eth_addr);
        }

        if ipv4_addr.is_unspecified() {
            return Err(Error::Address);
        }

        self.arp_table.insert_pending(ipv4_addr);
        self.send_arp_request(dev, ipv4_addr)?;

        let timeout = match timeout {
            Some(timeout) if timeout > Duration::from_secs(0) => timeout,
            _ => return Err(Error::Address),
        };

        let deadline = self.env.now_instant() + timeout;
        while self.env.now_instant() < deadline {
            let rx_len = dev.rx_begin();
            if rx_len == 0 {
                continue;
            }

            match dev.rx_word(ETH_HEADER_LEN - 2) {
                Ok(eth_types::ARP) => {
                    if let Err(err) = self.process_arp(dev, rx_len) {
                        debug!("Dropping ARP packet with {:?}.", err);
                    }
                }
                _ => debug!("Dropping frame while waiting on ARP for {}.", ipv4_addr),
            }
            dev.rx_end();

            if let Some(eth_addr) = self.arp_table.eth_addr_for_ip(ipv4_addr) {
                return Ok(eth_addr);
            }
        }

        debug!("ARP lookup for {} timed out.", ipv4_addr);
        Err(Error::Address)
    }

    /// Broadcasts an ARP request for an IPv4 address.
    pub fn send_arp_request<D: Device>(&mut self, dev: &mut D, ipv4_addr: &Address) -> Result<()> {
        let arp = Arp {
            op: ArpOp::Request,
            source_hw_addr: dev.ethernet_addr(),
            source_proto_addr: self.local,
            target_hw_addr: Address::mac([0; 6]),
            target_proto_addr: *ipv4_addr,
        };

        debug!("Sending ARP request for {}.", ipv4_addr);
        send_arp(dev, &arp, &Address::MAC_BROADCAST)
    }

    /// Processes an ARP packet in the receive buffer. The length includes the
    /// Ethernet header.
    ///
    /// Requests for the local address are answered. Replies update every
    /// entry of the ARP table holding the sender address.
    pub fn process_arp<D: Device>(&mut self, dev: &mut D, len: usize) -> Result<()> {
        if len < ETH_HEADER_LEN + Arp::BUFFER_LEN {
            debug!("Dropping ARP packet with length {}.", len);
            return Err(Error::Malformed);
        }

        let mut buffer = [0; Arp::BUFFER_LEN];
        dev.rx_read(ETH_HEADER_LEN, &mut buffer)?;
        let arp = Arp::deserialize(&buffer)?;

        match arp.op {
            ArpOp::Request => {
                if self.local.is_unspecified() || arp.target_proto_addr != self.local {
                    debug!(
                        "Ignoring ARP request for {}.",
                        arp.target_proto_addr
                    );
                    return Err(Error::Ignored);
                }

                let reply = Arp {
                    op: ArpOp::Reply,
                    source_hw_addr: dev.ethernet_addr(),
                    source_proto_addr: arp.target_proto_addr,
                    target_hw_addr: arp.source_hw_addr,
                    target_proto_addr: arp.source_proto_addr,
                };

                debug!(
                    "Sending ARP reply to {}/{}.",
                    reply.target_proto_addr, reply.target_hw_addr
                );
                send_arp(dev, &reply, &arp.source_hw_addr)
            }
            ArpOp::Reply => {
                match self.arp_table
                    .set_eth_addr_for_ip(&arp.source_proto_addr, &arp.source_hw_addr)
                {
                    Some(index) => {
                        debug!(
                            "Received ARP reply, mapping {} to {} in entry {}.",
                            arp.source_proto_addr, arp.source_hw_addr, index
                        );
                        Ok(())
                    }
                    None => {
                        debug!(
                            "Ignoring unsolicited ARP reply from {}.",
                            arp.source_proto_addr
                        );
                        Err(Error::Ignored)
                    }
                }
            }
        }
    }
}

fn send_arp<D: Device>(dev: &mut D, arp: &Arp, dst_addr: &Address) -> Result<()> {
    let mut buffer = [0; Arp::BUFFER_LEN];
    arp.serialize(&mut buffer)?;

    dev.tx_begin(dst_addr, eth_types::ARP)?;
    if let Err(err) = dev.tx_append(&buffer) {
        dev.tx_abort();
        return Err(err);
    }
    dev.tx_end()
}
