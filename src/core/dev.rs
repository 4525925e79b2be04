use std::ops::Range;

use byteorder::{
    ByteOrder,
    NetworkEndian,
};

use crate::core::addr::{
    Address,
    Kind,
};
use crate::core::check::internet_checksum;
use crate::core::link::Link;
use crate::core::repr::EthernetFrame;
use crate::{
    Error,
    Result,
};

/// Status of the most recent transmission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxStatus {
    Ok,
    /// The hardware failed to send a frame, e.g. due to a collision.
    Failed,
}

/// A network interface controller with a single receive and a single transmit
/// buffer.
///
/// Offsets are relative to the start of the Ethernet frame. A single frame may
/// be received and a single frame may be under construction for transmission
/// at any time. Building a reply from the received frame with `dma_copy(...)`
/// is only valid until `rx_end()` releases the receive buffer.
pub trait Device {
    /// Returns the ethernet address associated with the device.
    fn ethernet_addr(&self) -> Address;

    /// Fetches the next frame into the receive buffer if none is held and
    /// returns its length, or 0 if nothing was received.
    fn rx_begin(&mut self) -> usize;

    /// Releases the receive buffer.
    fn rx_end(&mut self);

    /// Returns the length of the frame in the receive buffer.
    fn rx_len(&self) -> usize;

    /// Reads buffer.len() bytes from the received frame starting at offset.
    fn rx_read(&self, offset: usize, buffer: &mut [u8]) -> Result<()>;

    /// Calculates the Internet Checksum over a region of the received frame.
    fn rx_checksum(&self, offset: usize, len: usize) -> Result<u16>;

    fn rx_byte(&self, offset: usize) -> Result<u8> {
        let mut buffer = [0; 1];
        self.rx_read(offset, &mut buffer)?;
        Ok(buffer[0])
    }

    /// Reads a network byte order word from the received frame.
    fn rx_word(&self, offset: usize) -> Result<u16> {
        let mut buffer = [0; 2];
        self.rx_read(offset, &mut buffer)?;
        Ok(NetworkEndian::read_u16(&buffer))
    }

    /// Opens a transmit frame and writes the Ethernet header.
    fn tx_begin(&mut self, dst_addr: &Address, ether_type: u16) -> Result<()>;

    /// Appends data to the transmit frame. Nothing is written if the whole
    /// buffer does not fit.
    fn tx_append(&mut self, data: &[u8]) -> Result<()>;

    /// Overwrites data in the transmit frame at offset without moving the
    /// append position. Extends the frame if writing past its end.
    fn tx_write(&mut self, offset: usize, data: &[u8]) -> Result<()>;

    /// Reads buffer.len() bytes from the transmit frame starting at offset.
    fn tx_read(&self, offset: usize, buffer: &mut [u8]) -> Result<()>;

    /// Returns the length of the frame under construction.
    fn tx_len(&self) -> usize;

    /// Calculates the Internet Checksum over a region of the transmit frame.
    fn tx_checksum(&self, offset: usize, len: usize) -> Result<u16>;

    /// Copies len bytes from the received frame at src_offset into the
    /// transmit frame at dst_offset.
    fn dma_copy(&mut self, dst_offset: usize, src_offset: usize, len: usize) -> Result<()>;

    /// Swaps two non-overlapping regions of the transmit frame.
    fn tx_swap(&mut self, offset_a: usize, offset_b: usize, len: usize) -> Result<()>;

    /// Closes the transmit frame and hands it to the hardware.
    fn tx_end(&mut self) -> Result<()>;

    /// Discards the transmit frame under construction.
    fn tx_abort(&mut self);

    fn tx_status(&self) -> TxStatus;

    fn tx_clear_error(&mut self);

    fn tx_append_byte(&mut self, data: u8) -> Result<()> {
        self.tx_append(&[data])
    }

    /// Appends a word in network byte order.
    fn tx_append_word(&mut self, data: u16) -> Result<()> {
        let mut buffer = [0; 2];
        NetworkEndian::write_u16(&mut buffer, data);
        self.tx_append(&buffer)
    }

    fn tx_write_byte(&mut self, offset: usize, data: u8) -> Result<()> {
        self.tx_write(offset, &[data])
    }

    /// Writes a word in network byte order.
    fn tx_write_word(&mut self, offset: usize, data: u16) -> Result<()> {
        let mut buffer = [0; 2];
        NetworkEndian::write_u16(&mut buffer, data);
        self.tx_write(offset, &buffer)
    }
}

/// A Device which reuses preallocated Tx/Rx buffers.
pub struct Standard<T: Link> {
    link: T,
    eth_addr: Address,
    rx_buffer: std::vec::Vec<u8>,
    rx_len: usize,
    tx_buffer: std::vec::Vec<u8>,
    tx_cursor: usize,
    tx_len: usize,
    tx_open: bool,
    tx_status: TxStatus,
}

impl<T: Link> Standard<T> {
    /// Creates a Standard device with buffers sized to the link MTU.
    pub fn new(link: T, eth_addr: Address) -> Result<Standard<T>> {
        let mtu = link.max_transmission_unit();
        Standard::with_buffer_len(link, eth_addr, mtu)
    }

    /// Creates a Standard device with buffers of buffer_len bytes.
    pub fn with_buffer_len(link: T, eth_addr: Address, buffer_len: usize) -> Result<Standard<T>> {
        if eth_addr.kind() != Kind::Mac {
            return Err(Error::KindMismatch);
        }

        if buffer_len < EthernetFrame::<&[u8]>::HEADER_LEN {
            return Err(Error::Exhausted);
        }

        Ok(Standard {
            link,
            eth_addr,
            rx_buffer: vec![0; buffer_len],
            rx_len: 0,
            tx_buffer: vec![0; buffer_len],
            tx_cursor: 0,
            tx_len: 0,
            tx_open: false,
            tx_status: TxStatus::Ok,
        })
    }

    pub fn link(&self) -> &T {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut T {
        &mut self.link
    }

    fn check_tx_open(&self) -> Result<()> {
        if self.tx_open {
            Ok(())
        } else {
            Err(Error::Busy)
        }
    }

    fn tx_range(&self, offset: usize, len: usize) -> Result<Range<usize>> {
        bounded_range(offset, len, self.tx_len)
    }

    fn rx_range(&self, offset: usize, len: usize) -> Result<Range<usize>> {
        bounded_range(offset, len, self.rx_len)
    }
}

/// Returns offset .. offset + len if it ends at or before limit.
fn bounded_range(offset: usize, len: usize, limit: usize) -> Result<Range<usize>> {
    match offset.checked_add(len) {
        Some(end) if end <= limit => Ok(offset .. end),
        _ => Err(Error::Exhausted),
    }
}

impl<T: Link> Device for Standard<T> {
    fn ethernet_addr(&self) -> Address {
        self.eth_addr
    }

    fn rx_begin(&mut self) -> usize {
        if self.rx_len > 0 {
            return self.rx_len;
        }

        match self.link.recv(&mut self.rx_buffer) {
            Ok(rx_len) => self.rx_len = rx_len,
            Err(err) => {
                warn!("Link::recv(...) failed with {:?}.", err);
                self.rx_len = 0;
            }
        }

        self.rx_len
    }

    fn rx_end(&mut self) {
        self.rx_len = 0;
    }

    fn rx_len(&self) -> usize {
        self.rx_len
    }

    fn rx_read(&self, offset: usize, buffer: &mut [u8]) -> Result<()> {
        let range = self.rx_range(offset, buffer.len())?;
        buffer.copy_from_slice(&self.rx_buffer[range]);
        Ok(())
    }

    fn rx_checksum(&self, offset: usize, len: usize) -> Result<u16> {
        let range = self.rx_range(offset, len)?;
        Ok(internet_checksum(&self.rx_buffer[range]))
    }

    fn tx_begin(&mut self, dst_addr: &Address, ether_type: u16) -> Result<()> {
        if self.tx_open {
            return Err(Error::Busy);
        }

        if dst_addr.kind() != Kind::Mac {
            return Err(Error::KindMismatch);
        }

        for byte in self.tx_buffer.iter_mut() {
            *byte = 0;
        }

        {
            let header_len = EthernetFrame::<&[u8]>::HEADER_LEN;
            let mut eth_frame = EthernetFrame::try_new(&mut self.tx_buffer[.. header_len])?;
            eth_frame.set_dst_addr(dst_addr)?;
            eth_frame.set_src_addr(&self.eth_addr)?;
            eth_frame.set_payload_type(ether_type);
        }

        self.tx_cursor = EthernetFrame::<&[u8]>::HEADER_LEN;
        self.tx_len = self.tx_cursor;
        self.tx_open = true;

        Ok(())
    }

    fn tx_append(&mut self, data: &[u8]) -> Result<()> {
        self.check_tx_open()?;

        let range = bounded_range(self.tx_cursor, data.len(), self.tx_buffer.len())?;
        self.tx_cursor = range.end;
        self.tx_len = std::cmp::max(self.tx_len, range.end);
        self.tx_buffer[range].copy_from_slice(data);

        Ok(())
    }

    fn tx_write(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        self.check_tx_open()?;

        let range = bounded_range(offset, data.len(), self.tx_buffer.len())?;
        self.tx_len = std::cmp::max(self.tx_len, range.end);
        self.tx_buffer[range].copy_from_slice(data);

        Ok(())
    }

    fn tx_read(&self, offset: usize, buffer: &mut [u8]) -> Result<()> {
        let range = self.tx_range(offset, buffer.len())?;
        buffer.copy_from_slice(&self.tx_buffer[range]);
        Ok(())
    }

    fn tx_len(&self) -> usize {
        self.tx_len
    }

    fn tx_checksum(&self, offset: usize, len: usize) -> Result<u16> {
        let range = self.tx_range(offset, len)?;
        Ok(internet_checksum(&self.tx_buffer[range]))
    }

    fn dma_copy(&mut self, dst_offset: usize, src_offset: usize, len: usize) -> Result<()> {
        self.check_tx_open()?;

        let src = self.rx_range(src_offset, len)?;
        let dst = bounded_range(dst_offset, len, self.tx_buffer.len())?;
        self.tx_len = std::cmp::max(self.tx_len, dst.end);
        self.tx_buffer[dst].copy_from_slice(&self.rx_buffer[src]);

        Ok(())
    }

    fn tx_swap(&mut self, offset_a: usize, offset_b: usize, len: usize) -> Result<()> {
        self.check_tx_open()?;

        let (a, b) = (self.tx_range(offset_a, len)?, self.tx_range(offset_b, len)?);
        if a.start < b.end && b.start < a.end {
            return Err(Error::Malformed);
        }

        for i in 0 .. len {
            self.tx_buffer.swap(a.start + i, b.start + i);
        }

        Ok(())
    }

    fn tx_end(&mut self) -> Result<()> {
        self.check_tx_open()?;
        self.tx_open = false;

        let min_len = std::cmp::min(EthernetFrame::<&[u8]>::MIN_FRAME_LEN, self.tx_buffer.len());
        let frame_len = std::cmp::max(self.tx_len, min_len);

        match self.link.send(&self.tx_buffer[.. frame_len]) {
            Ok(_) => Ok(()),
            Err(err) => {
                warn!("Link::send(...) failed with {:?}.", err);
                self.tx_status = TxStatus::Failed;
                Err(Error::from(err))
            }
        }
    }

    fn tx_abort(&mut self) {
        self.tx_open = false;
        self.tx_len = 0;
        self.tx_cursor = 0;
    }

    fn tx_status(&self) -> TxStatus {
        self.tx_status
    }

    fn tx_clear_error(&mut self) {
        self.tx_status = TxStatus::Ok;
    }
}
