use std::collections::VecDeque;

#[derive(Debug)]
pub enum Error {
    /// Indicates a generic IO error.
    IO(std::io::Error),
    /// Indicates a miscellaneous error with a message.
    Unknown(&'static str),
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::IO(error)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A low level interface for sending frames across a link.
pub trait Link {
    /// Sends a frame across a link.
    fn send(&mut self, buffer: &[u8]) -> Result<()>;

    /// Reads a frame from the underlying hardware and returns the size of
    /// frame, or 0 if no frame is pending. You should ensure that the buffer
    /// has at least MTU bytes to avoid errors.
    fn recv(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Returns the [MTU](https://en.wikipedia.org/wiki/Maximum_transmission_unit)
    /// of the underlying hardware.
    fn max_transmission_unit(&self) -> usize;
}

/// A Link backed by in memory frame queues.
///
/// Frames pushed with `push_rx(...)` are handed out by `recv(...)` in order,
/// and every frame sent is recorded for `take_tx()`.
#[derive(Debug, Default)]
pub struct Memory {
    rx: VecDeque<Vec<u8>>,
    tx: Vec<Vec<u8>>,
    fail_sends: usize,
}

impl Memory {
    /// Ethernet frame size without FCS.
    pub const MTU: usize = 1514;

    pub fn new() -> Memory {
        Memory::default()
    }

    /// Queues a frame for reception.
    pub fn push_rx(&mut self, frame: &[u8]) {
        self.rx.push_back(frame.to_vec());
    }

    /// Returns the number of frames waiting to be received.
    pub fn rx_pending(&self) -> usize {
        self.rx.len()
    }

    /// Removes and returns all frames sent so far.
    pub fn take_tx(&mut self) -> Vec<Vec<u8>> {
        std::mem::replace(&mut self.tx, Vec::new())
    }

    /// Makes the next n sends fail, as if the hardware reported a collision.
    pub fn fail_sends(&mut self, n: usize) {
        self.fail_sends = n;
    }
}

impl Link for Memory {
    fn send(&mut self, buffer: &[u8]) -> Result<()> {
        if self.fail_sends > 0 {
            self.fail_sends -= 1;
            return Err(Error::Unknown("Simulated transmit failure."));
        }
        self.tx.push(buffer.to_vec());
        Ok(())
    }

    fn recv(&mut self, buffer: &mut [u8]) -> Result<usize> {
        match self.rx.pop_front() {
            Some(frame) => {
                if frame.len() > buffer.len() {
                    return Err(Error::Unknown("Frame larger than receive buffer."));
                }
                buffer[.. frame.len()].copy_from_slice(&frame);
                Ok(frame.len())
            }
            None => Ok(0),
        }
    }

    fn max_transmission_unit(&self) -> usize {
        Self::MTU
    }
}
