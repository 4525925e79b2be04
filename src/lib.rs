#[cfg(test)]
#[macro_use]
extern crate assert_matches;
#[macro_use]
extern crate log;

pub mod core;

use crate::core::link::Error as LinkError;

#[derive(Debug)]
pub enum Error {
    /// Indicates an error where an address could not be resolved.
    Address,
    /// Indicates an error where a buffer, device, etc. is full or empty.
    Exhausted,
    /// Indicates an error where a packet or frame is malformed.
    Malformed,
    /// Indicates an error where a checksum is invalid.
    Checksum,
    /// Indicates a packet or frame that was not meant for us or is not
    /// supported.
    Ignored,
    /// Indicates an operation between addresses of different kinds.
    KindMismatch,
    /// Indicates a transmit transaction is in the wrong state, e.g. one is
    /// already open.
    Busy,
    /// Indicates an error reported by the underlying link.
    Link(LinkError),
}

impl From<LinkError> for Error {
    fn from(err: LinkError) -> Self {
        Error::Link(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
