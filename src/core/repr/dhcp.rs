//! [BOOTP/DHCP](https://tools.ietf.org/html/rfc2131) message layout.

pub const SERVER_PORT: u16 = 67;

pub const CLIENT_PORT: u16 = 68;

pub const MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];

/// Byte offsets of the fixed BOOTP fields, from the start of the message.
pub mod fields {
    use std::ops::Range;

    pub const OP: usize = 0;

    pub const HTYPE: usize = 1;

    pub const HLEN: usize = 2;

    pub const XID: Range<usize> = 4 .. 8;

    pub const CIADDR: Range<usize> = 12 .. 16;

    pub const YIADDR: Range<usize> = 16 .. 20;

    pub const SIADDR: Range<usize> = 20 .. 24;

    /// Client hardware address, padded to 16 bytes.
    pub const CHADDR: Range<usize> = 28 .. 44;

    pub const MAGIC_COOKIE: Range<usize> = 236 .. 240;

    pub const OPTIONS: usize = 240;
}

pub mod ops {
    pub const BOOT_REQUEST: u8 = 1;

    pub const BOOT_REPLY: u8 = 2;
}

pub mod options {
    pub const PAD: u8 = 0;

    pub const SUBNET_MASK: u8 = 1;

    pub const ROUTER: u8 = 3;

    pub const DNS: u8 = 6;

    pub const REQUESTED_IP: u8 = 50;

    pub const LEASE_TIME: u8 = 51;

    pub const MESSAGE_TYPE: u8 = 53;

    pub const SERVER_ID: u8 = 54;

    pub const PARAMETER_REQUEST_LIST: u8 = 55;

    pub const END: u8 = 255;
}

pub mod message_types {
    pub const DISCOVER: u8 = 1;

    pub const OFFER: u8 = 2;

    pub const REQUEST: u8 = 3;

    pub const ACK: u8 = 5;

    pub const NAK: u8 = 6;
}
