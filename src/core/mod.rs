//! Core, platform independent networking code.

pub mod addr;
pub mod arp_cache;
pub mod check;
pub mod dev;
pub mod link;
pub mod repr;
pub mod service;
pub mod time;
