//! UDP transport: one socket, one [distant_client::DistantClient] per remote address, and
//!  pluggable per-channel delivery protocols on top.
//!
//! ```ascii
//! datagram: checksum (u64, CRC-64/REDIS over the rest)
//!           kind (u8)
//!           kind specific fields, e.g. for DATA: channel (u8), seq (u64), ack (u64), flags (u8), payload
//! ```

pub mod channel;
pub mod config;
pub mod datagram;
pub mod distant_client;
pub mod event;
pub mod operation;
pub mod simulator;
pub mod udp_client;
