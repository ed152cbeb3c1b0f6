//! The chat application on top of the UDP transport.
//!
//! A [server::ChatServer] and any number of [client::ChatClient]s exchange batches of
//!  [action::Action]s, one framed message per networking tick. The server is the authority for
//!  message ids and timestamps; large objects (icons, images) travel as fixed size `FILE_DATA`
//!  packets, see [large_file::LargeFile].

pub mod action;
pub mod chat_config;
pub mod client;
pub mod context;
pub mod file_transfer;
pub mod image_store;
pub mod large_file;
pub mod message;
pub mod payloads;
pub mod server;
pub mod session;
pub mod user;
