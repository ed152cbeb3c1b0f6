pub mod chat;
pub mod net;
pub mod util;
