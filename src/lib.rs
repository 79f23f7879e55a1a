pub mod config;
pub mod dns;
pub mod error;
pub mod forwarder;
pub mod handler;
pub mod http_server;
pub mod refresh;
pub mod server;
pub mod snapshot;
pub mod zone;

pub use dns::DNSPacket;
pub use zone::{ZoneDocument, ZoneStore};
