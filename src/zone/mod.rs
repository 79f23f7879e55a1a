pub mod authoritative;
pub mod errors;
pub mod ingest;
pub mod parser;
pub mod record;
pub mod store;
#[allow(clippy::module_inception)]
pub mod zone;

pub use authoritative::{AuthoritativeResponder, Resolution, ResolverOptions};
pub use errors::{Result, ZoneError};
pub use ingest::{LoadMode, LoadStats, load_document};
pub use record::{Record, ZoneDocument};
pub use store::{ZoneSnapshot, ZoneStore};
pub use zone::{RecordKey, Zone};
