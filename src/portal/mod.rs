pub mod artificial;
pub mod cached_client;
#[cfg(test)]
pub(crate) mod fake;
pub mod request;
pub mod select;
pub mod source;
pub mod types;

pub use artificial::ArtificialPortal;
pub use cached_client::CachedPortal;
pub use request::PortalRequest;
pub use select::{connect, connect_with, Connected};
pub use source::DataSource;
pub use types::{Semester, Session, SourceKind};
