pub mod config;
pub mod crypto;
pub mod error;
pub mod event;
pub mod filter;
pub mod kinds;

pub use config::RelayConfig;
pub use error::{Error, Result};
pub use event::{Event, EventId, EventOrigin, PubKey, Signature, Tag};
pub use filter::Filter;
