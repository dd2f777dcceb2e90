//! Shardcache Core - Entity Types
//!
//! Pure data structures shared by the cache crates: identifiers, entity
//! snapshots, capability flags, gateway events, the transport interface,
//! errors and configuration. No caching behavior lives here.

pub mod config;
pub mod entities;
pub mod enums;
pub mod error;
pub mod event;
pub mod identity;
pub mod transport;

pub use config::*;
pub use entities::*;
pub use enums::*;
pub use error::*;
pub use event::*;
pub use identity::*;
pub use transport::*;
