//! An in-memory sorted key-value store served over a memcached-style text
//! protocol, extended with `rget`: a bounded, ordered range scan.

pub mod client;
pub mod config;
pub mod error;
pub mod format;
pub mod index;
pub mod protocol;
pub mod query;
pub mod scheduler;
pub mod server;

pub use client::Client;
pub use config::{IndexKind, ProtocolLimits, ServerConfig};
pub use error::{Error, ProtocolError, Result};
pub use index::{Entry, SkipListIndex, SnapshotIndex, SortedIndex, ValueRecord};
pub use query::{scan, Pager, RangeDescriptor};
pub use server::{Server, ShutdownHandle};
