//! Cache side of the cache-aside layer.
//!
//! - **Keys**: declarative templates resolved against per-call filters
//! - **Store**: the key-value adapter contract plus an in-memory backend
//! - **Codec**: JSON encoding of cached values
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! default_ttl_seconds = 3600
//! memory_capacity = 10000
//! ```

pub mod codec;
mod config;
mod keys;
mod lock;
mod store;

pub use codec::CodecError;
pub use config::CacheConfig;
pub use keys::{KeyPattern, escape_glob};
pub use store::{CacheError, CacheStore, MemoryCache, glob_match};

pub(crate) use lock::{rw_read, rw_write};
