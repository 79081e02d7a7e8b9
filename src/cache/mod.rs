//! Content-addressed caching.
//!
//! Cache validity is decided purely by content and configuration hashes,
//! never by timestamps, so a valid entry can never be stale.

mod hash;
mod key;
mod store;

pub use hash::ContentHash;
pub use key::CacheKey;
pub use store::{CacheStore, clear_cache_dir};
