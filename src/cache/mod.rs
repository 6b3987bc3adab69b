//! Response caching.
//!
//! Successful generations are stored under a deterministic fingerprint of
//! the normalized request, with TTL expiry and LRU eviction at a capacity
//! bound. Key derivation is stable across processes so identical
//! normalized requests always collide onto the same entry.

pub mod key;
pub mod store;

pub use key::{CacheKey, KEY_PREFIX_WORDS};
pub use store::{CacheStats, ResponseCache};
