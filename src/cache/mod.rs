//! Generic caching layer for offline support.
//!
//! This module provides a backend-agnostic caching mechanism that:
//! - Caches entities keyed by id, plus the ordered result of each list query
//! - Caches whole values (paginated pages, statistics) as snapshots
//! - Serves stale data when the network is unavailable
//! - Supports pattern invalidation and expiry of old entries

mod layer;
mod storage;
mod traits;

pub use layer::CacheLayer;
pub use storage::{CacheStorage, SqliteStorage};
pub use traits::{CacheResult, CacheSource, Cacheable, QueryKey};
