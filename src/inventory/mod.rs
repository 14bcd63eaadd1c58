//! REST access to the offcut inventory backend.

pub mod api_types;
pub mod cache;
pub mod cached_client;
pub mod client;
pub mod lookup;
pub mod types;

pub use cached_client::CachedInventoryClient;
pub use client::{ApiError, InventoryClient};
