//! Local store: reducer state kept in step with the backend, plus derived views.

mod reducer;
pub mod views;

pub use reducer::{CacheAction, CacheState, Collection, LoadStatus};

#[cfg(test)]
pub(crate) use reducer::tests as fixtures;
