//! Push channel: Socket.IO events from the backend.

pub mod events;
pub mod protocol;
pub mod socket;

pub use events::PushEvent;
pub use socket::{ConnectionStatus, PushClient, PushHandle};
