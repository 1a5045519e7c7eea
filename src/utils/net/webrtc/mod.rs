mod interfaces;
mod peer;
pub mod signal;

pub use interfaces::{ControlChannel, PeerHandle};
pub use peer::IngestPeer;
