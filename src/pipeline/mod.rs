//! Pipeline abstraction layer for the ingest receiver
//!
//! This module separates concerns between:
//! - Control/Coordination: connection lifecycle and pipeline state
//! - Data Transport: the bounded media queue between intake and sink
//! - Media Processing: reassembly, decoding and container writing
//!
//! # Architecture
//!
//! - Track readers push packets into the queue without blocking
//! - Exactly one sink drains the queue in its own async task
//! - Sinks implement the `PipelineStage` trait
//! - The coordinator launches the sink and runs the shutdown routine
//! - Health monitoring tracks counters and logs a periodic summary

pub mod health;
pub mod lifecycle;
pub mod queue;
pub mod receiver;
pub mod stage;
pub mod state;
pub mod types;

pub use health::PipelineHealth;
pub use lifecycle::{ConnectionState, LifecycleAction, LifecycleController};
pub use stage::PipelineStage;
pub use state::PipelineState;
pub use types::{CodecTag, MediaKind, QueuedPacket};
