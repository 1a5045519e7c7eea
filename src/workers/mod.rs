//! Background workers
//!
//! Resources owned by the sinks that need an explicit, ordered shutdown.

use crate::error::IngestError;

pub mod save_stream;

/// Trait for workers that need graceful shutdown.
pub trait WorkerClose {
    /// Close and clean up worker resources. Every failure is reported, and a
    /// second call is a no-op.
    fn close(&mut self) -> Result<(), Vec<IngestError>>;
}
