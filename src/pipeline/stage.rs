//! Pipeline stage trait
//!
//! Defines the interface for the drain loops spawned by the coordinator.

use crate::error::IngestError;
use async_trait::async_trait;

/// Trait for pipeline stages that process media data
#[async_trait]
pub trait PipelineStage: Send {
    /// Run the stage, processing data until the stop signal fires or a fatal
    /// error occurs
    async fn run(&mut self) -> Result<(), IngestError>;

    /// Get the name of this stage for logging
    fn name(&self) -> &'static str;
}
