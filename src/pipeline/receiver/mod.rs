//! Receiver pipeline components
//!
//! This module contains the receiver-side pipeline stages:
//! - PacketIntake: non-blocking hand-off from the track readers
//! - KeyframeTicker: periodic keyframe requests per video track
//! - FrameReassembler: RTP packets to VP8 frames
//! - DecodeSink: keyframes to numbered JPEG images
//! - RawSink: packets to IVF/Ogg containers
//!
//! The receiver pipeline flow:
//! ```text
//! Network → Intake → Queue → DecodeSink (Reassemble → Decode → JPEG)
//!                          ↘ RawSink (IVF / Ogg)
//! ```

pub mod coordinator;
pub mod decode_stage;
pub mod keyframe;
pub mod raw_stage;
pub mod reassembler;
pub mod receive_stage;

pub use coordinator::{ReceiverCoordinator, ShutdownReason, ShutdownReport};
pub use decode_stage::DecodeSink;
pub use keyframe::KeyframeTicker;
pub use raw_stage::RawSink;
pub use reassembler::{Frame, FrameReassembler, PartialFramePolicy, ReassemblerConfig};
pub use receive_stage::PacketIntake;
