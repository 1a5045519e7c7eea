//! Receiver pipeline coordinator
//!
//! Owns the pipeline context: the media queue, the active sink task, the
//! stop signal and the health counters. Launches the sink chosen at startup
//! and runs the single shutdown routine.

use crate::config::{IngestConfig, SinkMode};
use crate::decoder::{FrameDecoder, open_default_decoder};
use crate::encoder::ImageStore;
use crate::error::IngestError;
use crate::pipeline::PipelineStage;
use crate::pipeline::health::PipelineHealth;
use crate::pipeline::queue::{QueueDrain, QueueSender, media_queue};
use crate::pipeline::receiver::decode_stage::DecodeSink;
use crate::pipeline::receiver::raw_stage::RawSink;
use crate::pipeline::receiver::receive_stage::PacketIntake;
use crate::pipeline::state::PipelineState;
use crate::utils::net::webrtc::PeerHandle;
use crate::utils::sos::SignalOfStop;
use crate::workers::WorkerClose;
use crate::workers::save_stream::SaveStream;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::assets::{HEALTH_LOG_INTERVAL, STREAM_STALL_THRESHOLD};

/// Why the pipeline is being torn down
#[derive(Debug)]
pub enum ShutdownReason {
    /// The connection reached the failed state
    ConnectionFailed,
    /// Ctrl-C
    Interrupted,
    /// A sink hit an unrecoverable error
    Fatal(IngestError),
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownReason::ConnectionFailed => write!(f, "connection failed"),
            ShutdownReason::Interrupted => write!(f, "interrupted"),
            ShutdownReason::Fatal(e) => write!(f, "fatal error: {}", e),
        }
    }
}

/// Outcome of the shutdown routine
#[derive(Debug)]
pub struct ShutdownReport {
    pub reason: ShutdownReason,
    /// Every container close failure, in close order
    pub close_errors: Vec<IngestError>,
    pub peer_error: Option<IngestError>,
}

impl ShutdownReport {
    /// Every container and the peer connection closed without error
    pub fn is_clean(&self) -> bool {
        self.close_errors.is_empty() && self.peer_error.is_none()
    }

    pub fn exit_code(&self) -> u8 {
        match self.reason {
            ShutdownReason::Interrupted => 130,
            ShutdownReason::Fatal(_) => 1,
            ShutdownReason::ConnectionFailed if self.is_clean() => 0,
            ShutdownReason::ConnectionFailed => 1,
        }
    }
}

/// Periodic report: counters, queue depth and a warning when the stream stalls.
///
/// Returns whether the stream is stalled.
fn log_health(health: &PipelineHealth, intake: &PacketIntake) -> bool {
    info!(
        "Receiver pipeline {} (queue depth {})",
        health.summary(),
        intake.queued()
    );
    let stalled = health.is_stalled(STREAM_STALL_THRESHOLD);
    if stalled {
        warn!(
            "Receiver pipeline: no packets for more than {:?}",
            STREAM_STALL_THRESHOLD
        );
    }
    stalled
}

/// Coordinates the receiver pipeline: Intake → Queue → Sink
pub struct ReceiverCoordinator {
    config: IngestConfig,
    health: Arc<PipelineHealth>,
    state: PipelineState,
    sos: SignalOfStop,
    sender: QueueSender,
    drain: Option<QueueDrain>,
    /// Resolves once the sink loop has stopped, handing back its containers
    sink_task: Option<JoinHandle<Option<SaveStream>>>,
    shutdown_tx: mpsc::Sender<ShutdownReason>,
    shutdown_started: bool,
}

impl ReceiverCoordinator {
    /// `shutdown_tx` receives the fatal error of a failing sink.
    pub fn new(config: IngestConfig, shutdown_tx: mpsc::Sender<ShutdownReason>) -> Self {
        let (sender, drain) = media_queue(config.queue_capacity);

        Self {
            config,
            health: Arc::new(PipelineHealth::new()),
            state: PipelineState::Idle,
            sos: SignalOfStop::new(),
            sender,
            drain: Some(drain),
            sink_task: None,
            shutdown_tx,
            shutdown_started: false,
        }
    }

    /// Get the pipeline health metrics
    pub fn health(&self) -> &Arc<PipelineHealth> {
        &self.health
    }

    /// Get the current pipeline state
    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Stop signal shared with track readers and tickers
    pub fn stop_signal(&self) -> SignalOfStop {
        self.sos.clone()
    }

    /// A producer handle for one remote track
    pub fn intake(&self) -> PacketIntake {
        PacketIntake::new(self.sender.clone(), self.health.clone())
    }

    fn transition(&mut self, next: PipelineState) -> bool {
        if !self.state.can_transition_to(&next) {
            warn!(
                "ReceiverCoordinator: invalid transition {} -> {}",
                self.state, next
            );
            return false;
        }
        self.state = next;
        true
    }

    pub fn await_connection(&mut self) {
        self.transition(PipelineState::WaitingForConnection);
    }

    /// Open the sink for `mode` and start draining the queue.
    ///
    /// Failing to open the raw sink containers or the decoder is fatal.
    pub fn launch(&mut self, mode: SinkMode) -> Result<(), IngestError> {
        match mode {
            SinkMode::Raw => {
                let stream = SaveStream::open(
                    &self.config.video_path(),
                    &self.config.audio_path(),
                    self.config.audio_sample_rate,
                    self.config.audio_channels,
                )?;
                self.launch_raw(stream)
            }
            SinkMode::Decode => {
                let decoder = open_default_decoder()?;
                if let Err(e) = std::fs::create_dir_all(&self.config.output_dir) {
                    warn!(
                        "ReceiverCoordinator: cannot create {}: {}",
                        self.config.output_dir.display(),
                        e
                    );
                }
                self.launch_decode(decoder)
            }
        }
    }

    pub fn launch_raw(&mut self, stream: SaveStream) -> Result<(), IngestError> {
        let drain = self.take_drain()?;
        let sink = RawSink::new(
            drain,
            stream,
            self.config.save_interval,
            self.config.drain_batch_limit,
            self.sos.clone(),
            self.health.clone(),
        );
        self.spawn_sink(sink, |sink| sink.take_stream());
        Ok(())
    }

    pub fn launch_decode<F>(&mut self, decoder: F) -> Result<(), IngestError>
    where
        F: FrameDecoder + 'static,
    {
        let drain = self.take_drain()?;
        let sink = DecodeSink::new(
            drain,
            decoder,
            ImageStore::new(&self.config.output_dir),
            self.config.reassembly.clone(),
            self.config.decode_interval,
            self.config.drain_batch_limit,
            self.sos.clone(),
            self.health.clone(),
        );
        self.spawn_sink(sink, |_| None);
        Ok(())
    }

    fn take_drain(&mut self) -> Result<QueueDrain, IngestError> {
        if self.shutdown_started {
            return Err(IngestError::Signal {
                reason: "pipeline already shutting down".to_string(),
            });
        }
        self.drain.take().ok_or_else(|| IngestError::Signal {
            reason: "sink already launched".to_string(),
        })
    }

    fn spawn_sink<S, R>(&mut self, mut sink: S, release: R)
    where
        S: PipelineStage + 'static,
        R: FnOnce(&mut S) -> Option<SaveStream> + Send + 'static,
    {
        let name = sink.name();
        let shutdown_tx = self.shutdown_tx.clone();
        self.sink_task = Some(tokio::spawn(async move {
            if let Err(e) = sink.run().await {
                error!("{} error: {}", name, e);
                let _ = shutdown_tx.send(ShutdownReason::Fatal(e)).await;
            }
            release(&mut sink)
        }));

        // Start health monitoring
        let health = self.health.clone();
        let intake = self.intake();
        let sos = self.sos.clone();
        self.sos.spawn(async move {
            let mut interval = tokio::time::interval(HEALTH_LOG_INTERVAL);
            interval.tick().await;
            while !sos.cancelled() {
                interval.tick().await;
                log_health(&health, &intake);
            }
        });

        self.transition(PipelineState::Running {
            started_at: Instant::now(),
        });
        info!("ReceiverCoordinator: {} started", name);
    }

    /// The one shutdown routine: stop the drain loops, wait for the sink,
    /// close audio then video, close the peer connection.
    ///
    /// Runs once; later calls return `None`.
    pub async fn shutdown(
        &mut self,
        peer: &dyn PeerHandle,
        reason: ShutdownReason,
    ) -> Option<ShutdownReport> {
        if self.shutdown_started {
            return None;
        }
        self.shutdown_started = true;
        if let Some(ran_for) = self.state.running_duration() {
            info!("ReceiverCoordinator: sink ran for {:.1?}", ran_for);
        }
        self.transition(PipelineState::Stopping);
        info!("ReceiverCoordinator: shutting down ({})", reason);

        self.sos.cancel();

        let stream = match self.sink_task.take() {
            Some(task) => match task.await {
                Ok(stream) => stream,
                Err(e) => {
                    error!("ReceiverCoordinator: sink task failed: {}", e);
                    None
                }
            },
            None => None,
        };

        let close_errors = match stream {
            Some(mut stream) => stream.close().err().unwrap_or_default(),
            None => Vec::new(),
        };
        for e in &close_errors {
            error!("ReceiverCoordinator: {}", e);
        }
        info!("Done writing media files");

        let peer_error = peer.close().await.err();
        if let Some(e) = &peer_error {
            error!("ReceiverCoordinator: closing peer connection: {}", e);
        }

        self.transition(PipelineState::Stopped);
        info!("ReceiverCoordinator: {}", self.health.summary());

        Some(ShutdownReport {
            reason,
            close_errors,
            peer_error,
        })
    }
}
