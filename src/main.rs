use crate::assets::OUTPUT_DIR;
use crate::config::{IngestConfig, SinkMode, app_name, app_version};
use crate::error::IngestError;
use crate::pipeline::LifecycleController;
use crate::pipeline::receiver::{ReceiverCoordinator, ShutdownReason};
use crate::utils::net::webrtc::{IngestPeer, signal};
use anyhow::{Context, anyhow};
use clap::{Arg, Command};
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use std::{panic, process};
use tokio::sync::mpsc;

pub mod assets;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod pipeline;
pub mod utils;
pub mod workers;

fn parse_args() -> anyhow::Result<IngestConfig> {
    let matches = Command::new(app_name())
        .version(app_version())
        .author(env!("CARGO_PKG_AUTHORS"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_name("MODE")
                .help("Sink for the received media: decode (keyframes to JPEG) or raw (IVF/Ogg).")
                .required(false)
                .ignore_case(true)
                .default_value("raw"),
        )
        .arg(
            Arg::new("out-dir")
                .short('o')
                .long("out-dir")
                .value_name("DIR")
                .help("Directory receiving the images or container files.")
                .required(false)
                .default_value(OUTPUT_DIR),
        )
        .get_matches();

    let mode = matches
        .get_one::<String>("mode")
        .map(|m| m.parse::<SinkMode>())
        .transpose()
        .map_err(|e| anyhow!(e))?
        .unwrap_or(SinkMode::Raw);
    let output_dir = matches
        .get_one::<String>("out-dir")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(OUTPUT_DIR));

    Ok(IngestConfig::new(mode, output_dir))
}

/// Runs until the connection fails, a sink fails, or the user interrupts.
/// Returns the process exit code.
async fn run(config: IngestConfig) -> anyhow::Result<u8> {
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<ShutdownReason>(4);

    // gracefully close the app when receiving SIGINT, SIGTERM, or SIGHUP
    let ctrlc_tx = shutdown_tx.clone();
    ctrlc::set_handler(move || {
        if ctrlc_tx.blocking_send(ShutdownReason::Interrupted).is_err() {
            process::exit(130);
        }
    })
    .context("Error setting Ctrl-C handler")?;

    let mut coordinator = ReceiverCoordinator::new(config.clone(), shutdown_tx.clone());
    let lifecycle = Arc::new(LifecycleController::new());

    let peer = IngestPeer::new(&config)
        .await
        .context("Failed to create peer connection")?;
    peer.on_track(
        coordinator.intake(),
        coordinator.stop_signal(),
        coordinator.health().clone(),
        config.keyframe_interval,
    );
    peer.on_connection_state(lifecycle.clone(), shutdown_tx);

    let negotiate = async {
        info!("Waiting for the base64 encoded offer on stdin");
        let offer = signal::read_offer_from_stdin().await?;
        let answer = peer.answer(offer).await?;
        // The answer is the only thing written to stdout
        println!("{}", signal::encode(&answer)?);
        Ok::<(), IngestError>(())
    };

    let early_exit = tokio::select! {
        res = negotiate => res.err().map(ShutdownReason::Fatal),
        reason = shutdown_rx.recv() => Some(reason.unwrap_or(ShutdownReason::Interrupted)),
    };

    let reason = match early_exit {
        Some(reason) => reason,
        None => {
            coordinator.await_connection();
            let interrupted = tokio::select! {
                _ = lifecycle.wait_connected() => None,
                reason = shutdown_rx.recv() => Some(reason.unwrap_or(ShutdownReason::Interrupted)),
            };

            match interrupted {
                Some(reason) => reason,
                None => match coordinator.launch(config.mode) {
                    Ok(()) => shutdown_rx
                        .recv()
                        .await
                        .unwrap_or(ShutdownReason::Interrupted),
                    Err(e) => ShutdownReason::Fatal(e),
                },
            }
        }
    };

    let code = coordinator
        .shutdown(&peer, reason)
        .await
        .map(|report| report.exit_code())
        .unwrap_or(0);
    Ok(code)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    // kill the process as soon as any thread panics
    let orig_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        // invoke the default handler and exit the process
        orig_hook(panic_info);
        process::exit(105);
    }));

    let config = match parse_args() {
        Ok(config) => config,
        Err(e) => {
            error!("{:#}", e);
            process::exit(2);
        }
    };
    info!("{} {} starting in {} mode", app_name(), app_version(), config.mode);

    let code = match run(config).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            1
        }
    };

    // stdin may still be blocked in a reader thread, do not wait for it
    process::exit(code as i32);
}
