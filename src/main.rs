//! tonebridge host binary.
//!
//! Spawned by the browser with stdin/stdout as the framed transport. All
//! logging goes to stderr; stdout carries protocol frames only.

use tonebridge::dispatch::Dispatcher;
use tonebridge::engine::EngineManager;
use tonebridge::protocol::{ensure_binary_mode, FrameReader, FrameWriter};

fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    ensure_binary_mode();

    let reader = FrameReader::new(std::io::stdin().lock());
    let writer = FrameWriter::new(std::io::stdout().lock());
    let mut host = Dispatcher::new(reader, writer, EngineManager::from_env());

    host.warmup();

    match host.run() {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            // Transport failure mid-session; the channel is unrecoverable.
            tracing::error!("session aborted: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}
