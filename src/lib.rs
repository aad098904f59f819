//! # tonebridge
//!
//! Chrome native-messaging host bridging a browser extension to a pluggable
//! tone-rewrite engine.
//!
//! ## Architecture
//!
//! - **Framed transport** (stdio): 4-byte native-order length prefix plus
//!   UTF-8 JSON payload, the Chrome native-messaging wire format
//! - **Engine binding**: a dynamically loaded library found through an
//!   ordered candidate chain, bound once per process, with a deterministic
//!   heuristic standing in when nothing loads
//! - **Diagnostics**: advisory `"diag"` frames interleaved on the same
//!   transport for operator visibility
//!
//! ## Example
//!
//! ```no_run
//! use tonebridge::dispatch::Dispatcher;
//! use tonebridge::engine::EngineManager;
//! use tonebridge::protocol::{ensure_binary_mode, FrameReader, FrameWriter};
//!
//! ensure_binary_mode();
//! let reader = FrameReader::new(std::io::stdin().lock());
//! let writer = FrameWriter::new(std::io::stdout().lock());
//! let mut host = Dispatcher::new(reader, writer, EngineManager::from_env());
//! host.warmup();
//! host.run().unwrap();
//! ```

pub mod diag;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod heuristic;
pub mod protocol;

pub use dispatch::Dispatcher;
pub use engine::{EngineConfig, EngineManager};
pub use error::{EngineError, EngineStage, HostError, Result};
