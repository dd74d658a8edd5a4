//! Multilateration station feeder
//!
//! Reads the BEAST stream of a GPS-synchronized receiver, decodes the fields
//! needed for multilateration and writes them to one file per second of
//! receiver time.
//!
//! ```plain
//! socket -> reader -> [frames] -> decoder -> [records] -> sink -> <second>.txt
//! ```
//!
//! The three stages run as separate tasks. They're connected by unbounded
//! channels, one batch per read of the socket. There's no backpressure: if
//! the sink falls behind (e.g. slow disk), the channel buffers grow until it
//! catches up.

pub mod config;
pub mod decoder;
pub mod error_log;
pub mod pipeline;
pub mod sink;
pub mod source;

pub use mlat_feed_beast as beast;

#[derive(Debug, thiserror::Error)]
#[error("mlat-feed error")]
pub enum Error {
    Io(#[from] std::io::Error),
    StationConfig(#[from] serde_yaml_ng::Error),
    Join(#[from] tokio::task::JoinError),
}
