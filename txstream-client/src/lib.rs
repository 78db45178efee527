/// txstream gRPC Client Library
///
/// Connects to a txstream server and runs transactions over the batching,
/// request-correlating stream of `txstream-core`.

pub mod client;
pub mod config;
pub mod transaction;

// Re-export key types
pub use client::Client;
pub use config::ClientConfig;
pub use transaction::{AnswerStream, Transaction};
pub use txstream_core::{Error, Result};
pub use txstream_proto::transaction::{Options, Type};
