//! Transaction streaming core
//!
//! Multiplexes the requests of one transaction over a single bidirectional
//! channel: outbound requests are coalesced into frames by a dispatcher,
//! inbound responses are routed back to their callers by request id.

pub mod channel;
pub mod collector;
pub mod config;
pub mod error;
pub mod iterator;
pub mod metrics;
pub mod queue;
pub mod stream;
pub mod transmitter;
pub mod types;

pub use channel::{loopback, DuplexChannel, InboundStream, LoopbackServer};
pub use collector::ResponseCollector;
pub use config::TransmitterConfig;
pub use error::{Error, Result};
pub use iterator::ResponsePartIterator;
pub use queue::ResponseQueue;
pub use stream::{BidirectionalStream, Single};
pub use transmitter::{Dispatcher, RequestTransmitter};
pub use types::RequestId;
pub use txstream_proto as proto;
