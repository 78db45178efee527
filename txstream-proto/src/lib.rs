//! txstream wire protocol
//!
//! Protocol Buffers messages for the transaction stream and the client stub
//! for the bidirectional `Transactor/transaction` RPC. The core only relies on
//! the envelope fields (`req_id`, the `req` / `res` tags and the pagination
//! state); operation payloads are opaque to it.

/// Transaction request, response and response-part envelopes.
pub mod transaction;
pub mod transactor;

pub use transactor::TransactorClient;
