use crate::types::RequestId;
use thiserror::Error;
use tonic::Status;

/// Errors surfaced by the transaction stream.
///
/// `Clone` because a single terminal error (for example a channel failure) is
/// delivered to every request still waiting on the stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("The transaction has been closed and no further operation is allowed.")]
    TransactionClosed,

    #[error("The client has been closed and no further operation is allowed.")]
    ClientClosed,

    #[error("Received a response with unknown request id '{0}'")]
    UnknownRequestId(RequestId),

    #[error("Received a request id of {0} bytes, expected 16")]
    InvalidRequestId(usize),

    #[error("Request id '{0}' is already awaiting a response")]
    DuplicateRequestId(RequestId),

    #[error("Missing response for request id '{0}'")]
    MissingResponse(RequestId),

    #[error("Illegal message received from server: {0}")]
    IllegalServerMessage(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("RPC failed with {code:?}: {message}")]
    Rpc { code: tonic::Code, message: String },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No Tokio runtime available to drive request batching")]
    NoRuntime,
}

impl Error {
    /// Returns a stable error code for this error variant.
    pub fn code(&self) -> &'static str {
        match self {
            Error::TransactionClosed => "TRANSACTION_CLOSED",
            Error::ClientClosed => "CLIENT_CLOSED",
            Error::UnknownRequestId(_) => "UNKNOWN_REQUEST_ID",
            Error::InvalidRequestId(_) => "INVALID_REQUEST_ID",
            Error::DuplicateRequestId(_) => "DUPLICATE_REQUEST_ID",
            Error::MissingResponse(_) => "MISSING_RESPONSE",
            Error::IllegalServerMessage(_) => "ILLEGAL_SERVER_MESSAGE",
            Error::UnexpectedResponse(_) => "UNEXPECTED_RESPONSE",
            Error::Rpc { .. } => "RPC_ERROR",
            Error::Connection(_) => "CONNECTION_ERROR",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::NoRuntime => "NO_RUNTIME",
        }
    }

    /// Returns true if this error breaks request correlation for the whole
    /// stream, so every in-flight request has to be failed with it.
    ///
    /// Per-request errors like `MissingResponse` only affect the request that
    /// produced them.
    pub fn is_stream_fatal(&self) -> bool {
        match self {
            Error::UnknownRequestId(_) => true,
            Error::InvalidRequestId(_) => true,
            Error::IllegalServerMessage(_) => true,
            Error::Rpc { .. } => true,

            Error::TransactionClosed => false,
            Error::ClientClosed => false,
            Error::DuplicateRequestId(_) => false,
            Error::MissingResponse(_) => false,
            Error::UnexpectedResponse(_) => false,
            Error::Connection(_) => false,
            Error::InvalidConfig(_) => false,
            Error::NoRuntime => false,
        }
    }
}

/// Convert a gRPC status from the channel into an error
impl From<Status> for Error {
    fn from(status: Status) -> Self {
        Error::Rpc {
            code: status.code(),
            message: status.message().to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
