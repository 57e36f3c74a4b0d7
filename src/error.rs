//! Error types for the trading engine
//!
//! Every fallible operation returns a `Result` whose error is classified
//! into one of the kinds below. Classification is what drives behavior:
//! transient transport errors are retried on another endpoint, definitive
//! ones are not, and invariant violations trip the emergency path.

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the trading engine
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid keypair: {0}")]
    InvalidKeypair(String),

    #[error("Insecure keypair permissions: {0}")]
    InsecureKeypair(String),

    // Transport errors (classified per retry policy)
    /// Recoverable by retrying on another endpoint: timeout, 5xx,
    /// connection reset, disconnection.
    #[error("Transient transport error: {0}")]
    TransientTransport(String),

    /// Not retryable: malformed request, signature rejection.
    #[error("Definitive transport error: {0}")]
    DefinitiveTransport(String),

    #[error("RPC timeout after {0}ms")]
    RpcTimeout(u64),

    /// All endpoints tried once and none succeeded. Carries the
    /// per-endpoint errors for diagnostics.
    #[error("All {} RPC endpoints failed; last: {}", .attempts.len(), .attempts.last().map(|(_, e)| e.as_str()).unwrap_or("none"))]
    TransportExhausted { attempts: Vec<(String, String)> },

    /// Blockhash expired or nonce mismatch. Retry after a fresh fetch.
    #[error("Stale chain state: {0}")]
    StaleState(String),

    // Stream errors
    #[error("Stream connection failed: {0}")]
    StreamConnection(String),

    #[error("Stream disconnected: {0}")]
    StreamDisconnected(String),

    /// Payload did not match the expected shape. Logged and counted,
    /// never propagated past the adapter that saw it.
    #[error("Unparseable input from {source_tag}: {detail}")]
    UnparseableInput { source_tag: String, detail: String },

    /// Bounded channel full. Fan-in drops oldest; command channels
    /// surface this to the caller.
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Blocked by a configured rule (risk veto, blacklist, paused).
    /// Normal operation, not a failure.
    #[error("Policy reject: {0}")]
    PolicyReject(String),

    // Trading errors
    #[error("Transaction build failed: {0}")]
    TransactionBuild(String),

    #[error("Bundle submission failed: {0}")]
    BundleSubmission(String),

    #[error("Bundle rejected: {0}")]
    BundleRejected(String),

    #[error("Slippage exceeded: expected {expected}, got {actual}")]
    SlippageExceeded { expected: u64, actual: u64 },

    #[error("Signing rate cap exceeded")]
    SigningRateCap,

    // Position management errors
    #[error("Position not found: {0}")]
    PositionNotFound(String),

    #[error("Insufficient capital: {available} available, {required} required")]
    InsufficientCapital { available: f64, required: f64 },

    /// Impossible state (e.g. negative capital). Fatal: triggers
    /// emergency stop of all positions and process exit 10.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error should be retried on another endpoint
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::TransientTransport(_)
                | Error::RpcTimeout(_)
                | Error::StreamDisconnected(_)
                | Error::StaleState(_)
        )
    }

    /// Check if this error must not be retried
    pub fn is_definitive(&self) -> bool {
        matches!(
            self,
            Error::DefinitiveTransport(_)
                | Error::TransportExhausted { .. }
                | Error::BundleRejected(_)
                | Error::InvariantViolation(_)
        )
    }

    /// Check if this error requires a fresh blockhash before retrying
    pub fn needs_fresh_state(&self) -> bool {
        matches!(self, Error::StaleState(_))
    }

    /// Check if this error is fatal for the whole process
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::InvariantViolation(_))
    }

    /// Classify a JSON-RPC error code into transient or definitive.
    ///
    /// Server-side and rate-limit codes are worth retrying elsewhere;
    /// request-shape and signature errors are not. Blockhash-not-found
    /// maps to StaleState so callers refetch before retrying.
    pub fn from_rpc_code(code: i64, message: String) -> Self {
        match code {
            // JSON-RPC standard: invalid request / method / params
            -32600 | -32601 | -32602 => Error::DefinitiveTransport(message),
            // Blockhash not found
            -32002 if message.contains("Blockhash") => Error::StaleState(message),
            // Transaction signature verification failure
            -32003 => Error::DefinitiveTransport(message),
            // Node behind / unhealthy
            -32004 | -32005 => Error::TransientTransport(message),
            _ => Error::TransientTransport(format!("rpc error {code}: {message}")),
        }
    }
}

// Conversion from reqwest errors: timeouts and connection failures are
// transient; anything the server definitively rejected is not.
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            return Error::TransientTransport(e.to_string());
        }
        if let Some(status) = e.status() {
            if status.is_server_error() || status.as_u16() == 429 {
                return Error::TransientTransport(e.to_string());
            }
            return Error::DefinitiveTransport(e.to_string());
        }
        Error::TransientTransport(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
