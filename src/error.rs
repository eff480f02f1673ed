use polars::prelude::PolarsError;
use std::{io, path::PathBuf, time::Duration};
use thiserror::Error;
use tokio::task::JoinError;

/**
Result type to simplify function signatures.

This is a custom result type that uses our custom `TradeViewError` for the error type.

Functions can return `TradeViewResult<T>` and then use `?` to automatically propagate errors.
*/
pub type TradeViewResult<T> = Result<T, TradeViewError>;

/**
Custom error type for Trade View.

This enum defines all the possible errors that can occur in the application,
from building a query to drawing the resulting matrix.

We use the `thiserror` crate to derive the `Error` trait and automatically
implement `Display` using the `#[error(...)]` attribute.
*/
#[derive(Error, Debug)]
pub enum TradeViewError {
    // --- Engine Errors ---
    /// The transport could not reach the query engine (refused, DNS, reset).
    #[error("Connection error: {0}")]
    Connection(String),

    /// The engine did not answer within the configured request timeout.
    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    /// The engine rejected the query (syntax, unknown column, ...).
    /// Carries the engine's own diagnostic message.
    #[error("Query rejected by the engine: {message}")]
    Query { message: String },

    /// The engine answered, but the body could not be decoded.
    #[error("Unexpected broker response: {0}")]
    Protocol(String),

    // --- Pipeline Errors ---
    /// The grouping of a query does not uniquely key the requested pivot.
    #[error("Duplicate pivot key: row '{row}', column '{column}' appears more than once")]
    DuplicateKey { row: String, column: String },

    /// A column requested by the reshaper is not present in the result.
    #[error("Column not found in result: '{0}'")]
    ColumnNotFound(String),

    /// A pivot value cannot be read as a number.
    #[error("Non-numeric value '{value}' in column '{column}'")]
    NonNumericValue { column: String, value: String },

    /// A query specification that cannot produce valid SQL (empty table, empty column name).
    #[error("Invalid query specification: {0}")]
    InvalidQuery(String),

    // --- Local Snapshot Errors ---
    // Wrapper for standard IO errors.
    // The #[from] attribute automatically converts io::Error to TradeViewError::Io.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // Wrapper for Polars errors (snapshot loading, CSV export).
    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    // Errors related to the file type (e.g., unsupported file extension).
    #[error("File type error: {0}")]
    FileType(String),

    // Indicates that a specified file or folder could not be found, storing the attempted path.
    #[error("File not found: {0:#?}")]
    FileNotFound(PathBuf),

    // --- Runtime Errors ---
    // Wrapper for Tokio JoinErrors, occurring when asynchronous tasks fail.
    #[error("Tokio JoinError: {0}")]
    TokioJoin(#[from] JoinError),

    // Errors occurring when receiving data from asynchronous channels.
    #[error("Channel receive error: {0}")]
    ChannelReceive(String),

    #[error("Invalid value for command-line argument '{arg_name}': {reason}")]
    InvalidArgument {
        arg_name: String, // Context about *which* argument failed
        reason: String,   // The specific error reason
    },

    // A catch-all for other, less specific errors not covered by specific variants.
    #[error("Other error: {0}")]
    Other(String),
}

impl TradeViewError {
    /// Returns `true` for failures worth another attempt: the engine was unreachable or slow.
    /// A rejected query fails the same way every time.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TradeViewError::Connection(_) | TradeViewError::Timeout(_)
        )
    }
}

impl TradeViewError {
    /// Classifies a transport error of the broker client.
    ///
    /// `timeout` is the bound the client was built with; reqwest does not
    /// report it on the error.
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> TradeViewError {
        if err.is_timeout() {
            TradeViewError::Timeout(timeout)
        } else if err.is_connect() || err.is_request() {
            TradeViewError::Connection(err.to_string())
        } else if err.is_decode() || err.is_body() {
            TradeViewError::Protocol(err.to_string())
        } else {
            TradeViewError::Other(err.to_string())
        }
    }

    /// Classifies a non-success HTTP status of the broker.
    ///
    /// A 5xx means the broker is down or overloaded and is retried like a
    /// refused connection. Anything else is a rejection of the request itself.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> TradeViewError {
        let message = format!("HTTP {status}: {body}");
        if status.is_server_error() {
            TradeViewError::Connection(message)
        } else {
            TradeViewError::Query { message }
        }
    }
}

// Implementation of the From trait to convert a String into a TradeViewError.
// This allows us to easily convert generic error strings into our custom error type.
impl From<String> for TradeViewError {
    fn from(err: String) -> TradeViewError {
        // Prefer using specific error variants when possible, fallback to Other.
        TradeViewError::Other(err)
    }
}

//----------------------------------------------------------------------------//
//                                   Tests                                    //
//----------------------------------------------------------------------------//

/// Run tests with:
/// `cargo test -- --show-output tests_error`
#[cfg(test)]
mod tests_error {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn transient_errors_are_connection_and_timeout() {
        assert!(TradeViewError::Connection("refused".into()).is_transient());
        assert!(TradeViewError::Timeout(Duration::from_secs(1)).is_transient());

        let rejected = TradeViewError::Query {
            message: "Unknown column FOO".into(),
        };
        assert!(!rejected.is_transient());
        assert!(
            !TradeViewError::DuplicateKey {
                row: "A".into(),
                column: "1".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn query_error_keeps_engine_message() {
        let err = TradeViewError::Query {
            message: "SQLParsingError: line 1".into(),
        };
        assert!(err.to_string().contains("SQLParsingError: line 1"));
    }

    #[test]
    fn server_errors_are_transient_client_errors_are_not() {
        let unavailable = TradeViewError::from_status(StatusCode::SERVICE_UNAVAILABLE, "busy");
        assert!(matches!(&unavailable, TradeViewError::Connection(msg) if msg.contains("503")));
        assert!(unavailable.is_transient());

        let bad_request = TradeViewError::from_status(StatusCode::BAD_REQUEST, "bad sql");
        assert!(matches!(&bad_request, TradeViewError::Query { message } if message.contains("400")));
        assert!(!bad_request.is_transient());
    }

    #[test]
    fn string_converts_to_other() {
        let err: TradeViewError = "something odd".to_string().into();
        assert!(matches!(err, TradeViewError::Other(msg) if msg == "something odd"));
    }
}
