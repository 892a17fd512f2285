//! Rewrite-relay error types.

use thiserror::Error;

/// Errors from the external rewriting service.
///
/// `Transport` maps to the dedicated send-failure status; everything
/// else lands in the processing-failure status. "Nothing usable"
/// (empty or too-short results) is not an error at all; the client
/// reports it as an absent result.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The endpoint was unreachable or the call timed out.
    #[error("relay transport failed: {0}")]
    Transport(String),

    /// The relay answered with a non-success status.
    #[error("relay error (status {status}): {body}")]
    Api { status: u16, body: String },

    /// The relay answered 2xx but the payload was not the expected
    /// shape.
    #[error("malformed relay response: {0}")]
    Malformed(String),
}
