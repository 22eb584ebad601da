//! Error types for expectation configuration and dispatch.

use crate::request::Method;

/// Error raised while configuring an expectation.
///
/// Configuration problems surface immediately at registration time and are
/// never deferred to dispatch.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The path-and-query string passed to `respond_to` was empty.
    #[error("path must not be empty")]
    EmptyPath,

    /// An absolute URL could not be split into scheme, authority and path.
    #[error("malformed absolute URL: {0}")]
    MalformedUrl(String),

    /// An incoming request URL could not be parsed into a snapshot.
    #[error("malformed request URL: {0}")]
    MalformedRequestUrl(String),
}

/// Error raised while dispatching a request.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No registered expectation matches the request.
    ///
    /// This is a hard test-failure condition, deliberately distinct from
    /// "respond with 500" (which is the default *status* for a matched but
    /// unconfigured expectation). The surrounding harness should surface it
    /// as a fatal assertion.
    #[error("no expectation matches {method} {uri}")]
    UnmatchedRequest {
        /// Method of the unmatched request.
        method: Method,
        /// Full URI of the unmatched request.
        uri: String,
    },
}
