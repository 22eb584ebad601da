//! http-double
//!
//! An in-process test double for HTTP clients: it intercepts outbound
//! requests before they reach a real transport, matches them against
//! configured expectations and synthesizes responses instead of performing
//! network I/O. Every matched request is captured so tests can assert on
//! what was sent.
//!
//! # Features
//!
//! - **Request Matching**: scheme, host (with `*` wildcard), path, query
//!   parameters and content type
//! - **Response Sequences**: repeated calls to the same endpoint return
//!   different responses in order
//! - **Response Synthesis**: status, headers, cookies, body, simulated
//!   latency and dispatch callbacks
//! - **Capture Log**: append-only record of every dispatched request
//! - **Declarative Files**: load expectation sets from YAML
//!
//! # Example
//!
//! ```rust
//! use http_double::{Method, MockTransport, RequestSnapshot};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = MockTransport::new();
//!
//! transport
//!     .respond_to(Method::Get, "/api/info")?
//!     .respond_with(200)
//!     .with_content("application/json", r#"{"ok":true}"#);
//!
//! let response = transport
//!     .dispatch(RequestSnapshot::new(Method::Get, "/api/info")?)
//!     .await?;
//!
//! assert_eq!(response.status(), 200);
//! assert_eq!(transport.requests().len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod expectation;
pub mod index;
pub mod request;
pub mod response;

pub use builder::{Cookie, ExpectationBuilder, QueryParameterBuilder, ResponseBuilder};
pub use config::ExpectationFile;
pub use dispatch::{Intercept, MockTransport};
pub use error::{ConfigError, DispatchError};
pub use expectation::{ExpectationId, QueryRequirement};
pub use request::{Method, RequestSnapshot, RequestUri};
pub use response::MockResponse;
