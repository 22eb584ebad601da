//! The dispatch façade.
//!
//! [`MockTransport`] is the single entry point the intercepted HTTP client
//! talks to: it owns the expectation registry, resolves incoming requests
//! through the [`RequestIndex`], advances sequence cursors, synthesizes
//! responses and appends every matched request to the capture log.

use crate::builder::ExpectationBuilder;
use crate::error::{ConfigError, DispatchError};
use crate::expectation::{Expectation, ExpectationId, ResponseSpec};
use crate::index::{RequestIndex, WILDCARD_AUTHORITY};
use crate::request::{is_absolute_url, Method, RequestSnapshot, RequestUri};
use crate::response::{self, MockResponse};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, warn};

/// Transport-interception contract exposed to the host HTTP client.
#[async_trait]
pub trait Intercept: Send + Sync {
    /// Match the request against the registered expectations and synthesize
    /// a response, or fail with [`DispatchError::UnmatchedRequest`].
    async fn dispatch(&self, request: RequestSnapshot) -> Result<MockResponse, DispatchError>;
}

/// Registered expectations plus the index resolving requests to them.
///
/// Expectation ids are positions in the `expectations` vec and stay stable
/// for the lifetime of the registry; an overwritten registration leaves its
/// old entry in place but unreachable from the index.
pub(crate) struct Registry {
    pub(crate) expectations: Vec<Expectation>,
    pub(crate) index: RequestIndex,
}

impl Registry {
    fn new() -> Self {
        Self {
            expectations: Vec::new(),
            index: RequestIndex::new(),
        }
    }

    /// Create an expectation from a path-and-query string and index it.
    ///
    /// Absolute URLs register under their exact scheme and authority.
    /// Relative paths register under the wildcard authority for both `http`
    /// and `https`, so they match any host on either scheme.
    pub(crate) fn register(
        &mut self,
        method: Method,
        path_and_query: &str,
        content_type: Option<String>,
    ) -> Result<ExpectationId, ConfigError> {
        if path_and_query.is_empty() {
            return Err(ConfigError::EmptyPath);
        }

        // Absolute only when the scheme separator precedes the path and
        // query; a query value embedding a URL stays a relative registration.
        let (targets, path, query) = if is_absolute_url(path_and_query) {
            let uri = RequestUri::parse(path_and_query)
                .map_err(|_| ConfigError::MalformedUrl(path_and_query.to_string()))?;
            (
                vec![(uri.scheme, uri.authority)],
                uri.path,
                uri.query,
            )
        } else {
            let (path, query) = match path_and_query.split_once('?') {
                Some((path, query)) => (path.to_string(), Some(query.to_string())),
                None => (path_and_query.to_string(), None),
            };
            // Requests always carry a leading slash, so normalize the
            // registration to one as well.
            let path = if path.starts_with('/') {
                path
            } else {
                format!("/{path}")
            };
            (
                vec![
                    ("http".to_string(), WILDCARD_AUTHORITY.to_string()),
                    ("https".to_string(), WILDCARD_AUTHORITY.to_string()),
                ],
                path,
                query,
            )
        };

        let id = self.expectations.len();
        let expectation = Expectation::new(id, method, &path, query.as_deref(), content_type)?;
        self.expectations.push(expectation);

        for (scheme, authority) in &targets {
            self.index
                .insert(scheme, authority, &path, id, &self.expectations);
        }

        Ok(id)
    }

    fn find(&self, request: &RequestSnapshot) -> Option<ExpectationId> {
        let params = request.query_params();
        self.index.find(
            &request.uri().scheme,
            &request.uri().authority,
            &request.uri().path,
            request.method(),
            request.content_type(),
            &params,
            &self.expectations,
        )
    }
}

/// In-process test double standing in for an HTTP transport.
///
/// Configure expectations with [`respond_to`](Self::respond_to) before
/// requests are sent, then hand the transport to the client under test (or
/// call [`dispatch`](Intercept::dispatch) directly). Every matched request
/// is appended to the capture log for later assertions.
pub struct MockTransport {
    registry: Arc<RwLock<Registry>>,
    requests: Mutex<Vec<RequestSnapshot>>,
    requests_total: AtomicU64,
    requests_matched: AtomicU64,
    requests_unmatched: AtomicU64,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(RwLock::new(Registry::new())),
            requests: Mutex::new(Vec::new()),
            requests_total: AtomicU64::new(0),
            requests_matched: AtomicU64::new(0),
            requests_unmatched: AtomicU64::new(0),
        }
    }

    /// Register an expectation for the given method and path-and-query.
    ///
    /// Query parameters in the URL become requirements: `?id=5` requires the
    /// literal value, `?id` accepts any value. Fails immediately on an empty
    /// or malformed path.
    pub fn respond_to(
        &self,
        method: Method,
        path_and_query: &str,
    ) -> Result<ExpectationBuilder, ConfigError> {
        self.register(method, path_and_query, None)
    }

    /// Like [`respond_to`](Self::respond_to), additionally requiring the
    /// request's `Content-Type` media type to equal `content_type`.
    pub fn respond_to_content_type(
        &self,
        method: Method,
        path_and_query: &str,
        content_type: &str,
    ) -> Result<ExpectationBuilder, ConfigError> {
        self.register(method, path_and_query, Some(content_type.to_string()))
    }

    fn register(
        &self,
        method: Method,
        path_and_query: &str,
        content_type: Option<String>,
    ) -> Result<ExpectationBuilder, ConfigError> {
        let id = self
            .registry
            .write()
            .expect("registry lock poisoned")
            .register(method, path_and_query, content_type)?;
        debug!(id, %method, path_and_query, "Registered expectation");
        Ok(ExpectationBuilder::new(Arc::clone(&self.registry), id))
    }

    /// Dispatch a request against the registered expectations.
    pub async fn dispatch(
        &self,
        request: RequestSnapshot,
    ) -> Result<MockResponse, DispatchError> {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        // Deep copy for the capture log up front, so the entry stays
        // readable independently of whatever the caller does with the
        // original request.
        let captured = request.clone();

        let resolved: Option<(ExpectationId, ResponseSpec)> = {
            let registry = self.registry.read().expect("registry lock poisoned");
            registry.find(&request).map(|matched| {
                let serve = registry.expectations[matched]
                    .next_in_sequence()
                    .unwrap_or(matched);
                (matched, registry.expectations[serve].response.clone())
            })
        };

        let Some((matched, spec)) = resolved else {
            self.requests_unmatched.fetch_add(1, Ordering::Relaxed);
            warn!(
                method = %request.method(),
                uri = %request.uri(),
                "No expectation matches request"
            );
            return Err(DispatchError::UnmatchedRequest {
                method: request.method(),
                uri: request.uri().to_string(),
            });
        };

        self.requests_matched.fetch_add(1, Ordering::Relaxed);
        debug!(
            expectation = matched,
            method = %request.method(),
            path = %request.uri().path,
            "Request matched expectation"
        );

        let response = response::synthesize(&spec, &request).await;

        self.requests
            .lock()
            .expect("capture log lock poisoned")
            .push(captured);

        Ok(response)
    }

    /// Ordered view of all requests dispatched so far.
    pub fn requests(&self) -> Vec<RequestSnapshot> {
        self.requests
            .lock()
            .expect("capture log lock poisoned")
            .clone()
    }

    /// Clear the capture log.
    pub fn reset_requests(&self) {
        self.requests
            .lock()
            .expect("capture log lock poisoned")
            .clear();
    }

    /// Remove all registered expectations.
    ///
    /// Builder handles obtained before the call must not be used afterwards.
    pub fn clear_expectations(&self) {
        let mut registry = self.registry.write().expect("registry lock poisoned");
        *registry = Registry::new();
    }

    /// Total requests dispatched.
    pub fn total_requests(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    /// Total requests that matched an expectation.
    pub fn total_matched(&self) -> u64 {
        self.requests_matched.load(Ordering::Relaxed)
    }

    /// Total requests that matched nothing.
    pub fn total_unmatched(&self) -> u64 {
        self.requests_unmatched.load(Ordering::Relaxed)
    }

    /// Render the expectation index for debugging.
    pub fn dump_index(&self) -> String {
        let registry = self.registry.read().expect("registry lock poisoned");
        registry.index.dump(&registry.expectations)
    }
}

#[async_trait]
impl Intercept for MockTransport {
    async fn dispatch(&self, request: RequestSnapshot) -> Result<MockResponse, DispatchError> {
        MockTransport::dispatch(self, request).await
    }
}
