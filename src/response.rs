//! Response synthesis.
//!
//! Turns a resolved [`ResponseSpec`] into a concrete [`MockResponse`]:
//! status, assembled headers (`Content-Type` from the media type, one
//! `Set-Cookie` line per cookie string), body bytes, the configured
//! artificial latency, and the dispatch callback.

use crate::expectation::ResponseSpec;
use crate::request::RequestSnapshot;
use tracing::debug;

/// A synthesized response handed back to the intercepted client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl MockResponse {
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First header with the given name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All `Set-Cookie` header values, in configuration order.
    pub fn set_cookies(&self) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("set-cookie"))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The body as UTF-8 text, if it is valid UTF-8.
    pub fn body_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}

/// Produce the response for a resolved spec.
///
/// The configured delay is awaited first (a cooperative sleep, cancelled if
/// the caller drops the dispatch future), then the `on_dispatch` callback
/// runs synchronously with the inbound snapshot. Panics from the callback
/// propagate to the dispatch caller.
pub(crate) async fn synthesize(spec: &ResponseSpec, request: &RequestSnapshot) -> MockResponse {
    if !spec.delay.is_zero() {
        debug!(delay_ms = spec.delay.as_millis() as u64, "Applying delay");
        tokio::time::sleep(spec.delay).await;
    }

    if let Some(callback) = &spec.on_dispatch {
        callback(request);
    }

    build(spec)
}

fn build(spec: &ResponseSpec) -> MockResponse {
    let mut headers = spec.headers.clone();

    if let Some(media_type) = &spec.media_type {
        let configured = headers
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case("content-type"));
        if !configured {
            headers.push(("Content-Type".to_string(), media_type.clone()));
        }
    }

    for cookie in &spec.cookies {
        headers.push(("Set-Cookie".to_string(), cookie.clone()));
    }

    MockResponse {
        status: spec.status,
        headers,
        body: spec.body.clone().unwrap_or_default(),
    }
}
