//! Expectation entities.
//!
//! An [`Expectation`] is one registered request pattern together with its
//! resolved response (or response sequence). Expectations are configured
//! through the builder handles in [`crate::builder`] and become effectively
//! immutable once dispatching starts; the only mutable piece is the sequence
//! cursor, an atomic counter owned by the entity itself.

use crate::error::ConfigError;
use crate::request::{urlencoding_decode, Method, RequestSnapshot};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Identifier of an expectation within the registry.
pub type ExpectationId = usize;

/// Side effect invoked when an expectation is dispatched.
pub type DispatchCallback = Arc<dyn Fn(&RequestSnapshot) + Send + Sync>;

/// Requirement placed on a single query parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryRequirement {
    /// The parameter must be present with exactly this value.
    Value(String),
    /// The parameter must be present, any value is accepted.
    AnyValue,
    /// The parameter must not be present at all.
    Absent,
}

impl QueryRequirement {
    fn is_satisfied_by(&self, key: &str, params: &HashMap<String, String>) -> bool {
        match self {
            QueryRequirement::Value(expected) => params.get(key) == Some(expected),
            QueryRequirement::AnyValue => params.contains_key(key),
            QueryRequirement::Absent => !params.contains_key(key),
        }
    }
}

/// The response half of an expectation.
#[derive(Clone)]
pub struct ResponseSpec {
    /// HTTP status code; 500 until `respond_with` is called.
    pub status: u16,
    /// Media type for the response body.
    pub media_type: Option<String>,
    /// Response body payload; `None` produces an empty body.
    pub body: Option<Vec<u8>>,
    /// Ordered headers with unique keys; collisions are comma-joined.
    pub headers: Vec<(String, String)>,
    /// Pre-rendered `Set-Cookie` strings, one per cookie.
    pub cookies: Vec<String>,
    /// Artificial latency applied before the response is returned.
    pub delay: Duration,
    /// Callback invoked with the inbound snapshot at dispatch time.
    pub on_dispatch: Option<DispatchCallback>,
}

impl Default for ResponseSpec {
    fn default() -> Self {
        Self {
            status: 500,
            media_type: None,
            body: None,
            headers: Vec::new(),
            cookies: Vec::new(),
            delay: Duration::ZERO,
            on_dispatch: None,
        }
    }
}

impl fmt::Debug for ResponseSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseSpec")
            .field("status", &self.status)
            .field("media_type", &self.media_type)
            .field("body", &self.body.as_ref().map(|b| b.len()))
            .field("headers", &self.headers)
            .field("cookies", &self.cookies)
            .field("delay", &self.delay)
            .field("on_dispatch", &self.on_dispatch.is_some())
            .finish()
    }
}

impl ResponseSpec {
    /// Merge a header into the spec. If the key already exists (compared
    /// case-sensitively) the value is appended to it separated by a comma.
    pub fn merge_header(&mut self, name: &str, value: &str) {
        if let Some((_, existing)) = self.headers.iter_mut().find(|(k, _)| k == name) {
            existing.push(',');
            existing.push_str(value);
        } else {
            self.headers.push((name.to_string(), value.to_string()));
        }
    }
}

/// One registered request pattern and its response.
#[derive(Debug)]
pub struct Expectation {
    pub(crate) id: ExpectationId,
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) content_type: Option<String>,
    pub(crate) query: HashMap<String, QueryRequirement>,
    pub(crate) response: ResponseSpec,
    /// Child expectations forming a flat response sequence. Empty means the
    /// inline response is served on every match.
    pub(crate) sequence: Vec<ExpectationId>,
    cursor: AtomicUsize,
}

impl Expectation {
    /// Create an expectation for a path with an optional raw query string.
    ///
    /// Query parameters in the registration URL become requirements: a
    /// parameter with a value requires exactly that value, a parameter
    /// without `=` accepts any value.
    pub(crate) fn new(
        id: ExpectationId,
        method: Method,
        path: &str,
        query: Option<&str>,
        content_type: Option<String>,
    ) -> Result<Self, ConfigError> {
        if path.is_empty() {
            return Err(ConfigError::EmptyPath);
        }

        // Keys and values are decoded so requirements compare against the
        // decoded incoming parameters.
        let mut requirements = HashMap::new();
        if let Some(query) = query {
            for part in query.split('&').filter(|p| !p.is_empty()) {
                match part.split_once('=') {
                    Some((key, value)) => {
                        requirements.insert(
                            urlencoding_decode(key),
                            QueryRequirement::Value(urlencoding_decode(value)),
                        );
                    }
                    None => {
                        requirements.insert(urlencoding_decode(part), QueryRequirement::AnyValue);
                    }
                }
            }
        }

        Ok(Self {
            id,
            method,
            path: path.to_string(),
            content_type,
            query: requirements,
            response: ResponseSpec::default(),
            sequence: Vec::new(),
            cursor: AtomicUsize::new(0),
        })
    }

    /// Create a sequence child sharing this expectation's request pattern.
    pub(crate) fn sequence_child(&self, id: ExpectationId) -> Self {
        Self {
            id,
            method: self.method,
            path: self.path.clone(),
            content_type: self.content_type.clone(),
            query: self.query.clone(),
            response: ResponseSpec::default(),
            sequence: Vec::new(),
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> ExpectationId {
        self.id
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether this expectation matches the given request properties.
    ///
    /// Returns the number of satisfied query requirements so the index can
    /// prefer the most specific candidate; extra unconstrained parameters on
    /// the request are ignored.
    pub(crate) fn matches(
        &self,
        method: Method,
        content_type: Option<&str>,
        params: &HashMap<String, String>,
    ) -> Option<usize> {
        if self.method != method {
            return None;
        }

        if let Some(expected) = &self.content_type {
            if content_type != Some(expected.as_str()) {
                return None;
            }
        }

        for (key, requirement) in &self.query {
            if !requirement.is_satisfied_by(key, params) {
                return None;
            }
        }

        Some(self.query.len())
    }

    /// Whether another registration targets the same request pattern and
    /// should overwrite this one.
    pub(crate) fn same_shape(&self, other: &Expectation) -> bool {
        self.method == other.method
            && self.path == other.path
            && self.content_type == other.content_type
            && self.query == other.query
    }

    /// Select the sequence step to serve for this match, or `None` when the
    /// inline response applies.
    ///
    /// The cursor grows without bound but is clamped on read, so an exhausted
    /// sequence keeps repeating its last step. It advances on every
    /// successful dispatch regardless of which step was served.
    pub(crate) fn next_in_sequence(&self) -> Option<ExpectationId> {
        if self.sequence.is_empty() {
            return None;
        }
        let position = self.cursor.fetch_add(1, Ordering::SeqCst);
        Some(self.sequence[position.min(self.sequence.len() - 1)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_registration_query_becomes_requirements() {
        let exp = Expectation::new(0, Method::Get, "/x", Some("id=5&token"), None).unwrap();
        assert_eq!(
            exp.query.get("id"),
            Some(&QueryRequirement::Value("5".to_string()))
        );
        assert_eq!(exp.query.get("token"), Some(&QueryRequirement::AnyValue));
    }

    #[test]
    fn test_registration_query_values_are_decoded() {
        let exp = Expectation::new(0, Method::Get, "/x", Some("name=John%20Doe&tag=a+b"), None)
            .unwrap();
        assert_eq!(
            exp.query.get("name"),
            Some(&QueryRequirement::Value("John Doe".to_string()))
        );
        assert_eq!(
            exp.query.get("tag"),
            Some(&QueryRequirement::Value("a b".to_string()))
        );
    }

    #[test]
    fn test_empty_path_is_rejected() {
        assert!(Expectation::new(0, Method::Get, "", None, None).is_err());
    }

    #[test]
    fn test_any_value_requires_presence() {
        let mut exp = Expectation::new(0, Method::Get, "/x", None, None).unwrap();
        exp.query
            .insert("id".to_string(), QueryRequirement::AnyValue);

        assert_eq!(exp.matches(Method::Get, None, &params(&[("id", "7")])), Some(1));
        assert_eq!(exp.matches(Method::Get, None, &params(&[])), None);
    }

    #[test]
    fn test_absent_fails_when_key_present() {
        let mut exp = Expectation::new(0, Method::Get, "/x", None, None).unwrap();
        exp.query.insert("id".to_string(), QueryRequirement::Absent);

        assert_eq!(exp.matches(Method::Get, None, &params(&[])), Some(1));
        assert_eq!(exp.matches(Method::Get, None, &params(&[("id", "7")])), None);
    }

    #[test]
    fn test_extra_unconstrained_parameters_are_ignored() {
        let exp = Expectation::new(0, Method::Get, "/x", Some("id=5"), None).unwrap();
        assert_eq!(
            exp.matches(Method::Get, None, &params(&[("id", "5"), ("other", "1")])),
            Some(1)
        );
    }

    #[test]
    fn test_content_type_none_matches_any() {
        let exp = Expectation::new(0, Method::Post, "/x", None, None).unwrap();
        assert!(exp
            .matches(Method::Post, Some("application/json"), &params(&[]))
            .is_some());

        let typed = Expectation::new(
            1,
            Method::Post,
            "/x",
            None,
            Some("application/json".to_string()),
        )
        .unwrap();
        assert!(typed
            .matches(Method::Post, Some("application/json"), &params(&[]))
            .is_some());
        assert!(typed.matches(Method::Post, Some("text/plain"), &params(&[])).is_none());
        assert!(typed.matches(Method::Post, None, &params(&[])).is_none());
    }

    #[test]
    fn test_sequence_cursor_clamps_at_last_step() {
        let mut exp = Expectation::new(0, Method::Get, "/x", None, None).unwrap();
        exp.sequence = vec![10, 11];

        assert_eq!(exp.next_in_sequence(), Some(10));
        assert_eq!(exp.next_in_sequence(), Some(11));
        assert_eq!(exp.next_in_sequence(), Some(11));
        assert_eq!(exp.next_in_sequence(), Some(11));
    }

    #[test]
    fn test_empty_sequence_serves_inline_response() {
        let exp = Expectation::new(0, Method::Get, "/x", None, None).unwrap();
        assert_eq!(exp.next_in_sequence(), None);
    }

    #[test]
    fn test_header_merge_appends_with_comma() {
        let mut spec = ResponseSpec::default();
        spec.merge_header("X", "a");
        spec.merge_header("X", "b");
        spec.merge_header("Y", "c");

        assert_eq!(
            spec.headers,
            vec![
                ("X".to_string(), "a,b".to_string()),
                ("Y".to_string(), "c".to_string())
            ]
        );
    }

    #[test]
    fn test_header_merge_is_case_sensitive() {
        let mut spec = ResponseSpec::default();
        spec.merge_header("X-Test", "a");
        spec.merge_header("x-test", "b");
        assert_eq!(spec.headers.len(), 2);
    }

    #[test]
    fn test_default_status_is_internal_server_error() {
        assert_eq!(ResponseSpec::default().status, 500);
    }
}
