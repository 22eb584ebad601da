//! Fluent configuration handles.
//!
//! [`MockTransport::respond_to`](crate::MockTransport::respond_to) returns an
//! [`ExpectationBuilder`] which exposes the request-matching half of the
//! configuration surface; [`ExpectationBuilder::respond_with`] switches to
//! the response half ([`ResponseBuilder`]). Both are thin handles carrying
//! the id of the expectation they configure plus the id of the root
//! expectation, so sequence steps created anywhere in a chain always attach
//! to the same root.

use crate::dispatch::Registry;
use crate::expectation::{DispatchCallback, Expectation, ExpectationId, QueryRequirement};
use crate::request::RequestSnapshot;
use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};
use std::time::Duration;

fn with_expectation<T>(
    registry: &Arc<RwLock<Registry>>,
    id: ExpectationId,
    f: impl FnOnce(&mut Expectation) -> T,
) -> T {
    let mut registry = registry.write().expect("registry lock poisoned");
    f(&mut registry.expectations[id])
}

/// Handle configuring the request-matching side of one expectation.
#[derive(Clone)]
pub struct ExpectationBuilder {
    registry: Arc<RwLock<Registry>>,
    id: ExpectationId,
    root: ExpectationId,
}

impl ExpectationBuilder {
    pub(crate) fn new(registry: Arc<RwLock<Registry>>, id: ExpectationId) -> Self {
        Self {
            registry,
            id,
            root: id,
        }
    }

    /// Id of the expectation this handle configures.
    pub fn id(&self) -> ExpectationId {
        self.id
    }

    /// Respond with the given HTTP status code.
    pub fn respond_with(&self, status: u16) -> ResponseBuilder {
        with_expectation(&self.registry, self.id, |expectation| {
            expectation.response.status = status;
        });
        ResponseBuilder {
            registry: Arc::clone(&self.registry),
            id: self.id,
            root: self.root,
        }
    }

    /// Attach or overwrite a requirement for one query parameter.
    pub fn with_query_parameter(&self, key: &str) -> QueryParameterBuilder {
        QueryParameterBuilder {
            owner: self.clone(),
            key: key.to_string(),
        }
    }

    /// Add a step to this expectation's response sequence.
    ///
    /// The step is a new child expectation sharing the same method, path and
    /// content type; `configure` sets its response. Sequences are flat:
    /// chaining off a previously returned step still appends to the one root
    /// sequence. Returns the new step's builder so calls can be chained.
    pub fn with_response_sequence(&self, configure: impl FnOnce(&ExpectationBuilder)) -> Self {
        let child_id = {
            let mut registry = self.registry.write().expect("registry lock poisoned");
            let child_id = registry.expectations.len();
            let child = registry.expectations[self.root].sequence_child(child_id);
            registry.expectations.push(child);
            child_id
        };

        let child_builder = Self {
            registry: Arc::clone(&self.registry),
            id: child_id,
            root: self.root,
        };
        configure(&child_builder);

        with_expectation(&self.registry, self.root, |root| {
            root.sequence.push(child_id);
        });

        child_builder
    }
}

/// Handle configuring the response side of one expectation.
#[derive(Clone)]
pub struct ResponseBuilder {
    registry: Arc<RwLock<Registry>>,
    id: ExpectationId,
    root: ExpectationId,
}

impl ResponseBuilder {
    /// Respond with the given content.
    pub fn with_content(self, media_type: &str, body: impl Into<Vec<u8>>) -> Self {
        with_expectation(&self.registry, self.id, |expectation| {
            expectation.response.media_type = Some(media_type.to_string());
            expectation.response.body = Some(body.into());
        });
        self
    }

    /// Add a single response header, comma-appending on a key collision.
    pub fn with_header(self, name: &str, value: &str) -> Self {
        with_expectation(&self.registry, self.id, |expectation| {
            expectation.response.merge_header(name, value);
        });
        self
    }

    /// Add the given response headers.
    ///
    /// If a header already exists the supplied value is added to it
    /// separated by a comma. Key comparison is case-sensitive.
    pub fn with_headers<I, K, V>(self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        with_expectation(&self.registry, self.id, |expectation| {
            for (name, value) in headers {
                expectation.response.merge_header(name.as_ref(), value.as_ref());
            }
        });
        self
    }

    /// Add a `Set-Cookie` header rendered from the given cookie.
    pub fn with_cookie(self, cookie: Cookie) -> Self {
        with_expectation(&self.registry, self.id, |expectation| {
            expectation.response.cookies.push(cookie.render());
        });
        self
    }

    /// Delay the response by the given duration.
    pub fn with_delay(self, delay: Duration) -> Self {
        with_expectation(&self.registry, self.id, |expectation| {
            expectation.response.delay = delay;
        });
        self
    }

    /// Invoke a callback with the request snapshot when this expectation is
    /// dispatched. Panics from the callback propagate to the dispatch
    /// caller.
    pub fn on_dispatch(self, callback: impl Fn(&RequestSnapshot) + Send + Sync + 'static) -> Self {
        let callback: DispatchCallback = Arc::new(callback);
        with_expectation(&self.registry, self.id, |expectation| {
            expectation.response.on_dispatch = Some(callback);
        });
        self
    }

    /// Add a step to the owning expectation's response sequence.
    ///
    /// Equivalent to [`ExpectationBuilder::with_response_sequence`]; steps
    /// always attach to the root expectation.
    pub fn with_response_sequence(
        &self,
        configure: impl FnOnce(&ExpectationBuilder),
    ) -> ExpectationBuilder {
        let owner = ExpectationBuilder {
            registry: Arc::clone(&self.registry),
            id: self.id,
            root: self.root,
        };
        owner.with_response_sequence(configure)
    }
}

/// Handle attaching a requirement for one query parameter.
pub struct QueryParameterBuilder {
    owner: ExpectationBuilder,
    key: String,
}

impl QueryParameterBuilder {
    /// The parameter must be present, with any value.
    pub fn match_any_value(self) -> ExpectationBuilder {
        self.set(QueryRequirement::AnyValue)
    }

    /// The parameter must be present with exactly this value.
    pub fn match_value(self, value: &str) -> ExpectationBuilder {
        self.set(QueryRequirement::Value(value.to_string()))
    }

    /// The parameter must not be present.
    pub fn must_be_absent(self) -> ExpectationBuilder {
        self.set(QueryRequirement::Absent)
    }

    fn set(self, requirement: QueryRequirement) -> ExpectationBuilder {
        with_expectation(&self.owner.registry, self.owner.id, |expectation| {
            expectation.query.insert(self.key.clone(), requirement);
        });
        self.owner
    }
}

/// A response cookie, rendered into a single `Set-Cookie` string.
///
/// Attributes are emitted only when provided; `Secure` is a bare flag.
#[derive(Debug, Clone, Default)]
pub struct Cookie {
    name: String,
    value: String,
    expires_at: Option<DateTime<Utc>>,
    same_site: Option<String>,
    secure: bool,
    path: Option<String>,
    domain: Option<String>,
    max_age: Option<i64>,
}

impl Cookie {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            ..Self::default()
        }
    }

    /// Set the `Expires` attribute, rendered in RFC 1123 format.
    pub fn expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn same_site(mut self, same_site: &str) -> Self {
        self.same_site = Some(same_site.to_string());
        self
    }

    pub fn secure(mut self) -> Self {
        self.secure = true;
        self
    }

    pub fn path(mut self, path: &str) -> Self {
        self.path = Some(path.to_string());
        self
    }

    pub fn domain(mut self, domain: &str) -> Self {
        self.domain = Some(domain.to_string());
        self
    }

    pub fn max_age(mut self, max_age: i64) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Render the cookie as a `Set-Cookie` header value.
    pub fn render(&self) -> String {
        let mut attributes = Vec::new();

        if let Some(expires_at) = &self.expires_at {
            attributes.push(format!(
                "Expires={}",
                expires_at.format("%a, %d %b %Y %H:%M:%S GMT")
            ));
        }

        if let Some(same_site) = &self.same_site {
            attributes.push(format!("SameSite={same_site}"));
        }

        if self.secure {
            attributes.push("Secure".to_string());
        }

        if let Some(path) = &self.path {
            attributes.push(format!("Path={path}"));
        }

        if let Some(domain) = &self.domain {
            attributes.push(format!("Domain={domain}"));
        }

        if let Some(max_age) = self.max_age {
            attributes.push(format!("MaxAge={max_age}"));
        }

        let mut rendered = format!("{}={}", self.name, self.value);
        if !attributes.is_empty() {
            rendered.push_str("; ");
            rendered.push_str(&attributes.join(";"));
        }

        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_cookie_without_attributes() {
        assert_eq!(Cookie::new("session", "abc123").render(), "session=abc123");
    }

    #[test]
    fn test_cookie_secure_is_bare_flag() {
        assert_eq!(
            Cookie::new("session", "abc123").secure().render(),
            "session=abc123; Secure"
        );
    }

    #[test]
    fn test_cookie_attribute_order() {
        let expires = Utc.with_ymd_and_hms(2020, 11, 10, 12, 0, 0).unwrap();
        let cookie = Cookie::new("session", "abc123")
            .expires_at(expires)
            .same_site("Lax")
            .secure()
            .path("/api")
            .domain("tempuri.org")
            .max_age(3600);

        assert_eq!(
            cookie.render(),
            "session=abc123; Expires=Tue, 10 Nov 2020 12:00:00 GMT;SameSite=Lax;Secure;Path=/api;Domain=tempuri.org;MaxAge=3600"
        );
    }

    #[test]
    fn test_cookie_omits_unset_attributes() {
        let cookie = Cookie::new("session", "abc123").path("/");
        assert_eq!(cookie.render(), "session=abc123; Path=/");
    }
}
