//! Request snapshots.
//!
//! A [`RequestSnapshot`] is the dispatcher's view of one outbound request:
//! method, parsed URI, headers and an owned copy of the body bytes. Because
//! the snapshot owns its body, a captured entry stays readable after the
//! caller has consumed or dropped the original request.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// HTTP method of a request or expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Connect,
    Options,
    Trace,
    Patch,
}

impl Method {
    /// The canonical upper-case name of the method.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Connect => "CONNECT",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Patch => "PATCH",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request URI already split into its matching-relevant parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestUri {
    /// URI scheme (`http`, `https`, ...).
    pub scheme: String,
    /// Host and optional port.
    pub authority: String,
    /// Path without the query string.
    pub path: String,
    /// Raw query string without the leading `?`, if any.
    pub query: Option<String>,
}

impl RequestUri {
    /// Parse an absolute (`scheme://authority/path?query`) or relative
    /// (`/path?query`) URL.
    ///
    /// Relative URLs resolve against `http://localhost`, matching how a real
    /// client resolves them against a base address before they reach the
    /// transport.
    pub fn parse(url: &str) -> Result<Self, ConfigError> {
        if url.is_empty() {
            return Err(ConfigError::MalformedRequestUrl(url.to_string()));
        }

        let (scheme, authority, path_and_query) = match url.split_once("://") {
            Some((scheme, rest)) if is_absolute_url(url) => {
                if scheme.is_empty() || rest.is_empty() {
                    return Err(ConfigError::MalformedRequestUrl(url.to_string()));
                }
                match rest.split_once('/') {
                    Some((authority, tail)) => {
                        (scheme.to_string(), authority.to_string(), format!("/{tail}"))
                    }
                    None => match rest.split_once('?') {
                        Some((authority, query)) => {
                            (scheme.to_string(), authority.to_string(), format!("/?{query}"))
                        }
                        None => (scheme.to_string(), rest.to_string(), "/".to_string()),
                    },
                }
            }
            _ => (
                "http".to_string(),
                "localhost".to_string(),
                url.to_string(),
            ),
        };

        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (path_and_query, None),
        };

        Ok(Self {
            scheme,
            authority,
            path,
            query,
        })
    }
}

impl fmt::Display for RequestUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.authority, self.path)?;
        if let Some(query) = &self.query {
            write!(f, "?{query}")?;
        }
        Ok(())
    }
}

/// Snapshot of one outbound request as seen by the dispatcher.
#[derive(Debug, Clone)]
pub struct RequestSnapshot {
    method: Method,
    uri: RequestUri,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
}

impl RequestSnapshot {
    /// Create a snapshot for the given method and URL.
    pub fn new(method: Method, url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            method,
            uri: RequestUri::parse(url)?,
            headers: Vec::new(),
            body: None,
        })
    }

    /// Add a request header.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Attach body bytes to the snapshot.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn uri(&self) -> &RequestUri {
        &self.uri
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

    /// The media type of the request body, without parameters such as
    /// `charset`.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
            .map(|v| v.split(';').next().unwrap_or(v).trim())
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Decoded query parameters of the request URI.
    pub fn query_params(&self) -> HashMap<String, String> {
        parse_query_string(self.uri.query.as_deref().unwrap_or(""))
    }
}

/// Whether the URL carries a scheme prefix: `://` must appear before any
/// `/` or `?`. A relative path whose query value embeds a URL (for example
/// `/redirect?to=https://x.example`) is not absolute.
pub(crate) fn is_absolute_url(url: &str) -> bool {
    match url.find("://") {
        Some(idx) => !url[..idx].contains(|c| c == '/' || c == '?'),
        None => false,
    }
}

/// Parse a query string into key-value pairs.
///
/// A key without `=` maps to an empty value.
pub(crate) fn parse_query_string(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    for part in query.split('&') {
        if part.is_empty() {
            continue;
        }
        if let Some((key, value)) = part.split_once('=') {
            params.insert(urlencoding_decode(key), urlencoding_decode(value));
        } else {
            params.insert(urlencoding_decode(part), String::new());
        }
    }

    params
}

/// Simple URL decoding.
pub(crate) fn urlencoding_decode(s: &str) -> String {
    let mut result = String::new();
    let mut chars = s.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '%' {
            let hex: String = chars.by_ref().take(2).collect();
            if hex.len() == 2 {
                if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                    result.push(byte as char);
                    continue;
                }
            }
            result.push('%');
            result.push_str(&hex);
        } else if ch == '+' {
            result.push(' ');
        } else {
            result.push(ch);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_absolute_url() {
        let uri = RequestUri::parse("https://tempuri.org/api/info?page=1").unwrap();
        assert_eq!(uri.scheme, "https");
        assert_eq!(uri.authority, "tempuri.org");
        assert_eq!(uri.path, "/api/info");
        assert_eq!(uri.query.as_deref(), Some("page=1"));
    }

    #[test]
    fn test_parse_absolute_url_without_path() {
        let uri = RequestUri::parse("http://tempuri.org").unwrap();
        assert_eq!(uri.authority, "tempuri.org");
        assert_eq!(uri.path, "/");
        assert_eq!(uri.query, None);
    }

    #[test]
    fn test_parse_authority_with_query_but_no_path() {
        let uri = RequestUri::parse("https://tempuri.org?x=1").unwrap();
        assert_eq!(uri.authority, "tempuri.org");
        assert_eq!(uri.path, "/");
        assert_eq!(uri.query.as_deref(), Some("x=1"));
    }

    #[test]
    fn test_parse_relative_url() {
        let uri = RequestUri::parse("/api/info").unwrap();
        assert_eq!(uri.scheme, "http");
        assert_eq!(uri.authority, "localhost");
        assert_eq!(uri.path, "/api/info");
    }

    #[test]
    fn test_relative_url_with_embedded_url_in_query_stays_relative() {
        let uri = RequestUri::parse("/redirect?to=https://x.example").unwrap();
        assert_eq!(uri.scheme, "http");
        assert_eq!(uri.authority, "localhost");
        assert_eq!(uri.path, "/redirect");
        assert_eq!(uri.query.as_deref(), Some("to=https://x.example"));
    }

    #[test]
    fn test_is_absolute_url_requires_scheme_prefix() {
        assert!(is_absolute_url("https://tempuri.org/api/info"));
        assert!(!is_absolute_url("/api/info"));
        assert!(!is_absolute_url("/redirect?to=https://x.example"));
        assert!(!is_absolute_url("api/info"));
    }

    #[test]
    fn test_parse_empty_url_fails() {
        assert!(RequestUri::parse("").is_err());
    }

    #[test]
    fn test_uri_display_round_trip() {
        let uri = RequestUri::parse("https://tempuri.org/api/info?page=1").unwrap();
        assert_eq!(uri.to_string(), "https://tempuri.org/api/info?page=1");
    }

    #[test]
    fn test_parse_query_string() {
        let params = parse_query_string("foo=bar&baz=qux");
        assert_eq!(params.get("foo"), Some(&"bar".to_string()));
        assert_eq!(params.get("baz"), Some(&"qux".to_string()));

        let params = parse_query_string("name=John%20Doe");
        assert_eq!(params.get("name"), Some(&"John Doe".to_string()));

        let params = parse_query_string("flag");
        assert_eq!(params.get("flag"), Some(&String::new()));
    }

    #[test]
    fn test_content_type_strips_parameters() {
        let snapshot = RequestSnapshot::new(Method::Post, "/api/info")
            .unwrap()
            .with_header("Content-Type", "application/json; charset=utf-8");
        assert_eq!(snapshot.content_type(), Some("application/json"));
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let snapshot = RequestSnapshot::new(Method::Get, "/api/info")
            .unwrap()
            .with_header("X-Test", "value");
        assert_eq!(snapshot.header("x-test"), Some("value"));
    }
}
