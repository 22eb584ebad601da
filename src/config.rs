//! Declarative expectation files.
//!
//! Expectations can be configured from YAML instead of the fluent API,
//! which keeps large fixtures out of test code:
//!
//! ```yaml
//! expectations:
//!   - method: GET
//!     url: /api/info
//!     response:
//!       status: 200
//!       body:
//!         type: json
//!         content:
//!           message: "Hello, World!"
//! ```

use crate::builder::{Cookie, ExpectationBuilder};
use crate::dispatch::MockTransport;
use crate::request::Method;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// A set of declaratively defined expectations.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ExpectationFile {
    /// List of expectation definitions
    #[serde(default)]
    pub expectations: Vec<ExpectationDefinition>,
}

impl ExpectationFile {
    /// Load definitions from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse definitions from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let file: Self = serde_yaml::from_str(yaml)?;
        file.validate()?;
        Ok(file)
    }

    /// Validate all definitions.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (i, definition) in self.expectations.iter().enumerate() {
            definition
                .validate()
                .map_err(|e| anyhow::anyhow!("Expectation {}: {}", i, e))?;
        }
        Ok(())
    }

    /// Register every definition on the given transport.
    pub fn apply(&self, transport: &MockTransport) -> anyhow::Result<()> {
        self.validate()?;
        for definition in &self.expectations {
            definition.apply(transport)?;
        }
        Ok(())
    }
}

/// One declaratively defined expectation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpectationDefinition {
    /// HTTP method to match
    pub method: Method,

    /// Path and optional query string, or an absolute URL
    pub url: String,

    /// Request media type to match (absent = any)
    #[serde(default)]
    pub content_type: Option<String>,

    /// Additional query parameter rules
    #[serde(default)]
    pub query: HashMap<String, QueryRule>,

    /// Inline response; ignored when `sequence` is non-empty
    #[serde(default)]
    pub response: Option<ResponseDefinition>,

    /// Ordered response sequence steps
    #[serde(default)]
    pub sequence: Vec<ResponseDefinition>,
}

impl ExpectationDefinition {
    /// Validate the definition.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.url.is_empty() {
            anyhow::bail!("url cannot be empty");
        }
        if let Some(response) = &self.response {
            response.validate()?;
        }
        for step in &self.sequence {
            step.validate()?;
        }
        Ok(())
    }

    fn apply(&self, transport: &MockTransport) -> anyhow::Result<()> {
        let builder = match &self.content_type {
            Some(content_type) => {
                transport.respond_to_content_type(self.method, &self.url, content_type)?
            }
            None => transport.respond_to(self.method, &self.url)?,
        };

        for (key, rule) in &self.query {
            let parameter = builder.with_query_parameter(key);
            match rule {
                QueryRule::Value { value } => parameter.match_value(value),
                QueryRule::Any => parameter.match_any_value(),
                QueryRule::Absent => parameter.must_be_absent(),
            };
        }

        if let Some(response) = &self.response {
            response.apply(&builder)?;
        }

        for step in &self.sequence {
            // Resolve the body up front so the configuration closure stays
            // infallible.
            let body = step.body.as_ref().map(|b| b.to_bytes()).transpose()?;
            builder.with_response_sequence(|child| {
                step.configure(child, body.clone());
            });
        }

        Ok(())
    }
}

/// Rule for one query parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryRule {
    /// Exact value match
    Value { value: String },
    /// Parameter must be present (any value)
    Any,
    /// Parameter must be absent
    Absent,
}

/// Response definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseDefinition {
    /// HTTP status code
    #[serde(default = "default_status")]
    pub status: u16,

    /// Response headers
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Response body
    #[serde(default)]
    pub body: Option<BodyDefinition>,

    /// Response cookies
    #[serde(default)]
    pub cookies: Vec<CookieDefinition>,

    /// Latency simulation
    #[serde(default)]
    pub delay: Option<DelayDefinition>,
}

fn default_status() -> u16 {
    500
}

impl ResponseDefinition {
    /// Validate the response definition.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.status < 100 || self.status > 599 {
            anyhow::bail!("Invalid status code: {}", self.status);
        }
        if let Some(body) = &self.body {
            body.to_bytes()?;
        }
        Ok(())
    }

    fn apply(&self, builder: &ExpectationBuilder) -> anyhow::Result<()> {
        let body = self.body.as_ref().map(|b| b.to_bytes()).transpose()?;
        self.configure(builder, body);
        Ok(())
    }

    fn configure(&self, builder: &ExpectationBuilder, body: Option<Vec<u8>>) {
        let mut response = builder.respond_with(self.status);

        if let Some(body) = body {
            let media_type = self
                .body
                .as_ref()
                .map(|b| b.media_type())
                .unwrap_or("application/octet-stream");
            response = response.with_content(media_type, body);
        }

        for (name, value) in &self.headers {
            response = response.with_header(name, value);
        }

        for cookie in &self.cookies {
            response = response.with_cookie(cookie.to_cookie());
        }

        if let Some(delay) = &self.delay {
            response.with_delay(Duration::from_millis(delay.calculate()));
        }
    }
}

/// Response body configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BodyDefinition {
    /// Plain text body
    Text {
        content: String,
        #[serde(default)]
        media_type: Option<String>,
    },
    /// JSON body
    Json { content: serde_json::Value },
    /// Base64 encoded binary
    Base64 {
        content: String,
        #[serde(default)]
        media_type: Option<String>,
    },
}

impl BodyDefinition {
    /// Get the body content as bytes.
    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        match self {
            BodyDefinition::Text { content, .. } => Ok(content.as_bytes().to_vec()),
            BodyDefinition::Json { content } => Ok(serde_json::to_string(content)?.into_bytes()),
            BodyDefinition::Base64 { content, .. } => {
                use base64::Engine;
                base64::engine::general_purpose::STANDARD
                    .decode(content)
                    .map_err(|e| anyhow::anyhow!("Invalid base64: {}", e))
            }
        }
    }

    /// Media type for this body.
    pub fn media_type(&self) -> &str {
        match self {
            BodyDefinition::Text { media_type, .. } => media_type.as_deref().unwrap_or("text/plain"),
            BodyDefinition::Json { .. } => "application/json",
            BodyDefinition::Base64 { media_type, .. } => {
                media_type.as_deref().unwrap_or("application/octet-stream")
            }
        }
    }
}

/// Cookie definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CookieDefinition {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub same_site: Option<String>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub max_age: Option<i64>,
}

impl CookieDefinition {
    fn to_cookie(&self) -> Cookie {
        let mut cookie = Cookie::new(&self.name, &self.value);
        if let Some(expires_at) = self.expires_at {
            cookie = cookie.expires_at(expires_at);
        }
        if let Some(same_site) = &self.same_site {
            cookie = cookie.same_site(same_site);
        }
        if self.secure {
            cookie = cookie.secure();
        }
        if let Some(path) = &self.path {
            cookie = cookie.path(path);
        }
        if let Some(domain) = &self.domain {
            cookie = cookie.domain(domain);
        }
        if let Some(max_age) = self.max_age {
            cookie = cookie.max_age(max_age);
        }
        cookie
    }
}

/// Delay/latency simulation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DelayDefinition {
    /// Fixed delay in milliseconds
    #[serde(default)]
    pub fixed_ms: u64,

    /// Minimum delay for random range (ms)
    #[serde(default)]
    pub min_ms: u64,

    /// Maximum delay for random range (ms)
    #[serde(default)]
    pub max_ms: u64,
}

impl DelayDefinition {
    /// Calculate the actual delay to apply. A random range is sampled once,
    /// when the definition is registered.
    pub fn calculate(&self) -> u64 {
        if self.fixed_ms > 0 {
            return self.fixed_ms;
        }
        if self.max_ms > self.min_ms {
            use rand::Rng;
            let mut rng = rand::thread_rng();
            return rng.gen_range(self.min_ms..=self.max_ms);
        }
        self.min_ms
    }
}
