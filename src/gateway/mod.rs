pub mod guidance;
pub mod http;

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use serde::Serialize;

/// Entry point appended to the server root.
pub const API_ENTRY_POINT: &str = "yourls-api.php";

/// Normalized location of a YOURLS installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base: String,
}

impl Endpoint {
    /// Normalizes `api_base_url` to end with exactly one slash.
    pub fn new(api_base_url: &str) -> Self {
        let trimmed = api_base_url.trim().trim_end_matches('/');
        Self {
            base: format!("{trimmed}/"),
        }
    }

    /// Server root, always slash-terminated.
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn api_url(&self) -> String {
        format!("{}{API_ENTRY_POINT}", self.base)
    }

    pub fn admin_url(&self) -> String {
        format!("{}admin", self.base)
    }

    pub fn tools_url(&self) -> String {
        format!("{}admin/tools.php", self.base)
    }
}

/// Form parameters for one API call, kept in insertion order so the
/// encoded body is reproducible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    pairs: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// `action=shorturl`; `keyword` is only added when given, an empty
    /// keyword is still sent.
    pub fn shorten(signature: &str, url: &str, keyword: Option<&str>) -> Self {
        let mut options = Self::new()
            .with("action", "shorturl")
            .with("format", "simple")
            .with("url", url)
            .with("signature", signature);
        if let Some(keyword) = keyword {
            options = options.with("keyword", keyword);
        }
        options
    }

    /// `action=version`. The version is only reported inside the xml envelope.
    pub fn version(signature: &str) -> Self {
        Self::new()
            .with("action", "version")
            .with("format", "xml")
            .with("signature", signature)
    }

    /// Sets `name`, replacing an earlier value in place.
    pub fn with(mut self, name: &str, value: &str) -> Self {
        match self.pairs.iter_mut().find(|(k, _)| k == name) {
            Some(pair) => pair.1 = value.to_string(),
            None => self.pairs.push((name.to_string(), value.to_string())),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// `application/x-www-form-urlencoded` body.
    pub fn encode(&self) -> Result<String, serde_urlencoded::ser::Error> {
        serde_urlencoded::to_string(&self.pairs)
    }
}

/// How a value is pulled out of a successful response body.
#[derive(Debug, Clone)]
pub struct Extraction {
    pattern: Regex,
    group: usize,
}

impl Extraction {
    pub const SHORT_URL: &'static str = r"^\s*(\S+)\s*$";
    pub const VERSION: &'static str = r"^.*<version>(\d+\.\d+.*)</version>.*$";

    /// Compiles `pattern` case-sensitive in multiline mode.
    pub fn new(pattern: &str, group: usize) -> Result<Self, regex::Error> {
        let pattern = RegexBuilder::new(pattern).multi_line(true).build()?;
        Ok(Self { pattern, group })
    }

    pub fn short_url() -> &'static Self {
        &SHORT_URL_RULE
    }

    pub fn version() -> &'static Self {
        &VERSION_RULE
    }

    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }

    /// First match of the pattern; `None` when it does not match or the
    /// group did not participate.
    pub fn extract(&self, body: &str) -> Option<String> {
        self.pattern
            .captures(body)
            .and_then(|caps| caps.get(self.group))
            .map(|m| m.as_str().to_string())
    }
}

static SHORT_URL_RULE: LazyLock<Extraction> = LazyLock::new(|| {
    Extraction::new(Extraction::SHORT_URL, 1).expect("short url pattern compiles")
});

static VERSION_RULE: LazyLock<Extraction> = LazyLock::new(|| {
    Extraction::new(Extraction::VERSION, 1).expect("version pattern compiles")
});

/// Guidance attached to a failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Supplement {
    pub text: String,
    pub links: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Success {
    #[serde(rename = "url")]
    pub extracted_value: String,
    /// Key spelled the way the extension's popup reads it.
    #[serde(rename = "originalRespons")]
    pub raw_body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    #[serde(rename = "error")]
    pub message: String,
    #[serde(rename = "supp")]
    pub supplement: Supplement,
}

impl Failure {
    /// Failure without guidance.
    pub fn bare(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            supplement: Supplement::default(),
        }
    }
}

/// Result of exactly one API call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ApiOutcome {
    Success(Success),
    Failure(Failure),
}

impl ApiOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn success(&self) -> Option<&Success> {
        match self {
            Self::Success(s) => Some(s),
            Self::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Failure(f) => Some(f),
            Self::Success(_) => None,
        }
    }
}
