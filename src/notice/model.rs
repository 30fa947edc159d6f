//! In-memory representation of one error report
//!
//! The field order of every struct here is the element order of the wire
//! document, and the serde attributes describe that document directly.

use serde::{Deserialize, Serialize};

/// Wire schema version written on the root element
pub const NOTICE_SCHEMA_VERSION: &str = "2.0";

/// CGI data key under which the reporting host's address is recorded
pub const IP_ADDRESS_KEY: &str = "Environment.IpAddress";

/// A single named value
///
/// Used for CGI data, session data and request params. Collections keep
/// insertion order and may hold several pairs with the same key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyValuePair {
    #[serde(rename = "@key")]
    pub key: String,
    #[serde(rename = "$text", default)]
    pub value: String,
}

impl KeyValuePair {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Collect pairs from any ordered source of (key, value) items
    ///
    /// # Example
    /// ```
    /// use faultpost::notice::KeyValuePair;
    ///
    /// let pairs = KeyValuePair::from_pairs([("key1", "value1"), ("key2", "value2")]);
    /// assert_eq!(pairs[0], KeyValuePair::new("key1", "value1"));
    /// ```
    pub fn from_pairs<I, K, V>(pairs: I) -> Vec<KeyValuePair>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        pairs
            .into_iter()
            .map(|(key, value)| KeyValuePair::new(key, value))
            .collect()
    }
}

/// An ordered list of `<var>` entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarList {
    #[serde(rename = "var", default)]
    pub vars: Vec<KeyValuePair>,
}

impl VarList {
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.vars.iter().any(|pair| pair.key == key)
    }

    /// First value stored under `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|pair| pair.key == key)
            .map(|pair| pair.value.as_str())
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }
}

impl From<Vec<KeyValuePair>> for VarList {
    fn from(vars: Vec<KeyValuePair>) -> Self {
        Self { vars }
    }
}

/// Identity of the reporting library
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifierInfo {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
}

impl NotifierInfo {
    /// Identity of this crate
    pub fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            url: format!("https://crates.io/crates/{}", env!("CARGO_PKG_NAME")),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.version.is_empty() && self.url.is_empty()
    }
}

/// One stack frame of a backtrace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacktraceLine {
    #[serde(rename = "@file", default, skip_serializing_if = "String::is_empty")]
    pub file: String,
    #[serde(rename = "@number", default, skip_serializing_if = "is_zero")]
    pub number: u32,
    #[serde(rename = "@method", default, skip_serializing_if = "String::is_empty")]
    pub method: String,
}

impl BacktraceLine {
    pub fn is_empty(&self) -> bool {
        self.file.is_empty() && self.number == 0 && self.method.is_empty()
    }
}

fn is_zero(number: &u32) -> bool {
    *number == 0
}

/// Frames of one error, in the order the runtime reported them
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backtrace {
    #[serde(rename = "line", default)]
    pub lines: Vec<BacktraceLine>,
}

impl Backtrace {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// One link of the error chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub class: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Backtrace::is_empty")]
    pub backtrace: Backtrace,
}

/// Request context the error occurred in
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub component: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub action: String,
    #[serde(default, skip_serializing_if = "VarList::is_empty")]
    pub params: VarList,
    #[serde(default, skip_serializing_if = "VarList::is_empty")]
    pub session: VarList,
    #[serde(rename = "cgi-data", default, skip_serializing_if = "VarList::is_empty")]
    pub cgi_data: VarList,
}

impl RequestContext {
    pub fn is_empty(&self) -> bool {
        self.url.is_empty()
            && self.component.is_empty()
            && self.action.is_empty()
            && self.params.is_empty()
            && self.session.is_empty()
            && self.cgi_data.is_empty()
    }
}

/// Where the reporting application runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEnvironment {
    #[serde(rename = "project-root", default, skip_serializing_if = "String::is_empty")]
    pub project_root: String,
    #[serde(rename = "environment-name", default, skip_serializing_if = "String::is_empty")]
    pub environment_name: String,
    #[serde(rename = "app-version", default, skip_serializing_if = "String::is_empty")]
    pub app_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hostname: String,
}

impl ServerEnvironment {
    pub fn is_empty(&self) -> bool {
        self.project_root.is_empty()
            && self.environment_name.is_empty()
            && self.app_version.is_empty()
            && self.hostname.is_empty()
    }
}

/// A complete error report
///
/// Built per send attempt by [`NoticeBuilder`](crate::notice::NoticeBuilder);
/// the client only ever fills in `api_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "notice")]
pub struct Notice {
    #[serde(rename = "@version", default = "schema_version")]
    pub version: String,
    #[serde(rename = "api-key", default, skip_serializing_if = "String::is_empty")]
    pub api_key: String,
    #[serde(default, skip_serializing_if = "NotifierInfo::is_empty")]
    pub notifier: NotifierInfo,
    #[serde(rename = "error", default)]
    pub errors: Vec<ErrorEntry>,
    #[serde(default, skip_serializing_if = "RequestContext::is_empty")]
    pub request: RequestContext,
    #[serde(
        rename = "server-environment",
        default,
        skip_serializing_if = "ServerEnvironment::is_empty"
    )]
    pub server_environment: ServerEnvironment,
}

fn schema_version() -> String {
    NOTICE_SCHEMA_VERSION.to_string()
}

impl Default for Notice {
    fn default() -> Self {
        Self {
            version: schema_version(),
            api_key: String::new(),
            notifier: NotifierInfo::default(),
            errors: Vec::new(),
            request: RequestContext::default(),
            server_environment: ServerEnvironment::default(),
        }
    }
}

impl Notice {
    /// Set the request URL
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.request.url = url.into();
        self
    }

    /// Append request params in order
    pub fn with_params(mut self, params: Vec<KeyValuePair>) -> Self {
        self.request.params.vars.extend(params);
        self
    }

    /// Use a specific API key instead of the configured one
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.errors.first() {
            Some(error) => write!(f, "Notice({}: {})", error.class, error.message),
            None => write!(f, "Notice(<no error>)"),
        }
    }
}
