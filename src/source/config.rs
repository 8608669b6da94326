//! Upstream stream configuration

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;

use crate::error::ConfigError;

/// Default upstream connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Default time to wait for a reader to exit when stopping
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Upstream authentication type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthType {
    #[default]
    None,
    Basic,
}

impl FromStr for AuthType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NONE" => Ok(AuthType::None),
            "BASIC" => Ok(AuthType::Basic),
            _ => Err(ConfigError::InvalidAuthType(s.to_string())),
        }
    }
}

/// Configuration of one upstream camera stream
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Stream name viewers request it by
    pub name: String,

    /// Camera MJPEG URL
    pub source: Url,

    /// Upstream authentication
    pub auth_type: AuthType,

    /// Authentication parameters (`username`, `password` for basic)
    pub auth_params: HashMap<String, String>,

    /// Format parameters (`boundary` overrides the default boundary)
    pub format_params: HashMap<String, String>,

    /// Only connect while viewers are registered
    pub on_demand: bool,

    /// Viewers must supply a password
    pub protect: bool,

    /// Password may be reset administratively
    pub resettable: bool,

    /// Configured viewer password
    pub password: Option<String>,

    /// Upstream connect timeout
    pub connect_timeout: Duration,

    /// Time to wait for the reader to exit on stop
    pub stop_timeout: Duration,
}

impl StreamConfig {
    /// Start building a stream configuration
    pub fn builder(name: impl Into<String>, url: impl Into<String>) -> StreamConfigBuilder {
        StreamConfigBuilder::new(name, url)
    }

    /// Configured boundary, prefixed with `--` if needed
    pub fn boundary(&self) -> Option<String> {
        self.format_params
            .get("boundary")
            .map(|b| b.trim())
            .filter(|b| !b.is_empty())
            .map(|b| {
                if b.starts_with("--") {
                    b.to_string()
                } else {
                    format!("--{}", b)
                }
            })
    }

    /// Basic authentication credentials, if both are configured
    pub fn basic_credentials(&self) -> Option<(&str, &str)> {
        let user = self.auth_params.get("username")?;
        let pass = self.auth_params.get("password")?;
        Some((user.as_str(), pass.as_str()))
    }
}

/// Builder for [`StreamConfig`]
#[derive(Debug, Clone)]
pub struct StreamConfigBuilder {
    name: String,
    url: String,
    auth_type: AuthType,
    auth_params: HashMap<String, String>,
    format_params: HashMap<String, String>,
    on_demand: bool,
    protect: bool,
    resettable: bool,
    password: Option<String>,
    connect_timeout: Duration,
    stop_timeout: Duration,
}

impl StreamConfigBuilder {
    fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            auth_type: AuthType::None,
            auth_params: HashMap::new(),
            format_params: HashMap::new(),
            on_demand: false,
            protect: false,
            resettable: false,
            password: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    /// Connect only while viewers are registered
    pub fn on_demand(mut self, on_demand: bool) -> Self {
        self.on_demand = on_demand;
        self
    }

    /// Set the authentication type
    pub fn auth_type(mut self, auth_type: AuthType) -> Self {
        self.auth_type = auth_type;
        self
    }

    /// Add an authentication parameter
    pub fn auth_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.auth_params.insert(key.into(), value.into());
        self
    }

    /// Use basic authentication with these credentials
    pub fn basic_auth(self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth_type(AuthType::Basic)
            .auth_param("username", username)
            .auth_param("password", password)
    }

    /// Add a format parameter
    pub fn format_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.format_params.insert(key.into(), value.into());
        self
    }

    /// Require viewers to supply a password (generated when `None`)
    pub fn protect(mut self, password: Option<String>) -> Self {
        self.protect = true;
        self.password = password;
        self
    }

    /// Allow the viewer password to be reset
    pub fn resettable(mut self, resettable: bool) -> Self {
        self.resettable = resettable;
        self
    }

    /// Set the upstream connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the reader stop timeout
    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Validate and build the configuration
    pub fn build(self) -> Result<StreamConfig, ConfigError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(ConfigError::MissingName);
        }

        let source =
            Url::parse(self.url.trim()).map_err(|_| ConfigError::InvalidUrl(self.url.clone()))?;
        if !matches!(source.scheme(), "http" | "https") {
            return Err(ConfigError::UnsupportedScheme(source.scheme().to_string()));
        }

        Ok(StreamConfig {
            name,
            source,
            auth_type: self.auth_type,
            auth_params: self.auth_params,
            format_params: self.format_params,
            on_demand: self.on_demand,
            protect: self.protect,
            resettable: self.resettable,
            password: self.password,
            connect_timeout: self.connect_timeout,
            stop_timeout: self.stop_timeout,
        })
    }
}
