//! Connection parameters and client tuning knobs.

use std::time::Duration;
use thiserror::Error;

/// Dial timeout used when none is configured.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// The first invalid field found by [`ClientConfig::validate`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("the username cannot be empty")]
    EmptyUsername,
    #[error("the password cannot be empty")]
    EmptyPassword,
    #[error("the server cannot be empty")]
    EmptyServer,
    #[error("the port must be greater than 0")]
    InvalidPort,
}

impl ConfigError {
    /// Name of the offending field.
    pub fn field(&self) -> &'static str {
        match self {
            ConfigError::EmptyUsername => "username",
            ConfigError::EmptyPassword => "password",
            ConfigError::EmptyServer => "server",
            ConfigError::InvalidPort => "port",
        }
    }
}

/// Broker address and credentials.
///
/// Nothing is checked at construction; [`validate`](Self::validate) runs
/// before every connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub username: String,
    pub password: String,
    pub server: String,
    pub port: u16,
}

impl ClientConfig {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        server: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            server: server.into(),
            port,
        }
    }

    /// Check fields in the order username, password, server, port and
    /// report the first one that is empty or zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.username.is_empty() {
            return Err(ConfigError::EmptyUsername);
        }
        if self.password.is_empty() {
            return Err(ConfigError::EmptyPassword);
        }
        if self.server.is_empty() {
            return Err(ConfigError::EmptyServer);
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        Ok(())
    }

    /// `host:port` form used in log lines and errors.
    pub fn address(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }
}

/// Delivery mode requested for every subscription the client opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubscriptionType {
    /// Every subscriber receives every message.
    #[default]
    Multicast,
    /// Subscribers compete for messages.
    Anycast,
}

impl SubscriptionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionType::Multicast => "MULTICAST",
            SubscriptionType::Anycast => "ANYCAST",
        }
    }
}

/// Client behaviour that is not part of the broker address.
///
/// ```
/// use simple_stomp::{ClientOptions, SubscriptionType};
/// use std::time::Duration;
///
/// let opts = ClientOptions::default()
///     .dial_timeout(Duration::from_secs(3))
///     .subscription_type(SubscriptionType::Anycast);
/// assert_eq!(opts.dial_timeout, Duration::from_secs(3));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    pub dial_timeout: Duration,
    pub subscription_type: SubscriptionType,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            subscription_type: SubscriptionType::Multicast,
        }
    }
}

impl ClientOptions {
    pub fn dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    pub fn subscription_type(mut self, kind: SubscriptionType) -> Self {
        self.subscription_type = kind;
        self
    }
}
