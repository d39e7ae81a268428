//! Connection configuration for the LDAP directory collaborator.

use dirsync_core::{BindCredentials, Error};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;
use validator::{Validate, ValidationError};

use crate::Result;

/// Default connection timeout (seconds).
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 10;
/// Default operation timeout (seconds).
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 10;

/// Configuration for connecting to an LDAP directory.
#[derive(Debug, Deserialize, Validate)]
pub struct DirectoryConfig {
    /// Server URL (`ldap://` or `ldaps://`)
    #[validate(custom(function = "validate_ldap_url"))]
    url: String,

    /// Credentials used to bind before every operation
    #[serde(flatten)]
    credentials: BindCredentials,

    /// Whether to verify TLS certificates
    #[serde(default = "default_tls_verify")]
    tls_verify: bool,

    /// Optional path to a PEM CA certificate
    #[serde(default)]
    tls_ca_cert: Option<PathBuf>,

    /// Connection timeout in seconds
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_connection_timeout_secs")]
    connection_timeout_secs: u64,

    /// Per-operation timeout in seconds
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_operation_timeout_secs")]
    operation_timeout_secs: u64,
}

const fn default_tls_verify() -> bool {
    true
}

const fn default_connection_timeout_secs() -> u64 {
    DEFAULT_CONNECTION_TIMEOUT_SECS
}

const fn default_operation_timeout_secs() -> u64 {
    DEFAULT_OPERATION_TIMEOUT_SECS
}

fn validate_ldap_url(url: &str) -> std::result::Result<(), ValidationError> {
    match Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "ldap" | "ldaps") => Ok(()),
        _ => Err(ValidationError::new("ldap_url")),
    }
}

impl DirectoryConfig {
    /// Creates a new directory configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not a valid `ldap://` or `ldaps://` URL.
    pub fn new(url: impl Into<String>, credentials: BindCredentials) -> Result<Self> {
        let config = Self {
            url: url.into(),
            credentials,
            tls_verify: default_tls_verify(),
            tls_ca_cert: None,
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
        };
        config.check()?;
        Ok(config)
    }

    /// Parses and validates a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] for malformed JSON or invalid values.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| Error::ConfigError(format!("Invalid directory configuration: {e}")))
    }

    /// Returns the server URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the bind credentials.
    #[must_use]
    pub const fn credentials(&self) -> &BindCredentials {
        &self.credentials
    }

    /// Returns whether TLS certificate verification is enabled.
    #[must_use]
    pub const fn tls_verify(&self) -> bool {
        self.tls_verify
    }

    /// Optional custom CA certificate path.
    #[must_use]
    pub fn tls_ca_cert(&self) -> Option<&PathBuf> {
        self.tls_ca_cert.as_ref()
    }

    /// Returns the connection timeout duration.
    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Returns the operation timeout duration.
    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Enables or disables TLS certificate verification.
    #[must_use]
    pub const fn with_tls_verification(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Sets the custom CA certificate path for TLS verification.
    #[must_use]
    pub fn with_tls_ca_cert(mut self, path: PathBuf) -> Self {
        self.tls_ca_cert = Some(path);
        self
    }

    /// Overrides the connection timeout in seconds.
    #[must_use]
    pub const fn with_connection_timeout_secs(mut self, seconds: u64) -> Self {
        self.connection_timeout_secs = seconds;
        self
    }

    /// Overrides the operation timeout in seconds.
    #[must_use]
    pub const fn with_operation_timeout_secs(mut self, seconds: u64) -> Self {
        self.operation_timeout_secs = seconds;
        self
    }
}
