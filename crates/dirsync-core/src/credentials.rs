//! Bind credentials for directory connections.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Credentials used for a simple LDAP bind.
///
/// The password is held as a [`SecretString`]: it is redacted from `Debug` output and never
/// serialized.
#[derive(Debug, Deserialize, Serialize)]
pub struct BindCredentials {
    /// Bind DN (Distinguished Name) of the service account
    pub bind_dn: String,

    /// Bind password
    #[serde(
        deserialize_with = "deserialize_secret",
        serialize_with = "serialize_redacted"
    )]
    bind_password: SecretString,
}

impl BindCredentials {
    /// Create new bind credentials.
    ///
    /// # Arguments
    ///
    /// * `bind_dn` - The LDAP DN to bind as
    /// * `bind_password` - The password for that DN
    #[must_use]
    pub fn new(bind_dn: impl Into<String>, bind_password: impl Into<String>) -> Self {
        Self {
            bind_dn: bind_dn.into(),
            bind_password: SecretString::from(bind_password.into()),
        }
    }

    /// Get the LDAP bind DN.
    #[must_use]
    pub fn bind_dn(&self) -> &str {
        &self.bind_dn
    }

    /// Get the LDAP bind password.
    #[must_use]
    pub fn bind_password(&self) -> &str {
        self.bind_password.expose_secret()
    }

    /// Returns true when an anonymous bind would be performed.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.bind_dn.is_empty()
    }
}

impl Clone for BindCredentials {
    fn clone(&self) -> Self {
        Self::new(self.bind_dn.clone(), self.bind_password())
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> std::result::Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

fn serialize_redacted<S>(_: &SecretString, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str("[REDACTED]")
}
