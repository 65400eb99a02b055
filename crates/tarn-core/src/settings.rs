//! Data source settings and connection type signatures

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use ring::digest;
use serde::{Deserialize, Serialize};

use crate::{Result, TarnError};

/// Where and as whom physical connections are opened
///
/// The password is kept out of `Debug` output.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DataSourceSettings {
    /// Driver identifier (postgres, mysql, sqlite, etc.)
    #[serde(default)]
    pub driver: String,

    /// Connection URL handed to the driver
    pub url: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Auto-commit mode new connections start in; `None` keeps the driver default
    #[serde(default)]
    pub auto_commit: Option<bool>,

    /// Isolation level new connections start with
    #[serde(default)]
    pub isolation_level: Option<IsolationLevel>,

    /// Network timeout in milliseconds applied to new connections
    #[serde(default)]
    pub network_timeout_ms: Option<u64>,

    /// Extra driver properties
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// Transaction isolation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// SQL spelling, as used in `SET TRANSACTION ISOLATION LEVEL`
    pub fn to_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_sql())
    }
}

impl DataSourceSettings {
    /// Create settings for the given driver and URL
    pub fn new(driver: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the login credentials
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_auto_commit(mut self, auto_commit: bool) -> Self {
        self.auto_commit = Some(auto_commit);
        self
    }

    pub fn with_isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = Some(level);
        self
    }

    pub fn with_network_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.network_timeout_ms = Some(timeout_ms);
        self
    }

    /// Get the network timeout as a Duration
    pub fn network_timeout(&self) -> Option<Duration> {
        self.network_timeout_ms.map(Duration::from_millis)
    }

    /// Set a driver property
    pub fn with_property(mut self, key: &str, value: &str) -> Self {
        self.properties.insert(key.to_string(), value.to_string());
        self
    }

    /// Parse settings from a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let settings: Self = toml::from_str(source)?;
        if settings.url.is_empty() {
            return Err(TarnError::Configuration(
                "data source url must not be empty".into(),
            ));
        }
        Ok(settings)
    }

    /// Signature of connections opened with this data source's own credentials
    pub fn type_signature(&self) -> TypeSignature {
        TypeSignature::new(
            &self.url,
            self.username.as_deref(),
            self.password.as_deref(),
        )
    }
}

impl fmt::Debug for DataSourceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSourceSettings")
            .field("driver", &self.driver)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("auto_commit", &self.auto_commit)
            .field("isolation_level", &self.isolation_level)
            .field("network_timeout_ms", &self.network_timeout_ms)
            .field("properties", &self.properties)
            .finish()
    }
}

/// Fingerprint of the (url, username, password) a connection was issued for
///
/// Connections whose signature differs from the pool's current one were
/// handed out under stale configuration and are not cached on return.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeSignature([u8; 32]);

impl TypeSignature {
    pub fn new(url: &str, username: Option<&str>, password: Option<&str>) -> Self {
        let mut ctx = digest::Context::new(&digest::SHA256);
        for part in [Some(url), username, password] {
            match part {
                // Length prefix keeps ("ab", "c") distinct from ("a", "bc")
                Some(value) => {
                    ctx.update(&[1]);
                    ctx.update(&(value.len() as u64).to_be_bytes());
                    ctx.update(value.as_bytes());
                }
                None => ctx.update(&[0]),
            }
        }

        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(ctx.finish().as_ref());
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeSignature({})", self)
    }
}

impl fmt::Display for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0[..8]))
    }
}
