use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{FsError, FsResult};

/// Recognised connection settings.
///
/// Each key can be given either by its property string
/// (`s3.filesystem.readonly`) or by its symbolic name
/// (`PROPERTY_CONNECTION_READONLY`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvironmentKey {
    ConnectionReadonly,
    ConnectionUser,
    ConnectionPassword,
    MultipartUploadMinSize,
    ConnectionTimeout,
    MaxConnectionsPerContext,
    MaxConnectionsPerHost,
    RelaxHostname,
    RequestTimeout,
    SocketTimeout,
    TrustAllCerts,
    ProxyEnabled,
    ProxyHost,
    ProxyPort,
    ProxyUser,
    ProxyPassword,
}

impl EnvironmentKey {
    pub const ALL: [EnvironmentKey; 16] = [
        EnvironmentKey::ConnectionReadonly,
        EnvironmentKey::ConnectionUser,
        EnvironmentKey::ConnectionPassword,
        EnvironmentKey::MultipartUploadMinSize,
        EnvironmentKey::ConnectionTimeout,
        EnvironmentKey::MaxConnectionsPerContext,
        EnvironmentKey::MaxConnectionsPerHost,
        EnvironmentKey::RelaxHostname,
        EnvironmentKey::RequestTimeout,
        EnvironmentKey::SocketTimeout,
        EnvironmentKey::TrustAllCerts,
        EnvironmentKey::ProxyEnabled,
        EnvironmentKey::ProxyHost,
        EnvironmentKey::ProxyPort,
        EnvironmentKey::ProxyUser,
        EnvironmentKey::ProxyPassword,
    ];

    /// Property string as passed through to the object-store client.
    pub fn property(&self) -> &'static str {
        match self {
            EnvironmentKey::ConnectionReadonly => "s3.filesystem.readonly",
            EnvironmentKey::ConnectionUser => "s3.filesystem.user",
            EnvironmentKey::ConnectionPassword => "s3.filesystem.password",
            EnvironmentKey::MultipartUploadMinSize => "s3.filesystem.upload.multipart.minsize",
            EnvironmentKey::ConnectionTimeout => "s3.client.connection-timeout",
            EnvironmentKey::MaxConnectionsPerContext => "s3.client.connections-per-context",
            EnvironmentKey::MaxConnectionsPerHost => "s3.client.connections-per-host",
            EnvironmentKey::RelaxHostname => "s3.client.relax-hostname",
            EnvironmentKey::RequestTimeout => "s3.client.request-timeout",
            EnvironmentKey::SocketTimeout => "s3.client.so-timeout",
            EnvironmentKey::TrustAllCerts => "s3.client.trust-all-certs",
            EnvironmentKey::ProxyEnabled => "s3.client.use-system-proxy",
            EnvironmentKey::ProxyHost => "s3.client.proxy-host",
            EnvironmentKey::ProxyPort => "s3.client.proxy-port",
            EnvironmentKey::ProxyUser => "s3.client.proxy-user",
            EnvironmentKey::ProxyPassword => "s3.client.proxy-password",
        }
    }

    pub fn symbolic_name(&self) -> &'static str {
        match self {
            EnvironmentKey::ConnectionReadonly => "PROPERTY_CONNECTION_READONLY",
            EnvironmentKey::ConnectionUser => "PROPERTY_CONNECTION_USER",
            EnvironmentKey::ConnectionPassword => "PROPERTY_CONNECTION_PASSWORD",
            EnvironmentKey::MultipartUploadMinSize => "PROPERTY_MULTIPART_UPLOAD_MINSIZE",
            EnvironmentKey::ConnectionTimeout => "PROPERTY_CONNECTION_TIMEOUT",
            EnvironmentKey::MaxConnectionsPerContext => "PROPERTY_MAX_CONNECTIONS_PER_CONTEXT",
            EnvironmentKey::MaxConnectionsPerHost => "PROPERTY_MAX_CONNECTIONS_PER_HOST",
            EnvironmentKey::RelaxHostname => "PROPERTY_RELAX_HOSTNAME",
            EnvironmentKey::RequestTimeout => "PROPERTY_REQUEST_TIMEOUT",
            EnvironmentKey::SocketTimeout => "PROPERTY_SO_TIMEOUT",
            EnvironmentKey::TrustAllCerts => "PROPERTY_TRUST_ALL_CERTS",
            EnvironmentKey::ProxyEnabled => "PROPERTY_PROXY_ENABLED",
            EnvironmentKey::ProxyHost => "PROPERTY_PROXY_HOST",
            EnvironmentKey::ProxyPort => "PROPERTY_PROXY_PORT",
            EnvironmentKey::ProxyUser => "PROPERTY_PROXY_USER",
            EnvironmentKey::ProxyPassword => "PROPERTY_PROXY_PASSWORD",
        }
    }
}

impl FromStr for EnvironmentKey {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EnvironmentKey::ALL
            .iter()
            .find(|key| key.property() == s || key.symbolic_name() == s)
            .copied()
            .ok_or_else(|| FsError::InvalidArgument(format!("Unknown environment key: {}", s)))
    }
}

impl fmt::Display for EnvironmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.property())
    }
}

/// Proxy settings handed to the object-store client.
#[derive(Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub enabled: Option<bool>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("enabled", &self.enabled)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Settings for one filesystem connection.
///
/// Loaded from a TOML file, from key/value pairs, or both: values from
/// [`FileSystemConfig::apply_env`] override what the file set.
#[derive(Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FileSystemConfig {
    pub read_only: bool,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Uploads strictly larger than this use multipart. Unset means never.
    pub multipart_min_size: Option<u64>,
    pub connection_timeout_ms: Option<u64>,
    pub max_connections_per_context: Option<u32>,
    pub max_connections_per_host: Option<u32>,
    pub relax_hostname: Option<bool>,
    pub request_timeout_ms: Option<u64>,
    pub socket_timeout_ms: Option<u64>,
    pub trust_all_certs: Option<bool>,
    pub proxy: ProxyConfig,
}

impl FileSystemConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read filesystem config file: {}", e))?;

        toml::from_str(&content).map_err(|e| format!("Failed to parse filesystem config: {}", e))
    }

    /// Builds a configuration from key/value pairs.
    ///
    /// Unknown keys and unparsable values are rejected with
    /// [`FsError::InvalidArgument`].
    pub fn from_env<I, K, V>(entries: I) -> FsResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = FileSystemConfig::default();
        config.apply_env(entries)?;
        Ok(config)
    }

    pub fn apply_env<I, K, V>(&mut self, entries: I) -> FsResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in entries {
            let key: EnvironmentKey = key.as_ref().parse()?;
            self.set(key, value.as_ref())?;
        }
        Ok(())
    }

    pub fn set(&mut self, key: EnvironmentKey, value: &str) -> FsResult<()> {
        let value = value.trim();
        match key {
            EnvironmentKey::ConnectionReadonly => self.read_only = parse_value(key, value)?,
            EnvironmentKey::ConnectionUser => self.user = Some(value.to_string()),
            EnvironmentKey::ConnectionPassword => self.password = Some(value.to_string()),
            EnvironmentKey::MultipartUploadMinSize => {
                self.multipart_min_size = Some(parse_value(key, value)?)
            }
            EnvironmentKey::ConnectionTimeout => {
                self.connection_timeout_ms = Some(parse_value(key, value)?)
            }
            EnvironmentKey::MaxConnectionsPerContext => {
                self.max_connections_per_context = Some(parse_value(key, value)?)
            }
            EnvironmentKey::MaxConnectionsPerHost => {
                self.max_connections_per_host = Some(parse_value(key, value)?)
            }
            EnvironmentKey::RelaxHostname => self.relax_hostname = Some(parse_value(key, value)?),
            EnvironmentKey::RequestTimeout => {
                self.request_timeout_ms = Some(parse_value(key, value)?)
            }
            EnvironmentKey::SocketTimeout => {
                self.socket_timeout_ms = Some(parse_value(key, value)?)
            }
            EnvironmentKey::TrustAllCerts => {
                self.trust_all_certs = Some(parse_value(key, value)?)
            }
            EnvironmentKey::ProxyEnabled => self.proxy.enabled = Some(parse_value(key, value)?),
            EnvironmentKey::ProxyHost => self.proxy.host = Some(value.to_string()),
            EnvironmentKey::ProxyPort => self.proxy.port = Some(parse_value(key, value)?),
            EnvironmentKey::ProxyUser => self.proxy.user = Some(value.to_string()),
            EnvironmentKey::ProxyPassword => self.proxy.password = Some(value.to_string()),
        }
        Ok(())
    }

    /// Size above which uploads switch to multipart.
    pub fn multipart_threshold(&self) -> u64 {
        self.multipart_min_size.unwrap_or(u64::MAX)
    }

    /// Every setting that has a value, keyed by property string.
    ///
    /// Passwords are included; callers that log this must redact them.
    pub fn to_properties(&self) -> BTreeMap<&'static str, String> {
        let mut props = BTreeMap::new();
        let mut put = |key: EnvironmentKey, value: Option<String>| {
            if let Some(value) = value {
                props.insert(key.property(), value);
            }
        };

        put(EnvironmentKey::ConnectionReadonly, Some(self.read_only.to_string()));
        put(EnvironmentKey::ConnectionUser, self.user.clone());
        put(EnvironmentKey::ConnectionPassword, self.password.clone());
        put(
            EnvironmentKey::MultipartUploadMinSize,
            self.multipart_min_size.map(|v| v.to_string()),
        );
        put(
            EnvironmentKey::ConnectionTimeout,
            self.connection_timeout_ms.map(|v| v.to_string()),
        );
        put(
            EnvironmentKey::MaxConnectionsPerContext,
            self.max_connections_per_context.map(|v| v.to_string()),
        );
        put(
            EnvironmentKey::MaxConnectionsPerHost,
            self.max_connections_per_host.map(|v| v.to_string()),
        );
        put(EnvironmentKey::RelaxHostname, self.relax_hostname.map(|v| v.to_string()));
        put(
            EnvironmentKey::RequestTimeout,
            self.request_timeout_ms.map(|v| v.to_string()),
        );
        put(
            EnvironmentKey::SocketTimeout,
            self.socket_timeout_ms.map(|v| v.to_string()),
        );
        put(EnvironmentKey::TrustAllCerts, self.trust_all_certs.map(|v| v.to_string()));
        put(EnvironmentKey::ProxyEnabled, self.proxy.enabled.map(|v| v.to_string()));
        put(EnvironmentKey::ProxyHost, self.proxy.host.clone());
        put(EnvironmentKey::ProxyPort, self.proxy.port.map(|v| v.to_string()));
        put(EnvironmentKey::ProxyUser, self.proxy.user.clone());
        put(EnvironmentKey::ProxyPassword, self.proxy.password.clone());
        props
    }
}

impl fmt::Debug for FileSystemConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSystemConfig")
            .field("read_only", &self.read_only)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("multipart_min_size", &self.multipart_min_size)
            .field("connection_timeout_ms", &self.connection_timeout_ms)
            .field("max_connections_per_context", &self.max_connections_per_context)
            .field("max_connections_per_host", &self.max_connections_per_host)
            .field("relax_hostname", &self.relax_hostname)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("socket_timeout_ms", &self.socket_timeout_ms)
            .field("trust_all_certs", &self.trust_all_certs)
            .field("proxy", &self.proxy)
            .finish()
    }
}

fn parse_value<T: FromStr>(key: EnvironmentKey, value: &str) -> FsResult<T> {
    value.parse().map_err(|_| {
        FsError::InvalidArgument(format!("Invalid value '{}' for {}", value, key))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_env_accepts_both_key_forms() {
        let config = FileSystemConfig::from_env([
            ("s3.filesystem.readonly", "true"),
            ("PROPERTY_MULTIPART_UPLOAD_MINSIZE", "5242880"),
            ("s3.client.proxy-port", "3128"),
        ])
        .unwrap();

        assert!(config.read_only);
        assert_eq!(config.multipart_threshold(), 5 * 1024 * 1024);
        assert_eq!(config.proxy.port, Some(3128));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = FileSystemConfig::from_env([("s3.filesystem.colour", "blue")]).unwrap_err();
        assert!(matches!(err, FsError::InvalidArgument(_)));
    }

    #[test]
    fn test_bad_value_is_rejected() {
        let err = FileSystemConfig::from_env([("s3.filesystem.readonly", "yes please")])
            .unwrap_err();
        assert!(matches!(err, FsError::InvalidArgument(_)));
    }

    #[test]
    fn test_multipart_defaults_to_never() {
        assert_eq!(FileSystemConfig::default().multipart_threshold(), u64::MAX);
    }

    #[test]
    fn test_parse_toml_config() {
        let toml_content = r#"
read_only = true
user = "alice"
multipart_min_size = 1024

[proxy]
host = "proxy.local"
port = 8080
"#;

        let config: FileSystemConfig = toml::from_str(toml_content).unwrap();
        assert!(config.read_only);
        assert_eq!(config.user.as_deref(), Some("alice"));
        assert_eq!(config.multipart_threshold(), 1024);
        assert_eq!(config.proxy.host.as_deref(), Some("proxy.local"));
        assert_eq!(config.proxy.port, Some(8080));
    }

    #[test]
    fn test_to_properties_uses_property_keys() {
        let config = FileSystemConfig::from_env([
            ("PROPERTY_CONNECTION_USER", "bob"),
            ("s3.client.so-timeout", "3000"),
        ])
        .unwrap();

        let props = config.to_properties();
        assert_eq!(props.get("s3.filesystem.user").map(String::as_str), Some("bob"));
        assert_eq!(props.get("s3.client.so-timeout").map(String::as_str), Some("3000"));
        assert_eq!(props.get("s3.filesystem.readonly").map(String::as_str), Some("false"));
        assert!(!props.contains_key("s3.client.proxy-host"));
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = FileSystemConfig::from_env([("s3.filesystem.password", "hunter2")]).unwrap();
        assert!(!format!("{:?}", config).contains("hunter2"));
    }
}
