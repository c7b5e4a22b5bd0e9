use std::fmt;

use url::Url;

use crate::config::FileSystemConfig;
use crate::error::{FsError, FsResult};

/// URI scheme for plain-HTTP endpoints.
pub const SCHEME: &str = "s3";
/// URI scheme for TLS endpoints.
pub const SECURE_SCHEME: &str = "ss3";

#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub user: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Everything needed to reach one bucket, derived from a connection URI.
///
/// `s3://[user[:password]@]host[:port]/bucket` talks plain HTTP,
/// `ss3://...` talks HTTPS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    key: String,
    endpoint: String,
    secure: bool,
    bucket: String,
    credentials: Credentials,
}

impl ConnectionTarget {
    /// Parses `uri`. Credentials embedded in the URI win over the ones in
    /// `config`.
    pub fn parse(uri: &str, config: &FileSystemConfig) -> FsResult<Self> {
        let url = parse_url(uri)?;
        let secure = url.scheme() == SECURE_SCHEME;
        let authority = authority(&url)?;
        let client_scheme = if secure { "https" } else { "http" };

        let user = match url.username() {
            "" => config.user.clone(),
            user => Some(decode(user)?),
        };
        let password = match url.password() {
            Some(password) => Some(decode(password)?),
            None => config.password.clone(),
        };

        Ok(ConnectionTarget {
            key: format!("{}://{}{}", url.scheme(), authority, url.path()),
            endpoint: format!("{}://{}", client_scheme, authority),
            secure,
            bucket: bucket_name(&url)?,
            credentials: Credentials { user, password },
        })
    }

    /// The registry key for `uri`: scheme, host, port and path, without
    /// user-info, query or fragment.
    pub fn connection_key(uri: &str) -> FsResult<String> {
        let url = parse_url(uri)?;
        Ok(format!("{}://{}{}", url.scheme(), authority(&url)?, url.path()))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Client endpoint, `http://host[:port]` or `https://host[:port]`.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }
}

fn parse_url(uri: &str) -> FsResult<Url> {
    let url = Url::parse(uri)
        .map_err(|e| FsError::InvalidArgument(format!("Invalid URI {}: {}", uri, e)))?;
    match url.scheme() {
        SCHEME | SECURE_SCHEME => Ok(url),
        other => Err(FsError::InvalidArgument(format!(
            "URI scheme must be {} or {}, got {}",
            SCHEME, SECURE_SCHEME, other
        ))),
    }
}

fn authority(url: &Url) -> FsResult<String> {
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| FsError::InvalidArgument(format!("URI {} has no host", url)))?;
    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// The URI path without surrounding slashes; inner slashes become `-`.
fn bucket_name(url: &Url) -> FsResult<String> {
    let bucket = url.path().trim_matches('/').replace('/', "-");
    if bucket.is_empty() {
        return Err(FsError::InvalidArgument(format!(
            "URI {} must have the bucket as first path level",
            url
        )));
    }
    Ok(bucket)
}

fn decode(value: &str) -> FsResult<String> {
    urlencoding::decode(value)
        .map(|v| v.into_owned())
        .map_err(|e| FsError::InvalidArgument(format!("Invalid URI user-info: {}", e)))
}
