//! External service configuration.
//!
//! Every downstream service is optional. A deployment without, say, a Sample
//! Service still registers the sample handler; it simply rejects any sample
//! id it encounters.

use std::path::Path;

use serde::Deserialize;
use url::Url;
use zeroize::Zeroizing;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_UNIQUE_IDS: usize = 100_000;

/// Handle Service connection.
#[derive(Clone)]
pub struct HandleServiceConfig {
    pub url: Url,
    /// Workspace service token, used for read-permission grants.
    pub token: Zeroizing<String>,
}

/// Shock connection, shared by `shock` and `bytestream` ids. The token
/// identifies the workspace itself; nodes it owns are considered ingested.
///
/// `user` is trusted as given: it is not checked against the token, and a
/// wrong value sends another account's nodes down the reconcile path
/// instead of being copied or taken over.
#[derive(Clone)]
pub struct ShockConfig {
    pub url: Url,
    /// The user name the workspace token belongs to.
    pub user: String,
    pub token: Zeroizing<String>,
}

/// Sample Service connection. The token must carry Sample Service admin
/// rights.
#[derive(Clone)]
pub struct SampleServiceConfig {
    /// The Sample Service URL, or the service wizard URL when
    /// `service_version` is set.
    pub url: Url,
    pub token: Zeroizing<String>,
    pub service_version: Option<String>,
}

/// Connections to every service external ids may point into.
///
/// Custom `Debug` implementations redact all tokens.
#[derive(Clone, Debug)]
pub struct ExternalServicesConfig {
    pub handle_service: Option<HandleServiceConfig>,
    pub shock: Option<ShockConfig>,
    pub sample_service: Option<SampleServiceConfig>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Cap on distinct `(object, id)` pairs per call.
    pub max_unique_ids: usize,
}

impl Default for ExternalServicesConfig {
    fn default() -> Self {
        Self {
            handle_service: None,
            shock: None,
            sample_service: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_unique_ids: DEFAULT_MAX_UNIQUE_IDS,
        }
    }
}

impl std::fmt::Debug for HandleServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleServiceConfig")
            .field("url", &self.url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl std::fmt::Debug for ShockConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShockConfig")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl std::fmt::Debug for SampleServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleServiceConfig")
            .field("url", &self.url)
            .field("token", &"[REDACTED]")
            .field("service_version", &self.service_version)
            .finish()
    }
}

impl ExternalServicesConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables (all optional):
    /// - `IDREF_HANDLE_SERVICE_URL`, `IDREF_HANDLE_SERVICE_TOKEN`
    /// - `IDREF_SHOCK_URL`, `IDREF_SHOCK_USER`, `IDREF_SHOCK_TOKEN`
    /// - `IDREF_SAMPLE_SERVICE_URL`, `IDREF_SAMPLE_SERVICE_TOKEN`,
    ///   `IDREF_SAMPLE_SERVICE_VERSION`
    /// - `IDREF_TIMEOUT_SECS` (default: 30)
    /// - `IDREF_MAX_UNIQUE_IDS` (default: 100000)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let raw = RawConfig {
            handle_service: RawSection {
                url: get("IDREF_HANDLE_SERVICE_URL"),
                user: None,
                token: get("IDREF_HANDLE_SERVICE_TOKEN"),
                service_version: None,
            },
            shock: RawSection {
                url: get("IDREF_SHOCK_URL"),
                user: get("IDREF_SHOCK_USER"),
                token: get("IDREF_SHOCK_TOKEN"),
                service_version: None,
            },
            sample_service: RawSection {
                url: get("IDREF_SAMPLE_SERVICE_URL"),
                user: None,
                token: get("IDREF_SAMPLE_SERVICE_TOKEN"),
                service_version: get("IDREF_SAMPLE_SERVICE_VERSION"),
            },
            timeout_secs: parse_number("IDREF_TIMEOUT_SECS", get("IDREF_TIMEOUT_SECS"))?,
            max_unique_ids: parse_number("IDREF_MAX_UNIQUE_IDS", get("IDREF_MAX_UNIQUE_IDS"))?,
        };
        raw.validate()
    }

    /// Load configuration from a YAML file with the same fields as the
    /// struct; tokens are plain strings in the file.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(text)?;
        raw.validate()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawSection {
    url: Option<String>,
    user: Option<String>,
    token: Option<String>,
    service_version: Option<String>,
}

impl RawSection {
    fn is_empty(&self) -> bool {
        self.url.is_none() && self.token.is_none() && self.user.is_none()
    }

    /// Validate the URL/token pair. `None` for an entirely absent section.
    fn url_and_token(self, section: &str) -> Result<Option<(Url, Zeroizing<String>, RawSection)>, ConfigError> {
        if self.is_empty() {
            return Ok(None);
        }
        let raw_url = self.url.clone().ok_or_else(|| ConfigError::MissingUrl(section.to_string()))?;
        let token = self
            .token
            .clone()
            .ok_or_else(|| ConfigError::MissingToken(section.to_string()))?;
        let url = Url::parse(&raw_url).map_err(|e| ConfigError::InvalidUrl(section.to_string(), e.to_string()))?;
        Ok(Some((url, Zeroizing::new(token), self)))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    handle_service: RawSection,
    shock: RawSection,
    sample_service: RawSection,
    timeout_secs: Option<u64>,
    max_unique_ids: Option<usize>,
}

impl RawConfig {
    fn validate(self) -> Result<ExternalServicesConfig, ConfigError> {
        let handle_service = self
            .handle_service
            .url_and_token("handle_service")?
            .map(|(url, token, _)| HandleServiceConfig { url, token });

        let shock = match self.shock.url_and_token("shock")? {
            Some((url, token, rest)) => Some(ShockConfig {
                url,
                user: rest.user.ok_or_else(|| ConfigError::MissingUser("shock".to_string()))?,
                token,
            }),
            None => None,
        };

        let sample_service = self
            .sample_service
            .url_and_token("sample_service")?
            .map(|(url, token, rest)| SampleServiceConfig {
                url,
                token,
                service_version: rest.service_version,
            });

        let timeout_secs = self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidNumber {
                var: "timeout_secs".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(ExternalServicesConfig {
            handle_service,
            shock,
            sample_service,
            timeout_secs,
            max_unique_ids: self.max_unique_ids.unwrap_or(DEFAULT_MAX_UNIQUE_IDS),
        })
    }
}

fn parse_number<N: std::str::FromStr>(var: &str, raw: Option<String>) -> Result<Option<N>, ConfigError> {
    raw.map(|v| {
        v.trim().parse().map_err(|_| ConfigError::InvalidNumber {
            var: var.to_string(),
            value: v,
        })
    })
    .transpose()
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0}: a token is required when a URL is configured")]
    MissingToken(String),
    #[error("{0}: a URL is required when a token is configured")]
    MissingUrl(String),
    #[error("{0}: the user name the token belongs to is required")]
    MissingUser(String),
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
    #[error("invalid value for {var}: {value}")]
    InvalidNumber { var: String, value: String },
    #[error("could not read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
