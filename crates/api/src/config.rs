use std::path::PathBuf;
use std::time::Duration;

use aiops_core::scripting::language::Language;

use crate::auth::jwt::{JwtConfig, DEFAULT_TOKEN_TTL_HOURS};
use crate::auth::password;

/// Extra time the HTTP layer allows on top of the execution ceiling, so the
/// transport never cuts a request off before the runner's own timeout fires.
const REQUEST_TIMEOUT_MARGIN_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// PEM material for the HTTPS listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    pub cert: PathBuf,
    pub key: PathBuf,
    /// CA bundle for client certificates; `Some` turns on mutual TLS.
    pub client_ca: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Agent configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8443`).
    pub port: u16,
    /// `None` serves plain HTTP.
    pub tls: Option<TlsConfig>,
    /// Token signing secret and lifetime.
    pub jwt: JwtConfig,
    /// Key material for the symmetric cipher.
    pub aes_key: String,
    /// Argon2 PHC hash gating `/auth/api-key`, when set.
    pub issuance_secret_hash: Option<String>,
    /// Default and ceiling execution timeout in seconds.
    pub exec_timeout_secs: u64,
    /// Per-stream output capture limit.
    pub max_output_bytes: usize,
    /// Root for scoped work directories and script artifacts.
    pub temp_dir: PathBuf,
    /// Fallback when a script's language cannot be detected.
    pub default_language: Language,
    pub log_format: LogFormat,
}

impl ServerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                      | Default                   |
    /// |------------------------------|---------------------------|
    /// | `AIOPS_HOST`                 | `0.0.0.0`                 |
    /// | `AIOPS_PORT`                 | `8443`                    |
    /// | `AIOPS_TLS_CERT`             | unset (plain HTTP)        |
    /// | `AIOPS_TLS_KEY`              | unset (plain HTTP)        |
    /// | `AIOPS_TLS_CLIENT_CA`        | unset (no client certs)   |
    /// | `AIOPS_JWT_SECRET`           | required                  |
    /// | `AIOPS_TOKEN_TTL_HOURS`      | `24`                      |
    /// | `AIOPS_AES_KEY`              | required                  |
    /// | `AIOPS_ISSUANCE_SECRET_HASH` | unset (issuance open)     |
    /// | `AIOPS_EXEC_TIMEOUT_SECS`    | `300`                     |
    /// | `AIOPS_MAX_OUTPUT_BYTES`     | `1048576`                 |
    /// | `AIOPS_TEMP_DIR`             | `<os temp>/aiops-agent`   |
    /// | `AIOPS_DEFAULT_LANGUAGE`     | `shell`                   |
    /// | `AIOPS_LOG_FORMAT`           | `text`                    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let host = var("AIOPS_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = parse_or("AIOPS_PORT", var("AIOPS_PORT"), 8443u16)?;

        let tls = match (var("AIOPS_TLS_CERT"), var("AIOPS_TLS_KEY")) {
            (Some(cert), Some(key)) => Some(TlsConfig {
                cert: cert.into(),
                key: key.into(),
                client_ca: var("AIOPS_TLS_CLIENT_CA").map(PathBuf::from),
            }),
            (None, None) => {
                if var("AIOPS_TLS_CLIENT_CA").is_some() {
                    return Err(ConfigError::Invalid {
                        var: "AIOPS_TLS_CLIENT_CA",
                        reason: "requires AIOPS_TLS_CERT and AIOPS_TLS_KEY".into(),
                    });
                }
                None
            }
            (Some(_), None) => return Err(ConfigError::Missing("AIOPS_TLS_KEY")),
            (None, Some(_)) => return Err(ConfigError::Missing("AIOPS_TLS_CERT")),
        };

        let secret = var("AIOPS_JWT_SECRET").ok_or(ConfigError::Missing("AIOPS_JWT_SECRET"))?;
        let ttl_hours = parse_or(
            "AIOPS_TOKEN_TTL_HOURS",
            var("AIOPS_TOKEN_TTL_HOURS"),
            DEFAULT_TOKEN_TTL_HOURS,
        )?;
        if ttl_hours == 0 {
            return Err(ConfigError::Invalid {
                var: "AIOPS_TOKEN_TTL_HOURS",
                reason: "must be at least 1".into(),
            });
        }
        let jwt = JwtConfig {
            secret,
            token_ttl: Duration::from_secs(ttl_hours.saturating_mul(3600)),
        };

        let aes_key = var("AIOPS_AES_KEY").ok_or(ConfigError::Missing("AIOPS_AES_KEY"))?;

        let issuance_secret_hash = var("AIOPS_ISSUANCE_SECRET_HASH");
        if let Some(hash) = &issuance_secret_hash {
            if !password::is_valid_hash(hash) {
                return Err(ConfigError::Invalid {
                    var: "AIOPS_ISSUANCE_SECRET_HASH",
                    reason: "not an Argon2 PHC string".into(),
                });
            }
        }

        let exec_timeout_secs = parse_or("AIOPS_EXEC_TIMEOUT_SECS", var("AIOPS_EXEC_TIMEOUT_SECS"), 300u64)?;
        if exec_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "AIOPS_EXEC_TIMEOUT_SECS",
                reason: "must be at least 1".into(),
            });
        }

        let max_output_bytes = parse_or(
            "AIOPS_MAX_OUTPUT_BYTES",
            var("AIOPS_MAX_OUTPUT_BYTES"),
            1024 * 1024usize,
        )?;

        let temp_dir = var("AIOPS_TEMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("aiops-agent"));

        let default_language = parse_or(
            "AIOPS_DEFAULT_LANGUAGE",
            var("AIOPS_DEFAULT_LANGUAGE"),
            Language::Shell,
        )?;

        let log_format = match var("AIOPS_LOG_FORMAT").as_deref().map(str::to_ascii_lowercase) {
            None => LogFormat::Text,
            Some(f) if f == "text" => LogFormat::Text,
            Some(f) if f == "json" => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "AIOPS_LOG_FORMAT",
                    reason: format!("expected `text` or `json`, got `{other}`"),
                })
            }
        };

        Ok(Self {
            host,
            port,
            tls,
            jwt,
            aes_key,
            issuance_secret_hash,
            exec_timeout_secs,
            max_output_bytes,
            temp_dir,
            default_language,
            log_format,
        })
    }

    pub fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.exec_timeout_secs)
    }

    /// Timeout of the HTTP request layer.
    pub fn request_timeout_secs(&self) -> u64 {
        self.exec_timeout_secs
            .saturating_add(REQUEST_TIMEOUT_MARGIN_SECS)
    }
}

fn parse_or<T>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
    }
}
