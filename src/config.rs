//! Process configuration, read from the environment at startup.
//!
//! The relay is configured entirely through environment variables so it can
//! be dropped into a container without flags:
//!
//! - `ACCESS_TOKEN` (required): shared secret consumers must present.
//! - `LIVELOG_PUT_PORT` / `LIVELOG_GET_PORT`: listener ports, defaulting to
//!   60022 and 60023.
//! - `SERVER_CRT_FILE` / `SERVER_KEY_FILE`: when both are set the consumer
//!   port serves TLS; a half-set pair means plain HTTP.
//! - `DEBUG`: any non-empty value enables the diagnostics routes and
//!   verbose tracing.
//!
//! Invalid configuration terminates the process, and each failure category
//! has its own exit code so supervisors can tell them apart.

use std::env;
use std::path::PathBuf;

pub const DEFAULT_PUT_PORT: u16 = 60022;
pub const DEFAULT_GET_PORT: u16 = 60023;

/// Runtime configuration for the relay.
#[derive(Debug, Clone)]
pub struct Config {
    /// Shared secret checked against the consumer request path.
    pub access_token: String,
    /// Port for the producer (upload) listener.
    pub put_port: u16,
    /// Port for the consumer (download) listener.
    pub get_port: u16,
    /// TLS material for the consumer listener, if configured.
    pub tls: Option<TlsConfig>,
    /// Whether diagnostics routes and verbose tracing are enabled.
    pub debug: bool,
}

/// Certificate and key paths for the consumer listener.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

impl Config {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Reads configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let access_token = match lookup("ACCESS_TOKEN") {
            Some(token) if !token.is_empty() => token,
            _ => return Err(ConfigError::MissingAccessToken),
        };

        let put_port = parse_port(&lookup, "LIVELOG_PUT_PORT", DEFAULT_PUT_PORT)?;
        let get_port = parse_port(&lookup, "LIVELOG_GET_PORT", DEFAULT_GET_PORT)?;

        let tls = match (lookup("SERVER_CRT_FILE"), lookup("SERVER_KEY_FILE")) {
            (Some(cert), Some(key)) if !cert.is_empty() && !key.is_empty() => Some(TlsConfig {
                cert_file: cert.into(),
                key_file: key.into(),
            }),
            _ => None,
        };

        let debug = lookup("DEBUG").is_some_and(|v| !v.is_empty());

        Ok(Self {
            access_token,
            put_port,
            get_port,
            tls,
            debug,
        })
    }
}

fn parse_port(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: u16,
) -> Result<u16, ConfigError> {
    let Some(value) = lookup(var).filter(|v| !v.is_empty()) else {
        return Ok(default);
    };
    let port: i64 = value.parse().map_err(|_| ConfigError::PortNotANumber {
        var,
        value: value.clone(),
    })?;
    if !(0..=65535).contains(&port) {
        return Err(ConfigError::PortOutOfRange { var, value });
    }
    Ok(port as u16)
}

/// A startup configuration failure.
///
/// Each variant maps to a distinct process exit code (see
/// [`exit_code`](ConfigError::exit_code)) so that a supervisor can
/// distinguish failure categories without parsing log output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `ACCESS_TOKEN` is unset or empty.
    MissingAccessToken,
    /// A port variable is not a decimal integer.
    PortNotANumber { var: &'static str, value: String },
    /// A port variable is outside `[0, 65535]`.
    PortOutOfRange { var: &'static str, value: String },
}

impl ConfigError {
    /// The process exit code for this failure category.
    pub fn exit_code(&self) -> i32 {
        match self {
            ConfigError::PortNotANumber { var, .. } if *var == "LIVELOG_PUT_PORT" => 64,
            ConfigError::PortOutOfRange { var, .. } if *var == "LIVELOG_PUT_PORT" => 65,
            ConfigError::PortNotANumber { .. } => 66,
            ConfigError::PortOutOfRange { .. } => 67,
            ConfigError::MissingAccessToken => 68,
        }
    }
}

impl std::error::Error for ConfigError {}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingAccessToken => {
                write!(f, "ACCESS_TOKEN must be set to a non-empty value")
            }
            ConfigError::PortNotANumber { var, value } => {
                write!(f, "{} is not a number ({})", var, value)
            }
            ConfigError::PortOutOfRange { var, value } => {
                write!(f, "{} is not between 0 and 65535 ({})", var, value)
            }
        }
    }
}
