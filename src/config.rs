// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults and the [`Config`] loaded from them
//! at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Directory of the redb database | `./data` |
//! | `ACCESS_SECRET` | HMAC secret for access tokens | Required |
//! | `REFRESH_SECRET` | HMAC secret for refresh tokens (must differ) | Required |
//! | `ACCESS_TOKEN_TTL_SECS` | Access token lifetime | `1800` |
//! | `REFRESH_TOKEN_TTL_SECS` | Refresh token lifetime | `604800` |
//! | `OTP_TTL_SECS` | OTP code and trial counter lifetime | `600` |
//! | `REDIS_URL` | Redis session cache; in-process cache when unset | Optional |
//! | `CACHE_CAPACITY` | In-process cache capacity | `100000` |
//! | `SMS_API_URL` | SMS gateway endpoint; log-only notifier when unset | Optional |
//! | `SMS_API_KEY` / `SMS_CLIENT_ID` / `SMS_SENDER_ID` | Gateway credentials | With `SMS_API_URL` |
//! | `SMS_ACCESS_KEY` | Gateway access key header | Optional |
//! | `APP_ENV` | Environment name; prefixes SMS outside production | empty |
//! | `CREDENTIALED_PHONES` | Comma-separated phones reported as `hasCredential` | empty |
//! | `SEED_ADMIN_PHONE` / `SEED_ADMIN_PASSWORD` | Bootstrap admin account | Optional |
//! | `SEED_ADMIN_NAMES` | Bootstrap admin display name | `Administrator` |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | Serve HTTPS when both are set | Optional |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::phone::normalize_phone;
use crate::notify::SmsAuth;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";

/// Directory holding `pesa-gate.redb`.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

pub const ACCESS_SECRET_ENV: &str = "ACCESS_SECRET";
pub const REFRESH_SECRET_ENV: &str = "REFRESH_SECRET";
pub const ACCESS_TOKEN_TTL_ENV: &str = "ACCESS_TOKEN_TTL_SECS";
pub const REFRESH_TOKEN_TTL_ENV: &str = "REFRESH_TOKEN_TTL_SECS";
pub const OTP_TTL_ENV: &str = "OTP_TTL_SECS";

pub const REDIS_URL_ENV: &str = "REDIS_URL";
pub const CACHE_CAPACITY_ENV: &str = "CACHE_CAPACITY";

pub const SMS_API_URL_ENV: &str = "SMS_API_URL";
pub const SMS_API_KEY_ENV: &str = "SMS_API_KEY";
pub const SMS_CLIENT_ID_ENV: &str = "SMS_CLIENT_ID";
pub const SMS_SENDER_ID_ENV: &str = "SMS_SENDER_ID";
pub const SMS_ACCESS_KEY_ENV: &str = "SMS_ACCESS_KEY";
pub const APP_ENV_ENV: &str = "APP_ENV";

pub const CREDENTIALED_PHONES_ENV: &str = "CREDENTIALED_PHONES";

pub const SEED_ADMIN_PHONE_ENV: &str = "SEED_ADMIN_PHONE";
pub const SEED_ADMIN_PASSWORD_ENV: &str = "SEED_ADMIN_PASSWORD";
pub const SEED_ADMIN_NAMES_ENV: &str = "SEED_ADMIN_NAMES";

pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";

/// `json` for structured logs, anything else for human-readable output.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: u64 = 30 * 60;
pub const DEFAULT_REFRESH_TOKEN_TTL_SECS: u64 = 7 * 24 * 60 * 60;
pub const DEFAULT_OTP_TTL_SECS: u64 = 10 * 60;
pub const DEFAULT_CACHE_CAPACITY: usize = 100_000;

/// Database file name inside `DATA_DIR`.
pub const DATABASE_FILE: &str = "pesa-gate.redb";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("ACCESS_SECRET and REFRESH_SECRET must differ")]
    SharedSecret,
}

/// Bootstrap administrator created at startup when absent.
#[derive(Clone)]
pub struct SeedAdmin {
    pub phone: String,
    pub password: String,
    pub names: String,
}

impl std::fmt::Debug for SeedAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedAdmin")
            .field("phone", &self.phone)
            .field("names", &self.names)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Fully resolved runtime configuration.
#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub otp_ttl: Duration,
    pub redis_url: Option<String>,
    pub cache_capacity: usize,
    pub sms: Option<SmsAuth>,
    pub app_env: String,
    pub credentialed_phones: HashSet<String>,
    pub seed_admin: Option<SeedAdmin>,
    pub tls: Option<TlsPaths>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("data_dir", &self.data_dir)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("otp_ttl", &self.otp_ttl)
            .field("redis", &self.redis_url.is_some())
            .field("cache_capacity", &self.cache_capacity)
            .field("sms_gateway", &self.sms.is_some())
            .field("app_env", &self.app_env)
            .field("credentialed_phones", &self.credentialed_phones.len())
            .field("seed_admin", &self.seed_admin)
            .field("tls", &self.tls)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from any name → value lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let access_secret = require(ACCESS_SECRET_ENV)?;
        let refresh_secret = require(REFRESH_SECRET_ENV)?;
        if access_secret == refresh_secret {
            return Err(ConfigError::SharedSecret);
        }

        let sms = match get(SMS_API_URL_ENV) {
            Some(api_url) => Some(SmsAuth {
                api_url: gateway_url(api_url)?,
                api_key: require(SMS_API_KEY_ENV)?,
                client_id: require(SMS_CLIENT_ID_ENV)?,
                sender_id: require(SMS_SENDER_ID_ENV)?,
                access_key: get(SMS_ACCESS_KEY_ENV).unwrap_or_default(),
            }),
            None => None,
        };

        let seed_admin = match (get(SEED_ADMIN_PHONE_ENV), get(SEED_ADMIN_PASSWORD_ENV)) {
            (Some(phone), Some(password)) => Some(SeedAdmin {
                phone: normalize_phone(&phone),
                password,
                names: get(SEED_ADMIN_NAMES_ENV).unwrap_or_else(|| "Administrator".to_string()),
            }),
            (Some(_), None) => return Err(ConfigError::Missing(SEED_ADMIN_PASSWORD_ENV)),
            _ => None,
        };

        let tls = match (get(TLS_CERT_PATH_ENV), get(TLS_KEY_PATH_ENV)) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            (Some(_), None) => return Err(ConfigError::Missing(TLS_KEY_PATH_ENV)),
            (None, Some(_)) => return Err(ConfigError::Missing(TLS_CERT_PATH_ENV)),
            (None, None) => None,
        };

        let credentialed_phones = get(CREDENTIALED_PHONES_ENV)
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(normalize_phone)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            host: get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_or(&get, PORT_ENV, DEFAULT_PORT)?,
            data_dir: get(DATA_DIR_ENV)
                .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string())
                .into(),
            access_secret,
            refresh_secret,
            access_ttl: secs(&get, ACCESS_TOKEN_TTL_ENV, DEFAULT_ACCESS_TOKEN_TTL_SECS)?,
            refresh_ttl: secs(&get, REFRESH_TOKEN_TTL_ENV, DEFAULT_REFRESH_TOKEN_TTL_SECS)?,
            otp_ttl: secs(&get, OTP_TTL_ENV, DEFAULT_OTP_TTL_SECS)?,
            redis_url: get(REDIS_URL_ENV),
            cache_capacity: parse_or(&get, CACHE_CAPACITY_ENV, DEFAULT_CACHE_CAPACITY)?,
            sms,
            app_env: get(APP_ENV_ENV).unwrap_or_default(),
            credentialed_phones,
            seed_admin,
            tls,
        })
    }

    /// Path of the redb database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    /// Prefix added to outgoing SMS; empty in production.
    pub fn sms_prefix(&self) -> String {
        match self.app_env.to_lowercase().as_str() {
            "" | "production" | "prod" => String::new(),
            env => format!("[{env}] "),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(name) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

/// An absolute `http`/`https` URL.
fn gateway_url(value: String) -> Result<String, ConfigError> {
    match url::Url::parse(&value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(value),
        _ => Err(ConfigError::Invalid {
            name: SMS_API_URL_ENV,
            value,
        }),
    }
}

/// Non-zero number of seconds from `name`, or `default` when unset.
fn secs(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: u64,
) -> Result<Duration, ConfigError> {
    let value = parse_or(get, name, default)?;
    if value == 0 {
        return Err(ConfigError::Invalid {
            name,
            value: "0".to_string(),
        });
    }
    Ok(Duration::from_secs(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| map.get(name).cloned())
    }

    const SECRETS: [(&str, &str); 2] = [("ACCESS_SECRET", "a"), ("REFRESH_SECRET", "r")];

    #[test]
    fn defaults_apply() {
        let config = load(&SECRETS).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.access_ttl, Duration::from_secs(1800));
        assert_eq!(config.refresh_ttl, Duration::from_secs(604_800));
        assert_eq!(config.otp_ttl, Duration::from_secs(600));
        assert!(config.redis_url.is_none());
        assert!(config.sms.is_none());
        assert!(config.tls.is_none());
        assert_eq!(config.database_path(), PathBuf::from("./data/pesa-gate.redb"));
    }

    #[test]
    fn secrets_are_required_and_distinct() {
        assert!(matches!(load(&[]), Err(ConfigError::Missing("ACCESS_SECRET"))));
        assert!(matches!(
            load(&[("ACCESS_SECRET", "s"), ("REFRESH_SECRET", "s")]),
            Err(ConfigError::SharedSecret)
        ));
    }

    #[test]
    fn invalid_numbers_are_reported() {
        let mut vars = SECRETS.to_vec();
        vars.push(("PORT", "eighty"));
        assert!(matches!(load(&vars), Err(ConfigError::Invalid { name: "PORT", .. })));

        let mut vars = SECRETS.to_vec();
        vars.push(("OTP_TTL_SECS", "0"));
        assert!(matches!(load(&vars), Err(ConfigError::Invalid { name: "OTP_TTL_SECS", .. })));
    }

    #[test]
    fn sms_gateway_needs_credentials() {
        let mut vars = SECRETS.to_vec();
        vars.push(("SMS_API_URL", "https://sms.example/send"));
        assert!(matches!(load(&vars), Err(ConfigError::Missing("SMS_API_KEY"))));

        vars.extend([
            ("SMS_API_KEY", "k"),
            ("SMS_CLIENT_ID", "c"),
            ("SMS_SENDER_ID", "PESA"),
        ]);
        let sms = load(&vars).unwrap().sms.unwrap();
        assert_eq!(sms.sender_id, "PESA");
        assert_eq!(sms.access_key, "");
    }

    #[test]
    fn sms_gateway_url_must_be_http() {
        let mut vars = SECRETS.to_vec();
        vars.push(("SMS_API_URL", "sms.example/send"));
        assert!(matches!(load(&vars), Err(ConfigError::Invalid { name: "SMS_API_URL", .. })));
    }

    #[test]
    fn credentialed_phones_are_normalized() {
        let mut vars = SECRETS.to_vec();
        vars.push(("CREDENTIALED_PHONES", "0712345678, +254700000001,,"));
        let config = load(&vars).unwrap();
        assert!(config.credentialed_phones.contains("254712345678"));
        assert!(config.credentialed_phones.contains("254700000001"));
        assert_eq!(config.credentialed_phones.len(), 2);
    }

    #[test]
    fn tls_needs_both_paths() {
        let mut vars = SECRETS.to_vec();
        vars.push(("TLS_CERT_PATH", "/etc/cert.pem"));
        assert!(matches!(load(&vars), Err(ConfigError::Missing("TLS_KEY_PATH"))));
    }

    #[test]
    fn sms_prefix_outside_production() {
        let mut vars = SECRETS.to_vec();
        vars.push(("APP_ENV", "staging"));
        assert_eq!(load(&vars).unwrap().sms_prefix(), "[staging] ");
        assert_eq!(load(&SECRETS).unwrap().sms_prefix(), "");
    }
}
