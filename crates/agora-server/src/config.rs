use std::path::PathBuf;

use agora_types::api::ConversionSettings;

/// Secrets shipped in sample env files. Starting with one of these is refused.
const PLACEHOLDER_SECRETS: &[&str] = &["dev-secret-change-me", "changeme", "change-me", "secret"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{0} still holds a placeholder value")]
    Placeholder(&'static str),
    #[error("{name} is not a valid number: {value}")]
    InvalidNumber { name: &'static str, value: String },
    #[error("{0} must be positive")]
    NotPositive(&'static str),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub points_per_token: i64,
    pub min_conversion_points: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let jwt_secret = lookup("AGORA_JWT_SECRET")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("AGORA_JWT_SECRET"))?;
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.to_lowercase().as_str()) {
            return Err(ConfigError::Placeholder("AGORA_JWT_SECRET"));
        }

        let points_per_token = number(&lookup, "AGORA_POINTS_PER_TOKEN", 100)?;
        let min_conversion_points = number(&lookup, "AGORA_MIN_CONVERSION_POINTS", 1000)?;
        if points_per_token <= 0 {
            return Err(ConfigError::NotPositive("AGORA_POINTS_PER_TOKEN"));
        }
        if min_conversion_points <= 0 {
            return Err(ConfigError::NotPositive("AGORA_MIN_CONVERSION_POINTS"));
        }

        Ok(Self {
            host: lookup("AGORA_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: number(&lookup, "AGORA_PORT", 3000)?,
            db_path: PathBuf::from(lookup("AGORA_DB_PATH").unwrap_or_else(|| "agora.db".into())),
            jwt_secret,
            points_per_token,
            min_conversion_points,
        })
    }

    /// Settings written on first start. Values changed by admins afterwards win.
    pub fn default_conversion_settings(&self) -> ConversionSettings {
        ConversionSettings {
            points_per_token: self.points_per_token,
            min_points: self.min_conversion_points,
            enabled: true,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { name, value }),
    }
}
