//! Environment bootstrap: read the configuration once at startup and make
//! the data paths exist.

use std::path::PathBuf;
use std::str::FromStr;

use jsonwebtoken::Algorithm;
use thiserror::Error;

const RESOURCES_DIR: &str = "resources";
const DATABASE_FILE: &str = "primary.db";
const TEST_DATABASE_FILE: &str = "test.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required OS env var {0} but could not find it")]
    Missing(&'static str),
    #[error("env var {0} has an invalid value: {1}")]
    Invalid(&'static str, String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub testing: bool,
    pub secret_key: String,
    pub algorithm: Algorithm,
    pub token_expiry_minutes: i64,
    pub admin_username: String,
    pub admin_password: String,
    pub starting_elo: f64,
    pub k_ceiling: u32,
    pub k_floor: u32,
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::Missing(key))
}

fn or_default(key: &'static str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parsed<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError> {
    let raw = or_default(key, default);
    raw.parse()
        .map_err(|_| ConfigError::Invalid(key, raw.clone()))
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let algorithm_raw = or_default("ELO_CALCULATOR_ALGORITHM", "HS256");
        let algorithm = Algorithm::from_str(&algorithm_raw)
            .map_err(|_| ConfigError::Invalid("ELO_CALCULATOR_ALGORITHM", algorithm_raw))?;
        Ok(Self {
            testing: std::env::var("TESTING").is_ok_and(|v| !v.is_empty() && v != "0"),
            secret_key: required("ELO_CALCULATOR_SECRET_KEY")?,
            algorithm,
            token_expiry_minutes: parsed("ELO_CALCULATOR_EXPIRY_MINUTES", "1440")?,
            admin_username: or_default("ELO_CALCULATOR_ADMIN_USERNAME", "admin"),
            admin_password: required("ELO_CALCULATOR_ADMIN_PASSWORD")?,
            starting_elo: parsed("ELO_CALCULATOR_STARTING_ELO", "1200")?,
            k_ceiling: parsed("ELO_CALCULATOR_K_PARAMETER_CEILING", "512")?,
            k_floor: parsed("ELO_CALCULATOR_K_PARAMETER_FLOOR", "16")?,
        })
    }

    /// The record database; `TESTING` redirects to a scratch file.
    pub fn database_path(&self) -> PathBuf {
        let file = if self.testing {
            TEST_DATABASE_FILE
        } else {
            DATABASE_FILE
        };
        PathBuf::from(RESOURCES_DIR).join(file)
    }

    pub fn ensure_paths(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(RESOURCES_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn testing_flag_flips_the_database_file() {
        let mut config = Config {
            testing: false,
            secret_key: "secret".into(),
            algorithm: Algorithm::HS256,
            token_expiry_minutes: 1440,
            admin_username: "admin".into(),
            admin_password: "password".into(),
            starting_elo: 1200.0,
            k_ceiling: 512,
            k_floor: 16,
        };
        assert!(config.database_path().ends_with("primary.db"));
        config.testing = true;
        assert!(config.database_path().ends_with("test.db"));
    }
}
