use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML file or an env override could not be parsed into the config shape.
    #[error("Configuration error: {0}")]
    Load(String),

    #[error("Invalid configuration value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
