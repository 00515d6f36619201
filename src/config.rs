//! Configuration types, read from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default artifact bundle location.
pub const DEFAULT_ARTIFACT_DIR: &str = "./artifacts/current";

/// Hyperparameters and inputs for one training run.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    /// Upper bound on vocabulary size, reserved ids included.
    pub vocab_size: usize,
    /// Length every encoded sequence is padded or truncated to.
    pub max_sequence_length: usize,
    /// Maximum number of epochs.
    pub epochs: usize,
    /// Consecutive epochs without validation improvement before stopping.
    pub patience: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Fraction of the shuffled corpus held out for validation.
    pub validation_fraction: f64,
    /// Seeds weight initialization, dropout, the split and batch order.
    pub seed: u64,
    /// Maximum number of documents fetched per category.
    pub per_label_limit: usize,
    /// Mailbox categories (label names) to learn.
    pub categories: Vec<String>,
    /// Where the bundle is written.
    pub artifact_dir: PathBuf,
    pub model: ModelParams,
}

/// Shape of the recurrent classifier. Vocabulary size and label count are
/// only known after the corpus has been read, so they are not here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelParams {
    pub embedding_dim: usize,
    pub lstm_units: usize,
    pub dense_units: usize,
    pub dropout: f64,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            embedding_dim: 64,
            lstm_units: 64,
            dense_units: 64,
            dropout: 0.5,
        }
    }
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            vocab_size: 10_000,
            max_sequence_length: 100,
            epochs: 20,
            patience: 3,
            batch_size: 32,
            learning_rate: 1e-3,
            validation_fraction: 0.2,
            seed: 42,
            per_label_limit: 500,
            categories: Vec::new(),
            artifact_dir: PathBuf::from(DEFAULT_ARTIFACT_DIR),
            model: ModelParams::default(),
        }
    }
}

impl TrainConfig {
    /// Build from `INBOX_SORTER_*` environment variables, falling back to
    /// the defaults above.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let model_defaults = ModelParams::default();

        let categories = std::env::var("INBOX_SORTER_CATEGORIES")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let config = Self {
            vocab_size: env_or("INBOX_SORTER_VOCAB_SIZE", defaults.vocab_size)?,
            max_sequence_length: env_or(
                "INBOX_SORTER_MAX_SEQ_LEN",
                defaults.max_sequence_length,
            )?,
            epochs: env_or("INBOX_SORTER_EPOCHS", defaults.epochs)?,
            patience: env_or("INBOX_SORTER_PATIENCE", defaults.patience)?,
            batch_size: env_or("INBOX_SORTER_BATCH_SIZE", defaults.batch_size)?,
            learning_rate: env_or("INBOX_SORTER_LEARNING_RATE", defaults.learning_rate)?,
            validation_fraction: env_or(
                "INBOX_SORTER_VALIDATION_FRACTION",
                defaults.validation_fraction,
            )?,
            seed: env_or("INBOX_SORTER_SEED", defaults.seed)?,
            per_label_limit: env_or("INBOX_SORTER_PER_LABEL_LIMIT", defaults.per_label_limit)?,
            categories,
            artifact_dir: artifact_dir_from_env(),
            model: ModelParams {
                embedding_dim: env_or("INBOX_SORTER_EMBEDDING_DIM", model_defaults.embedding_dim)?,
                lstm_units: env_or("INBOX_SORTER_LSTM_UNITS", model_defaults.lstm_units)?,
                dense_units: env_or("INBOX_SORTER_DENSE_UNITS", model_defaults.dense_units)?,
                dropout: env_or("INBOX_SORTER_DROPOUT", model_defaults.dropout)?,
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the trainer cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vocab_size < 3 {
            return Err(invalid("INBOX_SORTER_VOCAB_SIZE", "must be at least 3"));
        }
        if self.max_sequence_length == 0 {
            return Err(invalid("INBOX_SORTER_MAX_SEQ_LEN", "must be positive"));
        }
        if self.epochs == 0 {
            return Err(invalid("INBOX_SORTER_EPOCHS", "must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(invalid("INBOX_SORTER_BATCH_SIZE", "must be positive"));
        }
        if !(0.0..1.0).contains(&self.validation_fraction) {
            return Err(invalid(
                "INBOX_SORTER_VALIDATION_FRACTION",
                "must be in [0, 1)",
            ));
        }
        if !(0.0..1.0).contains(&self.model.dropout) {
            return Err(invalid("INBOX_SORTER_DROPOUT", "must be in [0, 1)"));
        }
        Ok(())
    }
}

/// Settings for the webhook server.
#[derive(Debug, Clone)]
pub struct ServeConfig {
    pub port: u16,
    pub artifact_dir: PathBuf,
    /// Upper bound on every call to the mail provider.
    pub external_timeout: Duration,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            artifact_dir: PathBuf::from(DEFAULT_ARTIFACT_DIR),
            external_timeout: Duration::from_secs(15),
        }
    }
}

impl ServeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let timeout_secs: u64 = env_or(
            "INBOX_SORTER_EXTERNAL_TIMEOUT_SECS",
            defaults.external_timeout.as_secs(),
        )?;
        if timeout_secs == 0 {
            return Err(invalid(
                "INBOX_SORTER_EXTERNAL_TIMEOUT_SECS",
                "must be positive",
            ));
        }
        Ok(Self {
            port: env_or("INBOX_SORTER_PORT", defaults.port)?,
            artifact_dir: artifact_dir_from_env(),
            external_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// Credentials and endpoint for the Gmail REST API.
#[derive(Debug, Clone)]
pub struct GmailConfig {
    /// OAuth access token. Acquiring and refreshing it happens elsewhere.
    pub access_token: SecretString,
    /// Mailbox owner; `me` means the token's account.
    pub user_id: String,
    pub api_base: String,
}

impl GmailConfig {
    pub const DEFAULT_API_BASE: &'static str = "https://gmail.googleapis.com/gmail/v1";

    pub fn from_env() -> Result<Self, ConfigError> {
        let token = std::env::var("GMAIL_ACCESS_TOKEN")
            .map_err(|_| ConfigError::MissingEnvVar("GMAIL_ACCESS_TOKEN".to_string()))?;
        Ok(Self {
            access_token: SecretString::from(token),
            user_id: std::env::var("GMAIL_USER_ID").unwrap_or_else(|_| "me".to_string()),
            api_base: std::env::var("GMAIL_API_BASE")
                .unwrap_or_else(|_| Self::DEFAULT_API_BASE.to_string()),
        })
    }
}

fn artifact_dir_from_env() -> PathBuf {
    std::env::var("INBOX_SORTER_ARTIFACT_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_ARTIFACT_DIR))
}

/// Parse `key` from the environment, or return `default` when unset.
fn env_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{raw:?}: {e}"),
    })
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}
