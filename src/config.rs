//! Configuration types, built from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default sender the Nu bank parser understands.
pub const DEFAULT_SENDERS: &[&str] = &["nu@nu.com.co"];

const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const MICROSOFT_TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";

/// Sync pipeline configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Path to the libSQL database file.
    pub db_path: PathBuf,
    /// AES-256 key used to encrypt stored OAuth tokens.
    pub crypt_secret: SecretString,
    /// Sender addresses whose messages are searched.
    pub senders: Vec<String>,
    /// How far back to search. `None` means "start of the current month".
    pub lookback_days: Option<u32>,
    /// Background sync interval.
    pub sync_interval: Duration,
    /// Maximum concurrent message fetches per credential.
    pub fetch_concurrency: usize,
    /// Timeout applied to every provider HTTP call.
    pub http_timeout: Duration,
    /// `pdftotext` binary used to read statement attachments.
    pub pdftotext: PathBuf,
}

impl SyncConfig {
    /// Build config from environment variables.
    ///
    /// Only `MAIL_LEDGER_CRYPT_SECRET` is required.
    pub fn from_env() -> Result<Self, ConfigError> {
        let crypt_secret = std::env::var("MAIL_LEDGER_CRYPT_SECRET")
            .map_err(|_| ConfigError::MissingEnvVar("MAIL_LEDGER_CRYPT_SECRET".into()))?;

        let db_path = std::env::var("MAIL_LEDGER_DB_PATH")
            .unwrap_or_else(|_| "./data/mail-ledger.db".to_string());

        let senders = std::env::var("MAIL_LEDGER_SENDERS")
            .map(|s| parse_list(&s))
            .unwrap_or_else(|_| DEFAULT_SENDERS.iter().map(|s| s.to_string()).collect());

        let lookback_days = parse_optional_env::<u32>("MAIL_LEDGER_LOOKBACK_DAYS")?;
        let sync_interval_secs =
            parse_optional_env::<u64>("MAIL_LEDGER_SYNC_INTERVAL_SECS")?.unwrap_or(3600);
        let fetch_concurrency =
            parse_optional_env::<usize>("MAIL_LEDGER_FETCH_CONCURRENCY")?.unwrap_or(8);
        let http_timeout_secs =
            parse_optional_env::<u64>("MAIL_LEDGER_HTTP_TIMEOUT_SECS")?.unwrap_or(30);

        let pdftotext = std::env::var("MAIL_LEDGER_PDFTOTEXT")
            .unwrap_or_else(|_| "pdftotext".to_string());

        if fetch_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MAIL_LEDGER_FETCH_CONCURRENCY".into(),
                message: "must be at least 1".into(),
            });
        }

        Ok(Self {
            db_path: PathBuf::from(db_path),
            crypt_secret: SecretString::from(crypt_secret),
            senders,
            lookback_days,
            sync_interval: Duration::from_secs(sync_interval_secs),
            fetch_concurrency,
            http_timeout: Duration::from_secs(http_timeout_secs),
            pdftotext: PathBuf::from(pdftotext),
        })
    }
}

/// OAuth client settings for one mail provider.
#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub token_url: String,
}

impl OAuthClientConfig {
    /// Google client settings from `GOOGLE_CLIENT_ID` / `GOOGLE_CLIENT_SECRET`.
    /// Returns `None` if the client id is not set (provider disabled).
    pub fn google_from_env() -> Option<Self> {
        Self::from_env("GOOGLE", GOOGLE_TOKEN_URL)
    }

    /// Microsoft client settings from `MICROSOFT_CLIENT_ID` / `MICROSOFT_CLIENT_SECRET`.
    pub fn microsoft_from_env() -> Option<Self> {
        Self::from_env("MICROSOFT", MICROSOFT_TOKEN_URL)
    }

    fn from_env(prefix: &str, default_token_url: &str) -> Option<Self> {
        let client_id = std::env::var(format!("{prefix}_CLIENT_ID")).ok()?;
        let client_secret = std::env::var(format!("{prefix}_CLIENT_SECRET")).unwrap_or_default();
        let token_url = std::env::var(format!("{prefix}_TOKEN_URL"))
            .unwrap_or_else(|_| default_token_url.to_string());

        Some(Self {
            client_id,
            client_secret: SecretString::from(client_secret),
            token_url,
        })
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_optional_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_list_trims_and_drops_empty() {
        assert_eq!(
            parse_list(" nu@nu.com.co, ,alerts@bank.co "),
            vec!["nu@nu.com.co".to_string(), "alerts@bank.co".to_string()]
        );
    }

    #[test]
    fn parse_optional_env_missing_is_none() {
        let value = parse_optional_env::<u32>("MAIL_LEDGER_TEST_SURELY_UNSET").unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn default_senders_include_nu() {
        assert!(DEFAULT_SENDERS.contains(&"nu@nu.com.co"));
    }
}
