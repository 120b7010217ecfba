//! Error types for the mail ledger.

use uuid::Uuid;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("Cipher error: {0}")]
    Cipher(#[from] CipherError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DatabaseError {
    /// Classify a libSQL error message as a constraint violation or a plain query failure.
    pub(crate) fn from_libsql(context: &str, err: libsql::Error) -> Self {
        let text = err.to_string();
        if text.contains("constraint") || text.contains("UNIQUE") {
            Self::Constraint(format!("{context}: {text}"))
        } else {
            Self::Query(format!("{context}: {text}"))
        }
    }
}

/// Mail provider errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    /// Token refresh or exchange failed. Fatal for the credential's run.
    #[error("Authentication failed for provider {provider}: {reason}")]
    AuthFailed { provider: String, reason: String },

    #[error("Unsupported mail provider: {0}")]
    UnsupportedProvider(String),

    /// Search (listing) request failed. Fatal for the credential's run.
    #[error("Search failed on provider {provider}: {reason}")]
    SearchFailed { provider: String, reason: String },

    /// A single message could not be fetched or decoded.
    #[error("Failed to fetch message {message_id}: {reason}")]
    Fetch { message_id: String, reason: String },

    #[error("Invalid date header {value:?}: {reason}")]
    InvalidDate { value: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for MailError {
    fn from(err: reqwest::Error) -> Self {
        MailError::Http(err.to_string())
    }
}

/// Credential cipher errors.
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Encryption failed: {0}")]
    Encrypt(String),

    #[error("Decryption failed: {0}")]
    Decrypt(String),
}

/// Statement attachment extraction errors.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Attachment decode failed: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(String),

    /// The PDF text tool ran but rejected the file (bad password, corrupt PDF).
    #[error("PDF text tool exited with {status:?}: {stderr}")]
    Tool { status: Option<i32>, stderr: String },
}

/// Pipeline-related errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Failed to load credentials for wallet {wallet_id}: {source}")]
    Credentials {
        wallet_id: Uuid,
        #[source]
        source: DatabaseError,
    },

    #[error("Credential {credential_id} could not be decrypted: {source}")]
    CredentialDecrypt {
        credential_id: Uuid,
        #[source]
        source: CipherError,
    },

    #[error("Persistence failed for wallet {wallet_id}: {source}")]
    Persistence {
        wallet_id: Uuid,
        #[source]
        source: DatabaseError,
    },

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
