use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Presence write failed: {0}")]
    PresenceWrite(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().unwrap_or_default();
                match code.as_ref() {
                    // PostgreSQL check_violation
                    "23514" => Self::InvalidInput("Constraint check failed".to_string()),
                    // PostgreSQL not_null_violation
                    "23502" => Self::InvalidInput("Required field is missing".to_string()),
                    _ => Self::Database(err),
                }
            }
            _ => Self::Database(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by a playback session.
///
/// Validation failures are reported before any network use. Connection
/// failures are retried and only escape as `RetriesExhausted`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("Invalid stream key: {0}")]
    Validation(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Stream unavailable after {attempts} retries: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

impl PlaybackError {
    /// Message suitable for showing to a listener
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::Connection(_) => "Connection to the stream was interrupted".to_string(),
            Self::RetriesExhausted { .. } => {
                "The stream is currently unavailable. Please try again later.".to_string()
            }
        }
    }
}
