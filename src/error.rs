use thiserror::Error;

/// Type alias for Result with InsightsError
pub type Result<T> = std::result::Result<T, InsightsError>;

/// Error types for the Gmail insights tool
///
/// Only a few kinds halt the interactive shell (see [`InsightsError::is_fatal`]);
/// everything else is reported to the user and the shell keeps running.
#[derive(Error, Debug)]
pub enum InsightsError {
    /// OAuth consent, refresh or credential handling failed
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Mail retrieval failed (network or Gmail API error)
    #[error("Failed to retrieve emails: {0}")]
    FetchError(String),

    /// The language model endpoint returned an error
    #[error("Language model error: {0}")]
    ModelError(String),

    /// Word cloud rendering or image encoding failed
    #[error("Render error: {0}")]
    RenderError(String),

    /// Required API key is not present in the environment
    #[error("The {0} environment variable is not set.")]
    MissingApiKey(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// User aborted an interactive prompt
    #[error("Operation cancelled: {0}")]
    OperationCancelled(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl InsightsError {
    /// Check if the error must stop the process
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            InsightsError::AuthError(_)
                | InsightsError::ConfigError(_)
                | InsightsError::MissingApiKey(_)
        )
    }

    /// Check if the error is reported and treated as "no results"
    pub fn is_recoverable(&self) -> bool {
        matches!(self, InsightsError::FetchError(_))
    }
}

/// Human readable description of a non-success Gmail API status
fn describe_status(status: hyper::StatusCode) -> String {
    let reason = status.canonical_reason().unwrap_or("Unknown");
    match status.as_u16() {
        401 => format!("HTTP 401: {} (credential rejected)", reason),
        403 => format!("HTTP 403: {} (missing gmail.readonly scope?)", reason),
        429 => format!("HTTP 429: {} (quota exhausted)", reason),
        code => format!("HTTP {}: {}", code, reason),
    }
}

impl From<google_gmail1::Error> for InsightsError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            google_gmail1::Error::Failure(ref response) => {
                InsightsError::FetchError(describe_status(response.status()))
            }
            google_gmail1::Error::BadRequest(ref err) => {
                InsightsError::FetchError(format!("Bad request: {}", err))
            }
            google_gmail1::Error::HttpError(ref err) => {
                InsightsError::FetchError(format!("Connection error: {}", err))
            }
            google_gmail1::Error::Io(err) => InsightsError::FetchError(err.to_string()),
            _ => InsightsError::FetchError(error.to_string()),
        }
    }
}

impl From<async_openai::error::OpenAIError> for InsightsError {
    fn from(error: async_openai::error::OpenAIError) -> Self {
        InsightsError::ModelError(error.to_string())
    }
}

impl From<image::ImageError> for InsightsError {
    fn from(error: image::ImageError) -> Self {
        InsightsError::RenderError(error.to_string())
    }
}

impl From<inquire::InquireError> for InsightsError {
    fn from(error: inquire::InquireError) -> Self {
        match error {
            inquire::InquireError::OperationCanceled
            | inquire::InquireError::OperationInterrupted => {
                InsightsError::OperationCancelled("prompt closed".to_string())
            }
            other => InsightsError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                other.to_string(),
            )),
        }
    }
}
