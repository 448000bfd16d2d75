use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rdkafka::error::KafkaError;
use serde_json::json;

/// Startup errors. Any of these stops the process before the loop starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required API key is not present in the environment.
    #[error("Environment variable {0} not defined")]
    MissingEnv(&'static str),
    /// The ini file could not be read or parsed.
    #[error("Failed to load config file '{path}': {source}")]
    File {
        path: String,
        #[source]
        source: ::config::ConfigError,
    },
    /// A section required by the running binary is absent.
    #[error("Config section [{0}] is missing")]
    MissingSection(&'static str),
    /// A key required inside a section is absent.
    #[error("Config key '{key}' is missing from section [{section}]")]
    MissingKey { section: &'static str, key: &'static str },
    /// A value is present but unusable.
    #[error("Invalid value for '{key}': {reason}")]
    Invalid { key: String, reason: String },
}

/// Per-message failures of the streaming loop.
///
/// None of these are fatal: the loop logs them and moves on to the next poll,
/// and no enriched record is published for the message that raised them.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The broker reported an error instead of a message.
    #[error("Broker error: {0}")]
    Broker(#[from] KafkaError),
    /// The payload did not match its schema, or the registry could not resolve it.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// The search service answered with an error (or could not be reached).
    #[error("Search service error: {0}")]
    SearchService(String),
    /// The search succeeded but yielded no usable profile link.
    #[error("No good search result found for '{0}'")]
    NoResult(String),
    /// The scraping service returned a non-success status or an unreadable body.
    #[error("Scrape service error: {0}")]
    ScrapeService(String),
    /// The completion call failed or its answer was not the expected JSON.
    #[error("Summarization error: {0}")]
    Summarization(String),
}

impl PipelineError {
    /// True for failures raised by the search, scrape or completion services.
    pub fn is_external_service(&self) -> bool {
        matches!(
            self,
            PipelineError::SearchService(_)
                | PipelineError::NoResult(_)
                | PipelineError::ScrapeService(_)
                | PipelineError::Summarization(_)
        )
    }
}

impl From<apache_avro::Error> for PipelineError {
    fn from(err: apache_avro::Error) -> Self {
        PipelineError::Serialization(err.to_string())
    }
}

/// Errors returned by the CRUD web service.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database-related errors.
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
    /// Resource not found error.
    #[error("Not found: {0}")]
    NotFound(String),
    /// Bad request error (invalid input).
    #[error("Bad request: {0}")]
    BadRequest(String),
    /// Error with context chain for better debugging.
    #[error("{context}: {source}")]
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl IntoResponse for AppError {
    /// Maps each error variant to an HTTP status code and JSON body.
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::DatabaseError(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::WithContext { source, context } => {
                tracing::error!("Error with context: {} -> {}", context, source);
                return source.into_response();
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }
}

impl<T> ResultExt<T> for Result<T, sqlx::Error> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::DatabaseError(e)),
            context: context.into(),
        })
    }
}
