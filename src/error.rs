use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Console-wide error types.
///
/// # Taxonomy
///
/// - `Validation` - Rejected locally before any network call
/// - `Fetch` - Transport failure or failed read; previous caches are retained
/// - `Persistence` - The server rejected a mutation; local state is untouched
/// - `AuthExpired` - 401 on an authenticated request; handled by session
///   eviction, never shown as a dismissible notification
#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Failed to fetch from gateway: {0}")]
    Fetch(String),

    #[error("Gateway rejected the change: {message}")]
    Persistence {
        status: Option<u16>,
        message: String,
    },

    #[error("Session expired")]
    AuthExpired,

    #[error("Login failed: {0}")]
    LoginFailed(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Operation timed out: {0}")]
    OperationTimeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Fallback shown when the gateway rejects a change without saying why.
pub const GENERIC_PERSISTENCE_MESSAGE: &str = "The gateway could not save the change. Please try again.";

impl ConsoleError {
    /// Build a persistence error, falling back to the generic message when the
    /// server did not provide one.
    pub fn persistence(status: Option<u16>, server_message: Option<String>) -> Self {
        let message = server_message
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| GENERIC_PERSISTENCE_MESSAGE.to_string());
        ConsoleError::Persistence { status, message }
    }

    /// Whether the error is surfaced to the operator as a notification.
    ///
    /// Session expiry is handled by eviction and redirect instead.
    pub fn is_notifiable(&self) -> bool {
        !matches!(self, ConsoleError::AuthExpired)
    }

    /// User-facing text for the notification area.
    ///
    /// Transport and decoding details are logged, not shown.
    pub fn user_message(&self) -> String {
        match self {
            ConsoleError::Validation(msg) => msg.clone(),
            ConsoleError::Persistence { message, .. } => message.clone(),
            ConsoleError::LoginFailed(msg) => msg.clone(),
            ConsoleError::NotFound(msg) => msg.clone(),
            ConsoleError::Fetch(_) => {
                "Unable to load data from the gateway. Showing the last known values.".to_string()
            }
            ConsoleError::AuthExpired => "Your session has expired. Please sign in again.".to_string(),
            ConsoleError::Serialization(e) => sanitize_serde_error(e),
            ConsoleError::OperationTimeout(_) => {
                "The gateway took too long to respond. Please try again.".to_string()
            }
            ConsoleError::ConfigError(_) => {
                "Console configuration error. Please contact an administrator.".to_string()
            }
            ConsoleError::Internal(_) => "An unexpected error occurred.".to_string(),
        }
    }

    /// Convert into a dismissible notification.
    ///
    /// Returns `None` for errors that are not shown to the operator.
    pub fn to_notification(&self) -> Option<Notification> {
        if !self.is_notifiable() {
            return None;
        }

        // Log the full error for operators, show the sanitized text
        tracing::warn!(error = %self, "Operation failed");

        let level = match self {
            ConsoleError::Validation(_) => NotificationLevel::Warning,
            _ => NotificationLevel::Error,
        };
        Some(Notification::new(level, self.user_message()))
    }
}

/// Severity of a console notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// A dismissible message for the operator.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub level: NotificationLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            level,
            message: message.into(),
            created_at: Utc::now(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, message)
    }
}

/// Sanitize serde error messages before showing them.
///
/// Gateway payloads that fail to decode carry internal field names; keep the
/// field but drop the rest.
fn sanitize_serde_error(e: &serde_json::Error) -> String {
    let msg = e.to_string();

    if msg.contains("missing field")
        && let Some(start) = msg.find('`')
        && let Some(end) = msg[start + 1..].find('`')
    {
        let field = &msg[start + 1..start + 1 + end];
        return format!("The gateway response is missing the field {field}");
    }

    if msg.contains("invalid type") {
        return "The gateway returned data in an unexpected format".to_string();
    }

    "The gateway returned an unreadable response".to_string()
}

/// Convenience type alias for Results with ConsoleError.
pub type ConsoleResult<T> = Result<T, ConsoleError>;
