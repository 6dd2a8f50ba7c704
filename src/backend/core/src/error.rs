//! Error handling for Tasktree Core.
//!
//! Access denials are ordinary values ([`Decision`](crate::rbac::Decision));
//! this module covers everything that is actually an error:
//! - Stable, machine-readable error codes
//! - HTTP status code mapping for collaborators that surface errors over HTTP
//! - User-facing vs internal messages
//! - Logging and error metrics
//!
//! # Usage
//!
//! ```rust,ignore
//! use tasktree_core::error::{Result, TasktreeError};
//!
//! fn delete(
//!     guard: &OrganizationGuard<Directory>,
//!     actor: &Actor,
//!     id: OrganizationId,
//! ) -> Result<()> {
//!     guard.authorize_delete(actor, id)?;
//!     Ok(())
//! }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

use crate::rbac::models::LookupError;

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for Tasktree operations.
pub type Result<T> = std::result::Result<T, TasktreeError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes. Stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Authorization (4000-4099)
    Unauthorized,
    Forbidden,
    MalformedActor,

    // Hierarchy (4100-4199)
    OrganizationNotFound,
    HierarchyCycle,
    OrganizationHasChildren,

    // Input (4200-4299)
    InvalidInput,
    SerializationError,

    // Collaborators (5000-5099)
    LookupFailed,

    // Configuration (5100-5199)
    ConfigurationError,

    // Internal (9000-9099)
    InternalError,
}

impl ErrorCode {
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::Unauthorized => 4000,
            Self::Forbidden => 4001,
            Self::MalformedActor => 4002,
            Self::OrganizationNotFound => 4100,
            Self::HierarchyCycle => 4101,
            Self::OrganizationHasChildren => 4102,
            Self::InvalidInput => 4200,
            Self::SerializationError => 4201,
            Self::LookupFailed => 5000,
            Self::ConfigurationError => 5100,
            Self::InternalError => 9000,
        }
    }

    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden | Self::MalformedActor => StatusCode::FORBIDDEN,
            Self::OrganizationNotFound => StatusCode::NOT_FOUND,
            Self::HierarchyCycle | Self::OrganizationHasChildren => StatusCode::CONFLICT,
            Self::InvalidInput | Self::SerializationError => StatusCode::BAD_REQUEST,
            Self::LookupFailed => StatusCode::SERVICE_UNAVAILABLE,
            Self::ConfigurationError | Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub const fn category(&self) -> &'static str {
        match self {
            Self::Unauthorized | Self::Forbidden | Self::MalformedActor => "authorization",
            Self::OrganizationNotFound | Self::HierarchyCycle | Self::OrganizationHasChildren => {
                "hierarchy"
            }
            Self::InvalidInput | Self::SerializationError => "input",
            Self::LookupFailed => "collaborator",
            Self::ConfigurationError => "configuration",
            Self::InternalError => "internal",
        }
    }

    /// Whether a caller could reasonably retry. Nothing in this crate retries.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::LookupFailed)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
}

impl ErrorSeverity {
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::Unauthorized
            | ErrorCode::Forbidden
            | ErrorCode::OrganizationNotFound
            | ErrorCode::HierarchyCycle
            | ErrorCode::OrganizationHasChildren
            | ErrorCode::InvalidInput
            | ErrorCode::SerializationError => Self::Low,

            ErrorCode::MalformedActor | ErrorCode::LookupFailed => Self::Medium,

            ErrorCode::ConfigurationError | ErrorCode::InternalError => Self::High,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Details
// ═══════════════════════════════════════════════════════════════════════════════

/// Additional structured details about an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
}

impl ErrorDetails {
    pub fn is_empty(&self) -> bool {
        self.context.is_empty() && self.entity_id.is_none()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for Tasktree Core.
#[derive(Error, Debug)]
pub struct TasktreeError {
    code: ErrorCode,

    /// Safe to expose to clients.
    user_message: Cow<'static, str>,

    /// For logs only.
    internal_message: Option<String>,

    details: ErrorDetails,

    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for TasktreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl TasktreeError {
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            details: ErrorDetails::default(),
            source: None,
        };
        error.record_metrics();
        error
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, "An internal error occurred")
            .with_internal_message(message)
    }

    pub fn forbidden(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn organization_not_found(id: impl fmt::Display) -> Self {
        let id = id.to_string();
        let mut error = Self::new(
            ErrorCode::OrganizationNotFound,
            format!("Organization not found: {}", id),
        );
        error.details.entity_type = Some("organization".to_string());
        error.details.entity_id = Some(id);
        error
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorCode::ConfigurationError, "Invalid configuration")
            .with_internal_message(message)
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn with_internal_message(mut self, message: impl Into<String>) -> Self {
        self.internal_message = Some(message.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.context.insert(key.into(), v);
        }
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    /// Log this error at a level matching its severity.
    pub fn log(&self) {
        let code = self.code.to_string();
        let status = self.http_status().as_u16();

        match self.severity() {
            ErrorSeverity::High => error!(
                error_code = %code,
                category = self.code.category(),
                http_status = status,
                user_message = %self.user_message,
                internal_message = ?self.internal_message,
                source = ?self.source,
                "High severity error"
            ),
            ErrorSeverity::Medium => warn!(
                error_code = %code,
                category = self.code.category(),
                http_status = status,
                user_message = %self.user_message,
                internal_message = ?self.internal_message,
                "Medium severity error"
            ),
            ErrorSeverity::Low => tracing::debug!(
                error_code = %code,
                category = self.code.category(),
                http_status = status,
                user_message = %self.user_message,
                "Low severity error"
            ),
        }
    }

    fn record_metrics(&self) {
        counter!(
            "tasktree_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category(),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// API Response
// ═══════════════════════════════════════════════════════════════════════════════

/// Error body for collaborators that answer over HTTP.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorInfo,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub numeric_code: u32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<&TasktreeError> for ErrorResponse {
    fn from(error: &TasktreeError) -> Self {
        Self {
            success: false,
            error: ErrorInfo {
                code: error.code,
                numeric_code: error.code.numeric_code(),
                message: error.user_message.to_string(),
                details: (!error.details.is_empty()).then(|| error.details.clone()),
                timestamp: chrono::Utc::now(),
            },
        }
    }
}

impl IntoResponse for TasktreeError {
    fn into_response(self) -> Response {
        self.log();
        let status = self.http_status();
        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Conversions
// ═══════════════════════════════════════════════════════════════════════════════

impl From<LookupError> for TasktreeError {
    fn from(err: LookupError) -> Self {
        TasktreeError::new(ErrorCode::LookupFailed, "Directory lookup failed")
            .with_internal_message(err.to_string())
            .with_source(err)
    }
}

impl From<serde_json::Error> for TasktreeError {
    fn from(err: serde_json::Error) -> Self {
        TasktreeError::new(ErrorCode::SerializationError, "Invalid JSON")
            .with_internal_message(err.to_string())
            .with_source(err)
    }
}

impl From<config::ConfigError> for TasktreeError {
    fn from(err: config::ConfigError) -> Self {
        TasktreeError::configuration(err.to_string()).with_source(err)
    }
}

impl From<crate::rbac::roles::ParseError> for TasktreeError {
    fn from(err: crate::rbac::roles::ParseError) -> Self {
        TasktreeError::new(ErrorCode::InvalidInput, err.to_string()).with_source(err)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
