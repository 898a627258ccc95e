// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for the tag monitoring lifecycle.
//!
//! Errors are grouped by the layer that produced them. The layer decides how
//! the orchestrator reacts: anything at or below the session layer discards
//! the stack and rebuilds it, a monitored item failure only skips that tag,
//! and a dispatch overflow only drops a notification.
//!
//! # Error Categories
//!
//! ```text
//! OpcUaError
//! ├── Connection    - Endpoint unreachable, connection lost, retries exhausted
//! ├── Session       - Session could not be opened on a live connection
//! ├── Subscription  - Subscription creation or acknowledgement failed
//! ├── MonitoredItem - A single tag could not be monitored
//! ├── Dispatch      - A listener queue overflowed
//! ├── Startup       - The startup sequence ran out of attempts
//! └── Configuration - Invalid settings or API misuse
//! ```
//!
//! # Examples
//!
//! ```
//! use tagwatch_opcua::error::{ConnectionError, ErrorSeverity, OpcUaError};
//!
//! let error = OpcUaError::connection(ConnectionError::refused(
//!     "opc.tcp://localhost:4840",
//!     "connection refused",
//! ));
//!
//! assert!(error.is_retryable());
//! assert_eq!(error.severity(), ErrorSeverity::Error);
//! assert_eq!(error.error_code().to_string(), "UA-0101");
//! ```

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tracing::Level;

use crate::client::transport::{ConnectionState, SessionHandle, SubscriptionHandle};
use crate::registry::TagName;
use crate::types::OverflowPolicy;

/// Result type alias for tag monitoring operations.
pub type OpcUaResult<T> = Result<T, OpcUaError>;

// =============================================================================
// OpcUaError - Main Error Type
// =============================================================================

/// The main error type, categorized by the layer that failed.
#[derive(Debug, Error)]
pub enum OpcUaError {
    /// Transport connection errors.
    #[error("{0}")]
    Connection(#[from] ConnectionError),

    /// Session lifecycle errors.
    #[error("{0}")]
    Session(#[from] SessionError),

    /// Subscription lifecycle errors.
    #[error("{0}")]
    Subscription(#[from] SubscriptionError),

    /// Per-tag monitored item errors.
    #[error("{0}")]
    MonitoredItem(#[from] MonitoredItemError),

    /// Listener queue overflow.
    #[error("{0}")]
    Dispatch(#[from] DispatchOverflowError),

    /// Startup sequence gave up.
    #[error("{0}")]
    Startup(#[from] StartupError),

    /// Configuration and API usage errors.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),
}

impl OpcUaError {
    // =========================================================================
    // Factory Methods
    // =========================================================================

    /// Creates a connection error.
    #[inline]
    pub fn connection(error: ConnectionError) -> Self {
        Self::Connection(error)
    }

    /// Creates a session error.
    #[inline]
    pub fn session(error: SessionError) -> Self {
        Self::Session(error)
    }

    /// Creates a subscription error.
    #[inline]
    pub fn subscription(error: SubscriptionError) -> Self {
        Self::Subscription(error)
    }

    /// Creates a monitored item error.
    #[inline]
    pub fn monitored_item(error: MonitoredItemError) -> Self {
        Self::MonitoredItem(error)
    }

    /// Creates a configuration error.
    #[inline]
    pub fn configuration(error: ConfigurationError) -> Self {
        Self::Configuration(error)
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration(ConfigurationError::invalid(field, message))
    }

    /// Creates a not connected error.
    pub fn not_connected() -> Self {
        Self::Connection(ConnectionError::NotConnected)
    }

    // =========================================================================
    // Error Properties
    // =========================================================================

    /// Returns `true` if retrying the failed operation can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(e) => e.is_retryable(),
            Self::Session(e) => e.is_retryable(),
            Self::Subscription(e) => e.is_retryable(),
            Self::MonitoredItem(_) | Self::Dispatch(_) => false,
            Self::Startup(_) | Self::Configuration(_) => false,
        }
    }

    /// Returns `true` if this error must stop the orchestrator.
    ///
    /// Connection errors reach the orchestrator only after the connector has
    /// spent its retry budget, so they are fatal there.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Connection(e) => !e.is_retryable(),
            Self::Startup(_) | Self::Configuration(_) => true,
            _ => false,
        }
    }

    /// Returns the severity level of this error.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Connection(e) => e.severity(),
            Self::Session(_) => ErrorSeverity::Error,
            Self::Subscription(_) => ErrorSeverity::Error,
            Self::MonitoredItem(_) => ErrorSeverity::Warning,
            Self::Dispatch(_) => ErrorSeverity::Warning,
            Self::Startup(_) | Self::Configuration(_) => ErrorSeverity::Critical,
        }
    }

    /// Returns the error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Session(_) => "session",
            Self::Subscription(_) => "subscription",
            Self::MonitoredItem(_) => "monitored_item",
            Self::Dispatch(_) => "dispatch",
            Self::Startup(_) => "startup",
            Self::Configuration(_) => "configuration",
        }
    }

    /// Returns a unique error code for this error.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Connection(e) => e.error_code(),
            Self::Session(e) => e.error_code(),
            Self::Subscription(e) => e.error_code(),
            Self::MonitoredItem(e) => e.error_code(),
            Self::Dispatch(_) => ErrorCode::new(5, 1),
            Self::Startup(_) => ErrorCode::new(6, 1),
            Self::Configuration(e) => e.error_code(),
        }
    }

    /// Returns recovery hints for this error.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::Connection(e) => e.recovery_hints(),
            Self::Session(_) => vec![
                "The stack is rebuilt from a fresh connection automatically",
                "Check the server session limits if this repeats",
            ],
            Self::Subscription(_) => vec![
                "The stack is rebuilt from a fresh connection automatically",
                "Check the server subscription limits and publishing settings",
            ],
            Self::MonitoredItem(_) => vec![
                "Verify the tag exists in the server address space",
                "Check the namespace index and node id of the tag",
            ],
            Self::Dispatch(_) => vec![
                "The listener is slower than the notification rate",
                "Increase dispatch.queue_capacity or speed up the listener",
            ],
            Self::Startup(_) => vec![
                "Check that the endpoint is reachable",
                "Raise connection.max_retries or set retry_indefinitely",
            ],
            Self::Configuration(_) => vec!["Fix the configuration and restart"],
        }
    }

    /// Returns the tracing level for this error.
    pub fn tracing_level(&self) -> Level {
        self.severity().to_tracing_level()
    }

    /// Logs this error with a level matching its severity.
    pub fn log(&self, context: &str) {
        let code = self.error_code();

        match self.tracing_level() {
            Level::ERROR => tracing::error!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
            Level::WARN => tracing::warn!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
            _ => tracing::debug!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
        }
    }
}

// =============================================================================
// ConnectionError
// =============================================================================

/// Transport connection errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The endpoint refused or could not be reached.
    #[error("Connection refused to '{endpoint}': {reason}")]
    Refused {
        /// Target endpoint.
        endpoint: String,
        /// Reason reported by the transport.
        reason: String,
    },

    /// Invalid endpoint URL.
    #[error("Invalid endpoint URL: '{url}' - {reason}")]
    InvalidEndpoint {
        /// The invalid URL.
        url: String,
        /// Reason.
        reason: String,
    },

    /// No endpoint matches the configured security settings.
    #[error("No suitable endpoint found with security '{security}'")]
    NoSuitableEndpoint {
        /// Required security mode and policy.
        security: String,
    },

    /// An established connection went away.
    #[error("Connection lost{}", reason.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    Lost {
        /// Reason for the loss, if known.
        reason: Option<String>,
    },

    /// Operation requires a live connection.
    #[error("Not connected to OPC UA server")]
    NotConnected,

    /// The retry budget is spent.
    #[error("Giving up on '{endpoint}' after {attempts} attempt(s): {last_error}")]
    RetriesExhausted {
        /// Target endpoint.
        endpoint: String,
        /// Number of connection attempts made.
        attempts: u32,
        /// The error of the final attempt.
        #[source]
        last_error: Box<ConnectionError>,
    },
}

impl ConnectionError {
    /// Creates a connection refused error.
    pub fn refused(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Refused {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid endpoint error.
    pub fn invalid_endpoint(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a no suitable endpoint error.
    pub fn no_suitable_endpoint(security: impl Into<String>) -> Self {
        Self::NoSuitableEndpoint {
            security: security.into(),
        }
    }

    /// Creates a connection lost error.
    pub fn lost(reason: Option<String>) -> Self {
        Self::Lost { reason }
    }

    /// Creates a retries exhausted error.
    pub fn retries_exhausted(
        endpoint: impl Into<String>,
        attempts: u32,
        last_error: ConnectionError,
    ) -> Self {
        Self::RetriesExhausted {
            endpoint: endpoint.into(),
            attempts,
            last_error: Box::new(last_error),
        }
    }

    /// Returns `true` if another connection attempt can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Refused { .. } | Self::Lost { .. } | Self::NotConnected => true,
            Self::InvalidEndpoint { .. }
            | Self::NoSuitableEndpoint { .. }
            | Self::RetriesExhausted { .. } => false,
        }
    }

    /// Returns `true` if the retry budget was spent.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::RetriesExhausted { .. })
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Lost { .. } | Self::NotConnected => ErrorSeverity::Warning,
            Self::RetriesExhausted { .. } => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Refused { .. } => ErrorCode::new(1, 1),
            Self::InvalidEndpoint { .. } => ErrorCode::new(1, 2),
            Self::NoSuitableEndpoint { .. } => ErrorCode::new(1, 3),
            Self::Lost { .. } => ErrorCode::new(1, 4),
            Self::NotConnected => ErrorCode::new(1, 5),
            Self::RetriesExhausted { .. } => ErrorCode::new(1, 6),
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::Refused { .. } => vec![
                "Check if the OPC UA server is running",
                "Verify the endpoint URL is correct",
                "Check firewall rules allow the connection",
            ],
            Self::InvalidEndpoint { .. } => vec![
                "Use format: opc.tcp://hostname:port/path",
                "Verify the hostname and port are correct",
            ],
            Self::NoSuitableEndpoint { .. } => vec![
                "Check available security modes on the server",
                "Set endpoint_must_exist to false to connect to the configured URL directly",
            ],
            Self::Lost { .. } => vec!["The connection is re-established automatically"],
            Self::NotConnected => vec!["Connect before opening a session"],
            Self::RetriesExhausted { .. } => vec![
                "Check that the endpoint is reachable",
                "Raise connection.max_retries or set retry_indefinitely",
            ],
        }
    }
}

// =============================================================================
// SessionError
// =============================================================================

/// Session lifecycle errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Sessions can only be opened on a connected transport.
    #[error("Cannot open a session while the connection is {state}")]
    NotConnected {
        /// Connection state at the time of the call.
        state: ConnectionState,
    },

    /// The server did not grant the session.
    #[error("Failed to open session: {message}")]
    OpenFailed {
        /// Error message.
        message: String,
        /// Underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Closing the session failed.
    #[error("Failed to close session {session}: {message}")]
    CloseFailed {
        /// The session being closed.
        session: SessionHandle,
        /// Error message.
        message: String,
    },
}

impl SessionError {
    /// Creates a session open failure.
    pub fn open_failed(message: impl Into<String>) -> Self {
        Self::OpenFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a session open failure with source.
    pub fn open_failed_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::OpenFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a session close failure.
    pub fn close_failed(session: SessionHandle, message: impl Into<String>) -> Self {
        Self::CloseFailed {
            session,
            message: message.into(),
        }
    }

    /// Returns `true` if a rebuild can fix this error.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::CloseFailed { .. })
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotConnected { .. } => ErrorCode::new(2, 1),
            Self::OpenFailed { .. } => ErrorCode::new(2, 2),
            Self::CloseFailed { .. } => ErrorCode::new(2, 3),
        }
    }
}

// =============================================================================
// SubscriptionError
// =============================================================================

/// Subscription lifecycle errors.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// Subscription creation failed.
    #[error("Failed to create subscription: {message}")]
    CreationFailed {
        /// Error message.
        message: String,
    },

    /// The session already carries a subscription.
    #[error("Session {session} already has subscription {existing}")]
    AlreadyExists {
        /// The session.
        session: SessionHandle,
        /// The live subscription.
        existing: SubscriptionHandle,
    },

    /// The transport never acknowledged the subscription as started.
    #[error("Subscription {subscription} was not acknowledged within {waited:?}")]
    NotStarted {
        /// The subscription.
        subscription: SubscriptionHandle,
        /// How long the orchestrator waited.
        waited: Duration,
    },

    /// The server terminated the subscription.
    #[error("Subscription {subscription} was terminated by the server")]
    Terminated {
        /// The subscription.
        subscription: SubscriptionHandle,
    },

    /// Deleting the subscription failed.
    #[error("Failed to delete subscription {subscription}: {message}")]
    DeleteFailed {
        /// The subscription.
        subscription: SubscriptionHandle,
        /// Error message.
        message: String,
    },
}

impl SubscriptionError {
    /// Creates a subscription creation failure.
    pub fn creation_failed(message: impl Into<String>) -> Self {
        Self::CreationFailed {
            message: message.into(),
        }
    }

    /// Creates a subscription delete failure.
    pub fn delete_failed(subscription: SubscriptionHandle, message: impl Into<String>) -> Self {
        Self::DeleteFailed {
            subscription,
            message: message.into(),
        }
    }

    /// Returns `true` if a rebuild can fix this error.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::AlreadyExists { .. } | Self::DeleteFailed { .. })
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::CreationFailed { .. } => ErrorCode::new(3, 1),
            Self::AlreadyExists { .. } => ErrorCode::new(3, 2),
            Self::NotStarted { .. } => ErrorCode::new(3, 3),
            Self::Terminated { .. } => ErrorCode::new(3, 4),
            Self::DeleteFailed { .. } => ErrorCode::new(3, 5),
        }
    }
}

// =============================================================================
// MonitoredItemError
// =============================================================================

/// Errors scoped to a single tag. These never abort the other tags.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MonitoredItemError {
    /// The server rejected the item.
    #[error("Tag '{tag}' ({node_id}) could not be monitored: {reason}")]
    Rejected {
        /// The tag.
        tag: TagName,
        /// The node the tag maps to.
        node_id: String,
        /// Reason reported by the transport.
        reason: String,
    },

    /// The tag already has a monitored item on this subscription.
    #[error("Tag '{tag}' is already monitored on this subscription")]
    Duplicate {
        /// The tag.
        tag: TagName,
    },

    /// Deleting the item failed.
    #[error("Failed to delete monitored item for tag '{tag}': {reason}")]
    DeleteFailed {
        /// The tag.
        tag: TagName,
        /// Reason reported by the transport.
        reason: String,
    },
}

impl MonitoredItemError {
    /// Creates a rejected item error.
    pub fn rejected(tag: TagName, node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            tag,
            node_id: node_id.into(),
            reason: reason.into(),
        }
    }

    /// Returns the tag this error belongs to.
    pub fn tag(&self) -> &TagName {
        match self {
            Self::Rejected { tag, .. } | Self::Duplicate { tag } | Self::DeleteFailed { tag, .. } => {
                tag
            }
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Rejected { .. } => ErrorCode::new(4, 1),
            Self::Duplicate { .. } => ErrorCode::new(4, 2),
            Self::DeleteFailed { .. } => ErrorCode::new(4, 3),
        }
    }
}

// =============================================================================
// DispatchOverflowError
// =============================================================================

/// A listener queue was full and a notification was dropped.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Listener queue for tag '{tag}' is full ({capacity}), {policy} applied ({dropped_total} dropped so far)")]
pub struct DispatchOverflowError {
    /// The tag whose queue overflowed.
    pub tag: TagName,
    /// Queue capacity.
    pub capacity: usize,
    /// Policy that decided which notification was dropped.
    pub policy: OverflowPolicy,
    /// Total notifications dropped on this queue.
    pub dropped_total: u64,
}

// =============================================================================
// StartupError
// =============================================================================

/// The startup sequence failed and will not be retried.
#[derive(Debug, Error)]
#[error("Startup failed after {attempts} attempt(s): {last}")]
pub struct StartupError {
    /// Number of complete startup sequences attempted.
    pub attempts: u32,
    /// The error that ended the last attempt.
    #[source]
    pub last: Box<OpcUaError>,
}

impl StartupError {
    /// Creates a startup error.
    pub fn new(attempts: u32, last: OpcUaError) -> Self {
        Self {
            attempts,
            last: Box::new(last),
        }
    }
}

// =============================================================================
// ConfigurationError
// =============================================================================

/// Configuration and API usage errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    /// A setting has an invalid value.
    #[error("Invalid configuration for '{field}': {message}")]
    Invalid {
        /// The field.
        field: String,
        /// Error message.
        message: String,
    },

    /// A node id could not be parsed.
    #[error("Invalid node id '{value}': {reason}")]
    InvalidNodeId {
        /// The raw value.
        value: String,
        /// Reason.
        reason: String,
    },

    /// The tag is not in the registry.
    #[error("Unknown tag '{tag}'")]
    UnknownTag {
        /// The tag.
        tag: String,
    },

    /// The tag appears twice in the registry.
    #[error("Duplicate tag '{tag}'")]
    DuplicateTag {
        /// The tag.
        tag: String,
    },

    /// The operation is not allowed in the current lifecycle state.
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        /// The attempted operation.
        operation: &'static str,
        /// The current lifecycle state.
        state: String,
    },
}

impl ConfigurationError {
    /// Creates an invalid setting error.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid node id error.
    pub fn invalid_node_id(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidNodeId {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Invalid { .. } => ErrorCode::new(8, 1),
            Self::InvalidNodeId { .. } => ErrorCode::new(8, 2),
            Self::UnknownTag { .. } => ErrorCode::new(8, 3),
            Self::DuplicateTag { .. } => ErrorCode::new(8, 4),
            Self::InvalidState { .. } => ErrorCode::new(8, 5),
        }
    }
}

// =============================================================================
// FatalReason
// =============================================================================

/// A cloneable summary of the error that stopped the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatalReason {
    /// Error code of the fatal error.
    pub code: ErrorCode,
    /// Category of the fatal error.
    pub category: &'static str,
    /// Rendered error message.
    pub message: String,
}

impl From<&OpcUaError> for FatalReason {
    fn from(error: &OpcUaError) -> Self {
        Self {
            code: error.error_code(),
            category: error.category(),
            message: error.to_string(),
        }
    }
}

impl fmt::Display for FatalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

// =============================================================================
// ErrorSeverity
// =============================================================================

/// Error severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    /// Informational - no action required.
    Info,
    /// Warning - action may be required.
    Warning,
    /// Error - action required, but recoverable.
    Error,
    /// Critical - the orchestrator stops.
    Critical,
}

impl ErrorSeverity {
    /// Converts to tracing level.
    pub fn to_tracing_level(self) -> Level {
        match self {
            Self::Info => Level::INFO,
            Self::Warning => Level::WARN,
            Self::Error | Self::Critical => Level::ERROR,
        }
    }

    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// ErrorCode
// =============================================================================

/// Structured error code.
///
/// Format: `UA-XXYY` where XX is the category and YY the specific error.
///
/// Categories:
/// - 1: Connection
/// - 2: Session
/// - 3: Subscription
/// - 4: Monitored item
/// - 5: Dispatch
/// - 6: Startup
/// - 8: Configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    /// Category.
    pub category: u8,
    /// Specific error within category.
    pub code: u8,
}

impl ErrorCode {
    /// Creates a new error code.
    pub const fn new(category: u8, code: u8) -> Self {
        Self { category, code }
    }

    /// Returns the full error code as a u16.
    pub fn as_u16(&self) -> u16 {
        ((self.category as u16) << 8) | (self.code as u16)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UA-{:02X}{:02X}", self.category, self.code)
    }
}

// =============================================================================
// Tests
// =============================================================================
