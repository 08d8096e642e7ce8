//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `Fetcher`: Reads the resource behind a cache key
//! - `RemoteActions`: Performs scheduler actions on the backend
//! - `NotificationSink`: Shows transient messages to the operator

use std::fmt;

use async_trait::async_trait;

use crate::domain::action::SchedulerAction;
use crate::domain::cache::{CacheKey, FetchError};

// =============================================================================
// Fetcher
// =============================================================================

/// Reads the current value of the resource identified by a key.
///
/// The engine invokes at most one fetch per key at a time. Implementations
/// must not retry internally; the next scheduled tick is the retry.
#[async_trait]
pub trait Fetcher<V>: Send + Sync {
    /// Fetch the resource for `key`.
    async fn fetch(&self, key: &CacheKey) -> Result<V, FetchError>;
}

// =============================================================================
// Remote Actions
// =============================================================================

/// Performs operator actions against the remote schedulers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteActions: Send + Sync {
    /// Perform `action`. Resolves once the backend has acknowledged it.
    async fn perform(&self, action: SchedulerAction) -> Result<(), FetchError>;
}

// =============================================================================
// Notifications
// =============================================================================

/// Severity of an operator notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    /// The operation succeeded.
    Success,
    /// The operation failed.
    Error,
    /// Informational.
    Info,
}

impl NotificationKind {
    /// Label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transient message for the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Severity.
    pub kind: NotificationKind,
    /// Headline.
    pub text: String,
    /// Optional detail, typically the server's error message.
    pub detail: Option<String>,
}

/// Fire-and-forget delivery of operator notifications.
pub trait NotificationSink: Send + Sync {
    /// Show a notification. Must not block.
    fn notify(&self, kind: NotificationKind, text: &str, detail: Option<&str>);
}
