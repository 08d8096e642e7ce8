//! Domain Layer - Cache model and dashboard types.
//!
//! This layer contains the cache entries, keys, the change-notifying store,
//! and the dashboard vocabulary (endpoints, scheduler actions, market
//! sessions). Nothing here performs I/O.

/// Scheduler actions and the in-flight guard.
pub mod action;

/// Cache keys, entries, and the change-notifying store.
pub mod cache;

/// Dashboard endpoint catalog.
pub mod dashboard;

/// Market session clock.
pub mod session;

/// Subscriber tracking and change fan-out.
pub mod subscription;
