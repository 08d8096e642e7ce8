//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the synchronization engine and the port interfaces
//! through which it reaches the trading backend and the operator.

/// Port interfaces for the backend and operator notifications.
pub mod ports;

/// Deduplication, revalidation, subscriptions, and scheduler control.
pub mod services;
