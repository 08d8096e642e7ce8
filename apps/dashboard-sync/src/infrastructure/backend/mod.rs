//! Trading Backend Adapter
//!
//! `reqwest` implementation of the [`Fetcher`](crate::application::ports::Fetcher)
//! and [`RemoteActions`](crate::application::ports::RemoteActions) ports.

mod error;
mod http_client;

pub use error::BackendError;
pub use http_client::HttpBackend;
