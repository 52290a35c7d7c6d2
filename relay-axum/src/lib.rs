//! relay-axum: HTTP boundary for the audio relay service.
//!
//! Exposes the transfer endpoint and a health check as an Axum router,
//! and turns relay errors into Feathers-style JSON responses.

pub mod app;
mod error;
pub mod state;
pub mod transfer;
pub use error::RelayAxumError;
pub use state::RelayAxumState;

pub use app::{axum, AxumApp};
