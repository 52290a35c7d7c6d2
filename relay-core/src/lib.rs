//! relay-core: shared error and configuration types for the audio relay service.

pub mod config;
pub mod errors;

pub use config::{RelayConfig, RelayConfigSnapshot};
pub use errors::{ErrorKind, RelayError};
