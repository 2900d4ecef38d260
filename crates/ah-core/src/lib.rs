//! Core services for asio-host
//!
//! Configuration, the error taxonomy shared by every layer, and logging setup.

pub mod config;
pub mod error;
pub mod logging;

pub use config::Config;
pub use error::{HostError, Result};
