//! # fitsync common library
//!
//! Shared code for the fitsync binary and its tests:
//! - Error type
//! - TOML configuration loading and validation
//! - Logging initialization

pub mod config;
pub mod error;
pub mod logging;

pub use config::Config;
pub use error::{Error, Result};
