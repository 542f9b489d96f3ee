//! # coe-core
//!
//! Core types shared by the COE directory client.
//!
//! ## Modules
//!
//! - [`error`] - Error taxonomy for directory operations
//! - [`config`] - Per-deployment connection and bind configuration

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::DirectoryConfig;
pub use error::{Error, Result};
