//! # dirsync-core
//!
//! Core types shared by the directory record synchronization crates.
//!
//! ## Modules
//!
//! - [`error`] - Error type, stable error codes and conversions
//! - [`credentials`] - Bind credentials for directory connections

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod credentials;
pub mod error;

// Re-export commonly used types
pub use credentials::BindCredentials;
pub use error::{Error, Result};
