//! Shared types for the PKCE auth gateway workspace
//!
//! `Secret` keeps client secrets, signing keys, verifiers and upstream tokens
//! out of logs. `Error` covers configuration loading for every binary.

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
