//! stackgen library
//!
//! Typed environment stores with lazily generated values, a two-tier
//! (`global` / `services`) configuration merged under an update policy, and
//! the deployment writer producing env files and docker-compose overrides.

pub mod cli;
pub mod config;
pub mod deploy;
pub mod env;
pub mod error;
pub mod logging;
