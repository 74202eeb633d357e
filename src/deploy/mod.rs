//! Deployment file generation.
//!
//! Consumes a resolved [`ConfigTree`](crate::config::ConfigTree) and writes,
//! for the `default` server of a deployment directory:
//! - `.env`: every global namespace, keys prefixed by the namespace name
//! - `envs/<service>.env`: one file per docker-compose service with envs
//! - `docker-compose.override.yml`: `env_file` and config volume wiring
//! - the working configuration, with generated values frozen
//!
//! Files are generated in a staging directory and copied into the target
//! only once every one of them was written.

pub mod backup;
pub mod compose;
pub mod dotenv;
mod folder;

pub use folder::{DEFAULT_SERVER, DeployOptions, DeploymentFolder};

use std::path::PathBuf;
use thiserror::Error;

/// Deployment layout errors.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("no docker-compose.yml file found in '{0}'")]
    NoDockerComposeFile(PathBuf),

    #[error("target directory '{0}' exists and is not empty")]
    InvalidTargetDirectory(PathBuf),

    #[error("target directory '{target}' contains files of the source directory '{source_dir}'")]
    TargetContainsSource { target: PathBuf, source_dir: PathBuf },

    #[error("unknown service '{0}'")]
    UnknownService(String),

    #[error("invalid server configuration: {0}")]
    InvalidServerConfiguration(String),

    #[error("cannot find source file or folder '{0}'")]
    MissingSource(PathBuf),
}
