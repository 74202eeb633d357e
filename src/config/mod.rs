//! Deployment configuration.
//!
//! - [`ConfigTree`]: the `global` + `services` document, parsed into env stores
//! - [`ConfigLoader`]: merges the release template into the working
//!   configuration of a deployment directory
//! - [`InstallerConfig`]: update policy and allow list used by that merge

mod loader;
mod tree;
mod types;

pub use loader::{
    ConfigLoader, ConfigPaths, ConfigTier, TEMPLATE_CONFIG_FILENAME, WORKING_CONFIG_FILENAME,
};
pub use tree::{ConfigSection, ConfigTree};
pub use types::*;
