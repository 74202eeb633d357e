//! Light docker-compose handling: read service names, write overrides.

use super::DeployError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DOCKER_COMPOSE_FILENAME: &str = "docker-compose.yml";
pub const DOCKER_COMPOSE_OVERRIDE_FILENAME: &str = "docker-compose.override.yml";

#[derive(Debug, Default, Deserialize)]
struct ComposeDocument {
    #[serde(default)]
    version: Option<serde_yaml::Value>,
    #[serde(default)]
    services: Option<BTreeMap<String, serde_yaml::Value>>,
}

/// A parsed docker-compose file. Only service names and version are kept.
#[derive(Debug, Clone)]
pub struct ComposeFile {
    path: PathBuf,
    version: Option<String>,
    services: Vec<String>,
}

impl ComposeFile {
    /// Read `dir/docker-compose.yml`.
    pub fn open(dir: &Path) -> Result<Self> {
        Self::open_named(dir, DOCKER_COMPOSE_FILENAME)
    }

    pub fn open_named(dir: &Path, filename: &str) -> Result<Self> {
        let path = dir.join(filename);
        if !path.is_file() {
            return Err(DeployError::NoDockerComposeFile(dir.to_path_buf()).into());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read '{}'", path.display()))?;
        let document: Option<ComposeDocument> = serde_yaml::from_str(&content)
            .with_context(|| format!("invalid docker-compose file '{}'", path.display()))?;
        let document = document.unwrap_or_default();
        Ok(Self {
            path,
            version: document.version.and_then(|version| match version {
                serde_yaml::Value::String(s) => Some(s),
                serde_yaml::Value::Number(n) => Some(n.to_string()),
                _ => None,
            }),
            services: document.services.unwrap_or_default().into_keys().collect(),
        })
    }

    pub fn filename(&self) -> Option<&str> {
        self.path.file_name().and_then(|name| name.to_str())
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Service names, sorted.
    pub fn services(&self) -> &[String] {
        &self.services
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volumes: Option<Vec<String>>,
}

/// docker-compose override limited to `env_file` and `volumes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    services: BTreeMap<String, ServiceOverride>,
}

impl Default for ComposeOverride {
    fn default() -> Self {
        Self::new(Some("3.9"))
    }
}

impl ComposeOverride {
    pub fn new(version: Option<&str>) -> Self {
        Self {
            version: version.map(str::to_string),
            services: BTreeMap::new(),
        }
    }

    /// Override declaring the same format version as `compose`.
    pub fn matching(compose: &ComposeFile) -> Self {
        compose
            .version()
            .map_or_else(Self::default, |version| Self::new(Some(version)))
    }

    fn service_mut(&mut self, service: &str) -> &mut ServiceOverride {
        self.services.entry(service.to_string()).or_default()
    }

    pub fn set_service_env_file(&mut self, service: &str, path: impl Into<String>) {
        self.service_mut(service).env_file = Some(path.into());
    }

    pub fn add_service_volume(&mut self, service: &str, mapping: impl Into<String>) {
        self.service_mut(service)
            .volumes
            .get_or_insert_with(Vec::new)
            .push(mapping.into());
    }

    /// Volumes declared for `service`; empty if the service has none.
    pub fn service_volumes(&self, service: &str) -> Result<&[String], DeployError> {
        let entry = self
            .services
            .get(service)
            .ok_or_else(|| DeployError::UnknownService(service.to_string()))?;
        Ok(entry.volumes.as_deref().unwrap_or_default())
    }

    pub fn clear_service_volumes(&mut self, service: &str) {
        if let Some(entry) = self.services.get_mut(service) {
            entry.volumes = None;
        }
    }

    pub fn service(&self, service: &str) -> Option<&ServiceOverride> {
        self.services.get(service)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Write to `dir/filename` and return the written path.
    pub fn write_to(&self, dir: &Path, filename: &str) -> Result<PathBuf> {
        let path = dir.join(filename);
        std::fs::write(&path, self.to_yaml_string()?)
            .with_context(|| format!("cannot write '{}'", path.display()))?;
        Ok(path)
    }
}
