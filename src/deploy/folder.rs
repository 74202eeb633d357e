//! A deployment directory: compose file, configs folder and config tiers.

use super::DeployError;
use super::backup::write_zip;
use super::compose::{ComposeFile, ComposeOverride, DOCKER_COMPOSE_OVERRIDE_FILENAME};
use super::dotenv::{DOTENV_FILENAME, write_dotenv};
use crate::config::{
    ConfigLoader, ConfigPaths, ConfigTree, INSTALLER_CONFIG_FILENAME, TEMPLATE_CONFIG_FILENAME,
    WORKING_CONFIG_FILENAME,
};
use anyhow::{Context, Result};
use heck::ToShoutySnakeCase;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// The only server supported by the single-server layout.
pub const DEFAULT_SERVER: &str = "default";

/// Folder and file names of a deployment directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOptions {
    pub envs_folder: String,
    pub configs_folder: String,
    /// Where the per-service configs folder is mounted in its container.
    pub configs_mount_point: String,
    pub working_config_filename: String,
    pub template_config_filename: String,
    pub installer_config_filename: String,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            envs_folder: "envs".to_string(),
            configs_folder: "configs".to_string(),
            configs_mount_point: "/cm_configs".to_string(),
            working_config_filename: WORKING_CONFIG_FILENAME.to_string(),
            template_config_filename: TEMPLATE_CONFIG_FILENAME.to_string(),
            installer_config_filename: INSTALLER_CONFIG_FILENAME.to_string(),
        }
    }
}

/// Source deployment directory bound to its effective configuration.
#[derive(Debug)]
pub struct DeploymentFolder {
    directory: PathBuf,
    options: DeployOptions,
    compose: ComposeFile,
    loader: ConfigLoader,
}

impl DeploymentFolder {
    /// Open `directory`, which must hold a docker-compose file.
    pub fn open(directory: &Path, options: DeployOptions) -> Result<Self> {
        let compose = ComposeFile::open(directory)?;
        let paths = ConfigPaths::with_names(
            directory,
            &options.working_config_filename,
            &options.template_config_filename,
            &options.installer_config_filename,
        );
        let loader = ConfigLoader::load_with_paths(paths)?;

        if let Some(server) = loader
            .tree()
            .servers()
            .into_iter()
            .find(|server| server != DEFAULT_SERVER)
        {
            return Err(DeployError::InvalidServerConfiguration(format!(
                "only the '{DEFAULT_SERVER}' server is supported, found '{server}'"
            ))
            .into());
        }

        debug!(
            directory = %directory.display(),
            services = ?compose.services(),
            tiers = ?loader.tiers(),
            "Opened deployment folder"
        );

        Ok(Self {
            directory: directory.to_path_buf(),
            options,
            compose,
            loader,
        })
    }

    /// Effective configuration: working merged with template.
    pub fn config(&self) -> &ConfigTree {
        self.loader.tree()
    }

    fn configs_path(&self) -> PathBuf {
        self.directory.join(&self.options.configs_folder)
    }

    /// Compose services that have a namespace in the default server store.
    fn services_with_envs(&self) -> Vec<&str> {
        let Ok(store) = self.config().server_store(DEFAULT_SERVER) else {
            return Vec::new();
        };
        self.compose
            .services()
            .iter()
            .map(String::as_str)
            .filter(|service| store.has_namespace(service))
            .collect()
    }

    /// Compose services with a folder under the configs folder.
    fn services_with_configs(&self) -> Vec<&str> {
        let configs = self.configs_path();
        self.compose
            .services()
            .iter()
            .map(String::as_str)
            .filter(|service| configs.join(service).is_dir())
            .collect()
    }

    /// Files read from the source directory, relative to it.
    ///
    /// The compose file, everything under the configs folder, and the
    /// template and installer config when present.
    pub fn source_files(&self) -> Result<BTreeSet<PathBuf>> {
        let mut files = BTreeSet::new();
        if let Some(filename) = self.compose.filename() {
            files.insert(PathBuf::from(filename));
        }
        for filename in [
            &self.options.template_config_filename,
            &self.options.installer_config_filename,
        ] {
            if self.directory.join(filename).is_file() {
                files.insert(PathBuf::from(filename));
            }
        }
        let mut configs = Vec::new();
        list_files_recursive(&self.directory, &self.configs_path(), &mut configs)?;
        files.extend(configs);
        Ok(files)
    }

    /// Files written by [`deploy_files`](Self::deploy_files), relative to the target.
    pub fn generated_files(&self) -> BTreeSet<PathBuf> {
        let mut files: BTreeSet<PathBuf> = [
            DOTENV_FILENAME,
            DOCKER_COMPOSE_OVERRIDE_FILENAME,
            self.options.working_config_filename.as_str(),
        ]
        .into_iter()
        .map(PathBuf::from)
        .collect();
        let envs = Path::new(&self.options.envs_folder);
        files.extend(
            self.services_with_envs()
                .into_iter()
                .map(|service| envs.join(format!("{service}.env"))),
        );
        files
    }

    /// Every file present in a deployed target.
    pub fn target_files(&self) -> Result<BTreeSet<PathBuf>> {
        let mut files = self.source_files()?;
        files.extend(self.generated_files());
        Ok(files)
    }

    /// `.env` content: every global namespace, keys prefixed by the namespace.
    fn global_dotenv(&self) -> Result<BTreeMap<String, Value>> {
        let global = self.config().global_envs();
        let mut envs = BTreeMap::new();
        for namespace in global.namespaces() {
            let prefix = namespace.to_shouty_snake_case();
            for (key, value) in global.get_namespace_envs(&namespace)? {
                envs.insert(format!("{prefix}_{key}"), value);
            }
        }
        Ok(envs)
    }

    /// Files archived by [`write_backup`](Self::write_backup): the source
    /// files plus the working config of a previous deployment, if any.
    pub fn backup_files(&self) -> Result<BTreeSet<PathBuf>> {
        let mut files = self.source_files()?;
        let working = &self.options.working_config_filename;
        if self.directory.join(working).is_file() {
            files.insert(PathBuf::from(working));
        }
        Ok(files)
    }

    /// Zip the backup files into `zip_path`.
    pub fn write_backup(&self, zip_path: &Path) -> Result<PathBuf> {
        write_zip(&self.directory, &self.backup_files()?, zip_path)
    }

    fn generate_files(&self, dir: &Path) -> Result<()> {
        let dotenv = write_dotenv(dir, &self.global_dotenv()?, DOTENV_FILENAME)?;
        debug!(path = %dotenv.display(), "Wrote global env file");

        let mut compose_override = ComposeOverride::matching(&self.compose);

        let envs_dir = dir.join(&self.options.envs_folder);
        let services_with_envs = self.services_with_envs();
        if !services_with_envs.is_empty() {
            fs::create_dir_all(&envs_dir)
                .with_context(|| format!("cannot create '{}'", envs_dir.display()))?;
        }
        for service in services_with_envs {
            let envs = self
                .config()
                .server_store(DEFAULT_SERVER)?
                .get_namespace_envs(service)?;
            let filename = format!("{service}.env");
            write_dotenv(&envs_dir, &envs, &filename)?;
            compose_override
                .set_service_env_file(service, format!("{}/{filename}", self.options.envs_folder));
            debug!(service, "Wrote service env file");
        }

        for service in self.services_with_configs() {
            compose_override.add_service_volume(
                service,
                format!(
                    "./{}/{service}:{}",
                    self.options.configs_folder, self.options.configs_mount_point
                ),
            );
        }
        compose_override.write_to(dir, DOCKER_COMPOSE_OVERRIDE_FILENAME)?;

        let working = dir.join(&self.options.working_config_filename);
        fs::write(&working, self.config().to_yaml_string()?)
            .with_context(|| format!("cannot write '{}'", working.display()))?;
        debug!(path = %working.display(), "Wrote working configuration");
        Ok(())
    }

    /// Generate the deployment files into `target`, copying source files
    /// when `target` is not the source directory.
    ///
    /// Generation happens in a staging directory; `target` is only touched
    /// once every generated file was written.
    pub fn deploy_files(&self, target: &Path) -> Result<()> {
        let staging = TempDir::new().context("cannot create staging directory")?;
        self.generate_files(staging.path())?;
        debug!(staging = %staging.path().display(), "Generated into staging directory");

        fs::create_dir_all(target)
            .with_context(|| format!("cannot create '{}'", target.display()))?;
        let generated = self.generated_files();
        for relative in &generated {
            copy_file(staging.path(), target, relative)?;
        }
        if !same_directory(&self.directory, target) {
            for relative in self.source_files()? {
                copy_file(&self.directory, target, &relative)?;
            }
        }

        info!(
            target = %target.display(),
            generated = generated.len(),
            "Deployment files generated"
        );
        Ok(())
    }

    /// Remove the generated files from `target`, leaving source files.
    pub fn clean_generated_files(&self, target: &Path) -> Result<()> {
        for relative in self.generated_files() {
            let path = target.join(&relative);
            if path.is_file() {
                fs::remove_file(&path)
                    .with_context(|| format!("cannot remove '{}'", path.display()))?;
            }
        }
        let envs_dir = target.join(&self.options.envs_folder);
        if envs_dir.is_dir() && fs::read_dir(&envs_dir)?.next().is_none() {
            fs::remove_dir(&envs_dir)?;
        }
        Ok(())
    }
}

fn same_directory(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn copy_file(source_dir: &Path, target_dir: &Path, relative: &Path) -> Result<()> {
    let source = source_dir.join(relative);
    if !source.exists() {
        return Err(DeployError::MissingSource(source).into());
    }
    let target = target_dir.join(relative);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    debug!(
        "> '{}' ({})",
        relative.display(),
        if target.exists() { "replace" } else { "create" }
    );
    fs::copy(&source, &target)
        .with_context(|| format!("cannot copy '{}'", source.display()))?;
    Ok(())
}

/// Collect files under `dir`, relative to `base`.
fn list_files_recursive(base: &Path, dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            list_files_recursive(base, &path, files)?;
        } else {
            let relative = path.strip_prefix(base).unwrap_or(&path);
            files.push(relative.to_path_buf());
        }
    }
    Ok(())
}
