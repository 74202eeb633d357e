//! Deploy command: generate deployment files from a source directory.

use crate::config::{INSTALLER_CONFIG_FILENAME, TEMPLATE_CONFIG_FILENAME, WORKING_CONFIG_FILENAME};
use crate::deploy::backup::default_backup_filename;
use crate::deploy::{DeployError, DeployOptions, DeploymentFolder};
use anyhow::{Context, Result};
use clap::Args;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::info;

/// Arguments for the deploy command.
#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Directory holding docker-compose.yml and the stack configuration
    #[arg(short, long, default_value = ".")]
    pub source_directory: String,

    /// Where to write the deployment files (default: in place)
    #[arg(short, long)]
    pub target_directory: Option<String>,

    /// Name of the folder receiving per-service env files
    #[arg(long = "envs-folder-name", default_value = "envs")]
    pub envs_folder: String,

    /// Name of the folder holding per-service configuration files
    #[arg(long = "configs-folder-name", default_value = "configs")]
    pub configs_folder: String,

    /// Mount point of the service configs folder in its container
    #[arg(long, default_value = "/cm_configs")]
    pub configs_mount_point: String,

    /// Name of the working configuration file
    #[arg(long, default_value = WORKING_CONFIG_FILENAME)]
    pub working_config_filename: String,

    /// Name of the template configuration file
    #[arg(long, default_value = TEMPLATE_CONFIG_FILENAME)]
    pub template_config_filename: String,

    /// Clear the target directory before generating (distinct target only)
    #[arg(long)]
    pub overwrite: bool,

    /// Name of the installer configuration file
    #[arg(long, default_value = INSTALLER_CONFIG_FILENAME)]
    pub installer_config: String,

    /// Zip the source files into the target directory before deploying
    #[arg(short = 'z', long = "do-zip", alias = "do_zip")]
    pub do_zip: bool,

    /// Name of the backup zip (default: backup_<UTC timestamp>.zip)
    #[arg(long, requires = "do_zip")]
    pub zip_filename: Option<String>,
}

impl DeployArgs {
    pub fn options(&self) -> DeployOptions {
        DeployOptions {
            envs_folder: self.envs_folder.clone(),
            configs_folder: self.configs_folder.clone(),
            configs_mount_point: self.configs_mount_point.clone(),
            working_config_filename: self.working_config_filename.clone(),
            template_config_filename: self.template_config_filename.clone(),
            installer_config_filename: self.installer_config.clone(),
        }
    }
}

/// Run the deploy command.
///
/// The source is opened before the target is touched. A target that
/// contains the source directory or one of its files is refused, even
/// with `--overwrite`.
pub fn run_deploy(args: &DeployArgs) -> Result<()> {
    let source = Path::new(&args.source_directory)
        .canonicalize()
        .with_context(|| format!("cannot access source directory '{}'", args.source_directory))?;
    let folder = DeploymentFolder::open(&source, args.options())?;

    let target = match args.target_directory.as_deref() {
        Some(dir) => absolute(Path::new(dir))?,
        None => source.clone(),
    };

    if source == target {
        info!("Deploy files in-place in '{}'", source.display());
    } else {
        let holds_sources = folder
            .backup_files()?
            .iter()
            .any(|relative| source.join(relative).starts_with(&target));
        if source.starts_with(&target) || holds_sources {
            return Err(DeployError::TargetContainsSource {
                target,
                source_dir: source,
            }
            .into());
        }
        if !is_empty_dir(&target)? {
            if !args.overwrite {
                return Err(DeployError::InvalidTargetDirectory(target).into());
            }
            info!("Clearing target directory '{}'", target.display());
            clear_directory(&target)?;
        }
        fs::create_dir_all(&target)
            .with_context(|| format!("cannot create '{}'", target.display()))?;
        info!(
            "Deploy files from '{}' to '{}'",
            source.display(),
            target.display()
        );
    }

    if args.do_zip {
        let filename = args
            .zip_filename
            .clone()
            .unwrap_or_else(default_backup_filename);
        folder.write_backup(&target.join(filename))?;
    }

    info!("Generate deployment files...");
    folder.deploy_files(&target)?;
    info!("Done");
    Ok(())
}

/// Canonical path of an existing directory, or the normalized absolute
/// path of one still to be created.
fn absolute(path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return path
            .canonicalize()
            .with_context(|| format!("cannot access '{}'", path.display()));
    }
    let path = std::path::absolute(path)
        .with_context(|| format!("cannot resolve '{}'", path.display()))?;
    Ok(normalize(&path))
}

/// Lexical normalization: drops `.` and resolves `..` against preceding parts.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    if normalized.as_os_str().is_empty() {
        normalized.push(".");
    }
    normalized
}

/// Missing directories count as empty.
fn is_empty_dir(dir: &Path) -> Result<bool> {
    if !dir.exists() {
        return Ok(true);
    }
    Ok(fs::read_dir(dir)?.next().is_none())
}

fn clear_directory(dir: &Path) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}
