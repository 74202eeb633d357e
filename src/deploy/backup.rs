//! Zip backups of a deployment directory, taken before it is redeployed.

use anyhow::{Context, Result};
use chrono::Utc;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// `backup_<UTC timestamp>.zip`.
pub fn default_backup_filename() -> String {
    format!("backup_{}.zip", Utc::now().format("%Y%m%d%H%M%S"))
}

/// Archive `files` (relative to `base`) into `zip_path`, deflated.
///
/// Entry names are the relative paths with `/` separators.
pub fn write_zip<'a, I>(base: &Path, files: I, zip_path: &Path) -> Result<PathBuf>
where
    I: IntoIterator<Item = &'a PathBuf>,
{
    let archive = File::create(zip_path)
        .with_context(|| format!("cannot create zip file '{}'", zip_path.display()))?;
    let mut zip = ZipWriter::new(archive);
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut count = 0usize;
    for relative in files {
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        zip.start_file(name.as_str(), options)
            .with_context(|| format!("cannot add '{name}' to zip file"))?;
        let path = base.join(relative);
        let mut source =
            File::open(&path).with_context(|| format!("cannot open '{}'", path.display()))?;
        std::io::copy(&mut source, &mut zip)
            .with_context(|| format!("cannot copy '{}' into zip file", path.display()))?;
        debug!(entry = %name, "Zipped");
        count += 1;
    }
    zip.finish().context("cannot finalize zip file")?;

    info!(path = %zip_path.display(), files = count, "Backup written");
    Ok(zip_path.to_path_buf())
}
