//! Line-oriented `KEY=VALUE` env files.

use anyhow::{Context, Result};
use regex_lite::Regex;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Default env file name.
pub const DOTENV_FILENAME: &str = ".env";

static NEWLINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\r\n|\n|\r").expect("valid regex"));

/// Render a resolved value as it appears after `=`.
///
/// Values spanning several lines are wrapped in double quotes.
pub fn format_value(value: &Value) -> String {
    let text = match value {
        Value::Null => String::new(),
        Value::Bool(flag) => flag.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if NEWLINE.is_match(&text) {
        format!("\"{text}\"")
    } else {
        text
    }
}

/// Render `envs` as env file content.
pub fn render<'a, I>(envs: I) -> String
where
    I: IntoIterator<Item = (&'a String, &'a Value)>,
{
    envs.into_iter()
        .map(|(key, value)| format!("{key}={}\n", format_value(value)))
        .collect()
}

/// Write `envs` to `dir/filename` and return the written path.
pub fn write_dotenv<'a, I>(dir: &Path, envs: I, filename: &str) -> Result<PathBuf>
where
    I: IntoIterator<Item = (&'a String, &'a Value)>,
{
    let path = dir.join(filename);
    std::fs::write(&path, render(envs))
        .with_context(|| format!("cannot write env file '{}'", path.display()))?;
    Ok(path)
}
