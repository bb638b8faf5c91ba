//! Optional config file loading. Search order: ./mangascrape.toml, then
//! $XDG_CONFIG_HOME/mangascrape/config.toml (or ~/.config/mangascrape/config.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file contents. All fields optional; only present keys override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// Default output directory when -o is not set. Paths are relative to CWD.
    pub output_dir: Option<PathBuf>,
    /// Directory finished volumes are copied to when --upload-to is not set.
    pub upload_root: Option<PathBuf>,
    /// Default site for bare slugs and searches: mangakakalot, manganelo or mangareader.
    pub source: Option<String>,
    /// Output format: pdf or cbz.
    pub format: Option<String>,
    pub chapters_per_volume: Option<i64>,
    /// Worker threads for downloads and conversion (default 4).
    pub workers: Option<usize>,
    /// HTTP User-Agent header.
    pub user_agent: Option<String>,
    /// Minimum delay in milliseconds between request starts.
    pub request_delay_ms: Option<u64>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Number of HTTP attempts for transient failures (default 3).
    pub retry_count: Option<u32>,
    /// Delay in seconds before each retry (e.g. [1, 2, 4]). Empty means exponential.
    pub retry_backoff_secs: Option<Vec<u64>>,
    /// Write ComicInfo.xml into CBZ files (default: true).
    pub comic_info: Option<bool>,
}

/// Config file locations in search order.
pub fn config_paths() -> Result<Vec<PathBuf>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    let mut paths = vec![cwd.join("mangascrape.toml")];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("mangascrape").join("config.toml"));
    }
    Ok(paths)
}

/// Load the first config file found in the default search order.
/// Missing file returns Ok(None). Invalid TOML or I/O error reading a present file returns Err.
pub fn load_config() -> Result<Option<Config>, String> {
    load_first(&config_paths()?)
}

/// Load the first of `paths` that exists.
pub fn load_first(paths: &[PathBuf]) -> Result<Option<Config>, String> {
    for path in paths {
        if path.exists() {
            return load_file(path).map(Some);
        }
    }
    Ok(None)
}

fn load_file(path: &Path) -> Result<Config, String> {
    let s = std::fs::read_to_string(path)
        .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
    let config: Config =
        toml::from_str(&s).map_err(|e| format!("Invalid config {}: {}", path.display(), e))?;
    log::debug!("loaded config from {}", path.display());
    Ok(config)
}
