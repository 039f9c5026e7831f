//! Project configuration stored in `.taxtree/config.json`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use taxtree_graph::ImportConfig;
use taxtree_rdf::ExportConfig;

pub const CONFIG_DIR: &str = ".taxtree";
pub const CONFIG_FILE: &str = "config.json";

type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Location of the row store.
    pub db_path: PathBuf,
    pub import: ImportConfig,
    pub export: ExportConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            import: ImportConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

/// `<home>/.taxtree/taxtree.db`, or relative to the working directory when
/// there is no home directory.
pub fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
        .join("taxtree.db")
}

/// Config file location for a project directory.
pub fn config_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_DIR).join(CONFIG_FILE)
}

impl Config {
    /// Loads the config.
    ///
    /// An explicit path must exist. Without one, `./.taxtree/config.json` is
    /// used if present, else the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let local = config_path(Path::new("."));
                if !local.is_file() {
                    return Ok(Self::default());
                }
                local
            }
        };

        let raw = fs::read_to_string(&path)
            .map_err(|e| format!("cannot read config {}: {}", path.display(), e))?;
        let config = serde_json::from_str(&raw)
            .map_err(|e| format!("invalid config {}: {}", path.display(), e))?;
        Ok(config)
    }

    /// Writes the config as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
