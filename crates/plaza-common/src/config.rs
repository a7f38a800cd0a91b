use crate::error::PlazaError;
use crate::types::{Canvas, CanvasTable, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Server configuration. Every field has a default so a partial JSON file
/// (or none at all) is enough to start.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Bearer token of the bridge endpoint. The endpoint refuses every
    /// connection while this is unset.
    pub api_key: Option<String>,
    pub tile_folder: PathBuf,
    pub snapshot_path: Option<PathBuf>,
    pub snapshot_interval_secs: u64,
    pub ping_interval_secs: u64,
    pub online_counter_interval_secs: u64,
    pub tile_workers: usize,
    pub tile_base_interval_ms: u64,
    pub small_canvas_interval_secs: u64,
    pub log_level: String,
    pub canvases: BTreeMap<String, Canvas>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let mut canvases = BTreeMap::new();
        canvases.insert("0".to_owned(), Canvas::flat("d", 4096));
        Self {
            bind: "0.0.0.0:8080".to_owned(),
            api_key: None,
            tile_folder: PathBuf::from("./tiles"),
            snapshot_path: None,
            snapshot_interval_secs: 300,
            ping_interval_secs: 45,
            online_counter_interval_secs: 15,
            tile_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2),
            tile_base_interval_ms: 5000,
            small_canvas_interval_secs: 300,
            log_level: "info".to_owned(),
            canvases,
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: ServerConfig = serde_json::from_str(raw)?;
        config.canvas_table()?;
        Ok(config)
    }

    /// Resolves the configuration the way the binary does: an explicit path,
    /// else `PLAZA_CONFIG`, else defaults; then environment overrides.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let path = path.or_else(|| std::env::var_os("PLAZA_CONFIG").map(PathBuf::from));
        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.canvas_table()?;
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("PLAZA_BIND") {
            self.bind = bind;
        }
        if let Some(key) = lookup("PLAZA_API_KEY") {
            self.api_key = if key.is_empty() { None } else { Some(key) };
        }
        if let Some(folder) = lookup("PLAZA_TILE_FOLDER") {
            self.tile_folder = PathBuf::from(folder);
        }
        if let Some(level) = lookup("PLAZA_LOG") {
            self.log_level = level;
        }
    }

    pub fn canvas_table(&self) -> Result<CanvasTable> {
        if self.canvases.is_empty() {
            return Err(PlazaError::Config("no canvases configured".to_owned()));
        }
        CanvasTable::from_string_keys(&self.canvases)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }

    pub fn online_counter_interval(&self) -> Duration {
        Duration::from_secs(self.online_counter_interval_secs.max(1))
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs.max(1))
    }

    pub fn tile_base_interval(&self) -> Duration {
        Duration::from_millis(self.tile_base_interval_ms.max(1))
    }

    pub fn small_canvas_interval(&self) -> Duration {
        Duration::from_secs(self.small_canvas_interval_secs.max(1))
    }
}
