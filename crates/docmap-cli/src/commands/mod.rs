//! Subcommands and the helpers they share.

pub mod batch;
pub mod config;
pub mod process;
pub mod refine;
pub mod rules;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use docmap_core::{DocmapConfig, EngineRegistry, ExtractionResult, ExtractionService, TrainingRules};

/// `<platform config dir>/docmap/config.json`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("docmap")
        .join("config.json")
}

/// Config path from `--config`, else the platform default.
pub fn config_path(explicit: Option<&str>) -> PathBuf {
    explicit.map(PathBuf::from).unwrap_or_else(default_config_path)
}

/// Load configuration: an explicit `--config` must exist, the platform
/// default is used when present, otherwise defaults apply.
pub fn load_config(explicit: Option<&str>) -> anyhow::Result<DocmapConfig> {
    if let Some(path) = explicit {
        let path = Path::new(path);
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        return Ok(DocmapConfig::from_file(path)?);
    }

    let path = default_config_path();
    if path.exists() {
        debug!("Using config at {}", path.display());
        Ok(DocmapConfig::from_file(&path)?)
    } else {
        Ok(DocmapConfig::default())
    }
}

/// Rules from a JSON file, or the default order schema.
pub fn load_rules(path: Option<&Path>) -> anyhow::Result<TrainingRules> {
    let rules = match path {
        Some(path) => TrainingRules::from_file(path)?,
        None => TrainingRules::default(),
    };
    rules.validate()?;
    Ok(rules)
}

/// A previously saved extraction result.
pub fn load_result(path: &Path) -> anyhow::Result<ExtractionResult> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Cannot read result {}: {}", path.display(), e))?;
    Ok(serde_json::from_str(&data)?)
}

/// Extraction service over a fresh registry.
pub fn build_service(config: DocmapConfig) -> ExtractionService {
    ExtractionService::new(Arc::new(EngineRegistry::new(config)))
}
