//! Optional `pdb.toml` ambient configuration (§6): pipeline tuning knobs with `serde(default)`
//! fields so every setting has a built-in default, following `bot_arena::config::ArenaConfig`'s
//! load-or-default shape.

use std::path::Path;

use pdb_storage::PipelineConfig;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Read(std::path::PathBuf, std::io::Error),
    #[error("failed to parse config file {0}: {1}")]
    Parse(std::path::PathBuf, toml::de::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub queue_depth: usize,
    pub sort_workers: usize,
    pub buffer_pool_size: usize,
    pub index_granularity: usize,
    pub ingest_buffer_size: usize,
    pub ingest_workers: usize,
}

impl Default for CliConfig {
    fn default() -> Self {
        let pipeline = PipelineConfig::default();
        CliConfig {
            queue_depth: pipeline.queue_depth,
            sort_workers: pipeline.sort_workers,
            buffer_pool_size: pipeline.buffer_pool_size,
            index_granularity: pipeline.index_granularity,
            ingest_buffer_size: pdb::DEFAULT_BUFFER_SIZE,
            ingest_workers: 1,
        }
    }
}

impl CliConfig {
    /// Loads `path` if given and present, otherwise `./pdb.toml` if it exists, otherwise falls
    /// back to built-in defaults (§6 "`pdb-cli` additionally accepts `--config pdb.toml`").
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        let candidate = match explicit_path {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let default_path = Path::new("pdb.toml");
                default_path.exists().then(|| default_path.to_path_buf())
            }
        };

        let Some(path) = candidate else {
            return Ok(CliConfig::default());
        };

        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Read(path.clone(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse(path, e))
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            queue_depth: self.queue_depth,
            sort_workers: self.sort_workers,
            buffer_pool_size: self.buffer_pool_size,
            index_granularity: self.index_granularity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_path_falls_back_to_defaults() {
        let config = CliConfig::load(None).unwrap();
        assert_eq!(config.ingest_workers, 1);
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let err = CliConfig::load(Some(Path::new("/nonexistent/pdb.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read(..)));
    }

    #[test]
    fn parses_overrides_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pdb.toml");
        std::fs::write(&path, "sort_workers = 4\ningest_workers = 3\n").unwrap();
        let config = CliConfig::load(Some(&path)).unwrap();
        assert_eq!(config.sort_workers, 4);
        assert_eq!(config.ingest_workers, 3);
    }
}
