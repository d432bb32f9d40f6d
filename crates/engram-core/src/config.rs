//! Settings
//!
//! The per-user JSON configuration file with its enumerated keys. Every
//! field has a documented default so a missing or partial file always
//! yields a working configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{MemoryError, Result};
use crate::oracle::OracleConfig;

/// Runtime configuration, loaded from the user config dir
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Vector-store host
    pub chroma_host: String,
    /// Vector-store port
    pub chroma_port: u16,
    /// Project label new memories default to
    pub current_project: Option<String>,
    /// Whether retrieval rescales by age
    pub enable_memory_decay: bool,
    /// Retrieval decay half-life in days
    pub decay_half_life_days: f64,
    /// Whether shadow working-memory tracking is on
    pub shadow_enabled: bool,
    /// Shadow token budget
    pub shadow_token_threshold: u32,
    /// Shadow idle timeout in minutes
    pub shadow_time_threshold_min: i64,
    /// Shadow relevance needed to surface as a memory
    pub shadow_surface_threshold: f64,
    /// Whether repeated shadow activities collapse
    pub shadow_deduplicate: bool,
    /// Whether dream cycles consult the oracle
    pub dream_use_llm: bool,
    /// Oracle provider configuration
    pub llm: OracleConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chroma_host: "localhost".to_string(),
            chroma_port: 8000,
            current_project: None,
            enable_memory_decay: true,
            decay_half_life_days: 30.0,
            shadow_enabled: true,
            shadow_token_threshold: 500,
            shadow_time_threshold_min: 30,
            shadow_surface_threshold: 0.6,
            shadow_deduplicate: true,
            dream_use_llm: false,
            llm: OracleConfig::default(),
        }
    }
}

impl Settings {
    /// The default config file location under the user config dir
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "engram", "engram")
            .map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// The default trust-score state file location
    pub fn default_trust_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "engram", "engram")
            .map(|dirs| dirs.data_dir().join("trust_scores.json"))
    }

    /// Load from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| MemoryError::database(format!("config read: {}", e)))?;
        serde_json::from_str(&raw)
            .map_err(|e| MemoryError::parsing("config", e.to_string()))
    }

    /// Write to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| MemoryError::database(format!("config dir: {}", e)))?;
        }
        let body = serde_json::to_string_pretty(self)
            .map_err(|e| MemoryError::parsing("config", e.to_string()))?;
        std::fs::write(path, body)
            .map_err(|e| MemoryError::database(format!("config write: {}", e)))
    }

    /// Shadow tracker config derived from these settings
    pub fn shadow_config(&self) -> crate::memory::shadow::ShadowConfig {
        crate::memory::shadow::ShadowConfig {
            token_threshold: self.shadow_token_threshold,
            time_threshold_min: self.shadow_time_threshold_min,
            surface_threshold: self.shadow_surface_threshold,
            deduplicate: self.shadow_deduplicate,
        }
    }

    /// Retrieval decay config derived from these settings
    pub fn retrieval_decay(&self) -> crate::search::RetrievalDecay {
        crate::search::RetrievalDecay {
            enabled: self.enable_memory_decay,
            half_life_days: self.decay_half_life_days,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
