//! Application configuration management

use std::path::PathBuf;

use anyhow::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory containing the book's document files
    pub book_dir: PathBuf,
    /// Line prefix that starts a new section
    pub marker_prefix: String,
    /// Session loop settings
    pub session: SessionConfig,
    /// Telemetry settings
    pub telemetry: TelemetryConfig,
}

/// Session loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds between automatic saves of the whole book
    pub save_interval_secs: f64,
    /// Seconds between telemetry samples
    pub telemetry_interval_secs: f64,
}

/// Telemetry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Append-only log of raw samples
    pub log_path: PathBuf,
    /// Moving-average window applied to the rate series before plotting
    pub smoothing_window: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            book_dir: PathBuf::from("book"),
            marker_prefix: "##".to_string(),
            session: SessionConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            save_interval_secs: 1.0,
            telemetry_interval_secs: 0.01,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("rawSessionTm.csv"),
            smoothing_window: 1000,
        }
    }
}

impl AppConfig {
    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "scriptorium", "Scriptorium")
            .map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Result<Self> {
        let path = Self::config_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        // Ensure config directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        tracing::info!("Saved config to: {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.marker_prefix, "##");
        assert_eq!(config.session.save_interval_secs, 1.0);
        assert_eq!(config.telemetry.smoothing_window, 1000);
    }
}
