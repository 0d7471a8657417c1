use std::path::Path;

use tracing::debug;

use crate::error::{ProjectError, Result};
use crate::project::types::Outline;

/// Reads and writes clip trees produced by the upstream script agents
pub struct ProjectLoader;

impl ProjectLoader {
    /// Load an outline from a JSON or TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Outline> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let outline = match Self::format_of(path)?.as_str() {
            "json" => serde_json::from_str(&content).map_err(|e| ProjectError::ParseFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?,
            _ => toml::from_str(&content).map_err(|e| ProjectError::ParseFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?,
        };

        debug!("Loaded project tree from {:?}", path);
        Ok(outline)
    }

    /// Persist an outline, including any durations resolved during rendering
    pub fn save<P: AsRef<Path>>(outline: &Outline, path: P) -> Result<()> {
        let path = path.as_ref();

        let content = match Self::format_of(path)?.as_str() {
            "json" => serde_json::to_string_pretty(outline).map_err(|e| ProjectError::ParseFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?,
            _ => toml::to_string_pretty(outline).map_err(|e| ProjectError::ParseFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?,
        };

        // Write next to the target first so a crash never truncates the project
        let staging = path.with_extension("saving");
        std::fs::write(&staging, content)?;
        std::fs::rename(&staging, path)?;
        Ok(())
    }

    fn format_of(path: &Path) -> Result<String> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "json" | "toml" => Ok(extension),
            _ => Err(ProjectError::UnsupportedFormat { format: extension }.into()),
        }
    }
}
