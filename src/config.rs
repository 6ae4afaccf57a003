use std::path::Path;

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use prism_core::export::ExportFormat;
use prism_core::filters::FilterCatalog;
use prism_gpu::GpuPreference;

/// Tunables for an editing session. Missing fields take their defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Long edge of the live preview.
    pub preview_max_edge: u32,
    /// Long edge of gallery thumbnails.
    pub thumbnail_max_edge: u32,
    /// Undo depth. Zero keeps every state.
    pub history_limit: usize,
    /// Filter worker pool size. Zero picks from the core count.
    pub worker_threads: usize,
    pub gpu_preference: GpuPreference,
    pub export_format: ExportFormat,
    /// Filters rendered into the gallery, in display order.
    pub gallery_filters: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            preview_max_edge: 1280,
            thumbnail_max_edge: 160,
            history_limit: 50,
            worker_threads: 0,
            gpu_preference: GpuPreference::default(),
            export_format: ExportFormat::default(),
            gallery_filters: FilterCatalog::builtin()
                .ids()
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl SessionConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.preview_max_edge > 0, "preview_max_edge must be positive");
        ensure!(self.thumbnail_max_edge > 0, "thumbnail_max_edge must be positive");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let config = SessionConfig::from_json("{}").unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.gallery_filters.len(), FilterCatalog::builtin().all_filters().len());
        assert_eq!(config.gallery_filters[0], "Mono");
    }

    #[test]
    fn partial_config_overrides_fields() {
        let config = SessionConfig::from_json(
            r#"{
                "history_limit": 5,
                "gpu_preference": "low_power",
                "export_format": {"format": "png"},
                "gallery_filters": ["Noir", "Fade"]
            }"#,
        )
        .unwrap();
        assert_eq!(config.history_limit, 5);
        assert_eq!(config.gpu_preference, GpuPreference::LowPower);
        assert_eq!(config.export_format, ExportFormat::Png);
        assert_eq!(config.gallery_filters, vec!["Noir", "Fade"]);
        assert_eq!(config.preview_max_edge, 1280);
    }

    #[test]
    fn zero_preview_edge_is_rejected() {
        assert!(SessionConfig::from_json(r#"{"preview_max_edge": 0}"#).is_err());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prism.json");
        std::fs::write(&path, r#"{"thumbnail_max_edge": 96}"#).unwrap();

        let config = SessionConfig::load(&path).unwrap();
        assert_eq!(config.thumbnail_max_edge, 96);
    }

    #[test]
    fn load_names_missing_file() {
        let err = SessionConfig::load(Path::new("/nonexistent/prism.json")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/prism.json"));
    }
}
