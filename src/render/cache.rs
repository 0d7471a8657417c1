use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CompositorError, Result};
use crate::project::{VideoLayer, VoiceOverLayer};

/// Inputs that decide what a generated still looks like
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageParams {
    pub prompt: String,
    pub positive_prompt: String,
    pub negative_prompt: String,
    pub model: String,
    pub seed: i64,
    pub width: u32,
    pub height: u32,
}

impl From<&VideoLayer> for ImageParams {
    fn from(layer: &VideoLayer) -> Self {
        Self {
            prompt: layer.prompt.clone(),
            positive_prompt: layer.positive_prompt.clone(),
            negative_prompt: layer.negative_prompt.clone(),
            model: layer.model.clone(),
            seed: layer.seed,
            width: layer.width,
            height: layer.height,
        }
    }
}

/// The exact generation inputs behind one layer artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayerParams {
    /// `duration` is unset while only the still is known to be good
    Video {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration: Option<f64>,
        image: ImageParams,
    },
    VoiceOver {
        prompt: String,
        speaker: String,
        speaker_text_temp: f64,
        speaker_waveform_temp: f64,
    },
}

impl LayerParams {
    pub fn video(layer: &VideoLayer, duration: f64) -> Self {
        Self::Video {
            duration: Some(duration),
            image: ImageParams::from(layer),
        }
    }

    /// Record for a still whose clip has not been encoded yet
    ///
    /// Never equal to a full video record, so the clip stays stale while the
    /// still itself can be reused.
    pub fn still(layer: &VideoLayer) -> Self {
        Self::Video {
            duration: None,
            image: ImageParams::from(layer),
        }
    }

    /// Narration length is an output of synthesis, so it is not an input here
    pub fn voice_over(layer: &VoiceOverLayer) -> Self {
        Self::VoiceOver {
            prompt: layer.prompt.clone(),
            speaker: layer.speaker.clone(),
            speaker_text_temp: layer.speaker_text_temp,
            speaker_waveform_temp: layer.speaker_waveform_temp,
        }
    }
}

/// What is persisted next to each artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRecord {
    /// Informational only, never compared
    pub rendered_at: DateTime<Utc>,
    pub params: LayerParams,
}

/// Per-layer parameter records stored as `<dir>/<layer id>.toml`
///
/// Records are independent of each other. A record is removed before its
/// artifact is rewritten and only stored again once the artifact exists, so
/// an interrupted render never leaves a record describing a stale file. Video
/// layers get an intermediate still-only record between image generation and
/// encoding, so a failed encode never costs the image.
#[derive(Debug, Clone)]
pub struct LayerCache {
    dir: PathBuf,
}

impl LayerCache {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn record_path(&self, layer_id: &str) -> PathBuf {
        self.dir.join(format!("{}.toml", layer_id))
    }

    /// Read the last record for a layer
    ///
    /// A missing, unreadable or unparsable record is reported as `None`: the
    /// caller regenerates rather than failing the pass.
    pub async fn load(&self, layer_id: &str) -> Option<CachedRecord> {
        let path = self.record_path(layer_id);

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Ignoring unreadable cache record {:?}: {}", path, e);
                return None;
            }
        };

        match toml::from_str(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Ignoring corrupt cache record {:?}: {}", path, e);
                None
            }
        }
    }

    /// `false` only when the stored parameters equal `fresh` field for field
    pub async fn should_regenerate(&self, layer_id: &str, fresh: &LayerParams) -> bool {
        let regenerate = match self.load(layer_id).await {
            Some(record) => record.params != *fresh,
            None => true,
        };
        debug!("Cache {} for layer '{}'", if regenerate { "miss" } else { "hit" }, layer_id);
        regenerate
    }

    /// Whether the stored still was made from the same image inputs
    ///
    /// Ignores duration: a timing change alone must not rerun image generation.
    pub async fn image_matches(&self, layer_id: &str, fresh: &ImageParams) -> bool {
        match self.load(layer_id).await {
            Some(CachedRecord { params: LayerParams::Video { image, .. }, .. }) => image == *fresh,
            _ => false,
        }
    }

    /// Drop the record before the artifact is rewritten
    ///
    /// A render that dies half way then leaves no record, and the layer is
    /// regenerated from scratch next time.
    pub async fn invalidate(&self, layer_id: &str) -> Result<()> {
        match tokio::fs::remove_file(self.record_path(layer_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist the parameters of a freshly written artifact
    ///
    /// Writes a temporary file and renames it over the record, so readers see
    /// either the old record or the new one.
    pub async fn store(&self, layer_id: &str, params: &LayerParams) -> Result<()> {
        let record = CachedRecord {
            rendered_at: Utc::now(),
            params: params.clone(),
        };

        let content = toml::to_string_pretty(&record).map_err(|e| {
            CompositorError::generic(format!("cannot serialize cache record: {}", e))
        })?;

        let path = self.record_path(layer_id);
        let staging = self.dir.join(format!("{}.toml.tmp", layer_id));

        tokio::fs::write(&staging, content).await?;
        tokio::fs::rename(&staging, &path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn castle() -> VideoLayer {
        VideoLayer {
            prompt: "a castle".to_string(),
            positive_prompt: "golden hour".to_string(),
            negative_prompt: "blurry".to_string(),
            model: "sd-base".to_string(),
            seed: 42,
            width: 768,
            height: 432,
        }
    }

    fn narrator() -> VoiceOverLayer {
        VoiceOverLayer {
            prompt: "Once upon a time".to_string(),
            speaker: "v1".to_string(),
            speaker_text_temp: 0.7,
            speaker_waveform_temp: 0.7,
        }
    }

    #[tokio::test]
    async fn test_absent_record_always_regenerates() {
        let dir = tempdir().unwrap();
        let cache = LayerCache::new(dir.path());

        assert!(cache.should_regenerate("v1", &LayerParams::voice_over(&narrator())).await);
        assert!(!cache.image_matches("v1", &ImageParams::from(&castle())).await);
    }

    #[tokio::test]
    async fn test_identical_params_hit() {
        let dir = tempdir().unwrap();
        let cache = LayerCache::new(dir.path());
        let params = LayerParams::video(&castle(), 2.4);

        cache.store("v1", &params).await.unwrap();

        assert!(!cache.should_regenerate("v1", &params).await);
        assert!(!dir.path().join("v1.toml.tmp").exists());
    }

    #[tokio::test]
    async fn test_any_changed_field_misses() {
        let dir = tempdir().unwrap();
        let cache = LayerCache::new(dir.path());
        cache.store("vo", &LayerParams::voice_over(&narrator())).await.unwrap();

        let mut changed = narrator();
        changed.speaker_waveform_temp = 0.71;
        assert!(cache.should_regenerate("vo", &LayerParams::voice_over(&changed)).await);

        let mut changed = narrator();
        changed.speaker = "v2".to_string();
        assert!(cache.should_regenerate("vo", &LayerParams::voice_over(&changed)).await);
    }

    #[tokio::test]
    async fn test_video_duration_change_keeps_image() {
        let dir = tempdir().unwrap();
        let cache = LayerCache::new(dir.path());
        cache.store("v1", &LayerParams::video(&castle(), 2.4)).await.unwrap();

        let retimed = LayerParams::video(&castle(), 3.1);
        assert!(cache.should_regenerate("v1", &retimed).await);
        assert!(cache.image_matches("v1", &ImageParams::from(&castle())).await);

        let mut reseeded = castle();
        reseeded.seed = 43;
        assert!(!cache.image_matches("v1", &ImageParams::from(&reseeded)).await);
    }

    #[tokio::test]
    async fn test_invalidate_removes_record() {
        let dir = tempdir().unwrap();
        let cache = LayerCache::new(dir.path());
        let params = LayerParams::video(&castle(), 1.0);
        cache.store("v1", &params).await.unwrap();

        cache.invalidate("v1").await.unwrap();
        cache.invalidate("v1").await.unwrap();

        assert!(cache.should_regenerate("v1", &params).await);
    }

    #[tokio::test]
    async fn test_still_record_keeps_image_but_not_clip() {
        let dir = tempdir().unwrap();
        let cache = LayerCache::new(dir.path());
        cache.store("v1", &LayerParams::still(&castle())).await.unwrap();

        assert!(cache.should_regenerate("v1", &LayerParams::video(&castle(), 2.4)).await);
        assert!(cache.image_matches("v1", &ImageParams::from(&castle())).await);

        let text = std::fs::read_to_string(cache.record_path("v1")).unwrap();
        assert!(!text.contains("duration"));
    }

    #[tokio::test]
    async fn test_records_are_per_layer() {
        let dir = tempdir().unwrap();
        let cache = LayerCache::new(dir.path());
        cache.store("a", &LayerParams::video(&castle(), 1.0)).await.unwrap();

        assert!(cache.should_regenerate("b", &LayerParams::video(&castle(), 1.0)).await);
    }

    #[tokio::test]
    async fn test_corrupt_record_is_a_miss() {
        let dir = tempdir().unwrap();
        let cache = LayerCache::new(dir.path());
        std::fs::write(cache.record_path("v1"), "this is = = not toml").unwrap();

        assert!(cache.load("v1").await.is_none());
        assert!(cache.should_regenerate("v1", &LayerParams::video(&castle(), 1.0)).await);
    }

    #[tokio::test]
    async fn test_record_is_plain_key_value_text() {
        let dir = tempdir().unwrap();
        let cache = LayerCache::new(dir.path());
        cache.store("vo", &LayerParams::voice_over(&narrator())).await.unwrap();

        let text = std::fs::read_to_string(cache.record_path("vo")).unwrap();
        assert!(text.contains("kind = \"voice_over\""));
        assert!(text.contains("speaker = \"v1\""));
        assert!(text.contains("rendered_at"));
    }
}
