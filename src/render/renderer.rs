use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::RenderConfig;
use crate::encoder::MediaEncoder;
use crate::error::Result;
use crate::generators::{GeneratorSet, ImageRequest, SpeechRequest};
use crate::project::{LayerKind, ResolvedLayer, VideoLayer, VoiceOverLayer};
use crate::render::cache::{ImageParams, LayerCache, LayerParams};

/// Counts of the work a renderer actually did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub images_generated: usize,
    pub clips_encoded: usize,
    pub speech_generated: usize,
    pub cache_hits: usize,
}

#[derive(Debug, Default)]
struct Counters {
    images_generated: AtomicUsize,
    clips_encoded: AtomicUsize,
    speech_generated: AtomicUsize,
    cache_hits: AtomicUsize,
}

/// Renders single layers into artifacts, skipping work the cache vouches for
///
/// Artifacts and parameter records live in the shot directory and are named
/// after the layer id.
pub struct LayerRenderer {
    encoder: Arc<dyn MediaEncoder>,
    generators: GeneratorSet,
    config: RenderConfig,
    counters: Counters,
}

impl LayerRenderer {
    pub fn new(
        encoder: Arc<dyn MediaEncoder>,
        generators: GeneratorSet,
        config: RenderConfig,
    ) -> Self {
        Self {
            encoder,
            generators,
            config,
            counters: Counters::default(),
        }
    }

    /// Render one layer, returning its artifact
    ///
    /// Music layers have no synthesis backend and yield `None`.
    pub async fn render(&self, layer: &ResolvedLayer, dir: &Path) -> Result<Option<PathBuf>> {
        match &layer.kind {
            LayerKind::Video(video) => self
                .render_video(&layer.id, video, layer.duration, dir)
                .await
                .map(Some),
            LayerKind::VoiceOver(voice) => {
                self.render_voice_over(&layer.id, voice, dir).await.map(Some)
            }
            LayerKind::Music(_) => {
                warn!("No music backend; layer '{}' renders to silence", layer.id);
                Ok(None)
            }
        }
    }

    /// Render narration; needs no duration, which is why it can run first
    pub async fn render_voice_over(
        &self,
        layer_id: &str,
        layer: &VoiceOverLayer,
        dir: &Path,
    ) -> Result<PathBuf> {
        let cache = LayerCache::new(dir);
        let output = dir.join(format!("{}.{}", layer_id, self.config.audio_extension));
        let fresh = LayerParams::voice_over(layer);

        if !cache.should_regenerate(layer_id, &fresh).await && exists(&output).await {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(output);
        }

        cache.invalidate(layer_id).await?;

        info!("Synthesizing narration for layer '{}' ({})", layer_id, layer.speaker);
        self.generators
            .speech
            .generate(&SpeechRequest::from_layer(layer_id, layer), &output)
            .await?;
        self.counters.speech_generated.fetch_add(1, Ordering::Relaxed);

        cache.store(layer_id, &fresh).await?;
        Ok(output)
    }

    /// Render a still-to-video layer
    ///
    /// The still is only regenerated when its image inputs changed; a pure
    /// timing change re-encodes the clip from the existing still. A still-only
    /// record is stored before encoding, so a failed encode is retried from the
    /// still rather than from image generation.
    async fn render_video(
        &self,
        layer_id: &str,
        layer: &VideoLayer,
        duration: f64,
        dir: &Path,
    ) -> Result<PathBuf> {
        let cache = LayerCache::new(dir);
        let output = dir.join(format!("{}.{}", layer_id, self.config.video_extension));
        let still = dir.join(format!("{}.{}", layer_id, self.config.image_extension));
        let fresh = LayerParams::video(layer, duration);

        if !cache.should_regenerate(layer_id, &fresh).await && exists(&output).await {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(output);
        }

        let reuse_still =
            cache.image_matches(layer_id, &ImageParams::from(layer)).await && exists(&still).await;

        if reuse_still {
            debug!("Reusing still for layer '{}', only the clip is stale", layer_id);
        } else {
            cache.invalidate(layer_id).await?;
            info!("Generating still for layer '{}' with {}", layer_id, layer.model);
            self.generators
                .image
                .generate(&ImageRequest::from_layer(layer_id, layer), &still)
                .await?;
            self.counters.images_generated.fetch_add(1, Ordering::Relaxed);
        }
        cache.store(layer_id, &LayerParams::still(layer)).await?;

        debug!("Encoding {:.2}s clip for layer '{}'", duration, layer_id);
        self.encoder.image_to_video(&still, &output, duration).await?;
        self.counters.clips_encoded.fetch_add(1, Ordering::Relaxed);

        cache.store(layer_id, &fresh).await?;
        Ok(output)
    }

    pub fn stats(&self) -> RenderStats {
        RenderStats {
            images_generated: self.counters.images_generated.load(Ordering::Relaxed),
            clips_encoded: self.counters.clips_encoded.load(Ordering::Relaxed),
            speech_generated: self.counters.speech_generated.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
        }
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
