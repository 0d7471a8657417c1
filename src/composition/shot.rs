use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::RenderConfig;
use crate::composition::duration::DurationResolver;
use crate::encoder::MediaEncoder;
use crate::error::{ProjectError, Result};
use crate::project::Shot;
use crate::render::LayerRenderer;

/// Composites the layers of one shot into a single clip
///
/// The first video layer is the base picture; every other video layer is
/// drawn on top of it in document order. All audio layers play together.
pub struct ShotCompositor {
    renderer: Arc<LayerRenderer>,
    encoder: Arc<dyn MediaEncoder>,
    resolver: DurationResolver,
    config: RenderConfig,
}

impl ShotCompositor {
    pub fn new(
        renderer: Arc<LayerRenderer>,
        encoder: Arc<dyn MediaEncoder>,
        config: RenderConfig,
    ) -> Self {
        Self {
            renderer,
            encoder,
            resolver: DurationResolver::new(config.default_duration),
            config,
        }
    }

    pub fn output_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("shot.{}", self.config.video_extension))
    }

    /// Render every layer of `shot` into `dir` and composite them
    ///
    /// Writes resolved durations back into the shot's layers.
    pub async fn compose(&self, shot: &mut Shot, dir: &Path) -> Result<PathBuf> {
        if !shot.has_video_layer() {
            return Err(ProjectError::MissingVideoLayer { shot_id: shot.id.clone() }.into());
        }

        let layers = self.resolver.resolve(&mut shot.layers, &self.renderer, dir).await?;

        let mut video = Vec::new();
        let mut audio = Vec::new();
        for layer in &layers {
            let Some(artifact) = self.renderer.render(layer, dir).await? else {
                continue;
            };
            if layer.kind.is_video() {
                video.push(artifact);
            } else {
                audio.push(artifact);
            }
        }

        let (base, overlays) = video
            .split_first()
            .ok_or_else(|| ProjectError::MissingVideoLayer { shot_id: shot.id.clone() })?;
        let output = self.output_path(dir);

        if audio.is_empty() {
            debug!("Shot '{}' has no audio, using base clip as is", shot.id);
            tokio::fs::copy(base, &output).await?;
        } else {
            let mix = dir.join(format!("mix.{}", self.config.audio_extension));
            self.encoder.mix_audio(&audio, &mix).await?;
            self.encoder.mux(base, &mix, &output).await?;
        }

        let staging = dir.join(format!("shot.overlay.{}", self.config.video_extension));
        for overlay in overlays {
            self.encoder.overlay(&output, overlay, &staging).await?;
            tokio::fs::rename(&staging, &output).await?;
        }

        info!(
            "🎞️  Shot '{}' composited from {} video and {} audio layer(s)",
            shot.id,
            video.len(),
            audio.len()
        );
        Ok(output)
    }
}
