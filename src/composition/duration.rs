use std::path::Path;

use tokio::task;
use tracing::debug;

use crate::audio;
use crate::error::{CompositorError, Result};
use crate::project::{Layer, LayerKind, ResolvedLayer};
use crate::render::LayerRenderer;

/// Decides how long every layer of a shot lasts
///
/// Precedence: the longest authored duration, then the longest narration
/// (synthesized on the spot if needed), then the configured default.
#[derive(Debug, Clone, Copy)]
pub struct DurationResolver {
    default_duration: f64,
}

impl DurationResolver {
    pub fn new(default_duration: f64) -> Self {
        Self { default_duration }
    }

    /// Fill in the duration of every layer that has none
    ///
    /// Authored durations are left as they are. The returned view has one
    /// entry per layer, in the same order.
    pub async fn resolve(
        &self,
        layers: &mut [Layer],
        renderer: &LayerRenderer,
        dir: &Path,
    ) -> Result<Vec<ResolvedLayer>> {
        let effective = self.effective_duration(layers, renderer, dir).await?;

        for layer in layers.iter_mut() {
            if layer.explicit_duration().is_none() {
                layer.duration = Some(effective);
            }
        }

        Ok(layers.iter().filter_map(Layer::resolved).collect())
    }

    pub async fn effective_duration(
        &self,
        layers: &[Layer],
        renderer: &LayerRenderer,
        dir: &Path,
    ) -> Result<f64> {
        let authored = layers
            .iter()
            .filter_map(Layer::explicit_duration)
            .fold(0.0, f64::max);
        if authored > 0.0 {
            debug!("Using authored duration {:.2}s", authored);
            return Ok(authored);
        }

        let mut spoken: f64 = 0.0;
        for layer in layers {
            if let LayerKind::VoiceOver(voice) = &layer.kind {
                let path = renderer.render_voice_over(&layer.id, voice, dir).await?;
                let seconds = task::spawn_blocking(move || audio::duration_seconds(&path))
                    .await
                    .map_err(|e| {
                        CompositorError::generic(format!("measure task panicked: {}", e))
                    })??;
                debug!("Narration '{}' lasts {:.2}s", layer.id, seconds);
                spoken = spoken.max(seconds);
            }
        }
        if spoken > 0.0 {
            return Ok(spoken);
        }

        debug!("No authored or spoken length, using default {:.2}s", self.default_duration);
        Ok(self.default_duration)
    }
}
