//! # Generator Boundary
//!
//! Image diffusion and speech synthesis live outside this crate. The render
//! pipeline only needs "write a still for these parameters" and "write a
//! waveform for this line", expressed by [`ImageGenerator`] and
//! [`SpeechGenerator`].
//!
//! Two backends ship with the crate:
//!
//! - **command**: runs an external program with a templated argument list
//! - **placeholder**: writes a solid-colour still or a silent waveform, for
//!   previews and for running the pipeline without any model installed
//!
//! Music synthesis has no backend; music layers render to nothing.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::{GeneratorBackend, GeneratorsConfig};
use crate::error::Result;
use crate::project::{VideoLayer, VoiceOverLayer};

pub mod command;
pub mod placeholder;

pub use command::{CommandImageGenerator, CommandSpeechGenerator};
pub use placeholder::{PlaceholderImageGenerator, PlaceholderSpeechGenerator};

/// Parameters for one still image
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub layer_id: String,
    /// Scene prompt with the positive style prompt appended
    pub prompt: String,
    pub negative_prompt: String,
    pub model: String,
    pub seed: i64,
    pub width: u32,
    pub height: u32,
}

impl ImageRequest {
    pub fn from_layer(layer_id: &str, layer: &VideoLayer) -> Self {
        let prompt = if layer.positive_prompt.is_empty() {
            layer.prompt.clone()
        } else {
            format!("{}, {}", layer.prompt, layer.positive_prompt)
        };

        Self {
            layer_id: layer_id.to_string(),
            prompt,
            negative_prompt: layer.negative_prompt.clone(),
            model: layer.model.clone(),
            seed: layer.seed,
            width: layer.width,
            height: layer.height,
        }
    }
}

/// Parameters for one spoken line
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    pub layer_id: String,
    pub text: String,
    pub speaker: String,
    pub text_temp: f64,
    pub waveform_temp: f64,
}

impl SpeechRequest {
    pub fn from_layer(layer_id: &str, layer: &VoiceOverLayer) -> Self {
        Self {
            layer_id: layer_id.to_string(),
            text: layer.prompt.clone(),
            speaker: layer.speaker.clone(),
            text_temp: layer.speaker_text_temp,
            waveform_temp: layer.speaker_waveform_temp,
        }
    }
}

/// Produces a still image file for a video layer
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    fn name(&self) -> &str;

    /// Write the image to `output`, replacing any existing file
    async fn generate(&self, request: &ImageRequest, output: &Path) -> Result<()>;
}

/// Produces a waveform file for a voice-over layer
#[async_trait]
pub trait SpeechGenerator: Send + Sync {
    fn name(&self) -> &str;

    /// Write the waveform to `output`, replacing any existing file
    async fn generate(&self, request: &SpeechRequest, output: &Path) -> Result<()>;
}

/// The generators one render pass uses
#[derive(Clone)]
pub struct GeneratorSet {
    pub image: Arc<dyn ImageGenerator>,
    pub speech: Arc<dyn SpeechGenerator>,
}

impl GeneratorSet {
    pub fn new(image: Arc<dyn ImageGenerator>, speech: Arc<dyn SpeechGenerator>) -> Self {
        Self { image, speech }
    }

    /// Instantiate the backends selected in the configuration
    pub fn from_config(config: &GeneratorsConfig) -> Self {
        debug!(
            "Generator backends: image={}, speech={}",
            config.image.name(),
            config.speech.name()
        );

        let timeout = config.timeout();
        let image: Arc<dyn ImageGenerator> = match &config.image {
            GeneratorBackend::Placeholder => Arc::new(PlaceholderImageGenerator::new()),
            GeneratorBackend::Command { program, args } => {
                Arc::new(CommandImageGenerator::new(program.clone(), args.clone(), timeout))
            }
        };

        let speech: Arc<dyn SpeechGenerator> = match &config.speech {
            GeneratorBackend::Placeholder => Arc::new(PlaceholderSpeechGenerator::new()),
            GeneratorBackend::Command { program, args } => {
                Arc::new(CommandSpeechGenerator::new(program.clone(), args.clone(), timeout))
            }
        };

        Self { image, speech }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_request_combines_prompts() {
        let layer = VideoLayer {
            prompt: "a castle".to_string(),
            positive_prompt: "golden hour".to_string(),
            negative_prompt: "blurry".to_string(),
            model: "sd-base".to_string(),
            seed: 42,
            width: 768,
            height: 432,
        };

        let request = ImageRequest::from_layer("v1", &layer);
        assert_eq!(request.prompt, "a castle, golden hour");
        assert_eq!(request.negative_prompt, "blurry");
        assert_eq!(request.seed, 42);

        let bare = VideoLayer { positive_prompt: String::new(), ..layer };
        assert_eq!(ImageRequest::from_layer("v1", &bare).prompt, "a castle");
    }

    #[test]
    fn test_backends_from_config() {
        let config = GeneratorsConfig {
            image: GeneratorBackend::Command {
                program: "sd-cli".to_string(),
                args: vec![],
            },
            speech: GeneratorBackend::Placeholder,
            timeout_secs: Some(60),
        };

        let set = GeneratorSet::from_config(&config);
        assert_eq!(set.image.name(), "command");
        assert_eq!(set.speech.name(), "placeholder");
    }
}
