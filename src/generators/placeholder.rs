use std::path::Path;

use async_trait::async_trait;
use image::{ImageBuffer, Rgb};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tokio::task;

use crate::error::{CompositorError, GeneratorError, Result};
use crate::generators::{ImageGenerator, ImageRequest, SpeechGenerator, SpeechRequest};

/// Narration pace of the placeholder voice
const SECONDS_PER_WORD: f64 = 0.4;
const MIN_SPEECH_SECONDS: f64 = 0.5;
const SPEECH_SAMPLE_RATE: u32 = 24_000;

/// Writes a solid-colour still whose hue is fixed by the layer seed
#[derive(Debug, Default)]
pub struct PlaceholderImageGenerator;

impl PlaceholderImageGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Same seed, same colour
    pub fn color_for_seed(seed: i64) -> [u8; 3] {
        let mut rng = SmallRng::seed_from_u64(seed as u64);
        let hue = rng.gen_range(0.0..360.0);
        hsv_to_rgb(hue, 0.6, 0.8)
    }
}

#[async_trait]
impl ImageGenerator for PlaceholderImageGenerator {
    fn name(&self) -> &str {
        "placeholder"
    }

    async fn generate(&self, request: &ImageRequest, output: &Path) -> Result<()> {
        let color = Self::color_for_seed(request.seed);
        let (width, height) = (request.width.max(2), request.height.max(2));
        let output = output.to_path_buf();
        let layer_id = request.layer_id.clone();

        task::spawn_blocking(move || {
            let still = ImageBuffer::from_pixel(width, height, Rgb(color));
            still.save(&output).map_err(|e| GeneratorError::Failed {
                generator: "placeholder image".to_string(),
                layer_id,
                reason: e.to_string(),
            })
        })
        .await
        .map_err(|e| CompositorError::generic(format!("image task panicked: {}", e)))??;

        Ok(())
    }
}

/// Writes silence roughly as long as the line would take to read aloud
#[derive(Debug, Default)]
pub struct PlaceholderSpeechGenerator;

impl PlaceholderSpeechGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn seconds_for(text: &str) -> f64 {
        let words = text.split_whitespace().count() as f64;
        (words * SECONDS_PER_WORD).max(MIN_SPEECH_SECONDS)
    }
}

#[async_trait]
impl SpeechGenerator for PlaceholderSpeechGenerator {
    fn name(&self) -> &str {
        "placeholder"
    }

    async fn generate(&self, request: &SpeechRequest, output: &Path) -> Result<()> {
        let frames = (Self::seconds_for(&request.text) * SPEECH_SAMPLE_RATE as f64).round() as u32;
        let output = output.to_path_buf();
        let layer_id = request.layer_id.clone();

        task::spawn_blocking(move || write_silence(&output, frames))
            .await
            .map_err(|e| CompositorError::generic(format!("speech task panicked: {}", e)))?
            .map_err(|e| GeneratorError::Failed {
                generator: "placeholder speech".to_string(),
                layer_id,
                reason: e.to_string(),
            })?;

        Ok(())
    }
}

fn write_silence(path: &Path, frames: u32) -> std::result::Result<(), hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SPEECH_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    for _ in 0..frames {
        writer.write_sample(0i16)?;
    }
    writer.finalize()
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [u8; 3] {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = if h < 60.0 {
        (c, x, 0.0)
    } else if h < 120.0 {
        (x, c, 0.0)
    } else if h < 180.0 {
        (0.0, c, x)
    } else if h < 240.0 {
        (0.0, x, c)
    } else if h < 300.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };

    [
        ((r + m) * 255.0) as u8,
        ((g + m) * 255.0) as u8,
        ((b + m) * 255.0) as u8,
    ]
}
