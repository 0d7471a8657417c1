//! In-process stand-ins for the encoder and generators

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::config::RenderConfig;
use crate::encoder::MediaEncoder;
use crate::error::{EncoderError, Result};
use crate::generators::{GeneratorSet, ImageGenerator, ImageRequest, SpeechGenerator, SpeechRequest};
use crate::project::{Layer, LayerKind, MusicLayer, VideoLayer, VoiceOverLayer};
use crate::render::LayerRenderer;

/// Sample rate of fake narration; keeps measured lengths exact to the millisecond
const FAKE_SPEECH_RATE: u32 = 1000;

#[derive(Debug, Clone, PartialEq)]
pub enum EncoderCall {
    ImageToVideo { image: PathBuf, output: PathBuf, duration: f64 },
    Mix { inputs: Vec<PathBuf>, output: PathBuf },
    Mux { video: PathBuf, audio: PathBuf, output: PathBuf },
    Overlay { base: PathBuf, overlay: PathBuf, output: PathBuf },
    Concat { inputs: Vec<PathBuf>, output: PathBuf },
}

/// Records every call and writes small text files describing what it did
///
/// Concatenation writes the input bytes back to back, so a one-clip concat
/// reproduces its input exactly.
#[derive(Debug, Default)]
pub struct FakeEncoder {
    calls: Mutex<Vec<EncoderCall>>,
    fail_on: Option<&'static str>,
}

impl FakeEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call of one operation, e.g. `"concatenate"`
    pub fn failing_on(operation: &'static str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_on: Some(operation),
        }
    }

    pub fn calls(&self) -> Vec<EncoderCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn image_to_video_durations(&self) -> Vec<f64> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                EncoderCall::ImageToVideo { duration, .. } => Some(duration),
                _ => None,
            })
            .collect()
    }

    pub fn concat_calls(&self) -> Vec<(Vec<PathBuf>, PathBuf)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                EncoderCall::Concat { inputs, output } => Some((inputs, output)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, operation: &'static str, call: EncoderCall) -> Result<()> {
        if self.fail_on == Some(operation) {
            return Err(EncoderError::CommandFailed {
                tool: "fake".to_string(),
                status: "1".to_string(),
                stderr: format!("{} refused", operation),
            }
            .into());
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

async fn text_of(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[async_trait]
impl MediaEncoder for FakeEncoder {
    async fn image_to_video(&self, image: &Path, output: &Path, duration: f64) -> Result<()> {
        self.record(
            "image_to_video",
            EncoderCall::ImageToVideo {
                image: image.to_path_buf(),
                output: output.to_path_buf(),
                duration,
            },
        )?;
        let still = text_of(image).await?;
        tokio::fs::write(output, format!("clip({};{})", still, duration)).await?;
        Ok(())
    }

    async fn mix_audio(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        self.record(
            "mix_audio",
            EncoderCall::Mix {
                inputs: inputs.to_vec(),
                output: output.to_path_buf(),
            },
        )?;
        let names: Vec<String> = inputs.iter().map(|p| p.display().to_string()).collect();
        tokio::fs::write(output, format!("mix({})", names.join("+"))).await?;
        Ok(())
    }

    async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<()> {
        self.record(
            "mux",
            EncoderCall::Mux {
                video: video.to_path_buf(),
                audio: audio.to_path_buf(),
                output: output.to_path_buf(),
            },
        )?;
        let content = format!("mux({}|{})", text_of(video).await?, text_of(audio).await?);
        tokio::fs::write(output, content).await?;
        Ok(())
    }

    async fn overlay(&self, base: &Path, overlay: &Path, output: &Path) -> Result<()> {
        self.record(
            "overlay",
            EncoderCall::Overlay {
                base: base.to_path_buf(),
                overlay: overlay.to_path_buf(),
                output: output.to_path_buf(),
            },
        )?;
        let content = format!("overlay({}|{})", text_of(base).await?, text_of(overlay).await?);
        tokio::fs::write(output, content).await?;
        Ok(())
    }

    async fn concatenate(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        self.record(
            "concatenate",
            EncoderCall::Concat {
                inputs: inputs.to_vec(),
                output: output.to_path_buf(),
            },
        )?;
        let mut joined = Vec::new();
        for input in inputs {
            joined.extend(tokio::fs::read(input).await?);
        }
        tokio::fs::write(output, joined).await?;
        Ok(())
    }
}

/// Writes `still(<prompt>#<seed>)` as the "image"
#[derive(Debug, Default)]
pub struct FakeImageGenerator {
    calls: AtomicUsize,
}

#[async_trait]
impl ImageGenerator for FakeImageGenerator {
    fn name(&self) -> &str {
        "fake"
    }

    async fn generate(&self, request: &ImageRequest, output: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::fs::write(output, format!("still({}#{})", request.prompt, request.seed)).await?;
        Ok(())
    }
}

/// Writes a real WAV of a fixed length so duration measurement works
#[derive(Debug)]
pub struct FakeSpeechGenerator {
    calls: AtomicUsize,
    seconds: f64,
}

#[async_trait]
impl SpeechGenerator for FakeSpeechGenerator {
    fn name(&self) -> &str {
        "fake"
    }

    async fn generate(&self, _request: &SpeechRequest, output: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        write_wav(output, self.seconds);
        Ok(())
    }
}

pub fn write_wav(path: &Path, seconds: f64) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: FAKE_SPEECH_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for _ in 0..(seconds * FAKE_SPEECH_RATE as f64).round() as u32 {
        writer.write_sample(0i16).unwrap();
    }
    writer.finalize().unwrap();
}

/// Both fake generators plus their call counters
pub struct FakeGenerators {
    image: Arc<FakeImageGenerator>,
    speech: Arc<FakeSpeechGenerator>,
}

impl FakeGenerators {
    /// Every synthesized line lasts `speech_seconds`
    pub fn new(speech_seconds: f64) -> Self {
        Self {
            image: Arc::new(FakeImageGenerator::default()),
            speech: Arc::new(FakeSpeechGenerator {
                calls: AtomicUsize::new(0),
                seconds: speech_seconds,
            }),
        }
    }

    pub fn set(&self) -> GeneratorSet {
        GeneratorSet::new(self.image.clone(), self.speech.clone())
    }

    pub fn renderer(&self, encoder: Arc<FakeEncoder>) -> LayerRenderer {
        LayerRenderer::new(encoder, self.set(), RenderConfig::default())
    }

    pub fn images(&self) -> usize {
        self.image.calls.load(Ordering::SeqCst)
    }

    pub fn speech(&self) -> usize {
        self.speech.calls.load(Ordering::SeqCst)
    }
}

pub fn castle() -> VideoLayer {
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

pub fn narration(line: &str) -> VoiceOverLayer {
    VoiceOverLayer {
        prompt: line.to_string(),
        speaker: "v1".to_string(),
        speaker_text_temp: 0.7,
        speaker_waveform_temp: 0.7,
    }
}

pub fn video_layer(id: &str) -> Layer {
    Layer::new(id, LayerKind::Video(castle()))
}

pub fn voice_layer(id: &str, line: &str) -> Layer {
    Layer::new(id, LayerKind::VoiceOver(narration(line)))
}

pub fn music_layer(id: &str) -> Layer {
    Layer::new(
        id,
        LayerKind::Music(MusicLayer {
            prompt: "calm strings".to_string(),
        }),
    )
}
