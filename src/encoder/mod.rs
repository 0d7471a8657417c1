//! # Media Encoder Gateway
//!
//! All pixel and waveform work is delegated to an external encoding tool.
//! The [`MediaEncoder`] trait is the seam the render pipeline talks to;
//! [`FfmpegEncoder`] drives the real `ffmpeg`/`ffprobe` binaries.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::Result;

pub mod ffmpeg;

pub use ffmpeg::FfmpegEncoder;

/// Primitive media operations needed to composite and join clips
///
/// Every operation either writes `output` completely or returns an error.
#[async_trait]
pub trait MediaEncoder: Send + Sync {
    /// Turn a still image into a video of exactly `duration` seconds
    async fn image_to_video(&self, image: &Path, output: &Path, duration: f64) -> Result<()>;

    /// Play all inputs at once and mix them into one audio track
    async fn mix_audio(&self, inputs: &[PathBuf], output: &Path) -> Result<()>;

    /// Put an audio track onto a video
    async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<()>;

    /// Draw `overlay` on top of `base`, keeping the base audio
    async fn overlay(&self, base: &Path, overlay: &Path, output: &Path) -> Result<()>;

    /// Join clips back to back in the given order
    ///
    /// Inputs without an audio track get a silent one first so that every
    /// input has the same stream layout.
    async fn concatenate(&self, inputs: &[PathBuf], output: &Path) -> Result<()>;
}
