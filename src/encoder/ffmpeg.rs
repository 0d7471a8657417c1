use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::EncoderConfig;
use crate::encoder::MediaEncoder;
use crate::error::{EncoderError, Result};

/// Longest stderr excerpt kept in an error
const STDERR_TAIL: usize = 2000;

/// Media encoder backed by the `ffmpeg` and `ffprobe` command-line tools
///
/// Every invocation is an explicit argument list, never a shell pipeline.
pub struct FfmpegEncoder {
    config: EncoderConfig,
}

impl FfmpegEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    /// Check that ffmpeg can be started at all
    pub async fn check_available(&self) -> bool {
        Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    /// Ask ffprobe whether the file carries an audio stream
    pub async fn has_audio_stream(&self, path: &Path) -> Result<bool> {
        let args = os_args(&["-v", "error", "-show_entries", "stream=codec_type", "-of", "csv=p=0"])
            .into_iter()
            .chain(std::iter::once(path.as_os_str().to_owned()))
            .collect::<Vec<_>>();

        let stdout = self.run(&self.config.ffprobe_path, &args).await?;
        let listing = String::from_utf8(stdout).map_err(|_| EncoderError::ProbeFailed {
            path: path.display().to_string(),
            details: "stream listing is not UTF-8".to_string(),
        })?;

        Ok(listing.lines().any(|line| line.trim() == "audio"))
    }

    async fn run(&self, program: &str, args: &[OsString]) -> Result<Vec<u8>> {
        debug!("Running {} {:?}", program, args);

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EncoderError::SpawnFailed {
                tool: program.to_string(),
                reason: e.to_string(),
            })?;

        // Dropping the wait future on timeout drops the child, which kills it
        let waited = match self.config.timeout() {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| EncoderError::TimedOut {
                    tool: program.to_string(),
                    seconds: limit.as_secs(),
                })?,
            None => child.wait_with_output().await,
        };

        let output = waited.map_err(|e| EncoderError::SpawnFailed {
            tool: program.to_string(),
            reason: e.to_string(),
        })?;

        if !output.status.success() {
            return Err(EncoderError::CommandFailed {
                tool: program.to_string(),
                status: output.status.to_string(),
                stderr: stderr_tail(&output.stderr),
            }
            .into());
        }

        Ok(output.stdout)
    }

    async fn ffmpeg(&self, args: Vec<OsString>) -> Result<()> {
        let mut full = os_args(&["-y", "-hide_banner", "-loglevel", "error"]);
        full.extend(args);
        self.run(&self.config.ffmpeg_path, &full).await?;
        Ok(())
    }

    fn image_to_video_args(&self, image: &Path, output: &Path, duration: f64) -> Vec<OsString> {
        let mut args = os_args(&["-loop", "1", "-i"]);
        args.push(image.as_os_str().to_owned());
        args.extend(os_args(&[
            "-t",
            &format!("{duration}"),
            // yuv420p needs even dimensions
            "-vf",
            "scale=trunc(iw/2)*2:trunc(ih/2)*2",
            "-c:v",
            &self.config.video_codec,
            "-crf",
            &self.config.crf.to_string(),
            "-pix_fmt",
            &self.config.pixel_format,
        ]));
        args.push(output.as_os_str().to_owned());
        args
    }

    fn mix_args(&self, inputs: &[PathBuf], output: &Path) -> Vec<OsString> {
        let mut args = Vec::new();
        for input in inputs {
            args.push(OsString::from("-i"));
            args.push(input.as_os_str().to_owned());
        }
        args.extend(os_args(&[
            "-filter_complex",
            // Every input keeps its own level; amix divides by the input count otherwise
            &format!(
                "amix=inputs={}:duration=longest:dropout_transition=0:normalize=0",
                inputs.len()
            ),
        ]));
        args.push(output.as_os_str().to_owned());
        args
    }

    fn mux_args(&self, video: &Path, audio: &Path, output: &Path) -> Vec<OsString> {
        let mut args = os_args(&["-i"]);
        args.push(video.as_os_str().to_owned());
        args.push(OsString::from("-i"));
        args.push(audio.as_os_str().to_owned());
        args.extend(os_args(&[
            "-map",
            "0:v:0",
            "-map",
            "1:a:0",
            "-c:v",
            "copy",
            "-c:a",
            &self.config.audio_codec,
        ]));
        args.push(output.as_os_str().to_owned());
        args
    }

    fn overlay_args(&self, base: &Path, overlay: &Path, output: &Path) -> Vec<OsString> {
        let mut args = os_args(&["-i"]);
        args.push(base.as_os_str().to_owned());
        args.push(OsString::from("-i"));
        args.push(overlay.as_os_str().to_owned());
        args.extend(os_args(&[
            "-filter_complex",
            "[0:v][1:v]overlay=0:0",
            "-c:v",
            &self.config.video_codec,
            "-pix_fmt",
            &self.config.pixel_format,
            "-c:a",
            "copy",
        ]));
        args.push(output.as_os_str().to_owned());
        args
    }

    fn silence_args(&self, clip: &Path, output: &Path) -> Vec<OsString> {
        let mut args = os_args(&[
            "-f",
            "lavfi",
            "-i",
            &format!(
                "anullsrc=channel_layout={}:sample_rate={}",
                self.config.silence_channel_layout, self.config.silence_sample_rate
            ),
            "-i",
        ]);
        args.push(clip.as_os_str().to_owned());
        args.extend(os_args(&[
            "-shortest",
            "-map",
            "1:v:0",
            "-map",
            "0:a:0",
            "-c:v",
            "copy",
            "-c:a",
            &self.config.audio_codec,
            "-b:a",
            &self.config.audio_bitrate,
        ]));
        args.push(output.as_os_str().to_owned());
        args
    }

    fn concat_args(&self, list: &Path, output: &Path) -> Vec<OsString> {
        let mut args = os_args(&["-f", "concat", "-safe", "0", "-i"]);
        args.push(list.as_os_str().to_owned());
        args.extend(os_args(&[
            "-c:v",
            &self.config.video_codec,
            "-crf",
            &self.config.crf.to_string(),
            "-pix_fmt",
            &self.config.pixel_format,
            "-c:a",
            &self.config.audio_codec,
            "-b:a",
            &self.config.audio_bitrate,
        ]));
        args.push(output.as_os_str().to_owned());
        args
    }

    /// Give a clip a silent track unless it already has audio
    async fn with_audio_track(&self, clip: &Path) -> Result<PathBuf> {
        if self.has_audio_stream(clip).await? {
            return Ok(clip.to_path_buf());
        }

        let silent = silent_variant(clip);
        debug!("Adding silent audio track to {:?}", clip);
        self.ffmpeg(self.silence_args(clip, &silent)).await?;
        Ok(silent)
    }
}

#[async_trait]
impl MediaEncoder for FfmpegEncoder {
    async fn image_to_video(&self, image: &Path, output: &Path, duration: f64) -> Result<()> {
        self.ffmpeg(self.image_to_video_args(image, output, duration)).await
    }

    async fn mix_audio(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        match inputs {
            [] => Err(EncoderError::NoInputs { operation: "mix".to_string() }.into()),
            [single] => {
                tokio::fs::copy(single, output).await?;
                Ok(())
            }
            _ => self.ffmpeg(self.mix_args(inputs, output)).await,
        }
    }

    async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<()> {
        self.ffmpeg(self.mux_args(video, audio, output)).await
    }

    async fn overlay(&self, base: &Path, overlay: &Path, output: &Path) -> Result<()> {
        self.ffmpeg(self.overlay_args(base, overlay, output)).await
    }

    async fn concatenate(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        if inputs.is_empty() {
            return Err(EncoderError::NoInputs { operation: "concatenate".to_string() }.into());
        }

        let mut prepared = Vec::with_capacity(inputs.len());
        for input in inputs {
            let clip = self.with_audio_track(input).await?;
            prepared.push(tokio::fs::canonicalize(&clip).await?);
        }

        let list_path = output.with_extension("concat.txt");
        tokio::fs::write(&list_path, concat_list(&prepared)).await?;

        let result = self.ffmpeg(self.concat_args(&list_path, output)).await;

        if let Err(e) = tokio::fs::remove_file(&list_path).await {
            warn!("Failed to remove concat list {:?}: {}", list_path, e);
        }

        result
    }
}

fn os_args(args: &[&str]) -> Vec<OsString> {
    args.iter().map(OsString::from).collect()
}

/// Body of an ffmpeg concat-demuxer list, one `file` line per clip
fn concat_list(clips: &[PathBuf]) -> String {
    clips
        .iter()
        .map(|clip| {
            let escaped = clip.display().to_string().replace('\'', "'\\''");
            format!("file '{}'\n", escaped)
        })
        .collect()
}

/// `dir/shot.mp4` becomes `dir/shot.silent.mp4`
fn silent_variant(clip: &Path) -> PathBuf {
    let stem = clip.file_stem().and_then(|s| s.to_str()).unwrap_or("clip");
    let extension = clip.extension().and_then(|e| e.to_str()).unwrap_or("mp4");
    clip.with_file_name(format!("{}.silent.{}", stem, extension))
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let start = text.len().saturating_sub(STDERR_TAIL);
    // Stay on a char boundary
    let start = (start..=text.len())
        .find(|i| text.is_char_boundary(*i))
        .unwrap_or(text.len());
    text[start..].to_string()
}
