use std::fs::File;
use std::path::Path;

use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{AudioError, Result};

/// Measure the playback length of an audio file in seconds
pub fn duration_seconds<P: AsRef<Path>>(path: P) -> Result<f64> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "wav" => wav_duration(path),
        _ => symphonia_duration(path),
    }
}

/// WAV headers carry the frame count, so hound answers without decoding
fn wav_duration(path: &Path) -> Result<f64> {
    let reader = hound::WavReader::open(path)
        .map_err(|_| AudioError::OpenFailed {
            path: path.display().to_string()
        })?;

    let sample_rate = reader.spec().sample_rate;
    if sample_rate == 0 {
        return Err(AudioError::DurationUnknown {
            path: path.display().to_string(),
            reason: "sample rate is zero".to_string(),
        }.into());
    }

    Ok(reader.duration() as f64 / sample_rate as f64)
}

fn symphonia_duration(path: &Path) -> Result<f64> {
    let file = File::open(path)
        .map_err(|_| AudioError::OpenFailed {
            path: path.display().to_string()
        })?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| AudioError::DurationUnknown {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AudioError::DurationUnknown {
            path: path.display().to_string(),
            reason: "no decodable audio track".to_string(),
        })?;

    let track_id = track.id;
    let params = track.codec_params.clone();

    if let (Some(frames), Some(sample_rate)) = (params.n_frames, params.sample_rate) {
        if sample_rate > 0 {
            return Ok(frames as f64 / sample_rate as f64);
        }
    }

    // Header has no frame count: walk the packets and take the last timestamp
    let time_base = params.time_base.ok_or_else(|| AudioError::DurationUnknown {
        path: path.display().to_string(),
        reason: "no frame count and no time base".to_string(),
    })?;

    let mut end_ts = 0u64;
    loop {
        match format.next_packet() {
            Ok(packet) => {
                if packet.track_id() == track_id {
                    end_ts = end_ts.max(packet.ts() + packet.dur());
                }
            }
            Err(SymphoniaError::ResetRequired) => continue,
            Err(SymphoniaError::IoError(_)) => break, // End of stream
            Err(e) => {
                return Err(AudioError::DurationUnknown {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                }.into());
            }
        }
    }

    let time = time_base.calc_time(end_ts);
    Ok(time.seconds as f64 + time.frac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_silence(path: &Path, sample_rate: u32, channels: u16, frames: u32) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..frames * channels as u32 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_wav_duration() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("line.wav");
        write_silence(&path, 24_000, 1, 57_600);

        let duration = duration_seconds(&path).unwrap();
        assert!((duration - 2.4).abs() < 1e-9);
    }

    #[test]
    fn test_stereo_counts_frames_not_samples() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_silence(&path, 44_100, 2, 44_100);

        let duration = duration_seconds(&path).unwrap();
        assert!((duration - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        assert!(duration_seconds(dir.path().join("nope.wav")).is_err());
        assert!(duration_seconds(dir.path().join("nope.mp3")).is_err());
    }
}
