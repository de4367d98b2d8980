//! Audio normalization: arbitrary-format sources to 16 kHz mono PCM16 WAV.

use crate::error::{AudioError, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::path::{Path, PathBuf};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Canonical sample rate required by downstream recognizers (16kHz)
pub const SAMPLE_RATE: u32 = 16000;

/// Extensions the normalizer will attempt to decode.
const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "flac", "ogg"];

/// Outcome counters for a directory normalization run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NormalizeSummary {
    pub converted: usize,
    /// Outputs that already existed and were left untouched
    pub skipped: usize,
    pub failed: usize,
}

/// Normalize one audio file to 16 kHz mono PCM16 WAV.
///
/// # Errors
///
/// Returns an [`AudioError`] when the source codec cannot be decoded or
/// the destination cannot be written.
pub fn normalize_file(input: &Path, output: &Path) -> Result<()> {
    let (samples, source_rate) = decode_mono(input)?;
    let samples = resample(samples, source_rate)?;
    write_wav_pcm16(output, &samples)
}

/// Normalize every audio file under `input_dir` into `output_dir`.
///
/// The output directory mirrors the input layout with a `.wav`
/// extension. Files whose normalized output already exists are skipped,
/// so re-runs are idempotent. Per-file failures are logged and counted,
/// never fatal.
pub fn normalize_dir(input_dir: &Path, output_dir: &Path) -> Result<NormalizeSummary> {
    let mut summary = NormalizeSummary::default();

    for input in collect_audio_files(input_dir)? {
        let relative = input
            .strip_prefix(input_dir)
            .unwrap_or(&input)
            .with_extension("wav");
        let output = output_dir.join(relative);

        if output.exists() {
            summary.skipped += 1;
            continue;
        }

        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent).map_err(AudioError::Io)?;
        }

        match normalize_file(&input, &output) {
            Ok(()) => {
                tracing::debug!(input = ?input.display(), output = ?output.display(), "normalized");
                summary.converted += 1;
            }
            Err(err) => {
                tracing::warn!(input = ?input.display(), %err, "failed to normalize");
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

/// Duration in seconds of a WAV file, from its header.
pub fn wav_duration_secs(path: &Path) -> Result<f64> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    Ok(reader.duration() as f64 / spec.sample_rate as f64)
}

/// Recursively collect decodable audio files, sorted for stable order.
fn collect_audio_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];

    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir).map_err(AudioError::Io)? {
            let path = entry.map_err(AudioError::Io)?.path();
            if path.is_dir() {
                stack.push(path);
            } else if extension_of(&path)
                .is_some_and(|ext| AUDIO_EXTENSIONS.contains(&ext.as_str()))
            {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

/// Decode any supported source to mono f32 samples at its native rate.
fn decode_mono(path: &Path) -> Result<(Vec<f32>, u32)> {
    let extension = extension_of(path).unwrap_or_default();

    let (samples, rate, channels) = match extension.as_str() {
        "wav" => decode_wav(path)?,
        "mp3" | "flac" | "ogg" => decode_compressed(path, &extension)?,
        _ => return Err(AudioError::UnsupportedFormat { extension }.into()),
    };

    Ok((downmix(samples, channels), rate))
}

fn decode_wav(path: &Path) -> Result<(Vec<f32>, u32, usize)> {
    let mut reader = WavReader::open(path)?;
    let spec: WavSpec = reader.spec();

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, _) => reader.samples::<f32>().collect::<hound::Result<_>>()?,
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|s| s as f32 / 32768.0))
            .collect::<hound::Result<_>>()?,
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|s| s as f32 / 2147483648.0))
            .collect::<hound::Result<_>>()?,
        (SampleFormat::Int, bits) => return Err(AudioError::UnsupportedBitDepth(bits).into()),
    };

    Ok((samples, spec.sample_rate, spec.channels as usize))
}

/// Decode a compressed format via symphonia: probe with an extension
/// hint, pick the first non-null track, then drain the packet loop into
/// an interleaved f32 buffer.
fn decode_compressed(path: &Path, extension: &str) -> Result<(Vec<f32>, u32, usize)> {
    let file = std::fs::File::open(path).map_err(AudioError::Io)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    hint.with_extension(extension);

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(AudioError::NoAudioTrack)?;

    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.ok_or(AudioError::NoAudioTrack)?;
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .ok_or(AudioError::NoAudioTrack)?;
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs().make(&codec_params, &DecoderOptions::default())?;

    let mut samples = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder.decode(&packet)?;

        if sample_buf.is_none() {
            let spec = *decoded.spec();
            let capacity = decoded.capacity() as u64;
            sample_buf = Some(SampleBuffer::<f32>::new(capacity, spec));
        }

        if let Some(buf) = sample_buf.as_mut() {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }
    }

    Ok((samples, sample_rate, channels))
}

/// Downmix interleaved samples to mono by per-frame channel averaging.
fn downmix(samples: Vec<f32>, channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples;
    }
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Sinc-resample mono samples to [`SAMPLE_RATE`].
fn resample(samples: Vec<f32>, source_rate: u32) -> Result<Vec<f32>> {
    if source_rate == SAMPLE_RATE {
        return Ok(samples);
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    // 100ms input chunks; the final chunk is zero-padded and the output
    // truncated back to the rate-converted length.
    let chunk_size = (source_rate as usize / 10).max(1);
    let mut resampler = SincFixedIn::<f32>::new(
        SAMPLE_RATE as f64 / source_rate as f64,
        2.0,
        params,
        chunk_size,
        1,
    )
    .map_err(|e| AudioError::Resample(e.to_string()))?;

    let expected = (samples.len() as f64 * SAMPLE_RATE as f64 / source_rate as f64).round() as usize;
    let mut out = Vec::with_capacity(expected);
    let mut pos = 0;

    while pos < samples.len() {
        let end = (pos + chunk_size).min(samples.len());
        let mut frame = samples[pos..end].to_vec();
        frame.resize(chunk_size, 0.0);

        let processed = resampler
            .process(&[frame], None)
            .map_err(|e| AudioError::Resample(e.to_string()))?;
        out.extend_from_slice(&processed[0]);
        pos = end;
    }

    out.truncate(expected);
    Ok(out)
}

/// Write mono f32 samples as 16 kHz PCM16 WAV, clamping to [-1, 1].
fn write_wav_pcm16(path: &Path, samples: &[f32]) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        writer.write_sample((clamped * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_wav(
        path: &Path,
        sample_rate: u32,
        channels: u16,
        samples: &[f32],
    ) -> hound::Result<()> {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec)?;
        for &sample in samples {
            writer.write_sample((sample * 32767.0) as i16)?;
        }
        writer.finalize()?;
        Ok(())
    }

    #[test]
    fn passes_through_mono_16khz() {
        let temp_dir = std::env::temp_dir();
        let input = temp_dir.join("hearsay_norm_mono.wav");
        let output = temp_dir.join("hearsay_norm_mono_out.wav");

        create_test_wav(&input, 16000, 1, &[0.1, 0.2, 0.3]).unwrap();
        normalize_file(&input, &output).unwrap();

        let (samples, rate, channels) = decode_wav(&output).unwrap();
        assert_eq!(rate, SAMPLE_RATE);
        assert_eq!(channels, 1);
        assert_eq!(samples.len(), 3);
        assert!((samples[1] - 0.2).abs() < 0.01);

        std::fs::remove_file(input).ok();
        std::fs::remove_file(output).ok();
    }

    #[test]
    fn downmixes_stereo() {
        let temp_dir = std::env::temp_dir();
        let input = temp_dir.join("hearsay_norm_stereo.wav");
        let output = temp_dir.join("hearsay_norm_stereo_out.wav");

        create_test_wav(&input, 16000, 2, &[0.2, 0.4, 0.6, 0.8]).unwrap();
        normalize_file(&input, &output).unwrap();

        let (samples, _, channels) = decode_wav(&output).unwrap();
        assert_eq!(channels, 1);
        assert_eq!(samples.len(), 2);
        assert!((samples[0] - 0.3).abs() < 0.01);
        assert!((samples[1] - 0.7).abs() < 0.01);

        std::fs::remove_file(input).ok();
        std::fs::remove_file(output).ok();
    }

    #[test]
    fn resamples_to_target_rate() {
        let temp_dir = std::env::temp_dir();
        let input = temp_dir.join("hearsay_norm_8k.wav");
        let output = temp_dir.join("hearsay_norm_8k_out.wav");

        // 0.5s of a 200Hz tone at 8kHz
        let tone: Vec<f32> = (0..4000)
            .map(|i| (i as f32 * 200.0 * 2.0 * std::f32::consts::PI / 8000.0).sin() * 0.5)
            .collect();
        create_test_wav(&input, 8000, 1, &tone).unwrap();
        normalize_file(&input, &output).unwrap();

        let (samples, rate, _) = decode_wav(&output).unwrap();
        assert_eq!(rate, SAMPLE_RATE);
        assert!(
            samples.len() >= 7800 && samples.len() <= 8000,
            "unexpected resampled length: {}",
            samples.len()
        );

        std::fs::remove_file(input).ok();
        std::fs::remove_file(output).ok();
    }

    #[test]
    fn rejects_unknown_extension() {
        let temp_dir = std::env::temp_dir();
        let input = temp_dir.join("hearsay_norm_bad.aac");
        let output = temp_dir.join("hearsay_norm_bad_out.wav");
        std::fs::write(&input, b"not audio").unwrap();

        let err = normalize_file(&input, &output).unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Audio(AudioError::UnsupportedFormat { .. })
        ));

        std::fs::remove_file(input).ok();
    }

    #[test]
    fn directory_run_is_idempotent() {
        let root = std::env::temp_dir().join("hearsay_norm_dir");
        let input_dir = root.join("in");
        let output_dir = root.join("out");
        std::fs::remove_dir_all(&root).ok();
        std::fs::create_dir_all(&input_dir).unwrap();

        create_test_wav(&input_dir.join("a.wav"), 16000, 1, &[0.1, 0.2]).unwrap();
        create_test_wav(&input_dir.join("b.wav"), 16000, 2, &[0.1, 0.2]).unwrap();

        let first = normalize_dir(&input_dir, &output_dir).unwrap();
        assert_eq!(first.converted, 2);
        assert_eq!(first.skipped, 0);

        let second = normalize_dir(&input_dir, &output_dir).unwrap();
        assert_eq!(second.converted, 0);
        assert_eq!(second.skipped, 2);

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn measures_wav_duration() {
        let temp_dir = std::env::temp_dir();
        let path = temp_dir.join("hearsay_norm_dur.wav");

        create_test_wav(&path, 16000, 1, &vec![0.0; 16000]).unwrap();
        let duration = wav_duration_secs(&path).unwrap();
        assert!((duration - 1.0).abs() < 1e-6);

        std::fs::remove_file(path).ok();
    }
}
