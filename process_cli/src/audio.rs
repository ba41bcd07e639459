use std::path::Path;

use anyhow::{anyhow, Context};
use rubato::{FftFixedIn, Resampler};
use svs_process::{AudioLoader, BoxError};
use symphonia::core::{
    audio::{AudioBuffer, Signal},
    codecs::DecoderOptions,
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};
use tracing::{debug, instrument, trace, warn};

const RESAMPLE_CHUNK: usize = 1024;

/// Decodes anything symphonia can probe, then downmixes, resamples and
/// peak-normalizes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaLoader;

impl AudioLoader for SymphoniaLoader {
    fn load(&self, path: &Path, sample_rate: u32) -> Result<Vec<f32>, BoxError> {
        let (channels, source_rate) = decode(path)?;
        let mono = downmix(&channels);
        let mut samples = resample(&mono, source_rate, sample_rate)?;
        peak_normalize(&mut samples);
        Ok(samples)
    }
}

/// All channels of the default track, plus its sample rate.
#[instrument(level = "trace")]
pub fn decode(path: &Path) -> anyhow::Result<(Vec<Vec<f32>>, u32)> {
    debug!("opening file");
    let file = std::fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let stream = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }
    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .with_context(|| format!("unrecognized audio format in {}", path.display()))?;
    let mut format = probed.format;

    let tracks = format.tracks();
    if tracks.len() != 1 {
        warn!(tracks = tracks.len(), "file has multiple tracks, using only default");
    }
    let track = format
        .default_track()
        .ok_or_else(|| anyhow!("{} has no audio track", path.display()))?;
    let track_id = track.id;
    let params = track.codec_params.clone();
    let sample_rate = params
        .sample_rate
        .ok_or_else(|| anyhow!("{} does not declare a sample rate", path.display()))?;
    let mut decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .context("unsupported codec")?;
    debug!(?params, "read codec params");

    let mut channels: Vec<Vec<f32>> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e).context("failed to read packet"),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(reason)) => {
                warn!(reason, "skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(e).context("failed to decode packet"),
        };
        // conversion requires the destination to hold the packet's full capacity
        let mut converted: AudioBuffer<f32> =
            AudioBuffer::new(decoded.capacity() as u64, *decoded.spec());
        decoded.convert(&mut converted);
        let planes = converted.planes();
        let planes = planes.planes();
        if channels.len() != planes.len() {
            trace!("resizing channels due to size mismatch");
            channels.resize_with(planes.len(), Vec::new);
        }
        channels
            .iter_mut()
            .zip(planes)
            .for_each(|(channel, plane)| channel.extend_from_slice(plane));
    }

    if channels.is_empty() {
        return Err(anyhow!("{} contains no audio", path.display()));
    }
    Ok((channels, sample_rate))
}

/// Average of all channels.
pub fn downmix(channels: &[Vec<f32>]) -> Vec<f32> {
    let len = channels.iter().map(Vec::len).min().unwrap_or(0);
    let scale = 1.0 / channels.len().max(1) as f32;
    (0..len)
        .map(|i| channels.iter().map(|c| c[i]).sum::<f32>() * scale)
        .collect()
}

/// Resample to `to` Hz. The output is delay-compensated and exactly
/// `round(len * to / from)` samples long.
pub fn resample(samples: &[f32], from: u32, to: u32) -> anyhow::Result<Vec<f32>> {
    if from == to || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    let expected = (samples.len() as f64 * to as f64 / from as f64).round() as usize;

    let mut resampler = FftFixedIn::<f32>::new(from as usize, to as usize, RESAMPLE_CHUNK, 2, 1)
        .context("failed to build resampler")?;
    let delay = resampler.output_delay();
    let mut output = Vec::with_capacity(expected + delay);

    let mut position = 0;
    while samples.len() - position >= resampler.input_frames_next() {
        let needed = resampler.input_frames_next();
        let input: &[&[f32]] = &[&samples[position..position + needed]];
        let chunk = resampler.process(input, None)?;
        output.extend_from_slice(&chunk[0]);
        position += needed;
    }
    if position < samples.len() {
        let input: &[&[f32]] = &[&samples[position..]];
        let chunk = resampler.process_partial(Some(input), None)?;
        output.extend_from_slice(&chunk[0]);
    }
    while output.len() < expected + delay {
        let chunk = resampler.process_partial(None::<&[&[f32]]>, None)?;
        if chunk[0].is_empty() {
            break;
        }
        output.extend_from_slice(&chunk[0]);
    }

    output.drain(..delay.min(output.len()));
    output.resize(expected, 0.0);
    Ok(output)
}

/// Scale so the loudest sample has magnitude 1. Silence is left alone.
pub fn peak_normalize(samples: &mut [f32]) {
    let peak = samples.iter().fold(0.0f32, |peak, s| peak.max(s.abs()));
    if peak > 0.0 {
        samples.iter_mut().for_each(|s| *s /= peak);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    use hound::{SampleFormat, WavSpec, WavWriter};

    /// 16-bit PCM WAV, samples interleaved.
    fn wav_bytes(channels: u16, sample_rate: u32, samples: &[i16]) -> Vec<u8> {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
        for &sample in samples {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
        cursor.into_inner()
    }

    #[test]
    fn stereo_wav_is_downmixed_and_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("01.wav");
        let frames: Vec<i16> = (0..800).flat_map(|_| [4096i16, 12288]).collect();
        std::fs::write(&path, wav_bytes(2, 8000, &frames)).unwrap();

        let (channels, rate) = decode(&path).unwrap();
        assert_eq!(rate, 8000);
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].len(), 800);

        let samples = SymphoniaLoader.load(&path, 8000).unwrap();
        assert_eq!(samples.len(), 800);
        assert!(samples.iter().all(|s| (s - 1.0).abs() < 1e-6));
    }

    #[test]
    fn short_final_packet_is_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("02.wav");
        let samples: Vec<i16> = (0..4097).map(|i| (i % 100) as i16 * 100).collect();
        std::fs::write(&path, wav_bytes(1, 16_000, &samples)).unwrap();

        let (channels, rate) = decode(&path).unwrap();
        assert_eq!(rate, 16_000);
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].len(), 4097);
        assert!((channels[0][99] - 9900.0 / 32768.0).abs() < 1e-6);
    }

    #[test]
    fn resampled_length_follows_the_rate_ratio() {
        let tone: Vec<f32> = (0..4800)
            .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / 48_000.0).sin())
            .collect();
        let halved = resample(&tone, 48_000, 24_000).unwrap();
        assert_eq!(halved.len(), 2400);

        let odd = resample(&tone[..1001], 44_100, 24_000).unwrap();
        assert_eq!(odd.len(), (1001.0f64 * 24_000.0 / 44_100.0).round() as usize);
    }

    #[test]
    fn silence_stays_silent() {
        let mut samples = vec![0.0; 16];
        peak_normalize(&mut samples);
        assert!(samples.iter().all(|&s| s == 0.0));

        let mut samples = vec![0.25, -0.5];
        peak_normalize(&mut samples);
        assert_eq!(samples, vec![0.5, -1.0]);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(SymphoniaLoader.load(Path::new("/nonexistent/01.wav"), 24_000).is_err());
    }
}
