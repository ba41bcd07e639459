//! Feature extraction seams and alignment of their output to the label frames.

use std::path::Path;

use tracing::{debug, instrument};

use crate::{
    config::SoundConfig,
    error::{BoxError, ProcessError, Result},
    frames::{total_span, FrameEvent},
};

/// Decodes a recording to mono samples at `sample_rate`.
pub trait AudioLoader: Send + Sync {
    fn load(&self, path: &Path, sample_rate: u32) -> std::result::Result<Vec<f32>, BoxError>;
}

/// Produces one row of `mel_dim` values per `frame_shift` samples.
pub trait MelExtractor: Send + Sync {
    fn mel(&self, audio: &[f32], sound: &SoundConfig) -> std::result::Result<Vec<Vec<f32>>, BoxError>;
}

/// Produces one f0 value in Hz per `frame_shift` samples, `0.0` when unvoiced.
pub trait PitchExtractor: Send + Sync {
    fn pitch(&self, audio: &[f32], sound: &SoundConfig) -> std::result::Result<Vec<f32>, BoxError>;
}

/// Per-recording arrays, all truncated to the frame span of the labels.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTrack {
    /// `frames * frame_shift` samples.
    pub audio: Vec<f32>,
    pub mel: Vec<Vec<f32>>,
    /// Pitch divided by the configured ceiling.
    pub pitch: Vec<f32>,
    /// `1` for voiced frames, `0` for silent ones.
    pub silence: Vec<u8>,
    pub frame_shift: usize,
}

impl FeatureTrack {
    pub fn frames(&self) -> usize {
        self.mel.len()
    }
}

pub struct FeatureAligner<'a> {
    pub mel: &'a dyn MelExtractor,
    pub pitch: &'a dyn PitchExtractor,
    pub silence_threshold: f32,
}

impl FeatureAligner<'_> {
    #[instrument(skip_all, fields(samples = audio.len(), events = events.len()), level = "debug")]
    pub fn align(
        &self,
        mut audio: Vec<f32>,
        events: &[FrameEvent],
        sound: &SoundConfig,
    ) -> Result<FeatureTrack> {
        let frames = total_span(events);

        let start = std::time::Instant::now();
        let mut mel = self
            .mel
            .mel(&audio, sound)
            .map_err(|source| ProcessError::Feature {
                stage: "mel generation",
                source,
            })?;
        let elapsed = start.elapsed();
        debug!(?elapsed, frames = mel.len(), "mel generated");

        let start = std::time::Instant::now();
        let mut pitch = self
            .pitch
            .pitch(&audio, sound)
            .map_err(|source| ProcessError::Feature {
                stage: "pitch generation",
                source,
            })?;
        let elapsed = start.elapsed();
        debug!(?elapsed, frames = pitch.len(), "pitch generated");

        truncate_to("mel", &mut mel, frames)?;
        truncate_to("pitch", &mut pitch, frames)?;
        truncate_to("audio", &mut audio, frames * sound.frame_shift)?;

        pitch.iter_mut().for_each(|f0| *f0 /= sound.f0_max);
        let silence = silence_mask(&mel, self.silence_threshold);

        Ok(FeatureTrack {
            audio,
            mel,
            pitch,
            silence,
            frame_shift: sound.frame_shift,
        })
    }
}

fn truncate_to<T>(feature: &'static str, values: &mut Vec<T>, len: usize) -> Result<()> {
    if values.len() < len {
        return Err(ProcessError::FeatureTooShort {
            feature,
            expected: len,
            actual: values.len(),
        });
    }
    values.truncate(len);
    Ok(())
}

/// A frame is silent (`0`) when its mean mel value falls below `threshold`.
pub fn silence_mask(mel: &[Vec<f32>], threshold: f32) -> Vec<u8> {
    mel.iter()
        .map(|row| {
            let mean = row.iter().sum::<f32>() / row.len().max(1) as f32;
            u8::from(mean >= threshold)
        })
        .collect()
}
