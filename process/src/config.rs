use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ProcessError, Result};

/// Every knob the pattern generator reads, grouped the same way as the
/// hyper parameter file consumed by the training code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HyperParameters {
    pub sound: SoundConfig,
    pub sampling: SamplingConfig,
    pub corpus: CorpusConfig,
    pub train: TrainConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundConfig {
    pub spectrogram_dim: usize,
    pub mel_dim: usize,
    /// Analysis window, in samples.
    pub frame_length: usize,
    /// Hop between frames, in samples. One frame of mel/pitch/silence per hop.
    pub frame_shift: usize,
    pub sample_rate: u32,
    pub max_abs_mel: f32,
    pub mel_f_min: f32,
    pub mel_f_max: f32,
    pub f0_min: f32,
    pub f0_max: f32,
    pub confidence_threshold: f32,
    pub gaussian_smoothing_sigma: f32,
}

impl Default for SoundConfig {
    fn default() -> Self {
        Self {
            spectrogram_dim: 1025,
            mel_dim: 80,
            frame_length: 1200,
            frame_shift: 300,
            sample_rate: 24_000,
            max_abs_mel: 4.0,
            mel_f_min: 0.0,
            mel_f_max: 12_000.0,
            f0_min: 65.0,
            f0_max: 2094.0,
            confidence_threshold: 0.6,
            gaussian_smoothing_sigma: 0.0,
        }
    }
}

impl SoundConfig {
    /// FFT size implied by the number of linear spectrogram bins.
    pub fn n_fft(&self) -> usize {
        (self.spectrogram_dim.saturating_sub(1)) * 2
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Shortest accepted window, in frames.
    pub min_duration: usize,
    /// Longest accepted window, in frames.
    pub max_duration: usize,
    /// Step between probed window ends, in events.
    pub stride: usize,
    /// Frames whose mean mel value falls below this are marked silent.
    pub silence_threshold: f32,
    pub eval_probability: f64,
    /// Seed for the train/eval split. `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            min_duration: 600,
            max_duration: 1500,
            stride: 5,
            silence_threshold: -3.5,
            eval_probability: 0.001,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    pub wav_dir: PathBuf,
    pub label_dir: PathBuf,
    pub singer: String,
    pub dataset: String,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            wav_dir: PathBuf::from("wav"),
            label_dir: PathBuf::from("mono_label_with_note"),
            singer: "Kiritan".to_string(),
            dataset: "kiritan".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub train_pattern: PatternSplit,
    pub eval_pattern: PatternSplit,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            train_pattern: PatternSplit {
                path: PathBuf::from("patterns/train"),
                metadata_file: "metadata.bin".to_string(),
            },
            eval_pattern: PatternSplit {
                path: PathBuf::from("patterns/eval"),
                metadata_file: "metadata.bin".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSplit {
    pub path: PathBuf,
    pub metadata_file: String,
}

pub fn validate_config(config: &HyperParameters) -> Result<()> {
    let sound = &config.sound;
    let sampling = &config.sampling;

    let check = |ok: bool, msg: &str| {
        if ok {
            Ok(())
        } else {
            Err(ProcessError::Config(msg.to_string()))
        }
    };

    check(sound.sample_rate > 0, "sample_rate must be positive")?;
    check(sound.frame_shift > 0, "frame_shift must be positive")?;
    check(sound.frame_length > 0, "frame_length must be positive")?;
    check(sound.spectrogram_dim >= 2, "spectrogram_dim must be at least 2")?;
    check(sound.mel_dim > 0, "mel_dim must be positive")?;
    check(
        sound.frame_length <= sound.n_fft(),
        "frame_length must not exceed the fft size (spectrogram_dim - 1) * 2",
    )?;
    check(sound.max_abs_mel > 0.0, "max_abs_mel must be positive")?;
    check(sound.mel_f_min < sound.mel_f_max, "mel_f_min must be < mel_f_max")?;
    check(
        sound.mel_f_max <= sound.sample_rate as f32 / 2.0,
        "mel_f_max must not exceed the nyquist frequency",
    )?;
    check(
        sound.f0_min > 0.0 && sound.f0_min < sound.f0_max,
        "f0 range must satisfy 0 < f0_min < f0_max",
    )?;
    check(
        sound.gaussian_smoothing_sigma >= 0.0,
        "gaussian_smoothing_sigma must not be negative",
    )?;
    check(
        sampling.min_duration <= sampling.max_duration,
        "min_duration must be <= max_duration",
    )?;
    check(sampling.stride > 0, "stride must be positive")?;
    check(
        (0.0..=1.0).contains(&sampling.eval_probability),
        "eval_probability must lie in [0, 1]",
    )?;

    Ok(())
}

/// Load configuration from a JSON file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<HyperParameters> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ProcessError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: HyperParameters = serde_json::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}
