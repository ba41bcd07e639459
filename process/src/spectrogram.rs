use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError, RwLock},
};

use rustfft::{FftNum, FftPlanner};
use tracing::instrument;

use crate::{
    config::SoundConfig,
    error::BoxError,
    features::MelExtractor,
};

pub trait Float: FftNum + num_traits::Float {}
impl Float for f32 {}
impl Float for f64 {}

/// Magnitude STFT with a shared planner and a cache of analysis windows.
#[derive(Clone)]
pub struct SpectrogramGenerator<T: Float> {
    planner: Arc<Mutex<FftPlanner<T>>>,
    hanns: Arc<RwLock<HashMap<(usize, usize), Arc<Vec<f32>>>>>,
}

impl<T: Float> Default for SpectrogramGenerator<T> {
    fn default() -> Self {
        Self {
            planner: Arc::new(Mutex::new(FftPlanner::new())),
            hanns: Default::default(),
        }
    }
}

impl<T: Float> SpectrogramGenerator<T> {
    /// One row of `fft_len / 2 + 1` magnitudes per hop.
    #[instrument(skip(self, samples), level = "trace")]
    pub fn run(&self, samples: &[f32], config: &SpectrogramConfig) -> Vec<Vec<T>> {
        let mut planner_guard = self.planner.lock().unwrap_or_else(PoisonError::into_inner);
        let fft = planner_guard.plan_fft_forward(config.fft_len);
        drop(planner_guard);
        let hann = self.get_hann(config.window_len, config.fft_len);
        let hann_slice = hann.as_slice();

        let padded = match config.center {
            true => pad_reflect(samples, config.fft_len / 2),
            false => samples.to_vec(),
        };

        padded
            .windows(config.fft_len)
            .step_by(config.hop)
            .map(|window| {
                window
                    .iter()
                    .zip(hann_slice)
                    .map(|(sample, hann)| sample * hann)
                    .map(|scaled| {
                        num_complex::Complex::new(
                            T::from_f32(scaled).unwrap_or_else(T::zero),
                            T::zero(),
                        )
                    })
                    .collect::<Vec<_>>()
            })
            .map(|mut window| {
                fft.process(window.as_mut_slice());
                window
            })
            .map(|complex| {
                complex
                    .into_iter()
                    // the upper half mirrors the lower half for real input
                    .take(config.fft_len / 2 + 1)
                    .map(|val| val.norm())
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>()
    }

    fn get_hann(&self, window_len: usize, fft_len: usize) -> Arc<Vec<f32>> {
        let read = self.hanns.read().unwrap_or_else(PoisonError::into_inner);

        match read.get(&(window_len, fft_len)) {
            Some(hann) => hann.clone(),
            None => {
                drop(read);
                self.generate_hann(window_len, fft_len)
            }
        }
    }

    #[instrument(skip(self), level = "trace")]
    fn generate_hann(&self, window_len: usize, fft_len: usize) -> Arc<Vec<f32>> {
        let hann = Arc::new(generate_padded_hann(window_len, fft_len));
        let mut write = self.hanns.write().unwrap_or_else(PoisonError::into_inner);
        write.insert((window_len, fft_len), hann.clone());
        hann
    }
}

#[derive(Debug, Clone)]
pub struct SpectrogramConfig {
    pub fft_len: usize,
    /// Length of the Hann window, centred inside `fft_len`.
    pub window_len: usize,
    pub hop: usize,
    /// Reflect-pad by `fft_len / 2` so frame `i` is centred on sample `i * hop`.
    pub center: bool,
}

impl From<&SoundConfig> for SpectrogramConfig {
    fn from(sound: &SoundConfig) -> Self {
        Self {
            fft_len: sound.n_fft(),
            window_len: sound.frame_length,
            hop: sound.frame_shift,
            center: true,
        }
    }
}

fn generate_padded_hann(window_len: usize, fft_len: usize) -> Vec<f32> {
    let mut out = vec![0.0; fft_len];
    let offset = (fft_len - window_len.min(fft_len)) / 2;

    for i in 0..window_len.min(fft_len) {
        out[offset + i] =
            0.5 * (1.0 - (std::f32::consts::TAU * (i as f32 / window_len as f32)).cos());
    }

    out
}

/// Mirror `pad` samples onto each end, excluding the edge sample. Falls back to
/// zeros where the signal is too short to mirror.
pub(crate) fn pad_reflect(samples: &[f32], pad: usize) -> Vec<f32> {
    let n = samples.len();
    let mut out = Vec::with_capacity(n + 2 * pad);

    let reflect = |offset: usize, from_end: bool| -> f32 {
        if offset >= n {
            return 0.0;
        }
        match from_end {
            false => samples[offset],
            true => samples[n - 1 - offset],
        }
    };

    out.extend((1..=pad).rev().map(|i| reflect(i, false)));
    out.extend_from_slice(samples);
    out.extend((1..=pad).map(|i| reflect(i, true)));
    out
}

const MIN_LEVEL_DB: f32 = -100.0;
const REF_LEVEL_DB: f32 = 20.0;

/// Log-mel spectrogram normalized to `[-max_abs_mel, max_abs_mel]`.
#[derive(Clone, Default)]
pub struct MelGenerator<T: Float> {
    spectrogram: SpectrogramGenerator<T>,
}

impl<T: Float> MelGenerator<T> {
    #[instrument(skip(self, samples), fields(samples = samples.len()), level = "trace")]
    pub fn run(&self, samples: &[f32], sound: &SoundConfig) -> Vec<Vec<f32>> {
        let config = SpectrogramConfig::from(sound);
        let filters = mel_filterbank(
            sound.sample_rate,
            config.fft_len,
            sound.mel_dim,
            sound.mel_f_min,
            sound.mel_f_max,
        );

        self.spectrogram
            .run(samples, &config)
            .into_iter()
            .map(|frame| {
                let magnitudes = frame
                    .into_iter()
                    .map(|value| value.to_f32().unwrap_or(0.0))
                    .collect::<Vec<_>>();
                filters
                    .iter()
                    .map(|filter| {
                        let energy: f32 = filter
                            .iter()
                            .zip(&magnitudes)
                            .map(|(weight, magnitude)| weight * magnitude)
                            .sum();
                        let db = amp_to_db(energy) - REF_LEVEL_DB;
                        normalize(db, sound.max_abs_mel)
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

impl<T: Float> MelExtractor for MelGenerator<T> {
    fn mel(&self, audio: &[f32], sound: &SoundConfig) -> Result<Vec<Vec<f32>>, BoxError> {
        Ok(self.run(audio, sound))
    }
}

fn amp_to_db(amplitude: f32) -> f32 {
    20.0 * amplitude.max(1e-5).log10()
}

fn normalize(db: f32, max_abs: f32) -> f32 {
    let scaled = 2.0 * max_abs * ((db - MIN_LEVEL_DB) / -MIN_LEVEL_DB) - max_abs;
    scaled.clamp(-max_abs, max_abs)
}

fn hz_to_mel(hz: f32) -> f32 {
    const F_SP: f32 = 200.0 / 3.0;
    const MIN_LOG_HZ: f32 = 1000.0;
    let min_log_mel = MIN_LOG_HZ / F_SP;
    let log_step = 6.4f32.ln() / 27.0;

    if hz >= MIN_LOG_HZ {
        min_log_mel + (hz / MIN_LOG_HZ).ln() / log_step
    } else {
        hz / F_SP
    }
}

fn mel_to_hz(mel: f32) -> f32 {
    const F_SP: f32 = 200.0 / 3.0;
    const MIN_LOG_HZ: f32 = 1000.0;
    let min_log_mel = MIN_LOG_HZ / F_SP;
    let log_step = 6.4f32.ln() / 27.0;

    if mel >= min_log_mel {
        MIN_LOG_HZ * (log_step * (mel - min_log_mel)).exp()
    } else {
        mel * F_SP
    }
}

/// Slaney-scale triangular filters with area normalization, one row per band
/// over the `fft_len / 2 + 1` linear bins.
pub fn mel_filterbank(
    sample_rate: u32,
    fft_len: usize,
    n_mels: usize,
    f_min: f32,
    f_max: f32,
) -> Vec<Vec<f32>> {
    let n_bins = fft_len / 2 + 1;
    let bin_hz = |bin: usize| bin as f32 * sample_rate as f32 / fft_len as f32;

    let (mel_min, mel_max) = (hz_to_mel(f_min), hz_to_mel(f_max));
    let edges: Vec<f32> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f32 / (n_mels + 1) as f32))
        .collect();

    (0..n_mels)
        .map(|m| {
            let (lower, center, upper) = (edges[m], edges[m + 1], edges[m + 2]);
            let enorm = 2.0 / (upper - lower);
            (0..n_bins)
                .map(|bin| {
                    let hz = bin_hz(bin);
                    let rising = (hz - lower) / (center - lower);
                    let falling = (upper - hz) / (upper - center);
                    rising.min(falling).max(0.0) * enorm
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (std::f32::consts::TAU * freq * i as f32 / sample_rate as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn centred_frame_count() {
        let generator: SpectrogramGenerator<f32> = SpectrogramGenerator::default();
        let config = SpectrogramConfig {
            fft_len: 64,
            window_len: 48,
            hop: 16,
            center: true,
        };
        let spectrogram = generator.run(&vec![0.1; 1000], &config);
        assert_eq!(spectrogram.len(), 1000 / 16 + 1);
        assert!(spectrogram.iter().all(|row| row.len() == 33));
    }

    #[test]
    fn peak_lands_on_tone_bin() {
        let generator: SpectrogramGenerator<f64> = SpectrogramGenerator::default();
        let config = SpectrogramConfig {
            fft_len: 256,
            window_len: 256,
            hop: 128,
            center: false,
        };
        // 1 kHz at 8 kHz sample rate is bin 32 of 256
        let spectrogram = generator.run(&tone(1000.0, 8000, 2048), &config);
        let row = &spectrogram[4];
        let peak = row
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 32);
    }

    #[test]
    fn reflect_padding_mirrors_edges() {
        assert_eq!(
            pad_reflect(&[1.0, 2.0, 3.0, 4.0], 2),
            vec![3.0, 2.0, 1.0, 2.0, 3.0, 4.0, 3.0, 2.0]
        );
        assert_eq!(pad_reflect(&[1.0], 1), vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn slaney_scale_is_linear_below_1khz() {
        assert!((hz_to_mel(500.0) - 7.5).abs() < 1e-4);
        assert!((hz_to_mel(1000.0) - 15.0).abs() < 1e-4);
        assert!((mel_to_hz(hz_to_mel(4321.0)) - 4321.0).abs() < 0.05);
    }

    #[test]
    fn filterbank_shape_and_coverage() {
        let filters = mel_filterbank(24_000, 2048, 80, 0.0, 12_000.0);
        assert_eq!(filters.len(), 80);
        assert!(filters.iter().all(|f| f.len() == 1025));
        assert!(filters.iter().all(|f| f.iter().any(|&w| w > 0.0)));
        assert!(filters.iter().flatten().all(|&w| w >= 0.0));
    }

    #[test]
    fn mel_is_bounded_and_silence_is_floor() {
        let sound = SoundConfig {
            spectrogram_dim: 257,
            frame_length: 512,
            frame_shift: 128,
            sample_rate: 16_000,
            mel_f_max: 8000.0,
            mel_dim: 40,
            ..SoundConfig::default()
        };
        let generator: MelGenerator<f32> = MelGenerator::default();

        let silent = generator.run(&vec![0.0; 4096], &sound);
        assert_eq!(silent.len(), 4096 / 128 + 1);
        assert!(silent.iter().flatten().all(|&v| v == -sound.max_abs_mel));

        let loud = generator.run(&tone(440.0, 16_000, 4096), &sound);
        assert!(loud.iter().flatten().all(|v| v.abs() <= sound.max_abs_mel));
        let peak = loud[10].iter().cloned().fold(f32::MIN, f32::max);
        assert!(peak > 0.0);
    }
}
