//! YIN fundamental frequency tracking.

use tracing::instrument;

use crate::{
    config::SoundConfig,
    error::BoxError,
    features::PitchExtractor,
    spectrogram::pad_reflect,
};

/// Absolute threshold on the normalized difference for picking the first dip.
const HARMONIC_THRESHOLD: f32 = 0.1;

#[derive(Debug, Clone, Copy, Default)]
pub struct YinPitchGenerator;

impl YinPitchGenerator {
    /// One f0 estimate in Hz per hop, `0.0` for frames below the confidence
    /// threshold.
    #[instrument(skip(self, samples), fields(samples = samples.len()), level = "trace")]
    pub fn run(&self, samples: &[f32], sound: &SoundConfig) -> Vec<f32> {
        let sample_rate = sound.sample_rate as f32;
        let frame_length = sound.frame_length;
        let tau_min = ((sample_rate / sound.f0_max) as usize).max(1);
        let tau_max = ((sample_rate / sound.f0_min) as usize).min(frame_length.saturating_sub(1));

        let padded = pad_reflect(samples, frame_length / 2);
        let n_frames = samples.len() / sound.frame_shift + 1;

        let pitch: Vec<f32> = (0..n_frames)
            .map(|frame| {
                let start = frame * sound.frame_shift;
                let end = (start + frame_length).min(padded.len());
                let window = &padded[start..end];
                if tau_min >= tau_max || window.len() <= tau_max {
                    return 0.0;
                }

                let cmnd = cumulative_mean_normalized_difference(window, tau_max);
                let (tau, confidence) = pick_period(&cmnd, tau_min, tau_max);
                match confidence >= sound.confidence_threshold {
                    true => sample_rate / tau,
                    false => 0.0,
                }
            })
            .collect();

        match sound.gaussian_smoothing_sigma > 0.0 {
            true => gaussian_smooth(&pitch, sound.gaussian_smoothing_sigma),
            false => pitch,
        }
    }
}

impl PitchExtractor for YinPitchGenerator {
    fn pitch(&self, audio: &[f32], sound: &SoundConfig) -> Result<Vec<f32>, BoxError> {
        Ok(self.run(audio, sound))
    }
}

/// `d'(tau)` for `tau` in `0..=tau_max`, comparing the first half of the
/// window against lagged copies of itself.
fn cumulative_mean_normalized_difference(window: &[f32], tau_max: usize) -> Vec<f32> {
    let width = window.len() - tau_max;
    let mut cmnd = vec![1.0; tau_max + 1];
    let mut running = 0.0;

    for tau in 1..=tau_max {
        let diff: f32 = (0..width)
            .map(|j| {
                let delta = window[j] - window[j + tau];
                delta * delta
            })
            .sum();
        running += diff;
        cmnd[tau] = match running > 0.0 {
            true => diff * tau as f32 / running,
            false => 1.0,
        };
    }

    cmnd
}

/// Returns the interpolated period in samples and `1 - d'(tau)` as confidence.
fn pick_period(cmnd: &[f32], tau_min: usize, tau_max: usize) -> (f32, f32) {
    let mut tau = (tau_min..=tau_max)
        .find(|&t| cmnd[t] < HARMONIC_THRESHOLD)
        .unwrap_or_else(|| {
            (tau_min..=tau_max)
                .min_by(|&a, &b| cmnd[a].total_cmp(&cmnd[b]))
                .unwrap_or(tau_min)
        });

    // walk down to the bottom of the dip
    while tau < tau_max && cmnd[tau + 1] < cmnd[tau] {
        tau += 1;
    }

    let confidence = 1.0 - cmnd[tau];
    (parabolic_interpolation(cmnd, tau), confidence)
}

fn parabolic_interpolation(values: &[f32], index: usize) -> f32 {
    if index == 0 || index + 1 >= values.len() {
        return index as f32;
    }
    let (left, center, right) = (values[index - 1], values[index], values[index + 1]);
    let denominator = left - 2.0 * center + right;
    if denominator.abs() < f32::EPSILON {
        return index as f32;
    }
    index as f32 + 0.5 * (left - right) / denominator
}

/// 1-D Gaussian filter with reflected boundaries and a radius of four sigma.
pub fn gaussian_smooth(values: &[f32], sigma: f32) -> Vec<f32> {
    if values.is_empty() {
        return Vec::new();
    }
    let radius = (4.0 * sigma + 0.5) as isize;
    let kernel: Vec<f32> = (-radius..=radius)
        .map(|x| (-0.5 * (x as f32 / sigma).powi(2)).exp())
        .collect();
    let norm: f32 = kernel.iter().sum();

    let n = values.len() as isize;
    let reflect = |mut i: isize| -> usize {
        // scipy's "reflect" mode: (d c b a | a b c d | d c b a)
        loop {
            if i < 0 {
                i = -i - 1;
            } else if i >= n {
                i = 2 * n - i - 1;
            } else {
                return i as usize;
            }
        }
    };

    (0..n)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .map(|(k, weight)| weight * values[reflect(i + k as isize - radius)])
                .sum::<f32>()
                / norm
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sound() -> SoundConfig {
        SoundConfig {
            sample_rate: 16_000,
            frame_length: 1024,
            frame_shift: 256,
            f0_min: 60.0,
            f0_max: 1000.0,
            confidence_threshold: 0.6,
            gaussian_smoothing_sigma: 0.0,
            ..SoundConfig::default()
        }
    }

    fn tone(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (std::f32::consts::TAU * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn tracks_a_steady_tone() {
        let sound = sound();
        let pitch = YinPitchGenerator.run(&tone(220.0, 16_000, 16_000), &sound);
        assert_eq!(pitch.len(), 16_000 / 256 + 1);

        for &f0 in &pitch[4..pitch.len() - 4] {
            assert!((f0 - 220.0).abs() < 2.0, "estimated {f0}");
        }
    }

    #[test]
    fn silence_is_unvoiced() {
        let pitch = YinPitchGenerator.run(&vec![0.0; 8000], &sound());
        assert!(pitch.iter().all(|&f0| f0 == 0.0));
    }

    #[test]
    fn smoothing_preserves_constants_and_length() {
        let smoothed = gaussian_smooth(&[3.0; 17], 2.0);
        assert_eq!(smoothed.len(), 17);
        assert!(smoothed.iter().all(|v| (v - 3.0).abs() < 1e-5));
    }

    #[test]
    fn smoothing_spreads_an_impulse() {
        let mut impulse = vec![0.0; 21];
        impulse[10] = 1.0;
        let smoothed = gaussian_smooth(&impulse, 1.5);
        assert!(smoothed[10] < 1.0);
        assert!(smoothed[9] > 0.0 && (smoothed[9] - smoothed[11]).abs() < 1e-6);
        assert!((smoothed.iter().sum::<f32>() - 1.0).abs() < 1e-4);
    }
}
