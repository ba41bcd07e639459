//! Per-recording driver: labels and audio in, persisted patterns out.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use crate::{
    config::HyperParameters,
    error::{BoxError, ProcessError, Result},
    features::{AudioLoader, FeatureAligner, MelExtractor, PitchExtractor},
    frames::{to_frame_events, total_span},
    label::{read_labels, timed_events},
    stats::CorpusStats,
    trim::trim_silence,
    window::{Pattern, SamplingBounds, WindowSampler},
};

/// One recording and its note label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// 1-based position in the corpus, used in pattern names.
    pub index: usize,
    pub audio: PathBuf,
    pub label: PathBuf,
}

/// Receives each pattern as soon as it is cut. `index` counts from zero
/// within a source.
pub trait PatternSink {
    fn persist(&mut self, index: usize, pattern: &Pattern<'_>) -> std::result::Result<(), BoxError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceReport {
    pub patterns: usize,
    pub stats: CorpusStats,
}

pub struct SourceProcessor<'a> {
    pub config: &'a HyperParameters,
    pub loader: &'a dyn AudioLoader,
    pub mel: &'a dyn MelExtractor,
    pub pitch: &'a dyn PitchExtractor,
}

impl SourceProcessor<'_> {
    #[instrument(skip(self, sink), fields(index = source.index), level = "debug")]
    pub fn process(&self, source: &Source, sink: &mut dyn PatternSink) -> Result<SourceReport> {
        let sound = &self.config.sound;
        let corpus = &self.config.corpus;

        let mut events = timed_events(read_labels(&source.label)?);
        let mut audio = self
            .loader
            .load(&source.audio, sound.sample_rate)
            .map_err(|source| ProcessError::Feature {
                stage: "audio loading",
                source,
            })?;

        trim_silence(&mut events, &mut audio, sound.sample_rate);
        let events = to_frame_events(&events, sound.sample_rate, sound.frame_shift)?;

        let mut report = SourceReport::default();
        if events.is_empty() {
            warn!(label = %source.label.display(), "no events left after trimming");
            return Ok(report);
        }
        report.stats.record_notes(&events);
        debug!(events = events.len(), frames = total_span(&events), "converted labels");

        let aligner = FeatureAligner {
            mel: self.mel,
            pitch: self.pitch,
            silence_threshold: self.config.sampling.silence_threshold,
        };
        let track = aligner.align(audio, &events, sound)?;

        let bounds = SamplingBounds::from(&self.config.sampling);
        for window in WindowSampler::new(&events, bounds)? {
            let pattern =
                Pattern::from_window(&window, &events, &track, &corpus.singer, &corpus.dataset);
            sink.persist(report.patterns, &pattern)
                .map_err(|source| ProcessError::Sink {
                    index: report.patterns,
                    source,
                })?;
            report.patterns += 1;
            report.stats.record_span(window.span);
        }

        info!(
            audio = %source.audio.display(),
            patterns = report.patterns,
            "processed source"
        );
        Ok(report)
    }
}

/// Pair every `*.txt` label in `label_dir` (sorted by name) with
/// `wav_dir/<stem>.wav`. A missing recording is an error.
pub fn discover_sources(wav_dir: &Path, label_dir: &Path) -> Result<Vec<Source>> {
    let io_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ProcessError::Io { path, source }
    };

    let mut labels = Vec::new();
    for entry in std::fs::read_dir(label_dir).map_err(io_error(label_dir))? {
        let path = entry.map_err(io_error(label_dir))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "txt") {
            labels.push(path);
        }
    }
    labels.sort();

    labels
        .into_iter()
        .enumerate()
        .map(|(i, label)| {
            let mut name = label.file_stem().unwrap_or_default().to_os_string();
            name.push(".wav");
            let audio = wav_dir.join(name);
            if !audio.is_file() {
                return Err(ProcessError::Io {
                    path: audio,
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "no recording for label",
                    ),
                });
            }
            Ok(Source {
                index: i + 1,
                audio,
                label,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SoundConfig;

    /// Constant audio of a fixed length regardless of path.
    struct Silence(usize);
    impl AudioLoader for Silence {
        fn load(&self, _: &Path, _: u32) -> std::result::Result<Vec<f32>, BoxError> {
            Ok((0..self.0).map(|i| i as f32).collect())
        }
    }

    struct Missing;
    impl AudioLoader for Missing {
        fn load(&self, path: &Path, _: u32) -> std::result::Result<Vec<f32>, BoxError> {
            Err(format!("{} not found", path.display()).into())
        }
    }

    /// One loud row per frame, `len / hop + 1` rows.
    struct FlatMel;
    impl MelExtractor for FlatMel {
        fn mel(&self, audio: &[f32], sound: &SoundConfig) -> std::result::Result<Vec<Vec<f32>>, BoxError> {
            Ok(vec![vec![1.0; 2]; audio.len() / sound.frame_shift + 1])
        }
    }

    struct FlatPitch;
    impl PitchExtractor for FlatPitch {
        fn pitch(&self, audio: &[f32], sound: &SoundConfig) -> std::result::Result<Vec<f32>, BoxError> {
            Ok(vec![440.0; audio.len() / sound.frame_shift + 1])
        }
    }

    #[derive(Default)]
    struct Collect(Vec<(usize, Vec<usize>, Vec<String>, usize, f32)>);
    impl PatternSink for Collect {
        fn persist(&mut self, index: usize, pattern: &Pattern<'_>) -> std::result::Result<(), BoxError> {
            self.0.push((
                index,
                pattern.durations.clone(),
                pattern.text.iter().map(|t| t.to_string()).collect(),
                pattern.audio.len(),
                pattern.audio[0],
            ));
            Ok(())
        }
    }

    struct Full;
    impl PatternSink for Full {
        fn persist(&mut self, _: usize, _: &Pattern<'_>) -> std::result::Result<(), BoxError> {
            Err("disk full".into())
        }
    }

    fn config() -> HyperParameters {
        let mut config = HyperParameters::default();
        config.sound.sample_rate = 1000;
        config.sound.frame_shift = 10;
        config.sampling.min_duration = 20;
        config.sampling.max_duration = 60;
        config.sampling.stride = 1;
        config
    }

    fn write_label(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("01.txt");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn leading_rest_is_dropped_before_framing() {
        let dir = tempfile::tempdir().unwrap();
        // durations: 0.5 (rest), then 0.1 each for a..f
        let label = write_label(
            dir.path(),
            "0.5,pau,0\n0.6,a,60\n0.7,i,61\n0.8,u,62\n0.9,e,63\n1.0,o,64\n1.1,N,65\n",
        );
        let source = Source {
            index: 1,
            audio: dir.path().join("01.wav"),
            label,
        };
        let config = config();
        let processor = SourceProcessor {
            config: &config,
            loader: &Silence(2000),
            mel: &FlatMel,
            pitch: &FlatPitch,
        };

        let mut sink = Collect::default();
        let report = processor.process(&source, &mut sink).unwrap();

        assert_eq!(report.patterns, sink.0.len());
        assert!(report.patterns > 0);
        let (index, durations, text, samples, first_sample) = &sink.0[0];
        assert_eq!(*index, 0);
        assert_eq!(durations, &vec![10, 10]);
        assert_eq!(text[0], "a");
        assert_eq!(*samples, 200);
        // audio starts right after the 500 trimmed samples
        assert_eq!(*first_sample, 500.0);

        let stats = report.stats;
        assert_eq!(stats.note.map(|n| (n.min, n.max)), Some((60, 65)));
        let duration = stats.duration.unwrap();
        assert!(duration.min >= 20 && duration.max <= 60);
    }

    #[test]
    fn sink_failure_aborts_the_source() {
        let dir = tempfile::tempdir().unwrap();
        let label = write_label(dir.path(), "0.1,a,60\n0.2,i,61\n0.3,u,62\n0.4,e,63\n");
        let source = Source {
            index: 1,
            audio: dir.path().join("01.wav"),
            label,
        };
        let config = config();
        let processor = SourceProcessor {
            config: &config,
            loader: &Silence(1000),
            mel: &FlatMel,
            pitch: &FlatPitch,
        };

        let err = processor.process(&source, &mut Full).unwrap_err();
        assert!(matches!(err, ProcessError::Sink { index: 0, .. }));
    }

    #[test]
    fn loader_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let label = write_label(dir.path(), "0.1,a,60\n");
        let source = Source {
            index: 1,
            audio: dir.path().join("01.wav"),
            label,
        };
        let config = config();
        let processor = SourceProcessor {
            config: &config,
            loader: &Missing,
            mel: &FlatMel,
            pitch: &FlatPitch,
        };

        let err = processor.process(&source, &mut Collect::default()).unwrap_err();
        assert!(matches!(err, ProcessError::Feature { stage: "audio loading", .. }));
    }

    #[test]
    fn discovery_pairs_by_stem() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("wav");
        let labels = dir.path().join("labels");
        std::fs::create_dir_all(&wav).unwrap();
        std::fs::create_dir_all(&labels).unwrap();
        for name in ["02", "01"] {
            std::fs::write(labels.join(format!("{name}.txt")), "0.1,a,60\n").unwrap();
            std::fs::write(wav.join(format!("{name}.wav")), b"").unwrap();
        }
        std::fs::write(labels.join("notes.md"), "ignored").unwrap();

        let sources = discover_sources(&wav, &labels).unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].index, 1);
        assert!(sources[0].audio.ends_with("01.wav"));
        assert!(sources[1].label.ends_with("02.txt"));
    }

    #[test]
    fn discovery_requires_every_recording() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("01.txt"), "0.1,a,60\n").unwrap();
        let err = discover_sources(dir.path(), dir.path()).unwrap_err();
        assert!(matches!(err, ProcessError::Io { .. }));
    }
}
