pub mod config;
pub mod corpus;
pub mod error;
pub mod features;
pub mod frames;
pub mod fullcontext;
pub mod label;
pub mod matching;
pub mod pitch;
pub mod spectrogram;
pub mod stats;
pub mod trim;
pub mod window;

pub use config::{load_config, validate_config, HyperParameters};
pub use corpus::{discover_sources, PatternSink, Source, SourceProcessor, SourceReport};
pub use error::{BoxError, LabelError, ProcessError, Result};
pub use features::{AudioLoader, FeatureAligner, FeatureTrack, MelExtractor, PitchExtractor};
pub use frames::{to_frame_events, FrameEvent, FrameRateConverter};
pub use label::{read_labels, timed_events, LabelEvent, TimedEvent};
pub use pitch::YinPitchGenerator;
pub use spectrogram::{MelGenerator, SpectrogramConfig, SpectrogramGenerator};
pub use stats::{CorpusStats, Extent};
pub use trim::{trim_silence, Trim};
pub use window::{Pattern, SamplingBounds, Window, WindowSampler};
