use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use bincode::Options;
use rand::{rngs::StdRng, Rng, SeedableRng};
use svs_process::{BoxError, HyperParameters, Pattern, PatternSink};
use tracing::{instrument, trace};

pub mod metadata;
pub mod models;

pub use metadata::{build_metadata, read_metadata, write_metadata};
pub use models::{Field, Metadata, PatternFile, PatternRecord};

pub const PATTERN_EXTENSION: &str = "pattern";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: {source}")]
    Codec {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },
    #[error("unsupported pattern version {0}")]
    Version(u32),
    #[error("missing field {0}")]
    MissingField(&'static str),
    #[error("field {field} should be a {expected}, found a {found}")]
    FieldType {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },
    #[error("field {field} has shape {shape:?} but holds {len} values")]
    Shape {
        field: &'static str,
        shape: Vec<u64>,
        len: usize,
    },
    #[error("inconsistent pattern: {0}")]
    Inconsistent(String),
    #[error("{path}: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: Box<StoreError>,
    },
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .reject_trailing_bytes()
}

pub(crate) fn write_record<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let io_error = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }

    let mut writer = BufWriter::new(File::create(path).map_err(io_error)?);
    codec()
        .serialize_into(&mut writer, value)
        .map_err(|source| StoreError::Codec {
            path: path.to_path_buf(),
            source,
        })?;
    writer.flush().map_err(io_error)
}

/// Length prefixes are bounded by the file size.
pub(crate) fn read_record<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let bytes = std::fs::read(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    codec()
        .with_limit(bytes.len() as u64)
        .deserialize(&bytes)
        .map_err(|source| StoreError::Codec {
            path: path.to_path_buf(),
            source,
        })
}

/// Read a pattern file and validate it against the pattern schema.
pub fn read_pattern(path: &Path) -> Result<PatternRecord, StoreError> {
    let file: PatternFile = read_record(path)?;
    PatternRecord::try_from(file).map_err(|source| StoreError::Invalid {
        path: path.to_path_buf(),
        source: Box::new(source),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Eval,
}

/// Where patterns go and how they are split between training and evaluation.
#[derive(Debug, Clone)]
pub struct PatternStore {
    train_root: PathBuf,
    eval_root: PathBuf,
    dataset: String,
    eval_probability: f64,
    seed: Option<u64>,
}

impl PatternStore {
    pub fn new(
        train_root: PathBuf,
        eval_root: PathBuf,
        dataset: impl Into<String>,
        eval_probability: f64,
        seed: Option<u64>,
    ) -> Self {
        Self {
            train_root,
            eval_root,
            dataset: dataset.into(),
            eval_probability,
            seed,
        }
    }

    /// Split roots are resolved against `base`.
    pub fn from_config(config: &HyperParameters, base: &Path) -> Self {
        Self::new(
            base.join(&config.train.train_pattern.path),
            base.join(&config.train.eval_pattern.path),
            config.corpus.dataset.clone(),
            config.sampling.eval_probability,
            config.sampling.seed,
        )
    }

    pub fn root(&self, split: Split) -> &Path {
        match split {
            Split::Train => &self.train_root,
            Split::Eval => &self.eval_root,
        }
    }

    /// `{root}/{dataset}/{source:03}/{dataset}.S_{source:03}.P_{pattern:05}.pattern`
    pub fn pattern_path(&self, split: Split, source: usize, pattern: usize) -> PathBuf {
        let dataset = &self.dataset;
        self.root(split)
            .join(dataset)
            .join(format!("{source:03}"))
            .join(format!(
                "{dataset}.S_{source:03}.P_{pattern:05}.{PATTERN_EXTENSION}"
            ))
    }

    /// A writer for one source. With a configured seed the split decisions
    /// depend only on the seed and the source index.
    pub fn for_source(&self, source: usize) -> SourceWriter<'_> {
        let rng = match self.seed {
            Some(seed) => {
                StdRng::seed_from_u64(seed ^ (source as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
            }
            None => StdRng::from_entropy(),
        };
        SourceWriter {
            store: self,
            source,
            rng,
            counts: SplitCounts::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SplitCounts {
    pub train: usize,
    pub eval: usize,
}

pub struct SourceWriter<'a> {
    store: &'a PatternStore,
    source: usize,
    rng: StdRng,
    counts: SplitCounts,
}

impl SourceWriter<'_> {
    pub fn counts(&self) -> SplitCounts {
        self.counts
    }

    fn choose_split(&mut self) -> Split {
        match self.rng.gen::<f64>() <= self.store.eval_probability {
            true => Split::Eval,
            false => Split::Train,
        }
    }

    #[instrument(skip(self, pattern), fields(source = self.source), level = "trace")]
    pub fn write(&mut self, index: usize, pattern: &Pattern<'_>) -> Result<PathBuf, StoreError> {
        let split = self.choose_split();
        let path = self.store.pattern_path(split, self.source, index);

        write_record(&path, &PatternFile::from(pattern))?;
        match split {
            Split::Train => self.counts.train += 1,
            Split::Eval => self.counts.eval += 1,
        }
        trace!(path = %path.display(), frames = pattern.span(), "wrote pattern");
        Ok(path)
    }
}

impl PatternSink for SourceWriter<'_> {
    fn persist(&mut self, index: usize, pattern: &Pattern<'_>) -> Result<(), BoxError> {
        self.write(index, pattern)?;
        Ok(())
    }
}
