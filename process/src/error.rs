use std::path::PathBuf;

/// Boxed error returned by the feature extraction collaborators and pattern sinks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum LabelError {
    #[error("expected 3 comma separated fields, found {0}")]
    FieldCount(usize),
    #[error("invalid start time {0:?}")]
    StartTime(String),
    #[error("invalid note number {0:?}")]
    Note(String),
    #[error("start time {current} does not come after {previous}")]
    NotIncreasing { previous: f64, current: f64 },
    #[error("line does not look like a full-context label")]
    FullContext,
    #[error("invalid note name {0:?}")]
    NoteName(String),
    #[error("expected `start end lyric`, found {0} fields")]
    MonoFieldCount(usize),
    #[error("invalid time {0:?}")]
    Time(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}:{line}: {source}")]
    Label {
        path: PathBuf,
        line: usize,
        #[source]
        source: LabelError,
    },
    #[error("{0} contains no events")]
    EmptyLabel(PathBuf),
    #[error("{stage} failed: {source}")]
    Feature {
        stage: &'static str,
        #[source]
        source: BoxError,
    },
    #[error("{feature} has {actual} entries but the labels cover {expected}")]
    FeatureTooShort {
        feature: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("failed to persist pattern {index}: {source}")]
    Sink {
        index: usize,
        #[source]
        source: BoxError,
    },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to parse configuration: {0}")]
    ConfigFormat(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ProcessError>;
