//! Note label files: one `start_time,lyric,note` event per line.

use std::path::Path;

use tracing::{debug, instrument};

use crate::error::{LabelError, ProcessError, Result};

/// Lyric the label tooling writes for a rest.
pub const PAUSE_LYRIC: &str = "pau";
/// Canonical rest marker carried through to the patterns.
pub const REST_MARKER: &str = "<X>";

#[derive(Debug, Clone, PartialEq)]
pub struct LabelEvent {
    /// Seconds from the start of the recording.
    pub start_time: f64,
    pub lyric: String,
    pub note: i32,
}

impl LabelEvent {
    pub fn is_rest(&self) -> bool {
        self.lyric == REST_MARKER
    }
}

/// Parse a single label line. Rests are normalized to [`REST_MARKER`].
pub fn parse_line(line: &str) -> std::result::Result<LabelEvent, LabelError> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    let [start, lyric, note] = fields.as_slice() else {
        return Err(LabelError::FieldCount(fields.len()));
    };

    let start_time = start
        .parse::<f64>()
        .ok()
        .filter(|t| t.is_finite() && *t >= 0.0)
        .ok_or_else(|| LabelError::StartTime(start.to_string()))?;
    let note = note
        .parse::<i32>()
        .map_err(|_| LabelError::Note(note.to_string()))?;
    let lyric = if *lyric == PAUSE_LYRIC {
        REST_MARKER.to_string()
    } else {
        lyric.to_string()
    };

    Ok(LabelEvent {
        start_time,
        lyric,
        note,
    })
}

/// Parse the contents of a label file. Blank lines are ignored; `path` is
/// only used to annotate errors.
pub fn parse_labels(content: &str, path: &Path) -> Result<Vec<LabelEvent>> {
    let mut events: Vec<LabelEvent> = Vec::new();

    for (number, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let label_error = |source: LabelError| ProcessError::Label {
            path: path.to_path_buf(),
            line: number + 1,
            source,
        };

        let event = parse_line(line).map_err(label_error)?;
        if let Some(previous) = events.last() {
            if event.start_time <= previous.start_time {
                return Err(label_error(LabelError::NotIncreasing {
                    previous: previous.start_time,
                    current: event.start_time,
                }));
            }
        }
        events.push(event);
    }

    if events.is_empty() {
        return Err(ProcessError::EmptyLabel(path.to_path_buf()));
    }

    Ok(events)
}

#[instrument(level = "debug")]
pub fn read_labels(path: &Path) -> Result<Vec<LabelEvent>> {
    let content = std::fs::read_to_string(path).map_err(|source| ProcessError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let events = parse_labels(&content, path)?;
    debug!(events = events.len(), "read labels");
    Ok(events)
}

/// A label event with its time-domain duration resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedEvent {
    /// Seconds.
    pub duration: f64,
    pub lyric: String,
    pub note: i32,
}

impl TimedEvent {
    pub fn is_rest(&self) -> bool {
        self.lyric == REST_MARKER
    }
}

/// Resolve durations. Each event carries the gap since the previous event's
/// start; the first one measures from zero.
pub fn timed_events(events: Vec<LabelEvent>) -> Vec<TimedEvent> {
    let mut previous = 0.0;
    events
        .into_iter()
        .map(|event| {
            let duration = event.start_time - previous;
            previous = event.start_time;
            TimedEvent {
                duration,
                lyric: event.lyric,
                note: event.note,
            }
        })
        .collect()
}
