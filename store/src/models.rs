use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use svs_process::{config::SoundConfig, Pattern};

use crate::StoreError;

pub const PATTERN_VERSION: u32 = 1;

pub const AUDIO: &str = "Audio";
pub const MEL: &str = "Mel";
pub const SILENCE: &str = "Silence";
pub const PITCH: &str = "Pitch";
pub const DURATION: &str = "Duration";
pub const TEXT: &str = "Text";
pub const NOTE: &str = "Note";
pub const SINGER: &str = "Singer";
pub const DATASET: &str = "Dataset";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Field {
    F32Array { shape: Vec<u64>, data: Vec<f32> },
    U8Array(Vec<u8>),
    IntList(Vec<i64>),
    StrList(Vec<String>),
    Str(String),
}

impl Field {
    fn kind(&self) -> &'static str {
        match self {
            Field::F32Array { .. } => "f32 array",
            Field::U8Array(_) => "u8 array",
            Field::IntList(_) => "int list",
            Field::StrList(_) => "string list",
            Field::Str(_) => "string",
        }
    }
}

/// What actually lands on disk: a version tag and named fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternFile {
    pub version: u32,
    pub fields: BTreeMap<String, Field>,
}

impl From<&Pattern<'_>> for PatternFile {
    fn from(pattern: &Pattern<'_>) -> Self {
        let mel_dim = pattern.mel.first().map_or(0, Vec::len);
        let fields = [
            (
                AUDIO,
                Field::F32Array {
                    shape: vec![pattern.audio.len() as u64],
                    data: pattern.audio.to_vec(),
                },
            ),
            (
                MEL,
                Field::F32Array {
                    shape: vec![pattern.mel.len() as u64, mel_dim as u64],
                    data: pattern.mel.concat(),
                },
            ),
            (SILENCE, Field::U8Array(pattern.silence.to_vec())),
            (
                PITCH,
                Field::F32Array {
                    shape: vec![pattern.pitch.len() as u64],
                    data: pattern.pitch.to_vec(),
                },
            ),
            (
                DURATION,
                Field::IntList(pattern.durations.iter().map(|&d| d as i64).collect()),
            ),
            (
                TEXT,
                Field::StrList(pattern.text.iter().map(|t| t.to_string()).collect()),
            ),
            (
                NOTE,
                Field::IntList(pattern.notes.iter().map(|&n| n as i64).collect()),
            ),
            (SINGER, Field::Str(pattern.singer.to_string())),
            (DATASET, Field::Str(pattern.dataset.to_string())),
        ];

        Self {
            version: PATTERN_VERSION,
            fields: fields
                .into_iter()
                .map(|(name, field)| (name.to_string(), field))
                .collect(),
        }
    }
}

/// A pattern file that passed schema validation.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternRecord {
    pub audio: Vec<f32>,
    /// Row-major, `frames` rows of `mel_dim` values.
    pub mel: Vec<f32>,
    pub mel_dim: usize,
    pub silence: Vec<u8>,
    pub pitch: Vec<f32>,
    pub durations: Vec<i64>,
    pub text: Vec<String>,
    pub notes: Vec<i64>,
    pub singer: String,
    pub dataset: String,
}

impl PatternRecord {
    pub fn frames(&self) -> usize {
        self.silence.len()
    }
}

struct Fields(BTreeMap<String, Field>);

impl Fields {
    fn take(&mut self, name: &'static str) -> Result<Field, StoreError> {
        self.0.remove(name).ok_or(StoreError::MissingField(name))
    }

    fn array(&mut self, name: &'static str, dims: usize) -> Result<(Vec<u64>, Vec<f32>), StoreError> {
        match self.take(name)? {
            Field::F32Array { shape, data } => {
                let expected = shape.iter().try_fold(1u64, |total, &dim| total.checked_mul(dim));
                if shape.len() != dims || expected != Some(data.len() as u64) {
                    return Err(StoreError::Shape {
                        field: name,
                        shape,
                        len: data.len(),
                    });
                }
                Ok((shape, data))
            }
            other => Err(wrong_type(name, "f32 array", &other)),
        }
    }

    fn ints(&mut self, name: &'static str) -> Result<Vec<i64>, StoreError> {
        match self.take(name)? {
            Field::IntList(values) => Ok(values),
            other => Err(wrong_type(name, "int list", &other)),
        }
    }

    fn string(&mut self, name: &'static str) -> Result<String, StoreError> {
        match self.take(name)? {
            Field::Str(value) => Ok(value),
            other => Err(wrong_type(name, "string", &other)),
        }
    }
}

fn wrong_type(field: &'static str, expected: &'static str, found: &Field) -> StoreError {
    StoreError::FieldType {
        field,
        expected,
        found: found.kind(),
    }
}

impl TryFrom<PatternFile> for PatternRecord {
    type Error = StoreError;

    fn try_from(file: PatternFile) -> Result<Self, Self::Error> {
        if file.version != PATTERN_VERSION {
            return Err(StoreError::Version(file.version));
        }
        let mut fields = Fields(file.fields);

        let (_, audio) = fields.array(AUDIO, 1)?;
        let (mel_shape, mel) = fields.array(MEL, 2)?;
        let (_, pitch) = fields.array(PITCH, 1)?;
        let silence = match fields.take(SILENCE)? {
            Field::U8Array(values) => values,
            other => return Err(wrong_type(SILENCE, "u8 array", &other)),
        };
        let text = match fields.take(TEXT)? {
            Field::StrList(values) => values,
            other => return Err(wrong_type(TEXT, "string list", &other)),
        };

        let record = Self {
            audio,
            mel,
            mel_dim: mel_shape[1] as usize,
            silence,
            pitch,
            durations: fields.ints(DURATION)?,
            text,
            notes: fields.ints(NOTE)?,
            singer: fields.string(SINGER)?,
            dataset: fields.string(DATASET)?,
        };

        let frames = mel_shape[0] as usize;
        let span: i64 = record.durations.iter().sum();
        if record.silence.len() != frames
            || record.pitch.len() != frames
            || span != frames as i64
        {
            return Err(StoreError::Inconsistent(format!(
                "{frames} mel frames, {} silence, {} pitch, durations sum to {span}",
                record.silence.len(),
                record.pitch.len(),
            )));
        }
        let events = record.durations.len();
        if record.text.len() != events || record.notes.len() != events {
            return Err(StoreError::Inconsistent(format!(
                "{events} durations, {} lyrics, {} notes",
                record.text.len(),
                record.notes.len(),
            )));
        }

        Ok(record)
    }
}

/// Length index over every pattern of one split, keyed by the `/`-separated
/// path relative to the split root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub sound: SoundConfig,
    pub file_list: Vec<String>,
    /// Samples per pattern.
    pub audio_length: BTreeMap<String, u64>,
    /// Frames per pattern.
    pub mel_length: BTreeMap<String, u64>,
    /// Events per pattern.
    pub music_length: BTreeMap<String, u64>,
}

impl Metadata {
    pub fn new(sound: SoundConfig) -> Self {
        Self {
            sound,
            file_list: Vec::new(),
            audio_length: BTreeMap::new(),
            mel_length: BTreeMap::new(),
            music_length: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, key: String, record: &PatternRecord) {
        self.audio_length.insert(key.clone(), record.audio.len() as u64);
        self.mel_length.insert(key.clone(), record.frames() as u64);
        self.music_length.insert(key.clone(), record.durations.len() as u64);
        self.file_list.push(key);
    }

    pub fn len(&self) -> usize {
        self.file_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file_list.is_empty()
    }
}
