//! Transfer note numbers from a note label onto a phoneme-level mono label.
//!
//! The two sequences are aligned with a DTW-style table whose local cost is
//! the start time difference plus a fixed penalty for differing lyrics, then
//! walked back from the end, copying the note of each aligned note label.

use std::path::Path;

use tracing::warn;

use crate::{
    error::{LabelError, ProcessError, Result},
    label::{LabelEvent, PAUSE_LYRIC, REST_MARKER},
};

const LYRIC_MISMATCH_COST: f64 = 10.0;
const NON_VOICED: [&str; 2] = [PAUSE_LYRIC, "br"];

#[derive(Debug, Clone, PartialEq)]
pub struct MonoLabel {
    pub start_time: f64,
    pub end_time: f64,
    pub lyric: String,
    pub note: Option<i32>,
    exact_match: bool,
}

impl MonoLabel {
    fn assign(&mut self, source: &LabelEvent) {
        self.note = Some(source.note);
        self.exact_match = same_lyric(&self.lyric, &source.lyric);
    }
}

fn same_lyric(a: &str, b: &str) -> bool {
    fn canonical(lyric: &str) -> &str {
        match lyric {
            PAUSE_LYRIC => REST_MARKER,
            other => other,
        }
    }
    canonical(a) == canonical(b)
}

/// Parse `start end lyric` lines, times in seconds.
pub fn parse_mono_labels(content: &str, path: &Path) -> Result<Vec<MonoLabel>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| {
            parse_mono_line(line).map_err(|source| ProcessError::Label {
                path: path.to_path_buf(),
                line: number + 1,
                source,
            })
        })
        .collect()
}

fn parse_mono_line(line: &str) -> std::result::Result<MonoLabel, LabelError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let [start, end, lyric] = fields.as_slice() else {
        return Err(LabelError::MonoFieldCount(fields.len()));
    };
    let time = |field: &str| {
        field
            .parse::<f64>()
            .map_err(|_| LabelError::Time(field.to_string()))
    };

    Ok(MonoLabel {
        start_time: time(start)?,
        end_time: time(end)?,
        lyric: lyric.to_string(),
        note: None,
        exact_match: false,
    })
}

/// Fill in `note` on every mono label. Non-voiced labels always get `0`;
/// labels the alignment could not reach default to `0` with a warning.
pub fn match_notes(mono: &mut [MonoLabel], notes: &[LabelEvent]) {
    let (n_mono, n_note) = (mono.len(), notes.len());

    let mut dp = vec![vec![f64::INFINITY; n_note + 1]; n_mono + 1];
    dp.iter_mut().for_each(|row| row[0] = 0.0);
    dp[0].iter_mut().for_each(|cell| *cell = 0.0);

    for j in 0..n_note {
        for i in 0..n_mono {
            let best = dp[i][j + 1].min(dp[i + 1][j]).min(dp[i][j]);
            let lyric_cost = match same_lyric(&mono[i].lyric, &notes[j].lyric) {
                true => 0.0,
                false => LYRIC_MISMATCH_COST,
            };
            let time_cost = (mono[i].start_time - notes[j].start_time).abs();
            dp[i + 1][j + 1] = time_cost + lyric_cost + best;
        }
    }

    let (mut x, mut y) = (n_mono, n_note);
    while x != 0 && y != 0 {
        let left = dp[x - 1][y];
        let below = dp[x][y - 1];
        let diagonal = dp[x - 1][y - 1];

        if left < below && left < diagonal {
            if mono[x - 1].note.is_none() {
                mono[x - 1].assign(&notes[y - 1]);
            }
            x -= 1;
            continue;
        }

        if below < diagonal {
            if !mono[x - 1].exact_match {
                mono[x - 1].assign(&notes[y - 1]);
            }
            y -= 1;
            if y == 0 {
                break;
            }
            if !mono[x - 1].exact_match {
                mono[x - 1].assign(&notes[y - 1]);
            }
            continue;
        }

        if !mono[x - 1].exact_match {
            mono[x - 1].assign(&notes[y - 1]);
        }
        x -= 1;
        y -= 1;
    }

    for label in mono.iter_mut() {
        if NON_VOICED.contains(&label.lyric.as_str()) {
            label.note = Some(0);
            continue;
        }
        if label.note.is_none() {
            warn!(
                start = label.start_time,
                lyric = %label.lyric,
                "no note matched, defaulting to 0"
            );
            label.note = Some(0);
        }
    }
}

/// Render matched labels as `start,end,lyric,note` lines.
pub fn format_matched(mono: &[MonoLabel]) -> String {
    mono.iter()
        .map(|label| {
            format!(
                "{},{},{},{}",
                label.start_time,
                label.end_time,
                label.lyric,
                label.note.unwrap_or(0)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
