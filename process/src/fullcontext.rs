//! Conversion of Sinsy full-context labels into note label files.
//!
//! Each full-context line is `start end context`, times in units of 100 ns.
//! The current phoneme sits between the first `-` and the following `+` of
//! the context and the note name is the leading part of the `/E:` field.

use std::path::Path;

use crate::{
    error::{LabelError, ProcessError, Result},
    label::{LabelEvent, PAUSE_LYRIC},
};

const TIME_UNIT: f64 = 1.0e-7;
const NOTE_STEPS: &str = "C_D_EF_G_A_B";

/// Note number for names like `C4`, `Eb3` or `xx` (no note, `0`).
pub fn parse_note_name(name: &str) -> std::result::Result<i32, LabelError> {
    if name == "xx" {
        return Ok(0);
    }
    let invalid = || LabelError::NoteName(name.to_string());

    let mut chars = name.chars();
    let step = chars
        .next()
        .filter(|c| ('A'..='G').contains(c))
        .and_then(|c| NOTE_STEPS.find(c))
        .ok_or_else(invalid)?;
    let mut note = 24 + step as i32;
    let mut rest = chars.as_str();
    if let Some(natural) = rest.strip_prefix('b') {
        note -= 1;
        rest = natural;
    }
    let octave = match rest.as_bytes() {
        [digit] if digit.is_ascii_digit() => (digit - b'0') as i32,
        _ => return Err(invalid()),
    };
    note += 12 * octave;
    Ok(note)
}

/// The leading `[A-G]b?[0-9]` of a `/E:` field.
fn note_name_prefix(field: &str) -> Option<&str> {
    let bytes = field.as_bytes();
    if !bytes.first().is_some_and(|b| (b'A'..=b'G').contains(b)) {
        return None;
    }
    let flat = usize::from(bytes.get(1) == Some(&b'b'));
    let octave = 1 + flat;
    bytes
        .get(octave)
        .filter(|b| b.is_ascii_digit())
        .map(|_| &field[..=octave])
}

fn parse_line(line: &str) -> std::result::Result<LabelEvent, LabelError> {
    let mut fields = line.split_whitespace();
    let (Some(start), Some(_end), Some(context)) = (fields.next(), fields.next(), fields.next())
    else {
        return Err(LabelError::FullContext);
    };
    if !start.bytes().all(|b| b.is_ascii_digit()) {
        return Err(LabelError::FullContext);
    }
    let start: f64 = start.parse().map_err(|_| LabelError::FullContext)?;

    let phoneme = context
        .split_once('^')
        .and_then(|(_, rest)| rest.split_once('-'))
        .and_then(|(_, rest)| rest.split_once('+'))
        .map(|(phoneme, _)| phoneme)
        .filter(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_alphabetic()))
        .ok_or(LabelError::FullContext)?;

    let note_field = context
        .split_once("/E:")
        .map(|(_, rest)| rest)
        .ok_or(LabelError::FullContext)?;
    let note_name = match note_field.starts_with("xx") {
        true => "xx",
        false => note_name_prefix(note_field).ok_or_else(|| {
            let name = note_field.split(']').next().unwrap_or(note_field);
            LabelError::NoteName(name.to_string())
        })?,
    };

    let lyric = match phoneme {
        "xx" | "sil" => PAUSE_LYRIC,
        other => other,
    };

    Ok(LabelEvent {
        start_time: start * TIME_UNIT,
        lyric: lyric.to_string(),
        note: parse_note_name(note_name)?,
    })
}

/// Convert full-context label text to events. Runs of pauses collapse to
/// their first entry.
pub fn convert_full_context(content: &str, path: &Path) -> Result<Vec<LabelEvent>> {
    let mut events = Vec::new();
    let mut last_pause = false;

    for (number, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let event = parse_line(line).map_err(|source| ProcessError::Label {
            path: path.to_path_buf(),
            line: number + 1,
            source,
        })?;

        let is_pause = event.lyric == PAUSE_LYRIC;
        if is_pause && last_pause {
            continue;
        }
        last_pause = is_pause;
        events.push(event);
    }

    Ok(events)
}

/// Render events as `start,lyric,note` lines.
pub fn format_note_labels(events: &[LabelEvent]) -> String {
    events
        .iter()
        .map(|event| format!("{},{},{}", event.start_time, event.lyric, event.note))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
0 5000000 xx@xx^xx-sil+k=i_xx%xx^00_00~00-1!1[xx$xx]xx/A:xx-xx-xx@xx~xx/B:1_1_1@xx|xx/C:2+1+1@JPN&0/D:xx!xx#xx$xx%xx|xx&xx;xx-xx/E:xx]xx^0=4/4~100!1@240#96+xx]1$1|0[24&0]96=0^100~xx#xx_xx;xx$xx&xx%xx[xx|0]0-n^xx+xx~xx=xx@xx$xx!xx%xx#xx|xx|xx-xx&xx&xx+xx[xx;xx]xx;xx~xx~xx^xx^xx@xx[xx#xx=xx!xx~xx+xx!xx^xx
5000000 5500000 xx@sil^k-i+r=i_xx%xx^00_00~00-1!1[xx$xx]xx/A:xx-xx-xx@xx~xx/B:1_1_1@xx|xx/C:2+1+1@JPN&0/D:xx!xx#xx$xx%xx|xx&xx;xx-xx/E:A4]xx^0=4/4~100!1@240#96+xx]1$1|0[24&0]96=0^100~xx
5500000 9000000 xx@k^i-r+i=pau_xx%xx^00_00~00-1!1[xx$xx]xx/A:xx-xx-xx@xx~xx/B:1_1_1@xx|xx/C:2+1+1@JPN&0/D:xx!xx#xx$xx%xx|xx&xx;xx-xx/E:Bb3]xx^0=4/4~100
9000000 9500000 xx@i^r-pau+sil=xx_xx%xx^00_00~00-1!1[xx$xx]xx/E:xx]xx^0=4/4~100
9500000 9900000 xx@r^pau-sil+xx=xx_xx%xx^00_00~00-1!1[xx$xx]xx/E:xx]xx^0=4/4~100
";

    #[test]
    fn note_names() {
        assert_eq!(parse_note_name("xx").unwrap(), 0);
        assert_eq!(parse_note_name("C4").unwrap(), 72);
        assert_eq!(parse_note_name("A4").unwrap(), 81);
        assert_eq!(parse_note_name("Bb3").unwrap(), 70);
        assert!(parse_note_name("H2").is_err());
        assert!(parse_note_name("Cx").is_err());
        assert!(parse_note_name("C").is_err());
        assert!(parse_note_name("Cbb4").is_err());
        assert!(parse_note_name("C45").is_err());
    }

    #[test]
    fn note_field_takes_one_flat_and_one_octave_digit() {
        assert_eq!(note_name_prefix("Bb3]xx^0"), Some("Bb3"));
        assert_eq!(note_name_prefix("C45]xx"), Some("C4"));
        assert_eq!(note_name_prefix("Ebb4]xx"), None);
        assert_eq!(note_name_prefix("D]xx"), None);
        assert_eq!(note_name_prefix("b4"), None);
    }

    #[test]
    fn converts_and_collapses_pauses() {
        let events = convert_full_context(SAMPLE, Path::new("01.lab")).unwrap();
        let lyrics: Vec<&str> = events.iter().map(|e| e.lyric.as_str()).collect();
        assert_eq!(lyrics, vec!["pau", "i", "r", "pau"]);
        assert_eq!(events[1].note, 81);
        assert_eq!(events[2].note, 70);
        assert_eq!(events[1].start_time, 5_000_000.0 * TIME_UNIT);
    }

    #[test]
    fn output_is_readable_as_note_labels() {
        let events = convert_full_context(SAMPLE, Path::new("01.lab")).unwrap();
        let text = format_note_labels(&events);
        assert!(text.starts_with("0,pau,0\n"));

        let parsed = crate::label::parse_labels(&text, Path::new("01.txt")).unwrap();
        assert_eq!(parsed.len(), events.len());
        assert!(parsed[0].is_rest());
        assert_eq!(parsed[1].lyric, "i");
    }

    #[test]
    fn malformed_note_field_is_reported() {
        let line = "0 10 xx@xx^k-a+xx=xx/E:Cbb4]xx^0\n";
        let err = convert_full_context(line, Path::new("bad.lab")).unwrap_err();
        assert!(matches!(
            err,
            ProcessError::Label {
                source: LabelError::NoteName(ref name),
                ..
            } if name == "Cbb4"
        ));
    }

    #[test]
    fn garbage_line_is_reported() {
        let err = convert_full_context("0 10 nonsense\n", Path::new("bad.lab")).unwrap_err();
        assert!(matches!(err, ProcessError::Label { line: 1, .. }));
    }
}
