use tracing::debug;

use crate::label::TimedEvent;

/// Samples removed from each end of the recording.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Trim {
    pub leading: usize,
    pub trailing: usize,
}

/// Drop a single rest event from each end of the sequence along with its span
/// of audio. Cut lengths truncate to whole samples.
pub fn trim_silence(events: &mut Vec<TimedEvent>, audio: &mut Vec<f32>, sample_rate: u32) -> Trim {
    let mut trim = Trim::default();

    if events.first().is_some_and(TimedEvent::is_rest) {
        let event = events.remove(0);
        trim.leading = seconds_to_samples(event.duration, sample_rate).min(audio.len());
        audio.drain(..trim.leading);
    }

    if events.last().is_some_and(TimedEvent::is_rest) {
        if let Some(event) = events.pop() {
            trim.trailing = seconds_to_samples(event.duration, sample_rate).min(audio.len());
            audio.truncate(audio.len() - trim.trailing);
        }
    }

    debug!(?trim, remaining = audio.len(), "trimmed silence");
    trim
}

fn seconds_to_samples(seconds: f64, sample_rate: u32) -> usize {
    (seconds * sample_rate as f64).max(0.0) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::REST_MARKER;

    fn event(duration: f64, lyric: &str) -> TimedEvent {
        TimedEvent {
            duration,
            lyric: lyric.to_string(),
            note: 0,
        }
    }

    #[test]
    fn trims_both_ends() {
        let mut events = vec![
            event(0.5, REST_MARKER),
            event(1.0, "a"),
            event(1.0, "i"),
            event(0.25, REST_MARKER),
        ];
        let mut audio: Vec<f32> = (0..4000).map(|i| i as f32).collect();

        let trim = trim_silence(&mut events, &mut audio, 1000);

        assert_eq!(trim, Trim { leading: 500, trailing: 250 });
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].lyric, "a");
        assert_eq!(audio.len(), 3250);
        assert_eq!(audio[0], 500.0);
        assert_eq!(*audio.last().unwrap(), 3749.0);
    }

    #[test]
    fn only_one_rest_per_end() {
        let mut events = vec![
            event(0.1, REST_MARKER),
            event(0.1, REST_MARKER),
            event(0.1, "a"),
        ];
        let mut audio = vec![0.0; 1000];

        trim_silence(&mut events, &mut audio, 1000);

        assert_eq!(events.len(), 2);
        assert!(events[0].is_rest());
        assert_eq!(audio.len(), 900);
    }

    #[test]
    fn voiced_ends_are_untouched() {
        let mut events = vec![event(0.1, "a"), event(0.1, "i")];
        let mut audio = vec![0.0; 300];

        let trim = trim_silence(&mut events, &mut audio, 1000);

        assert_eq!(trim, Trim::default());
        assert_eq!(events.len(), 2);
        assert_eq!(audio.len(), 300);
    }

    #[test]
    fn zero_length_trailing_rest_keeps_audio() {
        let mut events = vec![event(0.1, "a"), event(0.0, REST_MARKER)];
        let mut audio = vec![0.0; 300];

        trim_silence(&mut events, &mut audio, 1000);

        assert_eq!(events.len(), 1);
        assert_eq!(audio.len(), 300);
    }

    #[test]
    fn cuts_never_exceed_the_audio() {
        let mut events = vec![event(5.0, REST_MARKER), event(0.1, "a")];
        let mut audio = vec![0.0; 100];

        let trim = trim_silence(&mut events, &mut audio, 1000);

        assert_eq!(trim.leading, 100);
        assert!(audio.is_empty());
    }
}
