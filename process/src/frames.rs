//! Time-domain to frame-domain conversion.
//!
//! Each event's duration is rounded to whole samples and then split into
//! whole frames; the sub-frame residue is carried into the next event so the
//! total frame count never drifts from the total sample count, the same way
//! a line rasterizer carries its error term.

use crate::{
    error::{ProcessError, Result},
    label::TimedEvent,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameEvent {
    /// First frame of the event, the sum of all previous durations.
    pub position: usize,
    /// Length in frames. May be zero for events shorter than one hop.
    pub duration: usize,
    pub lyric: String,
    pub note: i32,
}

impl FrameEvent {
    pub fn end(&self) -> usize {
        self.position + self.duration
    }
}

#[derive(Debug, Clone)]
pub struct FrameRateConverter {
    sample_rate: u32,
    frame_shift: usize,
    remainder: usize,
    position: usize,
}

impl FrameRateConverter {
    pub fn new(sample_rate: u32, frame_shift: usize) -> Result<Self> {
        if frame_shift == 0 {
            return Err(ProcessError::Config("frame_shift must be positive".to_string()));
        }
        Ok(Self {
            sample_rate,
            frame_shift,
            remainder: 0,
            position: 0,
        })
    }

    /// Convert the next duration (seconds), returning `(position, frames)`.
    pub fn advance(&mut self, seconds: f64) -> (usize, usize) {
        let samples = (seconds * self.sample_rate as f64).round().max(0.0) as usize;
        let raw = samples + self.remainder;
        self.remainder = raw % self.frame_shift;
        let frames = raw / self.frame_shift;

        let position = self.position;
        self.position += frames;
        (position, frames)
    }

    /// Samples carried over that have not yet added up to a frame.
    pub fn remainder(&self) -> usize {
        self.remainder
    }

    /// Frames emitted so far.
    pub fn position(&self) -> usize {
        self.position
    }
}

pub fn to_frame_events(
    events: &[TimedEvent],
    sample_rate: u32,
    frame_shift: usize,
) -> Result<Vec<FrameEvent>> {
    let mut converter = FrameRateConverter::new(sample_rate, frame_shift)?;
    let frames = events
        .iter()
        .map(|event| {
            let (position, duration) = converter.advance(event.duration);
            FrameEvent {
                position,
                duration,
                lyric: event.lyric.clone(),
                note: event.note,
            }
        })
        .collect();
    Ok(frames)
}

/// Frames covered by the whole event sequence.
pub fn total_span(events: &[FrameEvent]) -> usize {
    events.last().map(FrameEvent::end).unwrap_or(0)
}
