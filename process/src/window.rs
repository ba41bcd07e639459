//! Duration-bounded sliding windows over frame events.
//!
//! For every start event the sampler probes end events `start + 1`,
//! `start + 1 + stride`, ... (exclusive of the final event). Windows shorter
//! than the minimum are skipped; the first window longer than the maximum ends
//! the search for that start, since spans only grow with the end index.

use std::ops::Range;

use crate::{
    config::SamplingConfig,
    error::{ProcessError, Result},
    features::FeatureTrack,
    frames::FrameEvent,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingBounds {
    pub min_duration: usize,
    pub max_duration: usize,
    pub stride: usize,
}

impl From<&SamplingConfig> for SamplingBounds {
    fn from(config: &SamplingConfig) -> Self {
        Self {
            min_duration: config.min_duration,
            max_duration: config.max_duration,
            stride: config.stride,
        }
    }
}

/// An accepted run of events `start..end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: usize,
    pub end: usize,
    pub first_frame: usize,
    pub span: usize,
}

impl Window {
    pub fn frames(&self) -> Range<usize> {
        self.first_frame..self.first_frame + self.span
    }
}

#[derive(Debug, Clone)]
pub struct WindowSampler<'a> {
    events: &'a [FrameEvent],
    bounds: SamplingBounds,
    start: usize,
    end: usize,
}

impl<'a> WindowSampler<'a> {
    pub fn new(events: &'a [FrameEvent], bounds: SamplingBounds) -> Result<Self> {
        if bounds.stride == 0 {
            return Err(ProcessError::Config("stride must be positive".to_string()));
        }
        Ok(Self {
            events,
            bounds,
            start: 0,
            end: 1,
        })
    }

    fn next_start(&mut self) {
        self.start += 1;
        self.end = self.start + 1;
    }
}

impl Iterator for WindowSampler<'_> {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        let n = self.events.len();

        while self.start < n {
            if self.end >= n {
                self.next_start();
                continue;
            }

            let end = self.end;
            self.end += self.bounds.stride;

            let first_frame = self.events[self.start].position;
            let span = self.events[end - 1].end() - first_frame;

            if span < self.bounds.min_duration {
                continue;
            }
            if span > self.bounds.max_duration {
                self.next_start();
                continue;
            }

            return Some(Window {
                start: self.start,
                end,
                first_frame,
                span,
            });
        }

        None
    }
}

/// One training example, borrowing its feature slices from the source track.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern<'a> {
    pub audio: &'a [f32],
    pub mel: &'a [Vec<f32>],
    pub silence: &'a [u8],
    pub pitch: &'a [f32],
    pub durations: Vec<usize>,
    pub text: Vec<&'a str>,
    pub notes: Vec<i32>,
    pub singer: &'a str,
    pub dataset: &'a str,
}

impl<'a> Pattern<'a> {
    pub fn from_window(
        window: &Window,
        events: &'a [FrameEvent],
        track: &'a FeatureTrack,
        singer: &'a str,
        dataset: &'a str,
    ) -> Self {
        let frames = window.frames();
        let samples = frames.start * track.frame_shift..frames.end * track.frame_shift;
        let covered = &events[window.start..window.end];

        Self {
            audio: &track.audio[samples],
            mel: &track.mel[frames.clone()],
            silence: &track.silence[frames.clone()],
            pitch: &track.pitch[frames],
            durations: covered.iter().map(|event| event.duration).collect(),
            text: covered.iter().map(|event| event.lyric.as_str()).collect(),
            notes: covered.iter().map(|event| event.note).collect(),
            singer,
            dataset,
        }
    }

    pub fn span(&self) -> usize {
        self.mel.len()
    }
}
