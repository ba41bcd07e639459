use serde::{Deserialize, Serialize};

use crate::frames::FrameEvent;

/// Inclusive `[min, max]` range of observed values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extent<T> {
    pub min: T,
    pub max: T,
}

impl<T: Copy + Ord> Extent<T> {
    pub fn point(value: T) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    pub fn include(self, value: T) -> Self {
        Self {
            min: self.min.min(value),
            max: self.max.max(value),
        }
    }

    pub fn union(self, other: Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

fn include<T: Copy + Ord>(extent: Option<Extent<T>>, value: T) -> Option<Extent<T>> {
    Some(match extent {
        Some(extent) => extent.include(value),
        None => Extent::point(value),
    })
}

fn union<T: Copy + Ord>(a: Option<Extent<T>>, b: Option<Extent<T>>) -> Option<Extent<T>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.union(b)),
        (a, b) => a.or(b),
    }
}

/// Range of accepted window spans (frames) and of note numbers seen across a
/// corpus. Merging is associative and commutative so per-source results can
/// be reduced in any order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusStats {
    pub duration: Option<Extent<usize>>,
    pub note: Option<Extent<i32>>,
}

impl CorpusStats {
    pub fn record_span(&mut self, span: usize) {
        self.duration = include(self.duration, span);
    }

    pub fn record_notes(&mut self, events: &[FrameEvent]) {
        for event in events {
            self.note = include(self.note, event.note);
        }
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            duration: union(self.duration, other.duration),
            note: union(self.note, other.note),
        }
    }
}
