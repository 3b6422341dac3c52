//! Aligning annotation buckets to score measures and cutting the score to a window.

use serde::Serialize;
use tracing::{debug, instrument};

use crate::{AnnotationEvent, Score, SnippetError};

/// The score region covered by one window. Measures are 1-based ordinals, beats 1-based
/// within their measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MeasureSpan {
    pub start_measure: usize,
    pub start_beat: u32,
    pub end_measure: usize,
    /// Last beat reached in the end measure, when the window crosses at least one downbeat.
    pub end_beat: Option<u32>,
}

impl MeasureSpan {
    /// Whole measures only, no beat level cuts.
    pub fn measures(start_measure: usize, end_measure: usize) -> Self {
        Self {
            start_measure,
            start_beat: 1,
            end_measure,
            end_beat: None,
        }
    }
}

/// A recording whose first event is not a downbeat opens with a pickup measure, which shifts
/// every downbeat's measure up by one.
fn pickup(buckets: &[Vec<AnnotationEvent>]) -> usize {
    match buckets.iter().flatten().next() {
        Some(first) if !first.is_downbeat() => 1,
        _ => 0,
    }
}

/// The measure still open when window `index` begins.
fn open_measure(buckets: &[Vec<AnnotationEvent>], index: usize) -> usize {
    let downbeats = buckets[..index]
        .iter()
        .flatten()
        .filter(|event| event.is_downbeat())
        .count();
    pickup(buckets) + downbeats
}

/// Beat within the open measure at which window `index` begins: two plus the beats seen since
/// the last downbeat. Without any earlier downbeat the position is unknown and no cut is made.
fn resume_beat(buckets: &[Vec<AnnotationEvent>], index: usize) -> u32 {
    let mut beat = 2;
    for event in buckets[..index].iter().rev().flat_map(|bucket| bucket.iter().rev()) {
        if event.is_downbeat() {
            return beat;
        }
        beat += 1;
    }
    1
}

/// Works out the measures and beats window `index` spans from the downbeats before and inside it.
/// The final window never cuts its end measure.
///
/// Fails with [`SnippetError::AlignmentAmbiguity`] when the window holds no events;
/// [`carry_forward`] gives the fallback span for that case.
#[instrument(skip(buckets), level = "trace")]
pub fn locate_span(
    buckets: &[Vec<AnnotationEvent>],
    index: usize,
) -> Result<MeasureSpan, SnippetError> {
    let bucket = &buckets[index];
    let first = bucket
        .first()
        .ok_or(SnippetError::AlignmentAmbiguity { window: index })?;

    let open = open_measure(buckets, index);
    let (start_measure, start_beat) = if first.is_downbeat() {
        (open + 1, 1)
    } else if index == 0 {
        (open.max(1), 1)
    } else {
        (open.max(1), resume_beat(buckets, index))
    };

    let mut end_measure = start_measure;
    let mut end_beat = None;
    for event in &bucket[1..] {
        if event.is_downbeat() {
            end_measure += 1;
            end_beat = Some(1);
        } else if let Some(beat) = end_beat.as_mut() {
            *beat += 1;
        }
    }

    // the last window runs to the end of the recording, so its final measure is kept whole
    if index + 1 == buckets.len() {
        end_beat = None;
    }

    let span = MeasureSpan {
        start_measure,
        start_beat,
        end_measure,
        end_beat,
    };
    debug!(window = index, ?span, "located span");
    Ok(span)
}

/// Span for a window without events: the measure the previous window ended in, uncut.
pub fn carry_forward(buckets: &[Vec<AnnotationEvent>], index: usize) -> MeasureSpan {
    let open = open_measure(buckets, index).max(1);
    MeasureSpan::measures(open, open)
}

/// Copies the measures in `span` and blanks the beats outside it.
///
/// Leading beats of the start measure become one rest; beats after `end_beat` in the end
/// measure are dropped and rested to the barline. `score` itself is left untouched.
#[instrument(skip(score), level = "debug")]
pub fn trim_score(score: &Score, span: &MeasureSpan) -> Result<Score, SnippetError> {
    let mut snippet = score.measures(span.start_measure, span.end_measure)?;

    if span.start_beat > 1 {
        snippet.clear_before(span.start_measure, span.start_beat - 1);
    }
    if let Some(end_beat) = span.end_beat {
        snippet.clear_after(span.end_measure, end_beat);
    }

    Ok(snippet)
}
