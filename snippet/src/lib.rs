//! Cutting performance recordings and their scores into aligned snippets.
//!
//! A recording is split into windows of roughly equal length, the beat annotations are
//! grouped by window, and each group decides which measures (and beats) of the score the
//! window covers.

pub mod annotations;
pub mod bucket;
pub mod error;
pub mod musicxml;
pub mod partition;
pub mod score;
pub mod trim;
pub mod xml;

pub use annotations::{parse_annotations, read_annotations, AnnotationEvent};
pub use bucket::bucketize;
pub use error::SnippetError;
pub use musicxml::{parse_score, read_score, to_musicxml, write_score};
pub use partition::{make_windows, TimeWindow};
pub use score::Score;
pub use trim::{carry_forward, locate_span, trim_score, MeasureSpan};
