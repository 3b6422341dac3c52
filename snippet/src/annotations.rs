use std::path::Path;

use serde::Serialize;
use tracing::{debug, instrument};

use crate::SnippetError;

/// A single beat marker from a performance annotation log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotationEvent {
    /// Seconds from the start of the recording.
    pub timestamp: f64,
    pub label: String,
}

impl AnnotationEvent {
    pub fn new(timestamp: f64, label: impl Into<String>) -> Self {
        Self {
            timestamp,
            label: label.into(),
        }
    }

    /// Downbeats open a new measure; everything else is an intermediate beat.
    pub fn is_downbeat(&self) -> bool {
        self.label.starts_with("db")
    }
}

#[instrument(level = "debug")]
pub fn read_annotations(path: &Path) -> Result<Vec<AnnotationEvent>, SnippetError> {
    let text = std::fs::read_to_string(path)?;
    let events = parse_annotations(&text)?;
    debug!(n_events = events.len(), "read annotations");
    Ok(events)
}

/// Parses a tab separated label track: `start<TAB>end<TAB>label`.
/// The second column is taken as the event time.
pub fn parse_annotations(text: &str) -> Result<Vec<AnnotationEvent>, SnippetError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(text.as_bytes());

    let mut events = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| SnippetError::AnnotationParse {
            line: e.position().map_or(0, |position| position.line() as usize),
            reason: e.to_string(),
        })?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        let line = record
            .position()
            .map_or(0, |position| position.line() as usize);
        events.push(parse_record(line, &record)?);
    }
    Ok(events)
}

fn parse_record(line: usize, record: &csv::StringRecord) -> Result<AnnotationEvent, SnippetError> {
    let (Some(timestamp), Some(label)) = (record.get(1), record.get(2)) else {
        return Err(SnippetError::AnnotationParse {
            line,
            reason: format!("expected 3 tab separated fields, found {}", record.len()),
        });
    };

    let timestamp = timestamp
        .trim()
        .parse::<f64>()
        .map_err(|e| SnippetError::AnnotationParse {
            line,
            reason: format!("bad timestamp {:?}: {e}", timestamp.trim()),
        })?;

    Ok(AnnotationEvent::new(timestamp, label.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_label_track() {
        let text = "0.5\t0.5\tdb,4/4,2\n1.0\t1.0\tb\n1.5\t1.5\tb\r\n2.0\t2.0\tdb\n";
        let events = parse_annotations(text).unwrap();

        assert_eq!(events.len(), 4);
        assert_eq!(events[0], AnnotationEvent::new(0.5, "db,4/4,2"));
        assert_eq!(events[2], AnnotationEvent::new(1.5, "b"));
        assert!(events[0].is_downbeat());
        assert!(!events[1].is_downbeat());
        assert!(events[3].is_downbeat());
    }

    #[test]
    fn uses_second_column_as_timestamp() {
        let events = parse_annotations("0.1\t0.2\tb\n").unwrap();
        assert_eq!(events[0].timestamp, 0.2);
    }

    #[test]
    fn skips_blank_lines() {
        let events = parse_annotations("\n0.0\t0.0\tdb\n\n").unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn short_line_is_fatal() {
        let err = parse_annotations("0.0\t0.0\tdb\n1.0\t1.0\n").unwrap_err();
        match err {
            SnippetError::AnnotationParse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn labels_may_contain_quotes_and_commas() {
        let events = parse_annotations("0.0\t0.0\tdb,3/4,\"x\"\n").unwrap();
        assert_eq!(events[0].label, "db,3/4,\"x\"");
    }

    #[test]
    fn bad_timestamp_is_fatal() {
        let err = parse_annotations("0.0\tsoon\tdb\n").unwrap_err();
        assert!(matches!(err, SnippetError::AnnotationParse { line: 1, .. }));
    }

    #[test]
    fn reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0.0\t0.0\tdb").unwrap();
        writeln!(file, "0.5\t0.5\tb").unwrap();

        let events = read_annotations(file.path()).unwrap();
        assert_eq!(events.len(), 2);
    }
}
