use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnippetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Annotation parse error at line {line}: {reason}")]
    AnnotationParse { line: usize, reason: String },

    #[error("Invalid score XML: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("Failed to write score: {0}")]
    XmlWrite(#[from] quick_xml::Error),

    #[error("Unsupported score: {0}")]
    UnsupportedScore(String),

    #[error("Measure {measure} is beyond the end of the score ({available} measures)")]
    MeasureOutOfRange { measure: usize, available: usize },

    #[error("No annotation events fall inside window {window}")]
    AlignmentAmbiguity { window: usize },
}
