use std::path::Path;

use thiserror::Error;
use tracing::{debug, instrument};

pub mod models;

pub use models::{CatalogEntry, References};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed catalog: {0}")]
    Csv(#[from] csv::Error),

    #[error("row {row} has no {field}")]
    MissingReference { row: usize, field: &'static str },
}

impl CatalogError {
    /// A row without a recording is skipped rather than reported as a failure.
    pub fn is_missing_audio(&self) -> bool {
        matches!(
            self,
            CatalogError::MissingReference {
                field: "audio_performance",
                ..
            }
        )
    }
}

/// The metadata table, loaded in full. Read-only for the lifetime of a run.
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    #[instrument(level = "debug")]
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self, CatalogError> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let entries = reader
            .deserialize()
            .collect::<Result<Vec<CatalogEntry>, _>>()?;
        debug!(n_rows = entries.len(), "loaded catalog");

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
