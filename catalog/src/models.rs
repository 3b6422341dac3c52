use serde::Deserialize;

use crate::CatalogError;

/// One row of the metadata table. Columns other than these three are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogEntry {
    pub audio_performance: Option<String>,
    pub xml_score: Option<String>,
    pub performance_annotations: Option<String>,
}

/// The three files a row points at, once all of them are known to be present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct References<'a> {
    pub audio: &'a str,
    pub score: &'a str,
    pub annotations: &'a str,
}

impl CatalogEntry {
    pub fn references(&self, row: usize) -> Result<References<'_>, CatalogError> {
        Ok(References {
            audio: present(&self.audio_performance, row, "audio_performance")?,
            score: present(&self.xml_score, row, "xml_score")?,
            annotations: present(&self.performance_annotations, row, "performance_annotations")?,
        })
    }
}

fn present<'a>(
    value: &'a Option<String>,
    row: usize,
    field: &'static str,
) -> Result<&'a str, CatalogError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|path| !path.is_empty())
        .ok_or(CatalogError::MissingReference { row, field })
}
