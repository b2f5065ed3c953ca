use std::path::PathBuf;

use engine_logging::engine_debug;
use harvester_core::ResolvedRecord;

use crate::collab::{CollaboratorError, RecordSink};
use crate::filename::record_filename;
use crate::persist::AtomicFileWriter;

/// Stores each record as a pretty JSON document named after its label.
///
/// Saving the same label again replaces the file, so repeated deliveries are harmless.
#[derive(Debug, Clone)]
pub struct JsonDirSink {
    writer: AtomicFileWriter,
}

impl JsonDirSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            writer: AtomicFileWriter::new(dir.into()),
        }
    }
}

#[async_trait::async_trait]
impl RecordSink for JsonDirSink {
    async fn save(&self, record: &ResolvedRecord) -> Result<bool, CollaboratorError> {
        if record.label.trim().is_empty() {
            return Ok(false);
        }
        let writer = self.writer.clone();
        let record = record.clone();
        let path = tokio::task::spawn_blocking(move || {
            writer.write_json(&record_filename(&record.label), &record)
        })
        .await
        .map_err(|err| CollaboratorError::Other(format!("writer task failed: {err}")))?
        .map_err(|err| CollaboratorError::Other(err.to_string()))?;
        engine_debug!("Saved record to {:?}", path);
        Ok(true)
    }
}
