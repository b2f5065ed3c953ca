use std::collections::HashSet;
use std::path::PathBuf;

use engine_logging::engine_info;

use crate::collab::{CollaboratorError, ItemSource};

/// Work list read from a text file, one label per line.
///
/// Lines are trimmed; blank lines and repeated labels are skipped.
#[derive(Debug, Clone)]
pub struct LineFileSource {
    path: PathBuf,
}

impl LineFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl ItemSource for LineFileSource {
    async fn list_items(&self) -> Result<Vec<String>, CollaboratorError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|err| CollaboratorError::Other(format!("{:?}: {err}", self.path)))?;
        let items = parse_lines(&text);
        engine_info!("Loaded {} work items from {:?}", items.len(), self.path);
        Ok(items)
    }
}

fn parse_lines(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.lines()
        .map(|line| line.trim_start_matches('\u{feff}').trim())
        .filter(|line| !line.is_empty())
        .filter(|line| seen.insert(*line))
        .map(ToOwned::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_repeated_lines_are_dropped() {
        let items = parse_lines("\u{feff}一\n\n  二 \r\n一\n三\n");
        assert_eq!(items, vec!["一", "二", "三"]);
    }
}
