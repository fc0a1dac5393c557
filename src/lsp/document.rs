use std::cmp::Ordering;

use ropey::Rope;

use tower_lsp::lsp_types::{Position, TextDocumentContentChangeEvent, Url};

use crate::edits::RangeReplacement;
use crate::position::LineCol;

pub use crate::lsp::models::{LspDocument, LspDocumentHistory, LspDocumentState, VersionedChanges};

/// Converts an LSP position to a character offset in the Rope.
fn position_to_char_offset(position: &Position, text: &Rope) -> usize {
    let line = (position.line as usize).min(text.len_lines().saturating_sub(1));
    let line_start = text.line_to_char(line);
    let line_len = text.line(line).len_chars();
    line_start + (position.character as usize).min(line_len)
}

impl PartialEq for VersionedChanges {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
    }
}

impl Eq for VersionedChanges {}

impl PartialOrd for VersionedChanges {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VersionedChanges {
    fn cmp(&self, other: &Self) -> Ordering {
        other.version.cmp(&self.version)
    }
}

/// Result of applying one change event: the range replacements it performed,
/// in event order, ready for the edit delta translator. A full-text change
/// carries no replacements; every tracked position is stale after it.
#[derive(Debug, Default)]
pub struct AppliedChange {
    pub replacements: Vec<RangeReplacement>,
    pub full_replace: bool,
}

impl LspDocumentState {
    /// Applies a list of content changes to the document state, updating the
    /// rope and recording the replacements for position adjustment. Returns
    /// an error if the version is not newer than the current one.
    pub fn apply(
        &mut self,
        changes: Vec<TextDocumentContentChangeEvent>,
        version: i32,
    ) -> Result<AppliedChange, String> {
        if version <= self.version {
            return Err(format!("Version {} not newer than {}", version, self.version));
        }
        let mut applied = AppliedChange::default();
        for change in &changes {
            if let Some(range) = change.range {
                let start = position_to_char_offset(&range.start, &self.text);
                let end = position_to_char_offset(&range.end, &self.text);
                let replaced: String = self.text.slice(start..end).to_string();
                self.text.remove(start..end);
                self.text.insert(start, &change.text);
                applied.replacements.push(
                    RangeReplacement::new(
                        LineCol::new(range.start.line, range.start.character),
                        LineCol::new(range.end.line, range.end.character),
                        change.text.clone(),
                    )
                    .with_replaced(replaced),
                );
            } else {
                self.text = Rope::from_str(&change.text);
                applied.full_replace = true;
                applied.replacements.clear();
            }
        }
        self.history.changes.push(VersionedChanges { version, changes });
        self.version = version;
        Ok(applied)
    }
}

impl LspDocument {
    /// Returns the URI of the document.
    pub async fn uri(&self) -> Url {
        self.state.read().await.uri.clone()
    }

    /// Returns the current text of the document as a string.
    pub async fn text(&self) -> String {
        self.state.read().await.text.to_string()
    }

    /// Returns the current version of the document.
    pub async fn version(&self) -> i32 {
        self.state.read().await.version
    }

    /// Returns the text of one line without its trailing newline, or `None`
    /// past the end of the document.
    pub async fn line_text(&self, line: u32) -> Option<String> {
        let state = self.state.read().await;
        if (line as usize) >= state.text.len_lines() {
            return None;
        }
        let text = state.text.line(line as usize).to_string();
        Some(text.trim_end_matches(['\n', '\r']).to_string())
    }
}
