// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell

//! Byte-offset ↔ LSP position conversion and URI helpers.
//!
//! LSP positions count UTF-16 code units; supplementary-plane characters
//! take two columns.

use std::path::{Path, PathBuf};

use tower_lsp::lsp_types::{Position, Range, Url};

/// Convert a byte offset into an LSP position.
pub fn position_from_offset(text: &str, offset: u32) -> Position {
    let offset = (offset as usize).min(text.len());
    let mut line = 0u32;
    let mut line_start = 0usize;
    for (i, ch) in text.char_indices() {
        if i >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            line_start = i + ch.len_utf8();
        }
    }
    let character = text[line_start..offset]
        .chars()
        .map(|ch| ch.len_utf16() as u32)
        .sum();
    Position { line, character }
}

/// Convert an LSP position into a byte offset.
pub fn offset_from_position(text: &str, position: Position) -> u32 {
    let mut line = 0u32;
    let mut character = 0u32;
    for (i, ch) in text.char_indices() {
        if line == position.line && character >= position.character {
            return i as u32;
        }
        if line > position.line {
            return i as u32;
        }
        if ch == '\n' {
            line += 1;
            character = 0;
        } else {
            character += ch.len_utf16() as u32;
        }
    }
    text.len() as u32
}

/// Range covering `[start, end)` byte offsets.
pub fn range_from_offsets(text: &str, start: u32, end: u32) -> Range {
    Range {
        start: position_from_offset(text, start),
        end: position_from_offset(text, end),
    }
}

/// One-character diagnostic range anchored at `offset`.
pub fn diagnostic_range(text: &str, offset: u32) -> Range {
    let end = if (offset as usize) < text.len() {
        offset + 1
    } else {
        offset
    };
    range_from_offsets(text, offset, end)
}

/// Filesystem path of a `file://` URI.
pub fn uri_to_path(uri: &Url) -> Option<PathBuf> {
    if uri.scheme() != "file" {
        return None;
    }
    uri.to_file_path().ok()
}

/// `file://` URI for a filesystem path.
pub fn path_to_uri(path: &Path) -> Option<Url> {
    Url::from_file_path(path).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_round_trip() {
        let text = "ab\ncdef\n";
        let pos = position_from_offset(text, 5);
        assert_eq!(pos, Position { line: 1, character: 2 });
        assert_eq!(offset_from_position(text, pos), 5);
    }

    #[test]
    fn test_utf16_columns() {
        // '𝕏' is U+1D54F, two UTF-16 code units, four UTF-8 bytes
        let text = "𝕏x";
        let pos = position_from_offset(text, 4);
        assert_eq!(pos, Position { line: 0, character: 2 });
        assert_eq!(offset_from_position(text, pos), 4);
    }

    #[test]
    fn test_offset_past_end_clamps() {
        let text = "ab";
        assert_eq!(position_from_offset(text, 99), Position { line: 0, character: 2 });
        assert_eq!(
            offset_from_position(text, Position { line: 5, character: 0 }),
            2
        );
    }
}
