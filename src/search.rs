use crate::error::{FileOpError, IoResultExt, Result};
use crate::workspace::Workspace;
use regex::RegexBuilder;
use serde::Serialize;
use std::fs;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct LineMatch {
    pub line_number: usize,
    pub line_content: String,
    /// Character offsets of the first match on the line, end exclusive.
    pub match_position: (usize, usize),
}

#[derive(Debug, Serialize)]
pub struct SearchResult {
    pub file_path: String,
    pub search_text: String,
    pub matches_found: usize,
    pub matched_lines: Vec<LineMatch>,
}

/// Searches a text file line by line. Plain text is escaped before it is
/// compiled, so only `use_regex` enables pattern syntax.
pub fn search_file_content(
    workspace: &Workspace,
    file_path: &str,
    search_text: &str,
    use_regex: bool,
    case_sensitive: bool,
    use_base_dir: bool,
) -> Result<SearchResult> {
    let full_path = workspace.resolve(file_path, use_base_dir)?;
    if !full_path.is_file() {
        return Err(FileOpError::not_found("File", &full_path));
    }

    let pattern = if use_regex {
        search_text.to_string()
    } else {
        regex::escape(search_text)
    };
    let regex = RegexBuilder::new(&pattern)
        .case_insensitive(!case_sensitive)
        .build()?;

    let bytes = fs::read(&full_path).with_path("read", &full_path)?;
    let content = String::from_utf8_lossy(&bytes);

    let matched_lines: Vec<LineMatch> = content
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| {
            regex.find(line).map(|m| LineMatch {
                line_number: idx + 1,
                line_content: line.to_string(),
                match_position: (
                    line[..m.start()].chars().count(),
                    line[..m.end()].chars().count(),
                ),
            })
        })
        .collect();

    tracing::debug!(
        path = %full_path.display(),
        matches = matched_lines.len(),
        "searched file"
    );

    Ok(SearchResult {
        file_path: full_path.display().to_string(),
        search_text: search_text.to_string(),
        matches_found: matched_lines.len(),
        matched_lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::Builder;

    fn setup_workspace(content: &[u8]) -> (tempfile::TempDir, Workspace) {
        let tmp_dir = Builder::new().prefix("test-search-").tempdir().unwrap();
        fs::write(tmp_dir.path().join("notes.txt"), content).unwrap();
        let workspace = Workspace::new(tmp_dir.path());
        (tmp_dir, workspace)
    }

    #[test]
    fn test_plain_text_is_escaped() {
        let (_tmp_dir, ws) = setup_workspace(b"cost: 1.5\ncost: 105\n");
        let result = search_file_content(&ws, "notes.txt", "1.5", false, true, true).unwrap();

        assert_eq!(result.matches_found, 1);
        assert_eq!(
            result.matched_lines,
            vec![LineMatch {
                line_number: 1,
                line_content: "cost: 1.5".to_string(),
                match_position: (6, 9),
            }]
        );
    }

    #[test]
    fn test_regex_and_case_insensitive() {
        let (_tmp_dir, ws) = setup_workspace(b"Alpha\nbeta\nALPHABET\n");
        let result = search_file_content(&ws, "notes.txt", "^alpha", true, false, true).unwrap();
        let lines: Vec<_> = result.matched_lines.iter().map(|m| m.line_number).collect();
        assert_eq!(lines, vec![1, 3]);

        let sensitive = search_file_content(&ws, "notes.txt", "^alpha", true, true, true).unwrap();
        assert_eq!(sensitive.matches_found, 0);
    }

    #[test]
    fn test_positions_count_characters() {
        let (_tmp_dir, ws) = setup_workspace("héllo wörld\n".as_bytes());
        let result = search_file_content(&ws, "notes.txt", "wörld", false, true, true).unwrap();
        assert_eq!(result.matched_lines[0].match_position, (6, 11));
    }

    #[test]
    fn test_invalid_bytes_are_replaced() {
        let (_tmp_dir, ws) = setup_workspace(&[b'o', b'k', 0xff, b'\n', b'n', b'o']);
        let result = search_file_content(&ws, "notes.txt", "ok", false, true, true).unwrap();
        assert_eq!(result.matches_found, 1);
    }

    #[test]
    fn test_invalid_regex() {
        let (_tmp_dir, ws) = setup_workspace(b"x");
        let err = search_file_content(&ws, "notes.txt", "(", true, true, true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_missing_file() {
        let (_tmp_dir, ws) = setup_workspace(b"x");
        let err = search_file_content(&ws, "other.txt", "x", false, true, true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
