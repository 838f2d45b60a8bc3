use crate::error::{FileOpError, IoResultExt, Result};
use crate::workspace::Workspace;
use console::style;
use serde::Serialize;
use similar::{ChangeTag, TextDiff};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::Path;

const CONTEXT_LINES: usize = 2;
const MISSING_LINE: &str = "[No line]";

/// Renders a compact, colored diff for human review. Hunks are separated by `...`.
pub fn colored_diff(old: &str, new: &str) -> String {
    if old == new {
        return "No changes detected.".to_string();
    }

    let diff = TextDiff::from_lines(old, new);
    let mut diff_lines = Vec::new();

    for (hunk_idx, group) in diff.grouped_ops(CONTEXT_LINES).iter().enumerate() {
        if hunk_idx > 0 {
            diff_lines.push("...".to_string());
        }
        for op in group {
            for change in diff.iter_changes(op) {
                let text = change.value().trim_end_matches(['\n', '\r']);
                let line = match change.tag() {
                    ChangeTag::Delete => style(format!("- {text}")).red().to_string(),
                    ChangeTag::Insert => style(format!("+ {text}")).green().to_string(),
                    ChangeTag::Equal => format!("  {text}"),
                };
                diff_lines.push(line);
            }
        }
    }
    diff_lines.join("\n")
}

/// A unified diff split into lines, without trailing newlines.
pub fn unified_diff(old: &str, new: &str, from_label: &str, to_label: &str) -> Vec<String> {
    TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(3)
        .header(from_label, to_label)
        .to_string()
        .lines()
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone)]
pub struct LineDifference {
    pub line_number: usize,
    pub file1_line: String,
    pub file2_line: String,
}

/// Compares two texts position by position. A line present in only one of
/// them is paired with `[No line]`.
///
/// Line endings take part in the comparison, so `"a\n"` and `"a"` differ on
/// line 1. Lines are shown without their ending unless the ending is the only
/// difference; then both sides are shown escaped, e.g. `a\n` against `a`.
pub fn line_differences(text1: &str, text2: &str) -> Vec<LineDifference> {
    let lines1: Vec<&str> = text1.split_inclusive('\n').collect();
    let lines2: Vec<&str> = text2.split_inclusive('\n').collect();
    let longest = lines1.len().max(lines2.len());

    (0..longest)
        .filter_map(|i| {
            let left = lines1.get(i).copied();
            let right = lines2.get(i).copied();
            if left == right {
                return None;
            }
            let ending_only = left.map(trim_line_ending) == right.map(trim_line_ending);
            let shown = |line: Option<&str>| match line {
                None => MISSING_LINE.to_string(),
                Some(line) if ending_only => line.escape_debug().to_string(),
                Some(line) => trim_line_ending(line).to_string(),
            };
            Some(LineDifference {
                line_number: i + 1,
                file1_line: shown(left),
                file2_line: shown(right),
            })
        })
        .collect()
}

fn trim_line_ending(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonType {
    Binary,
    LineByLine,
}

#[derive(Debug, Serialize)]
pub struct Comparison {
    pub identical: bool,
    pub file1: String,
    pub file2: String,
    pub comparison_type: ComparisonType,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub differences: Option<Vec<LineDifference>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file1_lines: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file2_lines: Option<usize>,
}

/// Compares two files.
///
/// Sizes are checked first, then contents in chunks. Line-level details are
/// only produced when `show_diff` is set and both files are valid UTF-8;
/// binary files keep the `binary` comparison type and say so in the message.
pub fn compare_files(
    workspace: &Workspace,
    file_path1: &str,
    file_path2: &str,
    show_diff: bool,
    use_base_dir: bool,
) -> Result<Comparison> {
    let path1 = workspace.resolve(file_path1, use_base_dir)?;
    let path2 = workspace.resolve(file_path2, use_base_dir)?;
    if !path1.is_file() {
        return Err(FileOpError::not_found("First file", &path1));
    }
    if !path2.is_file() {
        return Err(FileOpError::not_found("Second file", &path2));
    }

    let identical = same_contents(&path1, &path2, workspace.limits().hash_chunk_size)?;
    let mut comparison = Comparison {
        identical,
        file1: path1.display().to_string(),
        file2: path2.display().to_string(),
        comparison_type: ComparisonType::Binary,
        message: if identical {
            "Files are identical (binary comparison)".to_string()
        } else {
            "Files are different".to_string()
        },
        differences: None,
        diff_count: None,
        file1_lines: None,
        file2_lines: None,
    };

    if identical || !show_diff {
        return Ok(comparison);
    }

    let bytes1 = fs::read(&path1).with_path("read", &path1)?;
    let bytes2 = fs::read(&path2).with_path("read", &path2)?;
    match (String::from_utf8(bytes1), String::from_utf8(bytes2)) {
        (Ok(text1), Ok(text2)) => {
            let differences = line_differences(&text1, &text2);
            comparison.comparison_type = ComparisonType::LineByLine;
            comparison.diff_count = Some(differences.len());
            comparison.file1_lines = Some(text1.lines().count());
            comparison.file2_lines = Some(text2.lines().count());
            comparison.differences = Some(differences);
        }
        _ => {
            comparison.message =
                "Files are different (binary files cannot show line differences)".to_string();
        }
    }
    Ok(comparison)
}

fn same_contents(path1: &Path, path2: &Path, chunk_size: usize) -> Result<bool> {
    let len1 = fs::metadata(path1).with_path("read metadata of", path1)?.len();
    let len2 = fs::metadata(path2).with_path("read metadata of", path2)?.len();
    if len1 != len2 {
        return Ok(false);
    }

    let mut reader1 = BufReader::new(File::open(path1).with_path("open", path1)?);
    let mut reader2 = BufReader::new(File::open(path2).with_path("open", path2)?);
    let chunk_size = chunk_size.max(1);
    let mut buf1 = vec![0u8; chunk_size];
    let mut buf2 = vec![0u8; chunk_size];

    loop {
        let read1 = read_full(&mut reader1, &mut buf1).with_path("read", path1)?;
        let read2 = read_full(&mut reader2, &mut buf2).with_path("read", path2)?;
        if read1 != read2 || buf1[..read1] != buf2[..read2] {
            return Ok(false);
        }
        if read1 == 0 {
            return Ok(true);
        }
    }
}

/// Fills `buf` as far as the reader allows; short only at end of input.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}
