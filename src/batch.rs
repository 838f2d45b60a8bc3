//! # Batch processing
//!
//! A batch run has two phases per file. First a plan is computed from the
//! file as it is on disk: where it would go, what it would be called, its
//! hash, or how many characters a transform would remove. Planning never
//! mutates anything. A dry run stops there; a real run applies the plans in
//! order afterwards.
//!
//! Every plan is computed, and every skip decided, before the first plan is
//! applied. A target is skipped when it exists on disk or when an earlier file
//! in the same batch already claimed it, so a dry run reports exactly what the
//! real run does.
//!
//! All operation arguments are validated before the first file is looked at.

use crate::error::{FileOpError, IoResultExt, Result};
use crate::file_ops::move_file;
use crate::hashing::{HashAlgorithm, hash_path};
use crate::path_expander::{NamePattern, ScanDepth, collect_matching_files};
use crate::workspace::Workspace;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

static PLACEHOLDER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([^{}]*)\}").expect("Invalid regex"));

const BATCH_OPERATIONS: [&str; 6] = ["copy", "move", "delete", "rename", "hash", "transform"];
const TRANSFORM_FUNCTIONS: [&str; 3] = ["uppercase", "lowercase", "replace"];

fn default_true() -> bool {
    true
}

fn default_pattern() -> String {
    "*".to_string()
}

/// Operation-specific arguments. Which ones are required depends on the operation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OperationArgs {
    pub destination: Option<String>,
    pub rename_pattern: Option<String>,
    pub algorithm: Option<String>,
    pub transform_function: Option<String>,
    pub search_text: Option<String>,
    pub replace_text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchRequest {
    pub directory_path: String,
    pub operation: String,
    #[serde(default = "default_pattern")]
    pub pattern: String,
    #[serde(default = "default_true")]
    pub recursive: bool,
    #[serde(default)]
    pub use_regex: bool,
    #[serde(default)]
    pub max_files: Option<usize>,
    #[serde(default = "default_true")]
    pub dry_run: bool,
    #[serde(default)]
    pub operation_args: OperationArgs,
    #[serde(default = "default_true", rename = "use_data_dir")]
    pub use_base_dir: bool,
}

impl BatchRequest {
    pub fn new(directory_path: &str, operation: &str) -> Self {
        Self {
            directory_path: directory_path.to_string(),
            operation: operation.to_string(),
            pattern: default_pattern(),
            recursive: true,
            use_regex: false,
            max_files: None,
            dry_run: true,
            operation_args: OperationArgs::default(),
            use_base_dir: true,
        }
    }
}

/// `{index}`, `{name}` and `{ext}` placeholders in a new file name.
#[derive(Debug, Clone)]
pub struct RenamePattern(String);

impl RenamePattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        if pattern.is_empty() {
            return Err(FileOpError::InvalidArgument(
                "Rename pattern must not be empty".to_string(),
            ));
        }
        for caps in PLACEHOLDER_REGEX.captures_iter(pattern) {
            let placeholder = &caps[1];
            if !matches!(placeholder, "index" | "name" | "ext") {
                return Err(FileOpError::InvalidArgument(format!(
                    "Unknown placeholder '{{{placeholder}}}' in rename pattern. Valid placeholders are {{index}}, {{name}}, {{ext}}"
                )));
            }
        }
        let literal = PLACEHOLDER_REGEX.replace_all(pattern, "");
        if literal.contains('/') || literal.contains('\\') {
            return Err(FileOpError::InvalidArgument(format!(
                "Rename pattern must not contain path separators: {pattern}"
            )));
        }
        Ok(Self(pattern.to_string()))
    }

    /// Renders the new name for the `index`-th (1-based) file. The original
    /// extension is kept when the rendered name has none.
    pub fn render(&self, index: usize, file_name: &str) -> String {
        let path = Path::new(file_name);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut new_name = PLACEHOLDER_REGEX
            .replace_all(&self.0, |caps: &Captures| match &caps[1] {
                "index" => index.to_string(),
                "name" => stem.clone(),
                _ => ext.clone(),
            })
            .into_owned();

        if !ext.is_empty() && Path::new(&new_name).extension().is_none() {
            new_name.push('.');
            new_name.push_str(&ext);
        }
        new_name
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transform {
    Uppercase,
    Lowercase,
    Replace { search: String, replace: String },
}

impl Transform {
    fn name(&self) -> &'static str {
        match self {
            Transform::Uppercase => "uppercase",
            Transform::Lowercase => "lowercase",
            Transform::Replace { .. } => "replace",
        }
    }

    fn apply(&self, content: &str) -> String {
        match self {
            Transform::Uppercase => content.to_uppercase(),
            Transform::Lowercase => content.to_lowercase(),
            Transform::Replace { search, replace } => content.replace(search.as_str(), replace),
        }
    }
}

/// A fully validated batch operation.
#[derive(Debug, Clone)]
pub enum BatchOperation {
    Copy { destination: PathBuf },
    Move { destination: PathBuf },
    Delete,
    Rename(RenamePattern),
    Hash(HashAlgorithm),
    Transform(Transform),
}

impl BatchOperation {
    pub fn parse(
        workspace: &Workspace,
        operation: &str,
        args: &OperationArgs,
        use_base_dir: bool,
    ) -> Result<Self> {
        match operation {
            "copy" | "move" => {
                let destination = args.destination.as_deref().ok_or_else(|| {
                    FileOpError::InvalidArgument(format!(
                        "Operation '{operation}' requires 'destination' argument"
                    ))
                })?;
                let destination = workspace.resolve(destination, use_base_dir)?;
                Ok(if operation == "copy" {
                    BatchOperation::Copy { destination }
                } else {
                    BatchOperation::Move { destination }
                })
            }
            "delete" => Ok(BatchOperation::Delete),
            "rename" => {
                let pattern = args.rename_pattern.as_deref().ok_or_else(|| {
                    FileOpError::InvalidArgument(
                        "Operation 'rename' requires 'rename_pattern' argument".to_string(),
                    )
                })?;
                Ok(BatchOperation::Rename(RenamePattern::parse(pattern)?))
            }
            "hash" => {
                let algorithm = args.algorithm.as_deref().unwrap_or("md5").parse()?;
                Ok(BatchOperation::Hash(algorithm))
            }
            "transform" => {
                let function = args.transform_function.as_deref().ok_or_else(|| {
                    FileOpError::InvalidArgument(
                        "Operation 'transform' requires 'transform_function' argument".to_string(),
                    )
                })?;
                let transform = match function {
                    "uppercase" => Transform::Uppercase,
                    "lowercase" => Transform::Lowercase,
                    "replace" => match (&args.search_text, &args.replace_text) {
                        (Some(search), Some(replace)) => Transform::Replace {
                            search: search.clone(),
                            replace: replace.clone(),
                        },
                        _ => {
                            return Err(FileOpError::InvalidArgument(
                                "Transform function 'replace' requires 'search_text' and 'replace_text' arguments"
                                    .to_string(),
                            ));
                        }
                    },
                    other => {
                        return Err(FileOpError::InvalidArgument(format!(
                            "Invalid transform function: {other}. Valid functions are: {}",
                            TRANSFORM_FUNCTIONS.join(", ")
                        )));
                    }
                };
                Ok(BatchOperation::Transform(transform))
            }
            other => Err(FileOpError::InvalidArgument(format!(
                "Invalid operation: {other}. Valid operations are: {}",
                BATCH_OPERATIONS.join(", ")
            ))),
        }
    }

    /// Whether applying this operation changes anything on disk.
    pub fn is_mutating(&self) -> bool {
        !matches!(self, BatchOperation::Hash(_))
    }
}

/// What would happen to one file. Computed without touching the file system
/// beyond reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilePlan {
    pub original_path: String,
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<HashAlgorithm>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform: Option<&'static str>,
    /// Original length minus transformed length, in characters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chars_changed: Option<i64>,
    #[serde(skip)]
    new_content: Option<String>,
}

impl FilePlan {
    fn bare(path: &Path) -> Self {
        FilePlan {
            original_path: path.display().to_string(),
            file_name: file_name_of(path),
            destination: None,
            new_name: None,
            algorithm: None,
            hash: None,
            transform: None,
            chars_changed: None,
            new_content: None,
        }
    }

    fn target(&self) -> Option<&Path> {
        self.destination.as_deref().map(Path::new)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Planned,
    Done,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileResult {
    #[serde(flatten)]
    pub plan: FilePlan,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub operation: String,
    pub pattern: String,
    pub recursive: bool,
    pub dry_run: bool,
    pub matched_files: Vec<String>,
    pub processed_files: Vec<FileResult>,
    pub total_matches: usize,
    pub total_processed: usize,
    pub total_failed: usize,
    pub total_skipped: usize,
}

/// Applies one operation to every file in a directory whose name matches a
/// glob or regex pattern. Defaults to a dry run.
pub fn batch_process_files(workspace: &Workspace, request: &BatchRequest) -> Result<BatchReport> {
    let dir_path = workspace.resolve(&request.directory_path, request.use_base_dir)?;
    if !dir_path.is_dir() {
        return Err(FileOpError::not_found("Directory", &dir_path));
    }
    let operation = BatchOperation::parse(
        workspace,
        &request.operation,
        &request.operation_args,
        request.use_base_dir,
    )?;
    let pattern = NamePattern::new(&request.pattern, request.use_regex)?;

    let depth = ScanDepth {
        recursive: request.recursive,
        max_depth: None,
    };
    let mut matched = collect_matching_files(&dir_path, &pattern, depth)?;
    if let Some(max_files) = request.max_files {
        matched.truncate(max_files);
    }

    if !request.dry_run {
        if let BatchOperation::Copy { destination } | BatchOperation::Move { destination } =
            &operation
        {
            fs::create_dir_all(destination).with_path("create directory", destination)?;
        }
    }

    let chunk_size = workspace.limits().hash_chunk_size;
    let mut claimed: HashSet<PathBuf> = HashSet::new();
    let mut processed_files: Vec<FileResult> = matched
        .iter()
        .enumerate()
        .map(|(idx, path)| match plan_file(&operation, path, idx + 1, chunk_size) {
            Err(e) => FileResult {
                plan: FilePlan::bare(path),
                status: FileStatus::Failed,
                message: Some(e.to_string()),
            },
            Ok(plan) => {
                let taken = plan.target().is_some_and(|target| {
                    fs::symlink_metadata(target).is_ok() || !claimed.insert(target.to_path_buf())
                });
                if taken {
                    FileResult {
                        message: Some(format!(
                            "Destination already exists: {}",
                            plan.destination.as_deref().unwrap_or_default()
                        )),
                        plan,
                        status: FileStatus::Skipped,
                    }
                } else {
                    FileResult {
                        plan,
                        status: FileStatus::Planned,
                        message: None,
                    }
                }
            }
        })
        .collect();

    if !request.dry_run {
        for (path, result) in matched.iter().zip(processed_files.iter_mut()) {
            if result.status != FileStatus::Planned {
                continue;
            }
            match apply_plan(&operation, path, &result.plan) {
                Ok(()) => result.status = FileStatus::Done,
                Err(e) => {
                    tracing::error!("Error processing file {}: {e}", path.display());
                    result.status = FileStatus::Failed;
                    result.message = Some(e.to_string());
                }
            }
        }
    }

    let count = |status| processed_files.iter().filter(|r| r.status == status).count();
    let total_failed = count(FileStatus::Failed);
    let total_skipped = count(FileStatus::Skipped);
    let total_processed = count(FileStatus::Done) + count(FileStatus::Planned);

    tracing::info!(
        operation = %request.operation,
        dry_run = request.dry_run,
        matches = matched.len(),
        failed = total_failed,
        "batch finished"
    );

    Ok(BatchReport {
        operation: request.operation.clone(),
        pattern: request.pattern.clone(),
        recursive: request.recursive,
        dry_run: request.dry_run,
        matched_files: matched.iter().map(|p| file_name_of(p)).collect(),
        processed_files,
        total_matches: matched.len(),
        total_processed,
        total_failed,
        total_skipped,
    })
}

fn plan_file(
    operation: &BatchOperation,
    path: &Path,
    index: usize,
    chunk_size: usize,
) -> Result<FilePlan> {
    let mut plan = FilePlan::bare(path);
    match operation {
        BatchOperation::Copy { destination } | BatchOperation::Move { destination } => {
            plan.destination = Some(destination.join(&plan.file_name).display().to_string());
        }
        BatchOperation::Delete => {}
        BatchOperation::Rename(pattern) => {
            let new_name = pattern.render(index, &plan.file_name);
            if new_name.is_empty() || new_name == "." || new_name == ".." {
                return Err(FileOpError::InvalidArgument(format!(
                    "Rename pattern produced an invalid name for {}",
                    plan.file_name
                )));
            }
            let parent = path.parent().unwrap_or(Path::new(""));
            plan.destination = Some(parent.join(&new_name).display().to_string());
            plan.new_name = Some(new_name);
        }
        BatchOperation::Hash(algorithm) => {
            let (hash, _) = hash_path(path, *algorithm, chunk_size)?;
            plan.algorithm = Some(*algorithm);
            plan.hash = Some(hash);
        }
        BatchOperation::Transform(transform) => {
            let bytes = fs::read(path).with_path("read", path)?;
            let content = String::from_utf8_lossy(&bytes);
            let new_content = transform.apply(&content);
            plan.transform = Some(transform.name());
            plan.chars_changed =
                Some(content.chars().count() as i64 - new_content.chars().count() as i64);
            plan.new_content = Some(new_content);
        }
    }
    Ok(plan)
}

fn apply_plan(operation: &BatchOperation, path: &Path, plan: &FilePlan) -> Result<()> {
    match operation {
        BatchOperation::Copy { .. } => {
            if let Some(target) = plan.target() {
                fs::copy(path, target).with_path("copy", path)?;
            }
        }
        BatchOperation::Move { .. } | BatchOperation::Rename(_) => {
            if let Some(target) = plan.target() {
                move_file(path, target)?;
            }
        }
        BatchOperation::Delete => fs::remove_file(path).with_path("delete", path)?,
        BatchOperation::Hash(_) => {}
        BatchOperation::Transform(_) => {
            if let Some(content) = &plan.new_content {
                fs::write(path, content).with_path("write", path)?;
            }
        }
    }
    Ok(())
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecursiveOperation {
    Count,
    List,
    Delete,
    Backup,
}

impl std::str::FromStr for RecursiveOperation {
    type Err = FileOpError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "count" => Ok(RecursiveOperation::Count),
            "list" => Ok(RecursiveOperation::List),
            "delete" => Ok(RecursiveOperation::Delete),
            "backup" => Ok(RecursiveOperation::Backup),
            other => Err(FileOpError::InvalidArgument(format!(
                "Invalid operation: {other}. Must be one of: count, list, delete, backup"
            ))),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecursiveReport {
    pub operation: RecursiveOperation,
    pub directory: String,
    pub pattern: String,
    pub matched_files: Vec<String>,
    pub total_matches: usize,
    /// Outcome per matched file, keyed by path. Empty for `count` and `list`.
    pub results: BTreeMap<String, String>,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

/// Walks a directory tree (depth 0 is the directory itself) and counts, lists,
/// deletes or backs up every file whose name matches.
#[allow(clippy::too_many_arguments)]
pub fn recursive_file_operation(
    workspace: &Workspace,
    directory_path: &str,
    operation: &str,
    pattern: &str,
    use_regex: bool,
    max_depth: Option<usize>,
    dry_run: bool,
    use_base_dir: bool,
) -> Result<RecursiveReport> {
    let dir_path = workspace.resolve(directory_path, use_base_dir)?;
    if !dir_path.is_dir() {
        return Err(FileOpError::not_found("Directory", &dir_path));
    }
    let operation: RecursiveOperation = operation.parse()?;
    let name_pattern = NamePattern::new(pattern, use_regex)?;

    let matched = collect_matching_files(
        &dir_path,
        &name_pattern,
        ScanDepth {
            recursive: true,
            max_depth,
        },
    )?;

    let mut results = BTreeMap::new();
    for path in &matched {
        let key = path.display().to_string();
        let outcome = match operation {
            RecursiveOperation::Count | RecursiveOperation::List => continue,
            RecursiveOperation::Delete if dry_run => "Would be deleted (dry run)".to_string(),
            RecursiveOperation::Delete => match fs::remove_file(path) {
                Ok(()) => "Deleted".to_string(),
                Err(e) => format!("Error: {e}"),
            },
            RecursiveOperation::Backup => {
                let backup_path = format!("{key}.bak");
                if dry_run {
                    format!("Would be backed up to {backup_path} (dry run)")
                } else {
                    match fs::copy(path, &backup_path) {
                        Ok(_) => format!("Backed up to {backup_path}"),
                        Err(e) => format!("Error: {e}"),
                    }
                }
            }
        };
        results.insert(key, outcome);
    }

    Ok(RecursiveReport {
        operation,
        directory: dir_path.display().to_string(),
        pattern: pattern.to_string(),
        total_matches: matched.len(),
        matched_files: matched.iter().map(|p| p.display().to_string()).collect(),
        results,
        dry_run,
        count: (operation == RecursiveOperation::Count).then_some(matched.len()),
    })
}
