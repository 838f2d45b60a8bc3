//! Zip archive creation and extraction.

use crate::error::{FileOpError, IoResultExt, Result};
use crate::file_ops::create_parent_dirs;
use crate::path_expander::{ExpandedFile, expand_and_validate};
use crate::workspace::Workspace;
use serde::Serialize;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const MAX_COMPRESSION_LEVEL: u32 = 9;

#[derive(Debug, Serialize)]
pub struct ZipReport {
    pub zip_path: String,
    pub files_added: Vec<String>,
    pub total_files: usize,
    /// Size of the archive file on disk.
    pub total_size: u64,
    /// Sum of the compressed sizes of all members.
    pub compressed_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_sources: Option<Vec<String>>,
    /// Files left out because another source already used the same member name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_names: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct ExtractReport {
    pub zip_path: String,
    pub output_dir: String,
    pub files_extracted: Vec<String>,
    pub total_files: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_files: Option<Vec<String>>,
}

/// Compresses files and directories into a new archive at `output_zip_path`.
///
/// Missing sources are reported back in `invalid_sources`, and files whose
/// member name is already taken in `duplicate_names`. The call only fails
/// outright when none of the sources exist. A failed write removes the
/// partial archive.
pub fn zip_files(
    workspace: &Workspace,
    source_paths: &[String],
    output_zip_path: &str,
    compression_level: u32,
    use_base_dir: bool,
) -> Result<ZipReport> {
    if compression_level > MAX_COMPRESSION_LEVEL {
        return Err(FileOpError::InvalidArgument(format!(
            "Compression level must be between 0 and {MAX_COMPRESSION_LEVEL}, got {compression_level}"
        )));
    }

    let sources = source_paths
        .iter()
        .map(|p| workspace.resolve(p, use_base_dir))
        .collect::<Result<Vec<PathBuf>>>()?;
    let output_path = workspace.resolve(output_zip_path, use_base_dir)?;

    let expansion = expand_and_validate(&sources);
    let invalid_sources: Vec<String> = expansion
        .not_found
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    if expansion.files.is_empty() && expansion.not_found.len() == sources.len() {
        return Err(FileOpError::NotFound(format!(
            "No valid source paths found. Invalid paths: {invalid_sources:?}"
        )));
    }

    create_parent_dirs(&output_path)?;
    let options = if compression_level == 0 {
        SimpleFileOptions::default().compression_method(CompressionMethod::Stored)
    } else {
        SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(i64::from(compression_level)))
    };

    let files_added = match write_archive(&output_path, &expansion.files, options) {
        Ok(files_added) => files_added,
        Err(e) => {
            if let Err(cleanup) = fs::remove_file(&output_path) {
                tracing::warn!("Could not remove partial archive {}: {cleanup}", output_path.display());
            }
            return Err(e);
        }
    };

    let total_size = fs::metadata(&output_path)
        .with_path("read metadata of", &output_path)?
        .len();
    let compressed_size = summed_compressed_size(&output_path)?;

    tracing::info!(
        zip = %output_path.display(),
        files = files_added.len(),
        "created archive"
    );

    Ok(ZipReport {
        zip_path: output_path.display().to_string(),
        total_files: files_added.len(),
        files_added,
        total_size,
        compressed_size,
        invalid_sources: (!invalid_sources.is_empty()).then_some(invalid_sources),
        duplicate_names: (!expansion.name_conflicts.is_empty()).then(|| {
            expansion
                .name_conflicts
                .iter()
                .map(|p| p.display().to_string())
                .collect()
        }),
    })
}

fn write_archive(
    output_path: &Path,
    files: &[ExpandedFile],
    options: SimpleFileOptions,
) -> Result<Vec<String>> {
    let out_file = File::create(output_path).with_path("create", output_path)?;
    let mut writer = ZipWriter::new(out_file);
    let mut files_added = Vec::with_capacity(files.len());
    for file in files {
        if file.path == output_path {
            continue;
        }
        writer.start_file(file.archive_name.as_str(), options)?;
        let mut source = File::open(&file.path).with_path("open", &file.path)?;
        io::copy(&mut source, &mut writer).with_path("compress", &file.path)?;
        files_added.push(file.archive_name.clone());
    }
    writer.finish()?;
    Ok(files_added)
}

fn summed_compressed_size(zip_path: &Path) -> Result<u64> {
    let file = File::open(zip_path).with_path("open", zip_path)?;
    let mut archive = ZipArchive::new(file)?;
    let mut total = 0;
    for i in 0..archive.len() {
        total += archive.by_index(i)?.compressed_size();
    }
    Ok(total)
}

/// Extracts an archive, either completely or only the named members.
///
/// Without `output_dir` the members land next to the archive. Member names
/// that would escape the output directory are rejected before anything is
/// written.
pub fn extract_zip(
    workspace: &Workspace,
    zip_path: &str,
    output_dir: Option<&str>,
    specific_files: Option<&[String]>,
    use_base_dir: bool,
) -> Result<ExtractReport> {
    let full_zip_path = workspace.resolve(zip_path, use_base_dir)?;
    if !full_zip_path.is_file() {
        return Err(FileOpError::not_found("ZIP file", &full_zip_path));
    }
    let output_dir = match output_dir {
        Some(dir) => workspace.resolve(dir, use_base_dir)?,
        None => full_zip_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| workspace.base_dir()),
    };

    let file = File::open(&full_zip_path).with_path("open", &full_zip_path)?;
    let mut archive = ZipArchive::new(file)?;
    let all_names: Vec<String> = archive.file_names().map(str::to_string).collect();

    let (to_extract, invalid_files) = match specific_files {
        Some(requested) if !requested.is_empty() => {
            let (valid, invalid): (Vec<String>, Vec<String>) = requested
                .iter()
                .cloned()
                .partition(|name| all_names.contains(name));
            (valid, invalid)
        }
        _ => (all_names, Vec::new()),
    };
    if to_extract.is_empty() {
        return Err(FileOpError::NotFound(format!(
            "No valid files to extract. Invalid files: {invalid_files:?}"
        )));
    }

    // Validate every member name up front so a hostile entry aborts before any write.
    let mut targets = Vec::with_capacity(to_extract.len());
    for name in &to_extract {
        let entry = archive.by_name(name)?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(FileOpError::InvalidArgument(format!(
                "Archive entry '{name}' would be extracted outside of {}",
                output_dir.display()
            )));
        };
        targets.push((name.clone(), output_dir.join(relative), entry.is_dir()));
    }

    fs::create_dir_all(&output_dir).with_path("create directory", &output_dir)?;
    for (name, target, is_dir) in &targets {
        if *is_dir {
            fs::create_dir_all(target).with_path("create directory", target)?;
            continue;
        }
        create_parent_dirs(target)?;
        let mut entry = archive.by_name(name)?;
        let mut out = File::create(target).with_path("create", target)?;
        io::copy(&mut entry, &mut out).with_path("extract", target)?;
    }

    tracing::info!(
        zip = %full_zip_path.display(),
        output = %output_dir.display(),
        files = to_extract.len(),
        "extracted archive"
    );

    Ok(ExtractReport {
        zip_path: full_zip_path.display().to_string(),
        output_dir: output_dir.display().to_string(),
        total_files: to_extract.len(),
        files_extracted: to_extract,
        invalid_files: (!invalid_files.is_empty()).then_some(invalid_files),
    })
}
