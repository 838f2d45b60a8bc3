use crate::archive::{self, MAX_COMPRESSION_LEVEL};
use crate::error::Result;
use crate::tools::{
    FunctionDescription, Tool, default_true, describe, object_schema, parse_args, to_json,
};
use crate::workspace::Workspace;
use async_trait::async_trait;
use console::style;
use serde::Deserialize;
use serde_json::{Value, json};

fn default_compression_level() -> u32 {
    MAX_COMPRESSION_LEVEL
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct ZipArgs {
    source_paths: Vec<String>,
    output_zip_path: String,
    #[serde(default = "default_compression_level")]
    compression_level: u32,
    #[serde(default = "default_true")]
    use_data_dir: bool,
}

pub struct ZipFilesTool;

#[async_trait]
impl Tool for ZipFilesTool {
    fn name(&self) -> &'static str {
        "zip_files"
    }

    fn schema(&self) -> FunctionDescription {
        describe(
            self.name(),
            "Compresses files and directories into a zip archive. Files are stored under their name, directory contents under paths relative to the directory's parent. Missing sources are reported instead of aborting.",
            object_schema(
                json!({
                    "source_paths": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Files or directories to include."
                    },
                    "output_zip_path": { "type": "string", "description": "Path of the archive to create." },
                    "compression_level": {
                        "type": "integer",
                        "minimum": 0,
                        "maximum": 9,
                        "description": "0 stores without compression, 9 (default) compresses most."
                    }
                }),
                &["source_paths", "output_zip_path"],
            ),
        )
    }

    async fn execute(&self, args: &Value, workspace: &Workspace) -> Result<Value> {
        let args: ZipArgs = parse_args(args)?;
        to_json(archive::zip_files(
            workspace,
            &args.source_paths,
            &args.output_zip_path,
            args.compression_level,
            args.use_data_dir,
        )?)
    }

    /// Creating an archive over an existing file replaces it.
    fn is_safe_for_auto_execute(&self, args: &Value, workspace: &Workspace) -> Result<bool> {
        let args: ZipArgs = parse_args(args)?;
        Ok(!workspace
            .resolve(&args.output_zip_path, args.use_data_dir)?
            .exists())
    }
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct ExtractArgs {
    zip_path: String,
    #[serde(default)]
    output_dir: Option<String>,
    #[serde(default)]
    specific_files: Option<Vec<String>>,
    #[serde(default = "default_true")]
    use_data_dir: bool,
}

pub struct ExtractZipTool;

#[async_trait]
impl Tool for ExtractZipTool {
    fn name(&self) -> &'static str {
        "extract_zip"
    }

    fn schema(&self) -> FunctionDescription {
        describe(
            self.name(),
            "Extracts a zip archive, completely or only the listed members. Existing files with the same names are overwritten.",
            object_schema(
                json!({
                    "zip_path": { "type": "string", "description": "Archive to extract." },
                    "output_dir": { "type": "string", "description": "Target directory. Defaults to the archive's directory." },
                    "specific_files": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Member names to extract. All members when omitted."
                    }
                }),
                &["zip_path"],
            ),
        )
    }

    fn preview(&self, args: &Value, workspace: &Workspace) -> Result<String> {
        let args: ExtractArgs = parse_args(args)?;
        let zip = workspace.resolve(&args.zip_path, args.use_data_dir)?;
        let target = match &args.output_dir {
            Some(dir) => workspace.resolve(dir, args.use_data_dir)?.display().to_string(),
            None => "the archive's directory".to_string(),
        };
        let members = match &args.specific_files {
            Some(files) if !files.is_empty() => files.join(", "),
            _ => "all members".to_string(),
        };
        Ok(format!(
            "Extract {} from {} into {}",
            members,
            style(zip.display()).bold(),
            style(target).yellow()
        ))
    }

    async fn execute(&self, args: &Value, workspace: &Workspace) -> Result<Value> {
        let args: ExtractArgs = parse_args(args)?;
        to_json(archive::extract_zip(
            workspace,
            &args.zip_path,
            args.output_dir.as_deref(),
            args.specific_files.as_deref(),
            args.use_data_dir,
        )?)
    }

    fn is_safe_for_auto_execute(&self, _args: &Value, _workspace: &Workspace) -> Result<bool> {
        Ok(false)
    }
}
