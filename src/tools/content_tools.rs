use crate::diff;
use crate::error::Result;
use crate::hashing;
use crate::search;
use crate::tools::{
    FunctionDescription, Tool, default_true, describe, object_schema, parse_args, to_json,
};
use crate::workspace::Workspace;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct SearchArgs {
    file_path: String,
    search_text: String,
    #[serde(default)]
    use_regex: bool,
    #[serde(default = "default_true")]
    case_sensitive: bool,
    #[serde(default = "default_true")]
    use_data_dir: bool,
}

pub struct SearchContentTool;

#[async_trait]
impl Tool for SearchContentTool {
    fn name(&self) -> &'static str {
        "search_file_content"
    }

    fn schema(&self) -> FunctionDescription {
        describe(
            self.name(),
            "Searches a file line by line for text or a regular expression. Returns matching lines with 1-based line numbers and the character span of the first match.",
            object_schema(
                json!({
                    "file_path": { "type": "string", "description": "File to search." },
                    "search_text": { "type": "string", "description": "Text or pattern to look for." },
                    "use_regex": { "type": "boolean", "description": "Treat search_text as a regular expression. Default false." },
                    "case_sensitive": { "type": "boolean", "description": "Default true." }
                }),
                &["file_path", "search_text"],
            ),
        )
    }

    async fn execute(&self, args: &Value, workspace: &Workspace) -> Result<Value> {
        let args: SearchArgs = parse_args(args)?;
        to_json(search::search_file_content(
            workspace,
            &args.file_path,
            &args.search_text,
            args.use_regex,
            args.case_sensitive,
            args.use_data_dir,
        )?)
    }
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct CompareArgs {
    file_path1: String,
    file_path2: String,
    #[serde(default)]
    show_diff: bool,
    #[serde(default = "default_true")]
    use_data_dir: bool,
}

pub struct CompareFilesTool;

#[async_trait]
impl Tool for CompareFilesTool {
    fn name(&self) -> &'static str {
        "compare_files"
    }

    fn schema(&self) -> FunctionDescription {
        describe(
            self.name(),
            "Checks whether two files are identical. With show_diff, text files also get a line-by-line list of differences.",
            object_schema(
                json!({
                    "file_path1": { "type": "string", "description": "First file." },
                    "file_path2": { "type": "string", "description": "Second file." },
                    "show_diff": { "type": "boolean", "description": "Include line differences. Default false." }
                }),
                &["file_path1", "file_path2"],
            ),
        )
    }

    async fn execute(&self, args: &Value, workspace: &Workspace) -> Result<Value> {
        let args: CompareArgs = parse_args(args)?;
        to_json(diff::compare_files(
            workspace,
            &args.file_path1,
            &args.file_path2,
            args.show_diff,
            args.use_data_dir,
        )?)
    }
}

fn default_algorithm() -> String {
    "md5".to_string()
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct HashArgs {
    file_path: String,
    #[serde(default = "default_algorithm")]
    hash_algorithm: String,
    #[serde(default = "default_true")]
    use_data_dir: bool,
}

pub struct FileHashTool;

#[async_trait]
impl Tool for FileHashTool {
    fn name(&self) -> &'static str {
        "calculate_file_hash"
    }

    fn schema(&self) -> FunctionDescription {
        describe(
            self.name(),
            "Computes the hex digest of a file with md5, sha1, sha256 or sha512.",
            object_schema(
                json!({
                    "file_path": { "type": "string", "description": "File to hash." },
                    "hash_algorithm": {
                        "type": "string",
                        "enum": ["md5", "sha1", "sha256", "sha512"],
                        "description": "Default md5."
                    }
                }),
                &["file_path"],
            ),
        )
    }

    async fn execute(&self, args: &Value, workspace: &Workspace) -> Result<Value> {
        let args: HashArgs = parse_args(args)?;
        to_json(hashing::calculate_file_hash(
            workspace,
            &args.file_path,
            &args.hash_algorithm,
            args.use_data_dir,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::Builder;

    #[tokio::test]
    async fn test_content_tools() {
        let tmp_dir = Builder::new().prefix("test-content-tools-").tempdir().unwrap();
        fs::write(tmp_dir.path().join("a.txt"), "one\nTwo\n").unwrap();
        fs::write(tmp_dir.path().join("b.txt"), "one\nthree\n").unwrap();
        let ws = Workspace::new(tmp_dir.path());

        let found = SearchContentTool
            .execute(
                &json!({"file_path": "a.txt", "search_text": "two", "case_sensitive": false}),
                &ws,
            )
            .await
            .unwrap();
        assert_eq!(found["matches_found"], 1);
        assert_eq!(found["matched_lines"][0]["line_number"], 2);

        let compared = CompareFilesTool
            .execute(
                &json!({"file_path1": "a.txt", "file_path2": "b.txt", "show_diff": true}),
                &ws,
            )
            .await
            .unwrap();
        assert_eq!(compared["identical"], false);
        assert_eq!(compared["comparison_type"], "line_by_line");
        assert_eq!(compared["differences"][0]["file2_line"], "three");

        let hashed = FileHashTool
            .execute(&json!({"file_path": "a.txt"}), &ws)
            .await
            .unwrap();
        assert_eq!(hashed["algorithm"], "md5");
        assert_eq!(hashed["file_size"], 8);
    }
}
