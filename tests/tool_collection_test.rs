use anyhow::Result;
use filehand::{ToolCollection, Workspace};
use serde_json::{Value, json};
use std::fs;
use tempfile::{Builder, TempDir};

fn setup() -> Result<(TempDir, Workspace, ToolCollection)> {
    let temp_dir = Builder::new().prefix("test-filehand-").tempdir()?;
    let workspace = Workspace::new(temp_dir.path());
    Ok((temp_dir, workspace, ToolCollection::with_default_tools()))
}

async fn call(tools: &ToolCollection, ws: &Workspace, name: &str, args: Value) -> Value {
    let response = tools.execute_tool_call(name, &args.to_string(), ws).await;
    assert!(!response.is_error, "{name} failed: {}", response.content);
    response.content
}

async fn call_err(tools: &ToolCollection, ws: &Workspace, name: &str, args: Value) -> String {
    let response = tools.execute_tool_call(name, &args.to_string(), ws).await;
    assert!(response.is_error, "{name} unexpectedly succeeded");
    response.content["error"]["kind"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn test_create_append_read_and_hash() -> Result<()> {
    let (temp_dir, ws, tools) = setup()?;

    call(
        &tools,
        &ws,
        "create_new_file",
        json!({"file_path": "data/a.txt", "content": "hello"}),
    )
    .await;
    call(
        &tools,
        &ws,
        "append_to_file",
        json!({"file_path": "data/a.txt", "content": " world"}),
    )
    .await;

    let content = call(&tools, &ws, "read_file", json!({"file_path": "data/a.txt"})).await;
    assert_eq!(content, json!("hello world"));
    assert_eq!(
        fs::read_to_string(temp_dir.path().join("data/a.txt"))?,
        "hello world"
    );

    let args = json!({"file_path": "data/a.txt", "hash_algorithm": "sha256"});
    let first = call(&tools, &ws, "calculate_file_hash", args.clone()).await;
    let second = call(&tools, &ws, "calculate_file_hash", args).await;
    assert_eq!(
        first["hash"],
        "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
    );
    assert_eq!(first["hash"], second["hash"]);
    Ok(())
}

#[tokio::test]
async fn test_copy_refuses_existing_destination() -> Result<()> {
    let (temp_dir, ws, tools) = setup()?;
    fs::write(temp_dir.path().join("src.txt"), "source")?;
    fs::write(temp_dir.path().join("dst.txt"), "taken")?;

    let kind = call_err(
        &tools,
        &ws,
        "copy_file",
        json!({"source_path": "src.txt", "destination_path": "dst.txt"}),
    )
    .await;
    assert_eq!(kind, "already_exists");
    assert_eq!(fs::read_to_string(temp_dir.path().join("dst.txt"))?, "taken");

    call(
        &tools,
        &ws,
        "copy_file",
        json!({"source_path": "src.txt", "destination_path": "copy.txt"}),
    )
    .await;
    assert_eq!(fs::read_to_string(temp_dir.path().join("copy.txt"))?, "source");
    assert_eq!(fs::read_to_string(temp_dir.path().join("src.txt"))?, "source");
    Ok(())
}

#[tokio::test]
async fn test_paths_cannot_escape_base_directory() -> Result<()> {
    let (_temp_dir, ws, tools) = setup()?;
    let kind = call_err(
        &tools,
        &ws,
        "read_file",
        json!({"file_path": "../../etc/passwd"}),
    )
    .await;
    assert_eq!(kind, "outside_base_directory");

    let kind = call_err(
        &tools,
        &ws,
        "write_to_file",
        json!({"file_path": "nested/../../escape.txt", "content": "x"}),
    )
    .await;
    assert_eq!(kind, "outside_base_directory");
    Ok(())
}

#[tokio::test]
async fn test_zip_then_extract_reproduces_content() -> Result<()> {
    let (temp_dir, ws, tools) = setup()?;
    let root = temp_dir.path();
    fs::create_dir_all(root.join("docs/deep"))?;
    fs::write(root.join("docs/readme.md"), "# readme\n")?;
    fs::write(root.join("docs/deep/blob.bin"), [0u8, 159, 146, 150, 255])?;

    let report = call(
        &tools,
        &ws,
        "zip_files",
        json!({"source_paths": ["docs", "missing.txt"], "output_zip_path": "out/docs.zip"}),
    )
    .await;
    assert_eq!(report["total_files"], 2);
    assert_eq!(report["invalid_sources"].as_array().map(Vec::len), Some(1));

    call(
        &tools,
        &ws,
        "extract_zip",
        json!({"zip_path": "out/docs.zip", "output_dir": "restored"}),
    )
    .await;
    assert_eq!(
        fs::read(root.join("restored/docs/readme.md"))?,
        fs::read(root.join("docs/readme.md"))?
    );
    assert_eq!(
        fs::read(root.join("restored/docs/deep/blob.bin"))?,
        fs::read(root.join("docs/deep/blob.bin"))?
    );
    Ok(())
}

#[tokio::test]
async fn test_batch_dry_run_matches_real_run() -> Result<()> {
    let (temp_dir, ws, tools) = setup()?;
    let root = temp_dir.path();
    fs::create_dir(root.join("photos"))?;
    fs::write(root.join("photos/b.jpg"), "b")?;
    fs::write(root.join("photos/a.jpg"), "a")?;
    fs::write(root.join("photos/notes.txt"), "n")?;

    let mut args = json!({
        "directory_path": "photos",
        "operation": "rename",
        "pattern": "*.jpg",
        "operation_args": {"rename_pattern": "img_{index}"}
    });
    let planned = call(&tools, &ws, "batch_process_files", args.clone()).await;
    assert_eq!(planned["dry_run"], true);
    assert!(root.join("photos/a.jpg").exists());

    args["dry_run"] = json!(false);
    let done = call(&tools, &ws, "batch_process_files", args).await;

    let targets = |report: &Value| -> Vec<Value> {
        report["processed_files"]
            .as_array()
            .into_iter()
            .flatten()
            .map(|file| file["new_name"].clone())
            .collect()
    };
    assert_eq!(targets(&planned), targets(&done));
    assert_eq!(done["total_processed"], 2);
    assert!(root.join("photos/img_1.jpg").exists());
    assert!(root.join("photos/img_2.jpg").exists());
    assert!(root.join("photos/notes.txt").exists());
    Ok(())
}

#[tokio::test]
async fn test_scan_then_check_reports_modified_file() -> Result<()> {
    let (temp_dir, ws, tools) = setup()?;
    let root = temp_dir.path();
    fs::create_dir(root.join("tracked"))?;
    fs::write(root.join("tracked/one.txt"), "1")?;
    fs::write(root.join("tracked/two.txt"), "2")?;

    let scan = json!({"directory_path": "tracked", "action": "scan"});
    let check = json!({"directory_path": "tracked", "action": "check"});
    call(&tools, &ws, "detect_file_changes", scan).await;

    let unchanged = call(&tools, &ws, "detect_file_changes", check.clone()).await;
    assert_eq!(unchanged["total_changes"], 0);

    fs::write(root.join("tracked/two.txt"), "two, but longer")?;
    let changed = call(&tools, &ws, "detect_file_changes", check).await;
    assert_eq!(changed["total_changes"], 1);
    let changed_files = changed["changed_files"].as_array().cloned().unwrap_or_default();
    assert_eq!(changed_files.len(), 1);
    assert!(
        changed_files[0]
            .as_str()
            .is_some_and(|path| path.ends_with("two.txt"))
    );
    Ok(())
}

#[tokio::test]
async fn test_destructive_calls_need_confirmation() -> Result<()> {
    let (temp_dir, ws, tools) = setup()?;
    fs::write(temp_dir.path().join("keep.txt"), "keep")?;

    let delete = json!({"file_path": "keep.txt"}).to_string();
    assert!(!tools.is_safe_for_auto_execute("delete_file", &delete, &ws)?);

    let read = json!({"file_path": "keep.txt"}).to_string();
    assert!(tools.is_safe_for_auto_execute("read_file", &read, &ws)?);

    let overwrite = json!({"file_path": "keep.txt", "content": "x"}).to_string();
    assert!(!tools.is_safe_for_auto_execute("write_to_file", &overwrite, &ws)?);

    let fresh = json!({"file_path": "fresh.txt", "content": "x"}).to_string();
    assert!(tools.is_safe_for_auto_execute("write_to_file", &fresh, &ws)?);
    Ok(())
}
