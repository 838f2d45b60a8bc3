use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use filehand::{Config, ToolCollection, Workspace, config};
use std::io::{self, Write};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_tracing(&config);

    let workspace = Workspace::from_config(&config);
    tracing::debug!(base_dir = %workspace.base_dir().display(), "workspace ready");
    let tools = ToolCollection::with_default_tools();

    match cli.command {
        Command::Tools => {
            let schemas = tools.get_all_schemas();
            println!("{}", serde_json::to_string_pretty(&schemas)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Call {
            tool,
            arguments,
            yes,
        } => run_call(&tools, &workspace, &tool, &arguments, yes).await,
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => config::load_from(path)?,
        None => config::load_or_create()?,
    };
    config.apply_env_overrides();
    if let Some(data_dir) = &cli.data_dir {
        config.data_directory = data_dir.clone();
    }
    Ok(config)
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("filehand={},warn", config.log_level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn run_call(
    tools: &ToolCollection,
    workspace: &Workspace,
    tool: &str,
    arguments: &str,
    yes: bool,
) -> Result<ExitCode> {
    eprintln!("[{}]", style(format!("tool: {tool}")).magenta());
    match tools.preview_tool_call(tool, arguments, workspace) {
        Ok(preview) => eprintln!("{preview}"),
        Err(e) => {
            eprintln!("{}", style(format!("Preview failed: {e}")).red());
            println!("{}", serde_json::to_string_pretty(&e.to_json())?);
            return Ok(ExitCode::FAILURE);
        }
    }

    let is_safe = match tools.is_safe_for_auto_execute(tool, arguments, workspace) {
        Ok(is_safe) => is_safe,
        Err(e) => {
            eprintln!(
                "{}",
                style(format!(
                    "Security check failed for tool call, please confirm manually: {e}"
                ))
                .red()
            );
            false
        }
    };

    if !is_safe && !yes && !confirm().await? {
        eprintln!("{}", style("Operation cancelled.").yellow());
        return Ok(ExitCode::FAILURE);
    }

    let response = tools.execute_tool_call(tool, arguments, workspace).await;
    println!("{}", serde_json::to_string_pretty(&response.content)?);
    Ok(if response.is_error {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Asks on stderr and reads one line from stdin. Anything but "n" confirms;
/// Ctrl+C and EOF cancel.
async fn confirm() -> Result<bool> {
    eprint!("\x07{} ", style("Execute this tool? [Y/n] ").dim());
    io::stderr().flush()?;

    let read_line = tokio::task::spawn_blocking(|| {
        let mut buffer = String::new();
        let read = io::stdin().read_line(&mut buffer)?;
        Ok::<_, io::Error>((read > 0).then(|| buffer.trim().to_string()))
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => Ok(false),
        line = read_line => {
            let line = line.context("stdin reader panicked")??;
            Ok(matches!(line, Some(input) if !input.eq_ignore_ascii_case("n")))
        }
    }
}
