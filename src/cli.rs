use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Run sandboxed file operations from the command line
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the config file. Defaults to $XDG_CONFIG_HOME/filehand/config.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Base directory for relative paths. Overrides the config and PROJECT_DATA_DIRECTORY
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the JSON schemas of all tools
    Tools,
    /// Preview and execute a single tool call
    Call {
        /// Name of the tool, e.g. read_file
        tool: String,
        /// JSON object with the tool arguments
        #[arg(default_value = "{}")]
        arguments: String,
        /// Execute destructive calls without asking
        #[arg(short, long)]
        yes: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_call() {
        let cli = Cli::parse_from([
            "filehand",
            "--data-dir",
            "/tmp/data",
            "call",
            "read_file",
            r#"{"file_path": "a.txt"}"#,
            "--yes",
        ]);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/data")));
        match cli.command {
            Command::Call {
                tool,
                arguments,
                yes,
            } => {
                assert_eq!(tool, "read_file");
                assert_eq!(arguments, r#"{"file_path": "a.txt"}"#);
                assert!(yes);
            }
            Command::Tools => panic!("expected call"),
        }
    }

    #[test]
    fn test_arguments_default_to_empty_object() {
        let cli = Cli::parse_from(["filehand", "call", "get_current_working_directory"]);
        match cli.command {
            Command::Call { arguments, .. } => assert_eq!(arguments, "{}"),
            Command::Tools => panic!("expected call"),
        }
    }
}
