//! CLI definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub mod commands;

/// devsync - mirror the agent database to a local folder
#[derive(Parser, Debug)]
#[command(name = "devsync", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: ~/.devsync/data/devsync.db)
    #[arg(long, global = true, env = "DEVSYNC_DB")]
    pub db: Option<PathBuf>,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start syncing to a directory (runs an initial export)
    Init {
        /// Sync root; must exist and be writable
        dir: PathBuf,

        /// Only sync these categories (comma-separated)
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,

        /// Also write the compressed database snapshot
        #[arg(long)]
        full_export: bool,
    },

    /// Write changed entities to the sync root
    Export,

    /// Merge edited files from the sync root into the database
    Import,

    /// Keep syncing in the foreground until interrupted
    Watch,

    /// Show sync status
    Status,

    /// Enable or disable one category
    Toggle {
        /// agents, conversations, memories, knowledge, tasks, studio, full-export
        category: String,

        #[arg(value_enum)]
        state: ToggleState,
    },

    /// Deactivate sync (files are left in place)
    Stop,

    /// Inspect and edit database records
    Entity {
        #[command(subcommand)]
        command: EntityCommands,
    },

    /// Print the contents of the database snapshot at the sync root
    Snapshot,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Print version information
    Version,
}

/// On/off argument of `devsync toggle`.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToggleState {
    On,
    Off,
}

impl ToggleState {
    #[must_use]
    pub const fn enabled(self) -> bool {
        matches!(self, Self::On)
    }
}

#[derive(Subcommand, Debug)]
pub enum EntityCommands {
    /// List records of one type
    List {
        /// agent, conversation, memory, knowledge, task, studio
        kind: String,

        /// Include soft-deleted records
        #[arg(long)]
        all: bool,
    },

    /// Insert or replace a record from JSON (file or stdin)
    Put {
        /// JSON file; reads stdin when omitted
        file: Option<PathBuf>,
    },

    /// Delete a record and its files
    Remove {
        /// Entity type
        kind: String,

        /// Record ID
        id: String,
    },

    /// Remove one image from a studio entry
    RemoveImage {
        /// Studio entry ID
        entry_id: String,

        /// Image ID
        image_id: String,
    },
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_init_with_categories() {
        let cli = Cli::parse_from([
            "devsync",
            "init",
            "/tmp/devs",
            "--only",
            "agents,memories",
            "--full-export",
        ]);
        match cli.command {
            Commands::Init {
                dir,
                only,
                full_export,
            } => {
                assert_eq!(dir, PathBuf::from("/tmp/devs"));
                assert_eq!(only, vec!["agents", "memories"]);
                assert!(full_export);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_toggle() {
        let cli = Cli::parse_from(["devsync", "--json", "toggle", "studio", "off"]);
        assert!(cli.json);
        match cli.command {
            Commands::Toggle { category, state } => {
                assert_eq!(category, "studio");
                assert!(!state.enabled());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
