//! devsync CLI entry point.

use clap::Parser;
use devsync::cli::commands;
use devsync::cli::{Cli, Commands};
use devsync::error::Error;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Set up tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    // Resolve effective JSON mode: --json OR non-TTY stdout
    let json = cli.json || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    // Run the command and handle errors
    match run(&cli, json).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,rusqlite=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

async fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    let db = cli.db.as_ref();
    match &cli.command {
        Commands::Init {
            dir,
            only,
            full_export,
        } => commands::init::execute(dir, only, *full_export, db, json).await,
        Commands::Export => commands::sync::export(db, json).await,
        Commands::Import => commands::sync::import(db, json).await,
        Commands::Watch => commands::sync::watch(db, json).await,
        Commands::Status => commands::status::execute(db, json),
        Commands::Toggle { category, state } => {
            commands::sync::toggle(category, *state, db, json).await
        }
        Commands::Stop => commands::sync::stop(db, json),
        Commands::Entity { command } => commands::entity::execute(command, db, json).await,
        Commands::Snapshot => commands::sync::snapshot(db, json).await,
        Commands::Completions { shell } => commands::completions::execute(shell),
        Commands::Version => commands::version::execute(db, json),
    }
}
