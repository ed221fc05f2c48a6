//! `devsync version`: build info plus where this invocation keeps its data.

use std::path::PathBuf;

use serde::Serialize;

use crate::config::resolve_db_path;
use crate::error::Result;
use crate::sync::SNAPSHOT_FILENAME;

#[derive(Serialize)]
struct VersionOutput<'a> {
    name: &'a str,
    version: &'a str,
    build: &'a str,
    database: Option<String>,
    snapshot_file: &'a str,
}

fn version_output(db_path: Option<&PathBuf>) -> VersionOutput<'static> {
    let build = if cfg!(debug_assertions) {
        "dev"
    } else {
        "release"
    };
    VersionOutput {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        build,
        database: resolve_db_path(db_path.map(PathBuf::as_path))
            .map(|path| path.display().to_string()),
        snapshot_file: SNAPSHOT_FILENAME,
    }
}

/// Print the devsync version, build profile and resolved database path.
///
/// The database is only located, never opened, so this works before the
/// first `init`.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let output = version_output(db_path);

    if json {
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("devsync {} ({})", output.version, output.build);
    println!(
        "  Database: {}",
        output.database.as_deref().unwrap_or("(no home directory)")
    );
    Ok(())
}
