//! Status command implementation.

use std::path::PathBuf;

use crate::cli::commands::open_storage;
use crate::error::Result;
use crate::serializers::SerializerRegistry;
use crate::sync::{get_sync_status, print_status};

/// Execute the status command.
///
/// Works without an active session; everything shown comes from the
/// database.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or read.
pub fn execute(db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let storage = open_storage(db_path)?;
    let status = get_sync_status(
        storage.as_ref(),
        storage.as_ref(),
        &SerializerRegistry::default(),
    )?;

    if json {
        println!("{}", serde_json::to_string(&status)?);
    } else {
        print_status(&status);
    }
    Ok(())
}
