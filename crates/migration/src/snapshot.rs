//! Collection snapshot files. A snapshot is rewritten as a whole on every
//! export, never appended to.

use std::path::{Path, PathBuf};

use crate::{
    error::MigrationError,
    files::{collection_file, read_json, write_json_atomic},
    types::{CollectionId, CollectionSnapshot},
};

pub fn write_snapshot(dir: &Path, snapshot: &CollectionSnapshot) -> Result<PathBuf, MigrationError> {
    let path = collection_file(dir, snapshot.id);
    write_json_atomic(&path, snapshot)?;
    Ok(path)
}

pub fn read_snapshot(
    dir: &Path,
    collection_id: CollectionId,
) -> Result<Option<CollectionSnapshot>, MigrationError> {
    read_json(&collection_file(dir, collection_id))
}
