//! File layout of an export/import working directory.

use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Serialize, de::DeserializeOwned};

use crate::{error::MigrationError, types::CollectionId};

pub fn collection_file(dir: &Path, collection_id: CollectionId) -> PathBuf {
    dir.join(format!("export_collection_{collection_id}.json"))
}

pub fn tokens_file(dir: &Path, collection_id: CollectionId) -> PathBuf {
    dir.join(format!("export_tokens_{collection_id}.json"))
}

pub fn state_file(dir: &Path, collection_id: CollectionId) -> PathBuf {
    dir.join(format!("import_state_collection_{collection_id}.json"))
}

/// Replaces `path` with `value` pretty-printed. The bytes go to a sibling
/// temporary file first, so readers only ever see a complete document.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), MigrationError> {
    let encoded = serde_json::to_vec_pretty(value).map_err(|err| MigrationError::json(path, err))?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|err| MigrationError::io(parent, err))?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let mut file = File::create(&tmp_path).map_err(|err| MigrationError::io(&tmp_path, err))?;
    file.write_all(&encoded)
        .and_then(|()| file.write_all(b"\n"))
        .and_then(|()| file.sync_all())
        .map_err(|err| MigrationError::io(&tmp_path, err))?;
    fs::rename(&tmp_path, path).map_err(|err| MigrationError::io(path, err))
}

/// Reads a JSON document, `None` when the file does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, MigrationError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(MigrationError::io(path, err)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|err| MigrationError::json(path, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn file_names_follow_collection_ids() {
        let dir = Path::new("/data");
        assert_eq!(
            collection_file(dir, 7),
            PathBuf::from("/data/export_collection_7.json")
        );
        assert_eq!(tokens_file(dir, 7), PathBuf::from("/data/export_tokens_7.json"));
        assert_eq!(
            state_file(dir, 7),
            PathBuf::from("/data/import_state_collection_7.json")
        );
    }

    #[test]
    fn atomic_write_overwrites_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let path = dir.path().join("nested").join("doc.json");

        write_json_atomic(&path, &json!({"round": 1})).unwrap();
        write_json_atomic(&path, &json!({"round": 2})).unwrap();

        let value: Value = read_json(&path).unwrap().unwrap();
        assert_eq!(value, json!({"round": 2}));
        assert!(!dir.path().join("nested").join("doc.json.tmp").exists());
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let value: Option<Value> = read_json(&dir.path().join("absent.json")).unwrap();
        assert!(value.is_none());
    }
}
