//! Temp-file-and-rename writes so a crash never leaves a half written config.

use crate::MergeError;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "config".to_string());
    path.with_file_name(format!(".{}.tmp", name))
}

pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), MergeError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .map_err(|e| MergeError::DirectoryCreate(parent.to_path_buf(), e))?;
        }
    }

    let temp = temp_path(path);
    let mut file =
        fs::File::create(&temp).map_err(|e| MergeError::FileCreate(temp.clone(), e))?;
    file.write_all(contents)
        .map_err(|e| MergeError::FileWrite(temp.clone(), e))?;
    file.sync_all()
        .map_err(|e| MergeError::FileSync(temp.clone(), e))?;
    drop(file);

    fs::rename(&temp, path).map_err(|e| MergeError::FileRename(temp, path.to_path_buf(), e))
}

/// Existing contents, or `None` when the file is absent
pub(crate) fn read_existing(path: &Path) -> Result<Option<String>, MergeError> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(MergeError::FileRead(path.to_path_buf(), e)),
    }
}
