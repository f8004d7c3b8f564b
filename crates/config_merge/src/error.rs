//! Error types for config merging

use std::{io::Error as IoError, path::PathBuf};
use thiserror::Error;

/// File-level merge failures. Per-item problems are collected as messages
/// in [`crate::MergeReport`] instead.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("Failed to read file {0}: {1}")]
    FileRead(PathBuf, IoError),

    #[error("Failed to create directory {0}: {1}")]
    DirectoryCreate(PathBuf, IoError),

    #[error("Failed to create file {0}: {1}")]
    FileCreate(PathBuf, IoError),

    #[error("Failed to write to file {0}: {1}")]
    FileWrite(PathBuf, IoError),

    #[error("Failed to sync file {0}: {1}")]
    FileSync(PathBuf, IoError),

    #[error("Failed to rename file from {0} to {1}: {2}")]
    FileRename(PathBuf, PathBuf, IoError),

    #[error("Invalid JSON in {0}: {1}")]
    InvalidJson(PathBuf, serde_json::Error),

    #[error("JSON document {0} is not an object")]
    NotAnObject(PathBuf),

    #[error("Invalid XML in {0}: {1}")]
    InvalidXml(PathBuf, xmltree::ParseError),

    #[error("Failed to serialize XML for {0}: {1}")]
    XmlWrite(PathBuf, xmltree::Error),

    #[error("Failed to serialize JSON for {0}: {1}")]
    JsonWrite(PathBuf, serde_json::Error),
}
