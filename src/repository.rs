//! Task repository - the host that stores and runs native task definitions
//!
//! Task paths use the native form: backslash separated, rooted at `\`
//! (`\Backups\Nightly`). Implementations call the codecs on every read and
//! write; last writer wins on concurrent registration.

use crate::models::{HistoryEntry, Task, TaskFolder};
use crate::storage::StorageError;
use crate::xml::XmlError;
use std::path::Path;
use thiserror::Error;

pub const ROOT_FOLDER: &str = "\\";

/// Characters the native scheduler rejects in task and folder names
const INVALID_NAME_CHARS: [char; 9] = ['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid name {0:?}")]
    InvalidName(String),

    #[error("task {0} is disabled")]
    Disabled(String),

    #[error("folder {0} is not empty")]
    FolderNotEmpty(String),

    #[error("the root folder cannot be deleted")]
    RootFolder,

    #[error("invalid task definition: {0}")]
    Definition(#[from] XmlError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{tool} failed: {message}")]
    Tool { tool: String, message: String },
}

/// Everything the rest of the crate needs from a scheduler host
pub trait TaskRepository: Send + Sync {
    fn list_tasks(&self, folder: &str, recursive: bool) -> Result<Vec<Task>, RepositoryError>;

    /// `Ok(None)` when no task is registered at `path`
    fn get_task(&self, path: &str) -> Result<Option<Task>, RepositoryError>;

    /// Register a new task or replace an existing one; returns its path.
    fn register_or_update(&self, task: &Task) -> Result<String, RepositoryError>;

    fn delete(&self, path: &str) -> Result<(), RepositoryError>;
    fn run(&self, path: &str) -> Result<(), RepositoryError>;
    fn stop(&self, path: &str) -> Result<(), RepositoryError>;
    fn enable(&self, path: &str) -> Result<(), RepositoryError>;
    fn disable(&self, path: &str) -> Result<(), RepositoryError>;

    fn get_raw_definition_text(&self, path: &str) -> Result<String, RepositoryError>;

    /// Register raw definition XML at `path`, creating or replacing the task.
    fn set_raw_definition_text(&self, path: &str, text: &str) -> Result<(), RepositoryError>;

    /// Write the raw definition as a UTF-16 XML file, the form the native
    /// import accepts.
    fn export_to_file(&self, path: &str, destination: &Path) -> Result<(), RepositoryError> {
        let text = self.get_raw_definition_text(path)?;
        std::fs::write(destination, encode_utf16le(&text))?;
        tracing::info!("Exported {} to {}", path, destination.display());
        Ok(())
    }

    fn list_folders(&self) -> Result<TaskFolder, RepositoryError>;
    fn create_folder(&self, path: &str) -> Result<(), RepositoryError>;
    fn delete_folder(&self, path: &str) -> Result<(), RepositoryError>;

    /// Newest first
    fn get_history(&self, path: &str) -> Result<Vec<HistoryEntry>, RepositoryError>;
}

/// Backslash separators, a leading `\`, no empty or trailing segments.
pub fn normalize_path(path: &str) -> String {
    let segments = path_segments(path);
    if segments.is_empty() {
        ROOT_FOLDER.to_string()
    } else {
        format!("\\{}", segments.join("\\"))
    }
}

pub fn path_segments(path: &str) -> Vec<&str> {
    path.split(['\\', '/'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Last path segment
pub fn task_name(path: &str) -> &str {
    path.trim_end_matches(['\\', '/'])
        .rsplit(['\\', '/'])
        .next()
        .unwrap_or_default()
}

pub fn parent_folder(path: &str) -> String {
    let mut segments = path_segments(path);
    segments.pop();
    normalize_path(&segments.join("\\"))
}

pub fn join_path(folder: &str, name: &str) -> String {
    normalize_path(&format!("{folder}\\{name}"))
}

pub fn is_root(path: &str) -> bool {
    path_segments(path).is_empty()
}

/// Whether `path` lies in `folder` (directly, or anywhere below it when
/// `recursive`).
pub fn in_folder(path: &str, folder: &str, recursive: bool) -> bool {
    let folder = path_segments(folder);
    let segments = path_segments(path);
    if segments.len() <= folder.len() || !segments.iter().zip(&folder).all(|(a, b)| a.eq_ignore_ascii_case(b)) {
        return false;
    }
    recursive || segments.len() == folder.len() + 1
}

pub fn validate_name(name: &str) -> Result<(), RepositoryError> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains(INVALID_NAME_CHARS)
        || trimmed.chars().any(char::is_control)
    {
        return Err(RepositoryError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Build the folder tree from folder paths, in any order; the root is implied.
pub fn build_folder_tree<S: AsRef<str>>(paths: &[S]) -> TaskFolder {
    let mut root = TaskFolder {
        name: ROOT_FOLDER.to_string(),
        path: ROOT_FOLDER.to_string(),
        sub_folders: vec![],
    };
    for path in paths {
        let mut node = &mut root;
        for segment in path_segments(path.as_ref()) {
            let index = match node
                .sub_folders
                .iter()
                .position(|f| f.name.eq_ignore_ascii_case(segment))
            {
                Some(index) => index,
                None => {
                    let child = TaskFolder {
                        name: segment.to_string(),
                        path: join_path(&node.path, segment),
                        sub_folders: vec![],
                    };
                    node.sub_folders.push(child);
                    node.sub_folders.len() - 1
                }
            };
            node = &mut node.sub_folders[index];
        }
    }
    sort_folders(&mut root);
    root
}

fn sort_folders(folder: &mut TaskFolder) {
    folder
        .sub_folders
        .sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    for child in &mut folder.sub_folders {
        sort_folders(child);
    }
}

/// UTF-16LE with a byte order mark
pub fn encode_utf16le(text: &str) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xFE];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    bytes
}

/// Decode a definition file: UTF-16 (either byte order, BOM required) or
/// UTF-8 with an optional BOM.
pub fn decode_text(bytes: &[u8]) -> Result<String, RepositoryError> {
    let invalid = |what: &str| {
        RepositoryError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("file is not valid {what}"),
        ))
    };
    let utf16 = |body: &[u8], from: fn([u8; 2]) -> u16| {
        let units: Vec<u16> = body.chunks_exact(2).map(|c| from([c[0], c[1]])).collect();
        String::from_utf16(&units).map_err(|_| invalid("UTF-16"))
    };
    match bytes {
        [0xFF, 0xFE, body @ ..] => utf16(body, u16::from_le_bytes),
        [0xFE, 0xFF, body @ ..] => utf16(body, u16::from_be_bytes),
        [0xEF, 0xBB, 0xBF, body @ ..] => String::from_utf8(body.to_vec()).map_err(|_| invalid("UTF-8")),
        _ => String::from_utf8(bytes.to_vec()).map_err(|_| invalid("UTF-8")),
    }
}
