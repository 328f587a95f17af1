//! File-backed scheduler host
//!
//! Stands in for the OS scheduler on machines without one. Folders are
//! directories under `<data_dir>/tasks`, each task is `<Name>.xml` holding
//! the raw definition, and runtime state plus history live in SQLite. Run
//! requests are recorded, never executed.

use crate::history::event_label;
use crate::models::{HistoryEntry, Task, TaskFolder, TaskRuntime, TaskState};
use crate::native::NativeTaskDefinition;
use crate::repository::*;
use crate::scheduler::next_run_time;
use crate::storage::Database;
use crate::task_codec;
use crate::xml::{self, XmlError, XmlNode};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Native result codes reported in `last_result`
pub const RESULT_HAS_NOT_RUN: i32 = 0x41303;
pub const RESULT_RUNNING: i32 = 0x41301;
pub const RESULT_TERMINATED: i32 = 0x41306;

const TASK_EXTENSION: &str = "xml";

pub struct LocalStore {
    tasks_dir: PathBuf,
    db: Database,
    history_limit: u32,
}

impl LocalStore {
    /// Open or create the store under `data_dir`
    pub fn open(data_dir: &Path, history_limit: u32) -> Result<Self, RepositoryError> {
        let tasks_dir = data_dir.join("tasks");
        fs::create_dir_all(&tasks_dir)?;
        let db = Database::open(&data_dir.join("taskdeck.db"))?;
        info!("Local task store at {}", data_dir.display());
        Ok(Self {
            tasks_dir,
            db,
            history_limit,
        })
    }

    fn folder_dir(&self, folder: &str) -> Result<PathBuf, RepositoryError> {
        let mut dir = self.tasks_dir.clone();
        for segment in path_segments(folder) {
            validate_name(segment)?;
            dir.push(segment);
        }
        Ok(dir)
    }

    fn task_file(&self, path: &str) -> Result<PathBuf, RepositoryError> {
        let name = task_name(path);
        validate_name(name)?;
        let mut file = self.folder_dir(&parent_folder(path))?;
        file.push(format!("{name}.{TASK_EXTENSION}"));
        Ok(file)
    }

    fn read_text(&self, path: &str) -> Result<Option<String>, RepositoryError> {
        let file = self.task_file(path)?;
        if !file.is_file() {
            return Ok(None);
        }
        Ok(Some(decode_text(&fs::read(file)?)?))
    }

    fn write_text(&self, path: &str, text: &str) -> Result<(), RepositoryError> {
        let file = self.task_file(path)?;
        if let Some(dir) = file.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&file, encode_utf16le(text))?;
        Ok(())
    }

    /// Whether the task file appears under its exact name. A case-only
    /// rename on a case-insensitive file system keeps the old entry.
    fn file_listed(&self, path: &str) -> Result<bool, RepositoryError> {
        let file = self.task_file(path)?;
        let (Some(dir), Some(name)) = (file.parent(), file.file_name()) else {
            return Ok(false);
        };
        if !dir.is_dir() {
            return Ok(false);
        }
        for entry in fs::read_dir(dir)? {
            if entry?.file_name() == name {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn load_task(&self, path: &str) -> Result<Option<Task>, RepositoryError> {
        let Some(text) = self.read_text(path)? else {
            return Ok(None);
        };
        let definition = NativeTaskDefinition::from_xml_text(&text)?;
        let mut task = task_codec::from_registered(path, &definition, self.runtime(path)?);
        task.runtime.next_run_time = next_run_time(&task, Utc::now());
        Ok(Some(task))
    }

    fn require_task(&self, path: &str) -> Result<Task, RepositoryError> {
        self.load_task(path)?
            .ok_or_else(|| RepositoryError::NotFound(path.to_string()))
    }

    fn runtime(&self, path: &str) -> Result<TaskRuntime, RepositoryError> {
        Ok(self.db.get_runtime(path)?.unwrap_or(TaskRuntime {
            state: TaskState::Ready,
            last_result: RESULT_HAS_NOT_RUN,
            ..Default::default()
        }))
    }

    fn record(&self, path: &str, event_id: u32, exit_code: &str, activity_id: Uuid) -> Result<(), RepositoryError> {
        let user = current_user();
        let message = match event_id {
            100 => format!(r#"Task Scheduler started "{activity_id}" instance of the "{path}" task for user "{user}"."#),
            106 => format!(r#"User "{user}" registered Task Scheduler task "{path}""#),
            110 => format!(r#"Task Scheduler launched "{activity_id}" instance of task "{path}" for user "{user}"."#),
            111 => format!(r#"User "{user}" terminated task "{path}"."#),
            140 => format!(r#"User "{user}" updated Task Scheduler task "{path}""#),
            141 => format!(r#"User "{user}" deleted Task Scheduler task "{path}""#),
            _ => String::new(),
        };
        let entry = HistoryEntry {
            timestamp: Utc::now(),
            event_id,
            result_label: event_label(event_id),
            exit_code: exit_code.to_string(),
            message,
            user,
            activity_id: Some(activity_id),
        };
        self.db.insert_history(path, &entry)?;
        Ok(())
    }

    /// Store `text` at `path` and log the registration.
    fn register_text(&self, path: &str, text: &str) -> Result<(), RepositoryError> {
        let existed = self.task_file(path)?.is_file();
        self.write_text(path, text)?;
        if existed {
            self.record(path, 140, "", Uuid::new_v4())?;
            info!("Updated task {}", path);
        } else {
            self.db.save_runtime(path, &self.runtime(path)?)?;
            self.record(path, 106, "", Uuid::new_v4())?;
            info!("Registered task {}", path);
        }
        Ok(())
    }

    fn remove_task(&self, path: &str) -> Result<(), RepositoryError> {
        fs::remove_file(self.task_file(path)?)?;
        self.db.delete_runtime(path)?;
        self.record(path, 141, "", Uuid::new_v4())?;
        info!("Deleted task {}", path);
        Ok(())
    }

    fn set_enabled(&self, path: &str, enabled: bool) -> Result<(), RepositoryError> {
        let text = self
            .read_text(path)?
            .ok_or_else(|| RepositoryError::NotFound(path.to_string()))?;
        self.write_text(path, &set_enabled_flag(&text, enabled)?)?;

        let mut runtime = self.runtime(path)?;
        runtime.state = match (enabled, runtime.state) {
            (false, _) => TaskState::Disabled,
            (true, TaskState::Disabled) => TaskState::Ready,
            (true, state) => state,
        };
        self.db.save_runtime(path, &runtime)?;
        info!("{} task {}", if enabled { "Enabled" } else { "Disabled" }, path);
        Ok(())
    }

    /// Task paths in `folder`, sorted
    fn task_paths(&self, folder: &str, recursive: bool) -> Result<Vec<String>, RepositoryError> {
        let dir = self.folder_dir(folder)?;
        if !dir.is_dir() {
            return Err(RepositoryError::NotFound(normalize_path(folder)));
        }
        let mut paths = Vec::new();
        collect_task_paths(&dir, &normalize_path(folder), recursive, &mut paths)?;
        paths.sort_by_key(|p| p.to_lowercase());
        Ok(paths)
    }
}

fn collect_task_paths(dir: &Path, folder: &str, recursive: bool, out: &mut Vec<String>) -> Result<(), RepositoryError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_path = entry.path();
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if file_path.is_dir() {
            if recursive {
                collect_task_paths(&file_path, &join_path(folder, &name), true, out)?;
            }
        } else if file_path.extension().is_some_and(|ext| ext == TASK_EXTENSION) {
            if let Some(stem) = file_path.file_stem().and_then(|s| s.to_str()) {
                out.push(join_path(folder, stem));
            }
        }
    }
    Ok(())
}

fn collect_folders(dir: &Path, folder: &str, out: &mut Vec<String>) -> Result<(), RepositoryError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.path().is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            let path = join_path(folder, name);
            collect_folders(&entry.path(), &path, out)?;
            out.push(path);
        }
    }
    Ok(())
}

fn current_user() -> String {
    std::env::var("USERNAME")
        .or_else(|_| std::env::var("USER"))
        .unwrap_or_default()
}

/// Rewrite `Settings/Enabled`, keeping every other element of the
/// definition.
pub fn set_enabled_flag(text: &str, enabled: bool) -> Result<String, XmlError> {
    let mut root = xml::parse(text)?;
    if root.local_name() != "Task" {
        return Err(XmlError::UnexpectedRoot(root.name));
    }
    let value = if enabled { "true" } else { "false" };

    let settings = match root.children.iter().position(|c| c.local_name() == "Settings") {
        Some(index) => &mut root.children[index],
        None => {
            root.push(XmlNode::new("Settings"));
            let last = root.children.len() - 1;
            &mut root.children[last]
        }
    };
    match settings.children.iter_mut().find(|c| c.local_name() == "Enabled") {
        Some(flag) => flag.text = value.to_string(),
        None => settings.push_text("Enabled", value),
    }
    xml::write(&root, "UTF-16")
}

impl TaskRepository for LocalStore {
    fn list_tasks(&self, folder: &str, recursive: bool) -> Result<Vec<Task>, RepositoryError> {
        let mut tasks = Vec::new();
        for path in self.task_paths(folder, recursive)? {
            match self.load_task(&path) {
                Ok(Some(task)) => tasks.push(task),
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable task {}: {}", path, e),
            }
        }
        Ok(tasks)
    }

    fn get_task(&self, path: &str) -> Result<Option<Task>, RepositoryError> {
        self.load_task(&normalize_path(path))
    }

    fn register_or_update(&self, task: &Task) -> Result<String, RepositoryError> {
        validate_name(&task.name)?;
        let previous = task.path.as_deref().map(normalize_path);
        let folder = previous
            .as_deref()
            .map(parent_folder)
            .unwrap_or_else(|| ROOT_FOLDER.to_string());
        let path = join_path(&folder, task.name.trim());

        let mut definition = task_codec::to_native(task);
        definition.registration_info.uri = Some(path.clone());
        self.register_text(&path, &definition.xml_text()?)?;

        // The old registration goes only once the new one is stored
        if let Some(old) = previous.filter(|old| *old != path) {
            if self.file_listed(&old)? && self.file_listed(&path)? {
                debug!("Task renamed from {} to {}", old, path);
                self.remove_task(&old)?;
            }
        }
        Ok(path)
    }

    fn delete(&self, path: &str) -> Result<(), RepositoryError> {
        let path = normalize_path(path);
        if !self.task_file(&path)?.is_file() {
            return Err(RepositoryError::NotFound(path));
        }
        self.remove_task(&path)
    }

    fn run(&self, path: &str) -> Result<(), RepositoryError> {
        let path = normalize_path(path);
        let task = self.require_task(&path)?;
        if !task.enabled {
            return Err(RepositoryError::Disabled(path));
        }
        let runtime = TaskRuntime {
            state: TaskState::Running,
            last_run_time: Some(Utc::now()),
            last_result: RESULT_RUNNING,
            next_run_time: None,
        };
        self.db.save_runtime(&path, &runtime)?;
        let activity = Uuid::new_v4();
        self.record(&path, 110, "", activity)?;
        self.record(&path, 100, "", activity)?;
        info!("Run requested for {}", path);
        Ok(())
    }

    fn stop(&self, path: &str) -> Result<(), RepositoryError> {
        let path = normalize_path(path);
        self.require_task(&path)?;
        let mut runtime = self.runtime(&path)?;
        if runtime.state != TaskState::Running {
            debug!("Task {} is not running", path);
            return Ok(());
        }
        runtime.state = TaskState::Ready;
        runtime.last_result = RESULT_TERMINATED;
        self.db.save_runtime(&path, &runtime)?;
        self.record(&path, 111, &format!("{RESULT_TERMINATED:#x}"), Uuid::new_v4())?;
        info!("Stopped task {}", path);
        Ok(())
    }

    fn enable(&self, path: &str) -> Result<(), RepositoryError> {
        self.set_enabled(&normalize_path(path), true)
    }

    fn disable(&self, path: &str) -> Result<(), RepositoryError> {
        self.set_enabled(&normalize_path(path), false)
    }

    fn get_raw_definition_text(&self, path: &str) -> Result<String, RepositoryError> {
        let path = normalize_path(path);
        self.read_text(&path)?
            .ok_or(RepositoryError::NotFound(path))
    }

    fn set_raw_definition_text(&self, path: &str, text: &str) -> Result<(), RepositoryError> {
        let path = normalize_path(path);
        validate_name(task_name(&path))?;
        NativeTaskDefinition::from_xml_text(text)?;
        self.register_text(&path, text)
    }

    fn list_folders(&self) -> Result<TaskFolder, RepositoryError> {
        let mut folders = Vec::new();
        collect_folders(&self.tasks_dir, ROOT_FOLDER, &mut folders)?;
        Ok(build_folder_tree(&folders))
    }

    fn create_folder(&self, path: &str) -> Result<(), RepositoryError> {
        let path = normalize_path(path);
        if is_root(&path) {
            return Err(RepositoryError::AlreadyExists(path));
        }
        let dir = self.folder_dir(&path)?;
        if dir.exists() {
            return Err(RepositoryError::AlreadyExists(path));
        }
        fs::create_dir_all(dir)?;
        info!("Created folder {}", path);
        Ok(())
    }

    fn delete_folder(&self, path: &str) -> Result<(), RepositoryError> {
        let path = normalize_path(path);
        if is_root(&path) {
            return Err(RepositoryError::RootFolder);
        }
        let dir = self.folder_dir(&path)?;
        if !dir.is_dir() {
            return Err(RepositoryError::NotFound(path));
        }
        if fs::read_dir(&dir)?.next().is_some() {
            return Err(RepositoryError::FolderNotEmpty(path));
        }
        fs::remove_dir(dir)?;
        info!("Deleted folder {}", path);
        Ok(())
    }

    fn get_history(&self, path: &str) -> Result<Vec<HistoryEntry>, RepositoryError> {
        Ok(self.db.get_history(&normalize_path(path), self.history_limit)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_enabled_flag_keeps_unknown_elements() {
        let text = r#"<?xml version="1.0" encoding="UTF-16"?>
<Task version="1.2" xmlns="http://schemas.microsoft.com/windows/2004/02/mit/task">
  <Settings>
    <Enabled>true</Enabled>
    <IdleSettings><Duration>PT10M</Duration></IdleSettings>
  </Settings>
  <Data>custom</Data>
</Task>"#;
        let updated = set_enabled_flag(text, false).unwrap();
        let root = xml::parse(&updated).unwrap();
        let settings = root.child("Settings").unwrap();
        assert_eq!(settings.child_text("Enabled"), Some("false"));
        assert!(settings.child("IdleSettings").is_some());
        assert_eq!(root.child_text("Data"), Some("custom"));
    }

    #[test]
    fn test_set_enabled_flag_keeps_prefixed_names() {
        let text = r#"<Task version="1.2" xmlns="http://schemas.microsoft.com/windows/2004/02/mit/task" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <Settings><Enabled>true</Enabled></Settings>
  <Data xsi:type="Note"><x:Item xmlns:x="urn:extra"> spaced </x:Item></Data>
</Task>"#;
        let updated = set_enabled_flag(text, false).unwrap();
        assert!(updated.contains(r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance""#));
        assert!(updated.contains(r#"<Data xsi:type="Note">"#));
        assert!(updated.contains("<x:Item"));
        let root = xml::parse(&updated).unwrap();
        assert_eq!(root.child("Settings").unwrap().child_text("Enabled"), Some("false"));
        assert_eq!(root.child("Data").unwrap().child_text("Item"), Some(" spaced "));
    }

    #[test]
    fn test_set_enabled_flag_adds_missing_settings() {
        let updated = set_enabled_flag("<Task/>", false).unwrap();
        let def = NativeTaskDefinition::from_xml_text(&updated).unwrap();
        assert!(!def.settings.enabled);
    }
}
