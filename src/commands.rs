//! Commands - async front door over a task repository
//!
//! Repository calls block on files, SQLite or child processes, so each one
//! runs on tokio's blocking pool. Errors become strings at this edge.

use crate::config::{Backend, Config};
use crate::history::HistoryFilter;
use crate::local_store::LocalStore;
use crate::models::*;
use crate::repository::{decode_text, RepositoryError, TaskRepository};
use crate::schtasks::SchtasksHost;
use chrono::Local;
use std::path::PathBuf;
use std::sync::Arc;

pub type SharedRepository = Arc<dyn TaskRepository>;

/// Open the host selected by `config`.
pub fn open_repository(config: &Config) -> Result<SharedRepository, String> {
    match config.backend {
        Backend::Native if !cfg!(windows) => {
            Err("the native backend needs the Windows Task Scheduler; use --backend local".to_string())
        }
        Backend::Native => {
            tracing::info!("Using the Windows Task Scheduler");
            Ok(Arc::new(SchtasksHost::new(config.history_limit)))
        }
        Backend::Local => {
            let data_dir = config.resolved_data_dir().map_err(|e| e.to_string())?;
            let store = LocalStore::open(&data_dir, config.history_limit).map_err(|e| e.to_string())?;
            Ok(Arc::new(store))
        }
    }
}

async fn blocking<T, F>(repo: &SharedRepository, call: F) -> Result<T, String>
where
    T: Send + 'static,
    F: FnOnce(&dyn TaskRepository) -> Result<T, RepositoryError> + Send + 'static,
{
    let repo = Arc::clone(repo);
    tokio::task::spawn_blocking(move || call(repo.as_ref()))
        .await
        .map_err(|e| format!("repository call panicked: {e}"))?
        .map_err(|e| e.to_string())
}

pub async fn get_tasks(repo: &SharedRepository, folder: String, recursive: bool) -> Result<Vec<Task>, String> {
    blocking(repo, move |r| r.list_tasks(&folder, recursive)).await
}

pub async fn get_task(repo: &SharedRepository, path: String) -> Result<Task, String> {
    blocking(repo, move |r| {
        r.get_task(&path)?.ok_or(RepositoryError::NotFound(path))
    })
    .await
}

/// Register or update; returns the task's path.
pub async fn save_task(repo: &SharedRepository, task: Task) -> Result<String, String> {
    blocking(repo, move |r| r.register_or_update(&task)).await
}

/// Register the definition XML in `file` at `path`.
pub async fn import_task(repo: &SharedRepository, path: String, file: PathBuf) -> Result<(), String> {
    blocking(repo, move |r| {
        let text = decode_text(&std::fs::read(&file)?)?;
        r.set_raw_definition_text(&path, &text)
    })
    .await
}

pub async fn export_task(repo: &SharedRepository, path: String, destination: PathBuf) -> Result<(), String> {
    blocking(repo, move |r| r.export_to_file(&path, &destination)).await
}

pub async fn get_task_xml(repo: &SharedRepository, path: String) -> Result<String, String> {
    blocking(repo, move |r| r.get_raw_definition_text(&path)).await
}

pub async fn delete_task(repo: &SharedRepository, path: String) -> Result<(), String> {
    blocking(repo, move |r| r.delete(&path)).await
}

pub async fn run_task_now(repo: &SharedRepository, path: String) -> Result<(), String> {
    tracing::info!("Running task now: {}", path);
    blocking(repo, move |r| r.run(&path)).await
}

pub async fn stop_task(repo: &SharedRepository, path: String) -> Result<(), String> {
    blocking(repo, move |r| r.stop(&path)).await
}

pub async fn set_task_enabled(repo: &SharedRepository, path: String, enabled: bool) -> Result<(), String> {
    blocking(repo, move |r| if enabled { r.enable(&path) } else { r.disable(&path) }).await
}

pub async fn get_history(
    repo: &SharedRepository,
    path: String,
    filter: HistoryFilter,
) -> Result<Vec<HistoryEntry>, String> {
    let entries = blocking(repo, move |r| r.get_history(&path)).await?;
    Ok(filter.apply(entries, Local::now()))
}

pub async fn get_folders(repo: &SharedRepository) -> Result<TaskFolder, String> {
    blocking(repo, |r| r.list_folders()).await
}

pub async fn create_folder(repo: &SharedRepository, path: String) -> Result<(), String> {
    blocking(repo, move |r| r.create_folder(&path)).await
}

pub async fn delete_folder(repo: &SharedRepository, path: String) -> Result<(), String> {
    blocking(repo, move |r| r.delete_folder(&path)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_repo(dir: &std::path::Path) -> SharedRepository {
        let config = Config {
            backend: Backend::Local,
            data_dir: Some(dir.to_path_buf()),
            history_limit: 10,
        };
        open_repository(&config).unwrap()
    }

    #[tokio::test]
    async fn test_save_run_and_history() {
        let dir = tempfile::tempdir().unwrap();
        let repo = local_repo(dir.path());

        let mut task = Task::new("Report");
        task.actions.push(Action::new("report.exe", "--daily"));
        let path = save_task(&repo, task).await.unwrap();
        assert_eq!(path, r"\Report");

        run_task_now(&repo, path.clone()).await.unwrap();
        let task = get_task(&repo, path.clone()).await.unwrap();
        assert_eq!(task.runtime.state, TaskState::Running);

        let history = get_history(&repo, path.clone(), HistoryFilter::Today).await.unwrap();
        let ids: Vec<u32> = history.iter().map(|e| e.event_id).collect();
        assert_eq!(ids, [100, 110, 106]);
    }

    #[tokio::test]
    async fn test_errors_are_strings() {
        let dir = tempfile::tempdir().unwrap();
        let repo = local_repo(dir.path());

        let err = get_task(&repo, r"\Missing".to_string()).await.unwrap_err();
        assert!(err.contains("not found"), "{err}");

        let err = delete_folder(&repo, r"\".to_string()).await.unwrap_err();
        assert!(err.contains("root"), "{err}");
    }

    #[cfg(not(windows))]
    #[test]
    fn test_native_backend_needs_windows() {
        let config = Config {
            backend: Backend::Native,
            ..Config::default()
        };
        assert!(open_repository(&config).is_err());
    }
}
