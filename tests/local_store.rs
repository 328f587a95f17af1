use taskdeck_lib::calendar::DayOfWeek;
use taskdeck_lib::duration::IsoDuration;
use taskdeck_lib::local_store::{LocalStore, RESULT_HAS_NOT_RUN, RESULT_TERMINATED};
use taskdeck_lib::repository::{RepositoryError, TaskRepository};
use taskdeck_lib::*;
use chrono::NaiveDate;

fn store() -> (tempfile::TempDir, LocalStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::open(dir.path(), 50).unwrap();
    (dir, store)
}

fn backup_task() -> Task {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(21, 30, 0)
        .unwrap();
    let mut on_service_change = Trigger::event("System", Some("Service Control Manager"), Some(7036));
    on_service_change.start_boundary = start;

    let mut task = Task::new("Nightly");
    task.path = Some(r"\Backups\Nightly".to_string());
    task.description = "Copy documents".to_string();
    task.triggers = vec![
        Trigger::weekly(start, 1, [DayOfWeek::Monday, DayOfWeek::Thursday]),
        on_service_change,
    ];
    task.actions = vec![Action::new("robocopy.exe", r"C:\docs D:\docs /MIR")];
    task.execution_time_limit = Some(IsoDuration::new("PT2H"));
    task
}

#[test]
fn register_then_read_back() {
    let (_dir, store) = store();
    let path = store.register_or_update(&backup_task()).unwrap();
    assert_eq!(path, r"\Backups\Nightly");

    let task = store.get_task(&path).unwrap().unwrap();
    assert_eq!(task.name, "Nightly");
    assert_eq!(task.description, "Copy documents");
    assert_eq!(task.triggers, backup_task().triggers);
    assert_eq!(task.actions, backup_task().actions);
    assert_eq!(task.runtime.state, TaskState::Ready);
    assert_eq!(task.runtime.last_result, RESULT_HAS_NOT_RUN);
    assert!(task.runtime.next_run_time.is_some());

    // The missing folder was created on registration
    let tree = store.list_folders().unwrap();
    assert_eq!(tree.sub_folders[0].path, r"\Backups");
}

#[test]
fn rename_replaces_the_old_path() {
    let (_dir, store) = store();
    let path = store.register_or_update(&backup_task()).unwrap();

    let mut task = store.get_task(&path).unwrap().unwrap();
    task.name = "Weekly".to_string();
    let renamed = store.register_or_update(&task).unwrap();

    assert_eq!(renamed, r"\Backups\Weekly");
    assert!(store.get_task(&path).unwrap().is_none());
    let names: Vec<String> = store
        .list_tasks(r"\Backups", false)
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names, ["Weekly"]);
}

#[test]
fn failed_rename_keeps_the_old_task() {
    let (_dir, store) = store();
    let path = store.register_or_update(&backup_task()).unwrap();

    // A folder squatting on the new file name makes the write fail
    store.create_folder(r"\Backups\Weekly.xml").unwrap();
    let mut task = store.get_task(&path).unwrap().unwrap();
    task.name = "Weekly".to_string();
    assert!(store.register_or_update(&task).is_err());

    let kept = store.get_task(&path).unwrap().unwrap();
    assert_eq!(kept.name, "Nightly");
    assert_eq!(kept.actions, backup_task().actions);
}

#[test]
fn case_only_rename_keeps_the_task() {
    let (_dir, store) = store();
    let path = store.register_or_update(&backup_task()).unwrap();

    let mut task = store.get_task(&path).unwrap().unwrap();
    task.name = "NIGHTLY".to_string();
    let renamed = store.register_or_update(&task).unwrap();

    let tasks = store.list_tasks(r"\Backups", false).unwrap();
    assert_eq!(tasks.len(), 1);
    assert!(tasks[0].name.eq_ignore_ascii_case("nightly"));
    assert!(store.get_task(&renamed).unwrap().is_some());
}

#[test]
fn run_stop_and_history() {
    let (_dir, store) = store();
    let path = store.register_or_update(&backup_task()).unwrap();

    store.run(&path).unwrap();
    let running = store.get_task(&path).unwrap().unwrap();
    assert_eq!(running.runtime.state, TaskState::Running);
    assert!(running.runtime.last_run_time.is_some());

    store.stop(&path).unwrap();
    let stopped = store.get_task(&path).unwrap().unwrap();
    assert_eq!(stopped.runtime.state, TaskState::Ready);
    assert_eq!(stopped.runtime.last_result, RESULT_TERMINATED);

    store.register_or_update(&stopped).unwrap();
    store.delete(&path).unwrap();

    let history = store.get_history(&path).unwrap();
    let ids: Vec<u32> = history.iter().map(|e| e.event_id).collect();
    assert_eq!(ids, [141, 140, 111, 100, 110, 106]);
    assert_eq!(history[0].result_label, "Task Registration Deleted");
    assert_eq!(history[3].activity_id, history[4].activity_id);
}

#[test]
fn disabled_tasks_cannot_run() {
    let (_dir, store) = store();
    let path = store.register_or_update(&backup_task()).unwrap();

    store.disable(&path).unwrap();
    let task = store.get_task(&path).unwrap().unwrap();
    assert!(!task.enabled);
    assert_eq!(task.runtime.state, TaskState::Disabled);
    assert_eq!(task.runtime.next_run_time, None);
    assert!(matches!(store.run(&path), Err(RepositoryError::Disabled(_))));

    store.enable(&path).unwrap();
    let task = store.get_task(&path).unwrap().unwrap();
    assert_eq!(task.runtime.state, TaskState::Ready);
    store.run(&path).unwrap();
}

#[test]
fn raw_definition_is_kept_verbatim() {
    let (dir, store) = store();
    let text = r#"<?xml version="1.0" encoding="UTF-16"?>
<Task version="1.4" xmlns="http://schemas.microsoft.com/windows/2004/02/mit/task">
  <RegistrationInfo><Description>Imported</Description></RegistrationInfo>
  <Triggers>
    <BootTrigger><Enabled>true</Enabled></BootTrigger>
  </Triggers>
  <Settings><Enabled>true</Enabled></Settings>
  <Actions Context="Author">
    <Exec><Command>notepad.exe</Command></Exec>
  </Actions>
</Task>"#;
    store.set_raw_definition_text(r"\Imported", text).unwrap();
    assert_eq!(store.get_raw_definition_text(r"\Imported").unwrap(), text);

    let task = store.get_task(r"\Imported").unwrap().unwrap();
    assert_eq!(task.triggers[0].kind, TriggerKind::AtStartup);
    assert_eq!(task.actions[0].command, "notepad.exe");

    let export = dir.path().join("export.xml");
    store.export_to_file(r"\Imported", &export).unwrap();
    let bytes = std::fs::read(&export).unwrap();
    assert_eq!(bytes[..2], [0xFF_u8, 0xFE]);
    assert_eq!(repository::decode_text(&bytes).unwrap(), text);

    assert!(store.set_raw_definition_text(r"\Broken", "<Task>").is_err());
    assert!(store.set_raw_definition_text(r"\Wrong", "<Other/>").is_err());
}

#[test]
fn folder_rules() {
    let (_dir, store) = store();
    store.create_folder(r"\Tools\Inner").unwrap();
    assert!(matches!(
        store.create_folder(r"\Tools"),
        Err(RepositoryError::AlreadyExists(_))
    ));
    assert!(matches!(
        store.delete_folder(r"\Tools"),
        Err(RepositoryError::FolderNotEmpty(_))
    ));
    assert!(matches!(store.delete_folder(r"\"), Err(RepositoryError::RootFolder)));
    assert!(matches!(
        store.delete_folder(r"\Nope"),
        Err(RepositoryError::NotFound(_))
    ));

    store.delete_folder(r"\Tools\Inner").unwrap();
    store.delete_folder(r"\Tools").unwrap();
    assert!(store.list_folders().unwrap().sub_folders.is_empty());
}

#[test]
fn invalid_names_and_missing_tasks() {
    let (_dir, store) = store();
    let bad = Task::new("what?");
    assert!(matches!(
        store.register_or_update(&bad),
        Err(RepositoryError::InvalidName(_))
    ));
    assert!(store.get_task(r"\Ghost").unwrap().is_none());
    assert!(matches!(store.run(r"\Ghost"), Err(RepositoryError::NotFound(_))));
    assert!(matches!(store.delete(r"\Ghost"), Err(RepositoryError::NotFound(_))));
    assert!(matches!(
        store.list_tasks(r"\Ghost", false),
        Err(RepositoryError::NotFound(_))
    ));
}

#[test]
fn recursive_listing() {
    let (_dir, store) = store();
    store.register_or_update(&backup_task()).unwrap();
    let mut top = Task::new("Top");
    top.actions.push(Action::new("a.exe", ""));
    store.register_or_update(&top).unwrap();

    let direct: Vec<_> = store.list_tasks(r"\", false).unwrap();
    assert_eq!(direct.len(), 1);
    assert_eq!(direct[0].path.as_deref(), Some(r"\Top"));

    let all = store.list_tasks(r"\", true).unwrap();
    let paths: Vec<_> = all.iter().filter_map(|t| t.path.as_deref()).collect();
    assert_eq!(paths, [r"\Backups\Nightly", r"\Top"]);
}
