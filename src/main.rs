//! Taskdeck - Main entry point

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use taskdeck_lib::commands::{self, SharedRepository};
use taskdeck_lib::config::{Backend, Config};
use taskdeck_lib::history::HistoryFilter;
use taskdeck_lib::{HistoryEntry, Task, TaskFolder};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "taskdeck", version, about = "Manage scheduled tasks")]
struct Cli {
    /// Config file (default: <config dir>/taskdeck/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true, value_enum)]
    backend: Option<Backend>,

    /// Data directory for the local backend
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Print results as pretty JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List tasks in a folder
    List {
        #[arg(default_value = "\\")]
        folder: String,
        #[arg(short, long)]
        recursive: bool,
    },
    /// Show one task
    Show {
        path: String,
        /// Print the raw definition XML
        #[arg(long)]
        xml: bool,
    },
    /// Register or update a task from a JSON file
    Apply { file: PathBuf },
    /// Register a definition XML file at PATH
    Import { path: String, file: PathBuf },
    /// Write a task's definition XML to DEST
    Export { path: String, dest: PathBuf },
    Delete { path: String },
    Run { path: String },
    Stop { path: String },
    Enable { path: String },
    Disable { path: String },
    /// Show a task's history, newest first
    History {
        path: String,
        #[arg(long, value_enum, default_value_t = HistoryFilter::All)]
        filter: HistoryFilter,
    },
    /// Print the folder tree
    Folders,
    Mkdir { path: String },
    Rmdir { path: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so stdout stays parseable
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let mut config = Config::load(cli.config.as_deref()).map_err(|e| e.to_string())?;
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(dir) = cli.data_dir {
        config.data_dir = Some(dir);
    }
    let repo = commands::open_repository(&config)?;
    let json = cli.json;

    match cli.command {
        Command::List { folder, recursive } => {
            let tasks = commands::get_tasks(&repo, folder, recursive).await?;
            output(json, tasks.as_slice(), print_tasks)
        }
        Command::Show { path, xml: true } => {
            println!("{}", commands::get_task_xml(&repo, path).await?);
            Ok(())
        }
        Command::Show { path, xml: false } => {
            let task = commands::get_task(&repo, path).await?;
            output(json, &task, print_task)
        }
        Command::Apply { file } => apply(&repo, file).await,
        Command::Import { path, file } => commands::import_task(&repo, path, file).await,
        Command::Export { path, dest } => commands::export_task(&repo, path, dest).await,
        Command::Delete { path } => commands::delete_task(&repo, path).await,
        Command::Run { path } => commands::run_task_now(&repo, path).await,
        Command::Stop { path } => commands::stop_task(&repo, path).await,
        Command::Enable { path } => commands::set_task_enabled(&repo, path, true).await,
        Command::Disable { path } => commands::set_task_enabled(&repo, path, false).await,
        Command::History { path, filter } => {
            let entries = commands::get_history(&repo, path, filter).await?;
            output(json, entries.as_slice(), print_history)
        }
        Command::Folders => {
            let tree = commands::get_folders(&repo).await?;
            output(json, &tree, |tree| print_folder(tree, 0))
        }
        Command::Mkdir { path } => commands::create_folder(&repo, path).await,
        Command::Rmdir { path } => commands::delete_folder(&repo, path).await,
    }
}

async fn apply(repo: &SharedRepository, file: PathBuf) -> Result<(), String> {
    let text = std::fs::read_to_string(&file).map_err(|e| format!("{}: {e}", file.display()))?;
    let task: Task = serde_json::from_str(&text).map_err(|e| format!("{}: {e}", file.display()))?;
    let path = commands::save_task(repo, task).await?;
    println!("{path}");
    Ok(())
}

fn output<T: Serialize + ?Sized>(json: bool, value: &T, text: impl FnOnce(&T)) -> Result<(), String> {
    if json {
        let pretty = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
        println!("{pretty}");
    } else {
        text(value);
    }
    Ok(())
}

fn local_time(time: Option<chrono::DateTime<chrono::Utc>>) -> String {
    time.map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn print_tasks(tasks: &[Task]) {
    for task in tasks {
        println!(
            "{:<9} {:<16} {}  {}",
            task.runtime.state.to_string(),
            local_time(task.runtime.next_run_time),
            task.path.as_deref().unwrap_or(&task.name),
            task.trigger_summary()
        );
    }
}

fn print_task(task: &Task) {
    println!("Name:        {}", task.name);
    println!("Path:        {}", task.path.as_deref().unwrap_or("-"));
    println!("State:       {}", task.runtime.state);
    println!("Enabled:     {}", task.enabled);
    if !task.description.is_empty() {
        println!("Description: {}", task.description);
    }
    println!("Last run:    {} (result {:#x})", local_time(task.runtime.last_run_time), task.runtime.last_result);
    println!("Next run:    {}", local_time(task.runtime.next_run_time));
    for trigger in &task.triggers {
        println!("Trigger:     {trigger}");
    }
    for action in &task.actions {
        println!("Action:      {} {}", action.command, action.arguments);
    }
}

fn print_history(entries: &[HistoryEntry]) {
    for entry in entries {
        println!(
            "{}  {:>4}  {:<26} {}",
            entry.timestamp.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S"),
            entry.event_id,
            entry.result_label,
            entry.exit_code
        );
    }
}

fn print_folder(folder: &TaskFolder, depth: usize) {
    println!("{}{}", "  ".repeat(depth), folder.name);
    for child in &folder.sub_folders {
        print_folder(child, depth + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_global_flags_after_command() {
        let cli = Cli::parse_from(["taskdeck", "list", r"\Tools", "-r", "--backend", "local", "--json"]);
        assert_eq!(cli.backend, Some(Backend::Local));
        assert!(cli.json);
        assert!(matches!(
            cli.command,
            Command::List { ref folder, recursive: true } if folder == r"\Tools"
        ));
    }

    #[test]
    fn test_history_filter_flag() {
        let cli = Cli::parse_from(["taskdeck", "history", r"\Backup", "--filter", "yesterday"]);
        assert!(matches!(cli.command, Command::History { filter: HistoryFilter::Yesterday, .. }));
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
