//! Windows host - the OS Task Scheduler through its command-line tools
//!
//! Definitions go through `schtasks.exe` as XML, history comes from the
//! TaskScheduler operational log via `wevtutil.exe`, and folders through
//! the `Schedule.Service` COM object in PowerShell. The parsers are plain
//! functions so they are testable anywhere.

use crate::history::event_label;
use crate::models::{HistoryEntry, Task, TaskFolder, TaskRuntime, TaskState};
use crate::native::NativeTaskDefinition;
use crate::repository::*;
use crate::task_codec;
use crate::xml;
use chrono::{DateTime, Datelike, Local, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::process::{Command, Output};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

const SCHTASKS: &str = "schtasks";
const WEVTUTIL: &str = "wevtutil";
const POWERSHELL: &str = "powershell";
const OPERATIONAL_LOG: &str = "Microsoft-Windows-TaskScheduler/Operational";

/// PowerShell exit codes for folder scripts
const EXIT_NOT_FOUND: i32 = 2;
const EXIT_NOT_EMPTY: i32 = 3;
const EXIT_EXISTS: i32 = 4;

/// Date forms `schtasks /FO CSV` prints, depending on locale
const TOOL_TIME_FORMATS: [&str; 5] = [
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

pub struct SchtasksHost {
    history_limit: u32,
}

impl SchtasksHost {
    pub fn new(history_limit: u32) -> Self {
        Self { history_limit }
    }

    fn query_definition(&self, path: &str) -> Result<Option<String>, RepositoryError> {
        match run_tool(SCHTASKS, &["/Query", "/TN", path, "/XML"]) {
            Ok(text) => Ok(Some(text)),
            Err(RepositoryError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn query_status(&self, path: Option<&str>) -> Result<HashMap<String, TaskRuntime>, RepositoryError> {
        let mut args = vec!["/Query", "/FO", "CSV", "/V"];
        if let Some(path) = path {
            args.extend(["/TN", path]);
        }
        Ok(parse_status_table(&run_tool(SCHTASKS, &args)?))
    }

    fn create_from_text(&self, path: &str, text: &str) -> Result<(), RepositoryError> {
        let file = std::env::temp_dir().join(format!("taskdeck-{}.xml", uuid::Uuid::new_v4()));
        fs::write(&file, encode_utf16le(text))?;
        let file_arg = file.to_string_lossy().to_string();
        let result = run_tool(SCHTASKS, &["/Create", "/TN", path, "/XML", &file_arg, "/F"]);
        if let Err(e) = fs::remove_file(&file) {
            debug!("Failed to remove {}: {}", file.display(), e);
        }
        result.map(|_| ())
    }

    fn change(&self, path: &str, flag: &str) -> Result<(), RepositoryError> {
        run_tool(SCHTASKS, &["/Change", "/TN", path, flag])?;
        info!("{} {}", flag, path);
        Ok(())
    }
}

impl TaskRepository for SchtasksHost {
    fn list_tasks(&self, folder: &str, recursive: bool) -> Result<Vec<Task>, RepositoryError> {
        let bundle = run_tool(SCHTASKS, &["/Query", "/XML", "ONE"])?;
        let status = self.query_status(None)?;
        let mut tasks = Vec::new();
        for (path, text) in split_xml_bundle(&bundle) {
            if !in_folder(&path, folder, recursive) {
                continue;
            }
            match NativeTaskDefinition::from_xml_text(&text) {
                Ok(def) => {
                    let runtime = lookup(&status, &path);
                    tasks.push(task_codec::from_registered(&path, &def, runtime));
                }
                Err(e) => warn!("Skipping unreadable task {}: {}", path, e),
            }
        }
        tasks.sort_by_key(|t| t.path.as_deref().unwrap_or_default().to_lowercase());
        Ok(tasks)
    }

    fn get_task(&self, path: &str) -> Result<Option<Task>, RepositoryError> {
        let path = normalize_path(path);
        let Some(text) = self.query_definition(&path)? else {
            return Ok(None);
        };
        let def = NativeTaskDefinition::from_xml_text(&text)?;
        let status = self.query_status(Some(&path)).unwrap_or_else(|e| {
            warn!("No status for {}: {}", path, e);
            HashMap::new()
        });
        Ok(Some(task_codec::from_registered(&path, &def, lookup(&status, &path))))
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
        self.create_from_text(&path, &definition.xml_text()?)?;
        info!("Registered task {}", path);

        // The old registration goes only once the new one exists
        if let Some(old) = previous.filter(|old| !old.eq_ignore_ascii_case(&path)) {
            if self.query_definition(&old)?.is_some() {
                debug!("Task renamed from {} to {}", old, path);
                self.delete(&old)?;
            }
        }
        Ok(path)
    }

    fn delete(&self, path: &str) -> Result<(), RepositoryError> {
        let path = normalize_path(path);
        run_tool(SCHTASKS, &["/Delete", "/TN", &path, "/F"])?;
        info!("Deleted task {}", path);
        Ok(())
    }

    fn run(&self, path: &str) -> Result<(), RepositoryError> {
        let path = normalize_path(path);
        run_tool(SCHTASKS, &["/Run", "/TN", &path])?;
        info!("Run requested for {}", path);
        Ok(())
    }

    fn stop(&self, path: &str) -> Result<(), RepositoryError> {
        let path = normalize_path(path);
        run_tool(SCHTASKS, &["/End", "/TN", &path])?;
        info!("Stopped task {}", path);
        Ok(())
    }

    fn enable(&self, path: &str) -> Result<(), RepositoryError> {
        self.change(&normalize_path(path), "/ENABLE")
    }

    fn disable(&self, path: &str) -> Result<(), RepositoryError> {
        self.change(&normalize_path(path), "/DISABLE")
    }

    fn get_raw_definition_text(&self, path: &str) -> Result<String, RepositoryError> {
        let path = normalize_path(path);
        self.query_definition(&path)?
            .ok_or(RepositoryError::NotFound(path))
    }

    fn set_raw_definition_text(&self, path: &str, text: &str) -> Result<(), RepositoryError> {
        let path = normalize_path(path);
        validate_name(task_name(&path))?;
        NativeTaskDefinition::from_xml_text(text)?;
        self.create_from_text(&path, text)?;
        info!("Registered task {} from raw definition", path);
        Ok(())
    }

    fn list_folders(&self) -> Result<TaskFolder, RepositoryError> {
        let script = format!(
            "{} function Walk($f) {{ $f.Path; foreach ($c in $f.GetFolders(0)) {{ Walk $c }} }}; Walk ($s.GetFolder('\\'))",
            connect_script()
        );
        let output = run_powershell(&script)?;
        let paths: Vec<&str> = output
            .lines()
            .map(str::trim)
            .filter(|line| line.starts_with('\\'))
            .collect();
        Ok(build_folder_tree(&paths))
    }

    fn create_folder(&self, path: &str) -> Result<(), RepositoryError> {
        let path = normalize_path(path);
        if is_root(&path) {
            return Err(RepositoryError::AlreadyExists(path));
        }
        for segment in path_segments(&path) {
            validate_name(segment)?;
        }
        let script = format!(
            "{} try {{ $s.GetFolder({}) | Out-Null; exit {EXIT_EXISTS} }} catch {{}}; \
             $s.GetFolder({}).CreateFolder({}) | Out-Null",
            connect_script(),
            ps_quote(&path),
            ps_quote(&parent_folder(&path)),
            ps_quote(task_name(&path)),
        );
        match run_powershell_status(&script)? {
            (0, _) => {
                info!("Created folder {}", path);
                Ok(())
            }
            (EXIT_EXISTS, _) => Err(RepositoryError::AlreadyExists(path)),
            (_, message) => Err(tool_error(POWERSHELL, message)),
        }
    }

    fn delete_folder(&self, path: &str) -> Result<(), RepositoryError> {
        let path = normalize_path(path);
        if is_root(&path) {
            return Err(RepositoryError::RootFolder);
        }
        let script = format!(
            "{} try {{ $f = $s.GetFolder({}) }} catch {{ exit {EXIT_NOT_FOUND} }}; \
             if ($f.GetTasks(1).Count -gt 0 -or $f.GetFolders(0).Count -gt 0) {{ exit {EXIT_NOT_EMPTY} }}; \
             $s.GetFolder({}).DeleteFolder({}, 0)",
            connect_script(),
            ps_quote(&path),
            ps_quote(&parent_folder(&path)),
            ps_quote(task_name(&path)),
        );
        match run_powershell_status(&script)? {
            (0, _) => {
                info!("Deleted folder {}", path);
                Ok(())
            }
            (EXIT_NOT_FOUND, _) => Err(RepositoryError::NotFound(path)),
            (EXIT_NOT_EMPTY, _) => Err(RepositoryError::FolderNotEmpty(path)),
            (_, message) => Err(tool_error(POWERSHELL, message)),
        }
    }

    fn get_history(&self, path: &str) -> Result<Vec<HistoryEntry>, RepositoryError> {
        let path = normalize_path(path);
        let query = format!("*[EventData[Data[@Name='TaskName']={}]]", xpath_quote(&path));
        let count = format!("/c:{}", self.history_limit);
        let query_arg = format!("/q:{query}");
        let output = run_tool(
            WEVTUTIL,
            &["qe", OPERATIONAL_LOG, &query_arg, "/rd:true", &count, "/f:RenderedXml"],
        )?;
        parse_events(&output)
    }
}

fn tool(program: &str) -> Command {
    #[allow(unused_mut)]
    let mut cmd = Command::new(program);
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW
    }
    cmd
}

fn output_text(output: &Output) -> (String, String) {
    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).trim().to_string(),
    )
}

fn tool_error(tool: &str, message: String) -> RepositoryError {
    RepositoryError::Tool {
        tool: tool.to_string(),
        message,
    }
}

/// Run a tool and return its stdout. A failure about a missing task becomes
/// `NotFound` for the `/TN` argument.
fn run_tool(program: &str, args: &[&str]) -> Result<String, RepositoryError> {
    debug!("Running {} {:?}", program, args);
    let output = tool(program).args(args).output()?;
    let (stdout, stderr) = output_text(&output);
    if output.status.success() {
        return Ok(stdout);
    }
    let message = if stderr.is_empty() { stdout.trim().to_string() } else { stderr };
    let subject = args.windows(2).find(|w| w[0] == "/TN").map(|w| w[1]);
    match subject {
        Some(path) if is_missing_message(&message) => Err(RepositoryError::NotFound(path.to_string())),
        _ => Err(tool_error(program, message)),
    }
}

fn run_powershell_status(script: &str) -> Result<(i32, String), RepositoryError> {
    debug!("Running PowerShell script");
    let output = tool(POWERSHELL)
        .args(["-NoProfile", "-NonInteractive", "-Command", script])
        .output()?;
    let (stdout, stderr) = output_text(&output);
    let code = output.status.code().unwrap_or(-1);
    Ok((code, if code == 0 { stdout } else { stderr }))
}

fn run_powershell(script: &str) -> Result<String, RepositoryError> {
    match run_powershell_status(script)? {
        (0, stdout) => Ok(stdout),
        (_, message) => Err(tool_error(POWERSHELL, message)),
    }
}

fn connect_script() -> &'static str {
    "$ErrorActionPreference = 'Stop'; $s = New-Object -ComObject Schedule.Service; $s.Connect();"
}

/// Single-quoted PowerShell literal
pub fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn xpath_quote(value: &str) -> String {
    if value.contains('\'') {
        format!("\"{value}\"")
    } else {
        format!("'{value}'")
    }
}

pub fn is_missing_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("cannot find") || lower.contains("does not exist")
}

fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<!--\s*(\\[^>]*?)\s*-->").expect("valid regex"))
}

/// Split `schtasks /Query /XML ONE` output into `(path, definition)` pairs.
pub fn split_xml_bundle(text: &str) -> Vec<(String, String)> {
    let markers: Vec<_> = marker_regex().captures_iter(text).collect();
    markers
        .iter()
        .enumerate()
        .filter_map(|(i, caps)| {
            let whole = caps.get(0)?;
            let end = markers
                .get(i + 1)
                .and_then(|next| next.get(0))
                .map(|m| m.start())
                .unwrap_or(text.len());
            let body = text[whole.end()..end].trim();
            let body = body.strip_suffix("</Tasks>").unwrap_or(body).trim();
            (!body.is_empty()).then(|| (normalize_path(&caps[1]), body.to_string()))
        })
        .collect()
}

/// RFC 4180 style rows; quoted fields may contain commas and `""`.
pub fn parse_csv(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let mut fields = Vec::new();
        let mut field = String::new();
        let mut quoted = false;
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '"' if quoted && chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => quoted = !quoted,
                ',' if !quoted => fields.push(std::mem::take(&mut field)),
                _ => field.push(c),
            }
        }
        fields.push(field);
        rows.push(fields);
    }
    rows
}

/// Runtime state per task path from `schtasks /Query /FO CSV /V`. The
/// header repeats per folder and tasks with several triggers repeat; the
/// first row wins.
pub fn parse_status_table(text: &str) -> HashMap<String, TaskRuntime> {
    let rows = parse_csv(text);
    let mut table = HashMap::new();
    let Some(header) = rows.first() else {
        return table;
    };
    let column = |name: &str| header.iter().position(|h| h.eq_ignore_ascii_case(name));
    let Some(name_col) = column("TaskName") else {
        warn!("Unrecognized schtasks status header");
        return table;
    };
    let (status_col, next_col, last_col, result_col) = (
        column("Status"),
        column("Next Run Time"),
        column("Last Run Time"),
        column("Last Result"),
    );
    let cell = |row: &Vec<String>, col: Option<usize>| col.and_then(|c| row.get(c)).map(|s| s.trim().to_string());

    for row in rows.iter().filter(|r| r != &header) {
        let Some(path) = cell(row, Some(name_col)).filter(|p| p.starts_with('\\')) else {
            continue;
        };
        let runtime = TaskRuntime {
            state: cell(row, status_col).map(|s| parse_state(&s)).unwrap_or_default(),
            next_run_time: cell(row, next_col).and_then(|s| parse_tool_time(&s)),
            last_run_time: cell(row, last_col).and_then(|s| parse_tool_time(&s)),
            last_result: cell(row, result_col).and_then(|s| parse_result_code(&s)).unwrap_or(0),
        };
        table.entry(path.to_lowercase()).or_insert(runtime);
    }
    table
}

fn lookup(table: &HashMap<String, TaskRuntime>, path: &str) -> TaskRuntime {
    table.get(&path.to_lowercase()).cloned().unwrap_or_default()
}

/// Queued tasks are waiting to start and show as Ready.
pub fn parse_state(text: &str) -> TaskState {
    match text.to_lowercase().as_str() {
        "ready" | "queued" => TaskState::Ready,
        "running" => TaskState::Running,
        "disabled" => TaskState::Disabled,
        _ => TaskState::Unknown,
    }
}

/// Local time as printed by the tool; `N/A`, the never-run placeholder
/// (1999) and unknown formats give `None`.
pub fn parse_tool_time(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    let naive = TOOL_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())?;
    if naive.year() < 2000 {
        return None;
    }
    Local
        .from_local_datetime(&naive)
        .latest()
        .map(|t| t.with_timezone(&Utc))
}

/// Decimal (possibly above `i32::MAX`) or `0x` hex result codes
pub fn parse_result_code(text: &str) -> Option<i32> {
    let text = text.trim();
    let value = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => text.parse::<i64>().ok()?,
    };
    Some(value as u32 as i32)
}

/// Parse `wevtutil qe /f:RenderedXml` output: a run of `<Event>` elements
/// without a root.
pub fn parse_events(text: &str) -> Result<Vec<HistoryEntry>, RepositoryError> {
    let body = text.trim();
    if body.is_empty() {
        return Ok(Vec::new());
    }
    let root = xml::parse(&format!("<Events>{body}</Events>"))?;
    let mut entries: Vec<HistoryEntry> = root.children_named("Event").filter_map(parse_event).collect();
    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    Ok(entries)
}

fn parse_event(event: &xml::XmlNode) -> Option<HistoryEntry> {
    let system = event.child("System")?;
    let event_id: u32 = system.child_text("EventID")?.trim().parse().ok()?;
    let timestamp = system
        .child("TimeCreated")
        .and_then(|t| t.attribute("SystemTime"))
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())?
        .with_timezone(&Utc);

    let data: HashMap<&str, &str> = event
        .child("EventData")
        .map(|d| {
            d.children_named("Data")
                .filter_map(|n| Some((n.attribute("Name")?, n.text.as_str())))
                .collect()
        })
        .unwrap_or_default();

    let user = ["UserContext", "UserName"]
        .iter()
        .find_map(|k| data.get(k).filter(|v| !v.is_empty()))
        .map(|v| v.to_string())
        .or_else(|| {
            system
                .child("Security")
                .and_then(|s| s.attribute("UserID"))
                .map(str::to_string)
        })
        .unwrap_or_default();
    let exit_code = ["ResultCode", "ReturnCode"]
        .iter()
        .find_map(|k| data.get(k))
        .map(|v| v.to_string())
        .unwrap_or_default();
    let message = event
        .child("RenderingInfo")
        .and_then(|r| r.child_text("Message"))
        .unwrap_or_default()
        .trim()
        .to_string();
    let activity_id = system
        .child("Correlation")
        .and_then(|c| c.attribute("ActivityID"))
        .and_then(|id| uuid::Uuid::parse_str(id).ok());

    Some(HistoryEntry {
        timestamp,
        event_id,
        result_label: event_label(event_id),
        exit_code,
        message,
        user,
        activity_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_xml_bundle() {
        let bundle = r#"<?xml version="1.0" encoding="UTF-16"?>
<Tasks>
<!-- \Backup -->
<Task version="1.2"><Settings><Enabled>true</Enabled></Settings></Task>
<!-- \Tools\Cleanup -->
<Task version="1.2"><Settings><Enabled>false</Enabled></Settings></Task>
</Tasks>"#;
        let tasks = split_xml_bundle(bundle);
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].0, r"\Backup");
        assert_eq!(tasks[1].0, r"\Tools\Cleanup");
        assert!(tasks[1].1.ends_with("</Task>"));

        let def = NativeTaskDefinition::from_xml_text(&tasks[1].1).unwrap();
        assert!(!def.settings.enabled);
    }

    #[test]
    fn test_parse_csv_quotes() {
        let rows = parse_csv("\"a\",\"b, c\",\"say \"\"hi\"\"\"\n\n\"d\",,e\n");
        assert_eq!(rows[0], ["a", "b, c", "say \"hi\""]);
        assert_eq!(rows[1], ["d", "", "e"]);
    }

    #[test]
    fn test_parse_status_table() {
        let text = "\
\"HostName\",\"TaskName\",\"Next Run Time\",\"Status\",\"Last Run Time\",\"Last Result\"
\"PC\",\"\\Backup\",\"6/1/2024 8:00:00 AM\",\"Ready\",\"11/30/1999 12:00:00 AM\",\"267011\"
\"PC\",\"\\Backup\",\"N/A\",\"Running\",\"N/A\",\"0\"
\"HostName\",\"TaskName\",\"Next Run Time\",\"Status\",\"Last Run Time\",\"Last Result\"
\"PC\",\"\\Tools\\Sync\",\"N/A\",\"Disabled\",\"5/31/2024 17:30:00\",\"2147942402\"
";
        let table = parse_status_table(text);
        assert_eq!(table.len(), 2);

        let backup = &table[r"\backup"];
        assert_eq!(backup.state, TaskState::Ready);
        assert!(backup.next_run_time.is_some());
        assert_eq!(backup.last_run_time, None);
        assert_eq!(backup.last_result, 0x41303);

        let sync = lookup(&table, r"\Tools\Sync");
        assert_eq!(sync.state, TaskState::Disabled);
        assert!(sync.last_run_time.is_some());
        assert_eq!(sync.last_result, 0x80070002_u32 as i32);
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_state("Queued"), TaskState::Ready);
        assert_eq!(parse_state("Bereit"), TaskState::Unknown);
        assert_eq!(parse_tool_time("N/A"), None);
        assert_eq!(parse_result_code("0x41306"), Some(0x41306));
        assert_eq!(parse_result_code("-1"), Some(-1));
        assert_eq!(parse_result_code("n/a"), None);
        assert_eq!(ps_quote("it's"), "'it''s'");
        assert!(is_missing_message("ERROR: The system cannot find the file specified."));
        assert!(!is_missing_message("ERROR: Access is denied."));
    }

    #[test]
    fn test_parse_events_newest_first() {
        let text = r#"
<Event xmlns="http://schemas.microsoft.com/win/2004/08/events/event">
  <System>
    <EventID>100</EventID>
    <TimeCreated SystemTime="2024-06-01T08:00:00.1234567Z"/>
    <Correlation ActivityID="{6F0C1C44-7A3E-4D2B-9F47-3C1E2B9A0D11}"/>
    <Security UserID="S-1-5-18"/>
  </System>
  <EventData>
    <Data Name="TaskName">\Backup</Data>
    <Data Name="UserContext">PC\alice</Data>
  </EventData>
  <RenderingInfo Culture="en-US"><Message>Task Scheduler started the task.</Message></RenderingInfo>
</Event>
<Event xmlns="http://schemas.microsoft.com/win/2004/08/events/event">
  <System>
    <EventID>102</EventID>
    <TimeCreated SystemTime="2024-06-01T08:05:00.0000000Z"/>
    <Security UserID="S-1-5-18"/>
  </System>
  <EventData>
    <Data Name="TaskName">\Backup</Data>
    <Data Name="ResultCode">0</Data>
  </EventData>
</Event>"#;
        let entries = parse_events(text).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].event_id, 102);
        assert_eq!(entries[0].result_label, "Task Completed");
        assert_eq!(entries[0].exit_code, "0");
        assert_eq!(entries[0].user, "S-1-5-18");
        assert_eq!(entries[1].user, r"PC\alice");
        assert_eq!(entries[1].message, "Task Scheduler started the task.");
        assert!(entries[1].activity_id.is_some());

        assert!(parse_events("  ").unwrap().is_empty());
    }
}
