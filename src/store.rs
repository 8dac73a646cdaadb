use crate::errors::{AppError, AppResult};
use crate::models::{Priority, Task, TaskDraft, DEFAULT_PRIORITY, DEFAULT_REMIND_BEFORE_MINUTES};
use crate::time_parsing::local_from_naive;
use chrono::{DateTime, Local, NaiveDateTime, Timelike};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const DOCUMENT_VERSION: u8 = 1;
const STORED_DUE_FORMAT: &str = "%Y-%m-%dT%H:%M";
const LEGACY_DUE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// One full load of the task document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Highest id ever assigned, including ids of deleted tasks.
    pub last_id: u64,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Serialize)]
struct StoreDocument<'a> {
    version: u8,
    last_id: u64,
    tasks: Vec<TaskRecord<'a>>,
}

#[derive(Debug, Serialize)]
struct TaskRecord<'a> {
    id: u64,
    title: &'a str,
    due_at: Option<String>,
    priority: u8,
    completed: bool,
    remind_before_minutes: u32,
    reminder_sent: bool,
}

impl<'a> From<&'a Task> for TaskRecord<'a> {
    fn from(task: &'a Task) -> Self {
        Self {
            id: task.id,
            title: &task.title,
            due_at: task.due_at.map(|due| due.format(STORED_DUE_FORMAT).to_string()),
            priority: task.priority.as_number(),
            completed: task.completed,
            remind_before_minutes: task.remind_before_minutes,
            reminder_sent: task.reminder_sent,
        }
    }
}

/// File-backed task collection. Every mutation is a full load, a pure
/// transform of the snapshot, and an atomic replacement of the document.
#[derive(Debug)]
pub struct TaskStore {
    path: PathBuf,
    io_lock: Mutex<()>,
}

impl TaskStore {
    pub fn open(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let store = Self {
            path: path.to_path_buf(),
            io_lock: Mutex::new(()),
        };
        {
            let _guard = store.lock()?;
            store.load()?;
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn list_tasks(&self) -> AppResult<Vec<Task>> {
        let _guard = self.lock()?;
        Ok(self.load()?.tasks)
    }

    pub fn get_task(&self, id: u64) -> AppResult<Option<Task>> {
        Ok(self.list_tasks()?.into_iter().find(|task| task.id == id))
    }

    pub fn add_task(&self, draft: TaskDraft) -> AppResult<Task> {
        let draft = normalize_draft(draft)?;
        let task = self.mutate(|snapshot| {
            let id = next_id(&snapshot.tasks, snapshot.last_id)?;
            let task = Task {
                id,
                title: draft.title,
                due_at: draft.due_at,
                priority: draft.priority,
                completed: false,
                remind_before_minutes: draft.remind_before_minutes,
                reminder_sent: false,
            };
            let mut tasks = snapshot.tasks;
            tasks.push(task.clone());
            Ok((Snapshot { last_id: id, tasks }, task))
        })?;
        tracing::info!(task_id = task.id, "task added");
        Ok(task)
    }

    /// Overwrites the editable fields and re-arms the reminder. Unknown ids are
    /// skipped, not reported.
    pub fn update_task(&self, id: u64, draft: TaskDraft) -> AppResult<Option<Task>> {
        let draft = normalize_draft(draft)?;
        self.mutate(|snapshot| {
            let tasks = apply_update(&snapshot.tasks, id, &draft);
            let updated = tasks.iter().find(|task| task.id == id).cloned();
            Ok((Snapshot { tasks, ..snapshot }, updated))
        })
    }

    /// Returns whether a task was removed. The document is rewritten either way.
    pub fn delete_task(&self, id: u64) -> AppResult<bool> {
        let removed = self.mutate(|snapshot| {
            let tasks = apply_delete(&snapshot.tasks, id);
            let removed = tasks.len() != snapshot.tasks.len();
            Ok((Snapshot { tasks, ..snapshot }, removed))
        })?;
        if removed {
            tracing::info!(task_id = id, "task deleted");
        }
        Ok(removed)
    }

    pub fn set_completed(&self, id: u64, completed: bool) -> AppResult<Option<Task>> {
        self.mutate(|snapshot| {
            let tasks = apply_completed(&snapshot.tasks, id, completed);
            let updated = tasks.iter().find(|task| task.id == id).cloned();
            Ok((Snapshot { tasks, ..snapshot }, updated))
        })
    }

    pub fn mark_reminder_sent(&self, id: u64) -> AppResult<Option<Task>> {
        self.mutate(|snapshot| {
            let tasks = apply_reminder_sent(&snapshot.tasks, id);
            let updated = tasks.iter().find(|task| task.id == id).cloned();
            Ok((Snapshot { tasks, ..snapshot }, updated))
        })
    }

    fn mutate<R>(
        &self,
        transform: impl FnOnce(Snapshot) -> AppResult<(Snapshot, R)>,
    ) -> AppResult<R> {
        let _guard = self.lock()?;
        let snapshot = self.load()?;
        let (next, result) = transform(snapshot)?;
        self.save(&next)?;
        Ok(result)
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, ()>> {
        self.io_lock
            .lock()
            .map_err(|_| AppError::Internal("task store mutex poisoned".to_string()))
    }

    fn load(&self) -> AppResult<Snapshot> {
        if !self.path.exists() {
            let empty = Snapshot::default();
            self.save(&empty)?;
            return Ok(empty);
        }
        let bytes = fs::read(&self.path).map_err(|err| AppError::Io(err.to_string()))?;
        decode_document(&bytes).map_err(|err| match err {
            AppError::CorruptStore(message) => {
                AppError::CorruptStore(format!("{}: {}", self.path.to_string_lossy(), message))
            }
            other => other,
        })
    }

    fn save(&self, snapshot: &Snapshot) -> AppResult<()> {
        let document = StoreDocument {
            version: DOCUMENT_VERSION,
            last_id: snapshot.last_id,
            tasks: snapshot.tasks.iter().map(TaskRecord::from).collect(),
        };
        let bytes = serde_json::to_vec_pretty(&document)?;

        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "tasks.json".to_string());
        let tmp_path = self.path.with_file_name(format!("{file_name}.tmp"));

        let mut file = File::create(&tmp_path).map_err(|err| AppError::Io(err.to_string()))?;
        file.write_all(&bytes).map_err(|err| AppError::Io(err.to_string()))?;
        file.sync_all().map_err(|err| AppError::Io(err.to_string()))?;
        drop(file);

        fs::rename(&tmp_path, &self.path).map_err(|err| {
            let _ = fs::remove_file(&tmp_path);
            AppError::Io(format!(
                "failed to replace {}: {}",
                self.path.to_string_lossy(),
                err
            ))
        })
    }
}

/// Trims the title, rejects empty ones, and drops sub-minute precision from
/// the due time to match what the document can hold.
pub fn normalize_draft(draft: TaskDraft) -> AppResult<TaskDraft> {
    let title = draft.title.trim().to_string();
    if title.is_empty() {
        return Err(AppError::Validation("Title cannot be empty.".to_string()));
    }
    Ok(TaskDraft {
        title,
        due_at: draft.due_at.map(truncate_to_minute),
        ..draft
    })
}

fn truncate_to_minute(due_at: DateTime<Local>) -> DateTime<Local> {
    due_at
        .with_second(0)
        .and_then(|value| value.with_nanosecond(0))
        .unwrap_or(due_at)
}

/// Fails once the id space is exhausted rather than wrapping onto a used id.
pub fn next_id(tasks: &[Task], last_id: u64) -> AppResult<u64> {
    tasks
        .iter()
        .map(|task| task.id)
        .max()
        .unwrap_or(0)
        .max(last_id)
        .checked_add(1)
        .ok_or_else(|| AppError::CorruptStore("no task ids left to assign".to_string()))
}

pub fn apply_update(tasks: &[Task], id: u64, draft: &TaskDraft) -> Vec<Task> {
    tasks
        .iter()
        .map(|task| {
            if task.id != id {
                return task.clone();
            }
            Task {
                title: draft.title.trim().to_string(),
                due_at: draft.due_at,
                priority: draft.priority,
                remind_before_minutes: draft.remind_before_minutes,
                reminder_sent: false,
                ..task.clone()
            }
        })
        .collect()
}

pub fn apply_delete(tasks: &[Task], id: u64) -> Vec<Task> {
    tasks.iter().filter(|task| task.id != id).cloned().collect()
}

/// Completing suppresses the reminder, reopening re-arms it. Undated tasks
/// never carry a sent flag.
pub fn apply_completed(tasks: &[Task], id: u64, completed: bool) -> Vec<Task> {
    tasks
        .iter()
        .map(|task| {
            if task.id != id {
                return task.clone();
            }
            Task {
                completed,
                // An undated task has no reminder to suppress.
                reminder_sent: completed && task.due_at.is_some(),
                ..task.clone()
            }
        })
        .collect()
}

pub fn apply_reminder_sent(tasks: &[Task], id: u64) -> Vec<Task> {
    tasks
        .iter()
        .map(|task| {
            if task.id != id {
                return task.clone();
            }
            Task {
                reminder_sent: task.due_at.is_some(),
                ..task.clone()
            }
        })
        .collect()
}

fn decode_document(bytes: &[u8]) -> AppResult<Snapshot> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Snapshot::default());
    }

    let value: Value = serde_json::from_slice(bytes)
        .map_err(|err| AppError::CorruptStore(format!("document is not valid JSON: {err}")))?;

    let (records, mut last_id) = match value {
        Value::Array(records) => (records, 0),
        Value::Object(mut document) => {
            let records = match document.remove("tasks") {
                Some(Value::Array(records)) => records,
                None | Some(Value::Null) => Vec::new(),
                Some(_) => {
                    return Err(AppError::CorruptStore("'tasks' must be an array".to_string()));
                }
            };
            let last_id = match document.get("last_id") {
                None | Some(Value::Null) => 0,
                Some(value) => value.as_u64().ok_or_else(|| {
                    AppError::CorruptStore("'last_id' must be a non-negative integer".to_string())
                })?,
            };
            (records, last_id)
        }
        _ => {
            return Err(AppError::CorruptStore(
                "document must be a task list or an object with 'tasks'".to_string(),
            ));
        }
    };

    let mut seen = HashSet::new();
    let mut tasks = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        let task = decode_record(index, record)?;
        if !seen.insert(task.id) {
            return Err(AppError::CorruptStore(format!(
                "record {index}: duplicate id {}",
                task.id
            )));
        }
        last_id = last_id.max(task.id);
        tasks.push(task);
    }

    Ok(Snapshot { last_id, tasks })
}

fn decode_record(index: usize, record: Value) -> AppResult<Task> {
    let corrupt = |message: &str| AppError::CorruptStore(format!("record {index}: {message}"));
    let Value::Object(fields) = record else {
        return Err(corrupt("not an object"));
    };

    let id = fields
        .get("id")
        .and_then(Value::as_u64)
        .filter(|id| *id > 0)
        .ok_or_else(|| corrupt("missing or invalid 'id'"))?;
    let title = fields
        .get("title")
        .and_then(Value::as_str)
        .ok_or_else(|| corrupt("missing or invalid 'title'"))?
        .to_string();

    let due_at = match present(&fields, "due_at") {
        None => None,
        Some(Value::String(raw)) if raw.trim().is_empty() => None,
        Some(Value::String(raw)) => Some(
            parse_stored_due(raw)
                .ok_or_else(|| corrupt(&format!("invalid 'due_at' value '{raw}'")))?,
        ),
        Some(_) => return Err(corrupt("'due_at' must be a string or null")),
    };

    let priority = match present(&fields, "priority") {
        None => DEFAULT_PRIORITY,
        Some(value) => value
            .as_u64()
            .and_then(|raw| u8::try_from(raw).ok())
            .and_then(|raw| Priority::try_from(raw).ok())
            .ok_or_else(|| corrupt("'priority' must be 1, 2 or 3"))?,
    };

    let completed = read_bool(&fields, "completed")
        .map_err(|_| corrupt("'completed' must be a boolean"))?;
    let reminder_sent = read_bool(&fields, "reminder_sent")
        .map_err(|_| corrupt("'reminder_sent' must be a boolean"))?;

    let remind_before_minutes = match present(&fields, "remind_before_minutes") {
        None => DEFAULT_REMIND_BEFORE_MINUTES,
        Some(value) => value
            .as_u64()
            .and_then(|raw| u32::try_from(raw).ok())
            .ok_or_else(|| corrupt("'remind_before_minutes' must be a non-negative integer"))?,
    };

    Ok(Task {
        id,
        title,
        due_at,
        priority,
        completed,
        remind_before_minutes,
        reminder_sent: reminder_sent && due_at.is_some(),
    })
}

fn present<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    fields.get(key).filter(|value| !value.is_null())
}

fn read_bool(fields: &Map<String, Value>, key: &str) -> Result<bool, ()> {
    match present(fields, key) {
        None => Ok(false),
        Some(value) => value.as_bool().ok_or(()),
    }
}

fn parse_stored_due(raw: &str) -> Option<DateTime<Local>> {
    let raw = raw.trim();
    for format in LEGACY_DUE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return local_from_naive(naive).ok();
        }
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|due| due.with_timezone(&Local))
}
