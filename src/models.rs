use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_PRIORITY: Priority = Priority::Medium;
pub const DEFAULT_REMIND_BEFORE_MINUTES: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Priority {
    High = 1,
    Medium = 2,
    Low = 3,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    pub fn as_number(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        DEFAULT_PRIORITY
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::High),
            2 => Ok(Self::Medium),
            3 => Ok(Self::Low),
            other => Err(format!("priority must be 1, 2 or 3 (got {other})")),
        }
    }
}

impl From<Priority> for u8 {
    fn from(value: Priority) -> Self {
        value.as_number()
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.as_number(), self.label())
    }
}

/// A tracked task. `id`, `completed` and `reminder_sent` are owned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: u64,
    pub title: String,
    pub due_at: Option<DateTime<Local>>,
    pub priority: Priority,
    pub completed: bool,
    pub remind_before_minutes: u32,
    pub reminder_sent: bool,
}

impl Task {
    /// Start of the reminder window, if the task has a due time.
    pub fn remind_at(&self) -> Option<DateTime<Local>> {
        self.due_at
            .map(|due| due - chrono::Duration::minutes(i64::from(self.remind_before_minutes)))
    }

    pub fn is_overdue(&self, now: DateTime<Local>) -> bool {
        !self.completed && self.due_at.is_some_and(|due| due < now)
    }
}

/// Caller-supplied editable fields for add and update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: String,
    pub due_at: Option<DateTime<Local>>,
    pub priority: Priority,
    pub remind_before_minutes: u32,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            due_at: None,
            priority: DEFAULT_PRIORITY,
            remind_before_minutes: DEFAULT_REMIND_BEFORE_MINUTES,
        }
    }

    pub fn due_at(mut self, due_at: DateTime<Local>) -> Self {
        self.due_at = Some(due_at);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn remind_before(mut self, minutes: u32) -> Self {
        self.remind_before_minutes = minutes;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Complete,
    NotDoneOverdue,
    Incomplete,
}

impl TaskStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Complete => "Complete",
            Self::NotDoneOverdue => "Not Done (Overdue)",
            Self::Incomplete => "Incomplete",
        }
    }
}

/// One line of the task list as a front end renders it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRow {
    pub id: u64,
    pub title: String,
    pub due: String,
    pub priority: String,
    pub status: TaskStatus,
    pub status_label: String,
}

/// Raw form text as submitted by a front end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskForm {
    pub title: String,
    pub due: String,
    pub priority: String,
    pub remind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub store_file: PathBuf,
    pub poll_interval_secs: u64,
    pub mail: Option<MailSettings>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            store_file: PathBuf::from("tasks.json"),
            poll_interval_secs: 5,
            mail: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MailSettings {
    #[serde(default = "default_mail_program")]
    pub program: String,
    #[serde(default = "default_mail_args")]
    pub args: Vec<String>,
    pub from: String,
    pub to: String,
    #[serde(default = "default_mail_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_mail_program() -> String {
    "sendmail".to_string()
}

fn default_mail_args() -> Vec<String> {
    vec!["-t".to_string(), "-i".to_string()]
}

fn default_mail_timeout_ms() -> u64 {
    30_000
}

#[cfg(test)]
mod tests {
    use super::{AppSettings, MailSettings, Priority, Task};
    use chrono::{Local, TimeZone};

    #[test]
    fn priority_serializes_as_number() {
        assert_eq!(serde_json::to_string(&Priority::High).expect("serialize"), "1");
        let parsed: Priority = serde_json::from_str("3").expect("deserialize");
        assert_eq!(parsed, Priority::Low);
        assert!(serde_json::from_str::<Priority>("4").is_err());
        assert_eq!(Priority::Medium.to_string(), "2 - Medium");
    }

    #[test]
    fn remind_at_subtracts_offset() {
        let due = Local.with_ymd_and_hms(2026, 1, 20, 21, 30, 0).single().expect("local time");
        let task = Task {
            id: 1,
            title: "Pay rent".to_string(),
            due_at: Some(due),
            priority: Priority::Medium,
            completed: false,
            remind_before_minutes: 90,
            reminder_sent: false,
        };
        let expected = Local.with_ymd_and_hms(2026, 1, 20, 20, 0, 0).single().expect("local time");
        assert_eq!(task.remind_at(), Some(expected));
    }

    #[test]
    fn mail_settings_fill_defaults() {
        let settings: AppSettings = serde_json::from_value(serde_json::json!({
            "storeFile": "tasks.json",
            "pollIntervalSecs": 5,
            "mail": { "from": "me@example.com", "to": "me@example.com" }
        }))
        .expect("settings");
        let mail: MailSettings = settings.mail.expect("mail settings");
        assert_eq!(mail.program, "sendmail");
        assert_eq!(mail.args, vec!["-t", "-i"]);
        assert_eq!(mail.timeout_ms, 30_000);
    }
}
