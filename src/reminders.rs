use crate::errors::AppResult;
use crate::models::Task;
use crate::notify::NotificationSink;
use crate::store::TaskStore;
use crate::time_parsing::format_due;
use chrono::{DateTime, Duration, Local};
use std::sync::Arc;

/// Grace added to "now" so polling drift does not push a reminder past its window start.
pub const REMINDER_TOLERANCE_SECS: i64 = 10;

/// True when the task has entered its reminder window and has not been reminded.
/// Once the due time itself has passed the reminder is considered missed.
pub fn is_due_for_reminder(task: &Task, now: DateTime<Local>) -> bool {
    if task.completed || task.reminder_sent {
        return false;
    }
    let (Some(due_at), Some(remind_at)) = (task.due_at, task.remind_at()) else {
        return false;
    };
    now + Duration::seconds(REMINDER_TOLERANCE_SECS) >= remind_at && now < due_at
}

pub fn due_for_reminder(tasks: &[Task], now: DateTime<Local>) -> Vec<Task> {
    tasks
        .iter()
        .filter(|task| is_due_for_reminder(task, now))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderMessage {
    pub subject: String,
    pub body: String,
}

impl ReminderMessage {
    pub fn for_task(task: &Task) -> Self {
        let due = task.due_at.as_ref().map(format_due).unwrap_or_default();
        Self {
            subject: format!("Task Reminder: {}", task.title),
            body: format!("Reminder!\n\nTask: {}\nDue: {}\n", task.title, due),
        }
    }
}

/// Outcome of one reminder pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReminderReport {
    pub sent: Vec<u64>,
    pub failed: Vec<(u64, String)>,
}

pub struct ReminderEngine {
    store: Arc<TaskStore>,
    sink: Arc<dyn NotificationSink>,
}

impl ReminderEngine {
    pub fn new(store: Arc<TaskStore>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { store, sink }
    }

    pub fn due_for_reminder(&self, now: DateTime<Local>) -> AppResult<Vec<Task>> {
        Ok(due_for_reminder(&self.store.list_tasks()?, now))
    }

    /// Entry point for the periodic trigger.
    pub fn check_reminders(&self) {
        if let Err(error) = self.check_reminders_at(Local::now()) {
            tracing::error!(error = %error, "reminder check failed");
        }
    }

    /// Sends every due reminder and marks it sent. Each task is attempted
    /// independently; a failed send stays unsent and is retried next pass.
    pub fn check_reminders_at(&self, now: DateTime<Local>) -> AppResult<ReminderReport> {
        let mut report = ReminderReport::default();
        for task in self.due_for_reminder(now)? {
            let message = ReminderMessage::for_task(&task);
            if let Err(error) = self.sink.send(&message.subject, &message.body) {
                tracing::warn!(
                    task_id = task.id,
                    sink = self.sink.id(),
                    error = %error,
                    "reminder send failed"
                );
                report.failed.push((task.id, error.to_string()));
                continue;
            }

            // A failure here means the reminder may be sent again on the next pass.
            if let Err(error) = self.store.mark_reminder_sent(task.id) {
                tracing::error!(
                    task_id = task.id,
                    error = %error,
                    "reminder sent but not recorded"
                );
                report.failed.push((task.id, error.to_string()));
                continue;
            }

            tracing::info!(task_id = task.id, sink = self.sink.id(), "reminder sent");
            report.sent.push(task.id);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use crate::models::{Priority, TaskDraft};
    use crate::time_parsing::parse_due_date_time;
    use chrono::TimeZone;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<(String, String)>>,
        fail_subjects_containing: Option<String>,
    }

    impl NotificationSink for RecordingSink {
        fn id(&self) -> &'static str {
            "recording"
        }

        fn send(&self, subject: &str, body: &str) -> AppResult<()> {
            if let Some(needle) = &self.fail_subjects_containing {
                if subject.contains(needle.as_str()) {
                    return Err(AppError::Notification("smtp unavailable".to_string()));
                }
            }
            self.sent
                .lock()
                .expect("recording sink lock")
                .push((subject.to_string(), body.to_string()));
            Ok(())
        }
    }

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, mo, d, h, mi, s).single().expect("local time")
    }

    fn rent_task() -> Task {
        Task {
            id: 1,
            title: "Pay rent".to_string(),
            due_at: parse_due_date_time("2026-01-20 21:30").expect("parse"),
            priority: Priority::Medium,
            completed: false,
            remind_before_minutes: 60,
            reminder_sent: false,
        }
    }

    fn engine_with(
        sink: Arc<RecordingSink>,
    ) -> (tempfile::TempDir, Arc<TaskStore>, ReminderEngine) {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = Arc::new(TaskStore::open(&dir.path().join("tasks.json")).expect("store"));
        let engine = ReminderEngine::new(store.clone(), sink);
        (dir, store, engine)
    }

    #[test]
    fn window_edges() {
        let task = rent_task();
        assert!(!is_due_for_reminder(&task, at(2026, 1, 20, 20, 29, 49)));
        assert!(is_due_for_reminder(&task, at(2026, 1, 20, 20, 29, 50)));
        assert!(is_due_for_reminder(&task, at(2026, 1, 20, 21, 29, 59)));
        assert!(!is_due_for_reminder(&task, at(2026, 1, 20, 21, 30, 0)));
    }

    #[test]
    fn never_offers_completed_sent_or_undated_tasks() {
        let now = at(2026, 1, 20, 21, 0, 0);
        let completed = Task { completed: true, ..rent_task() };
        let sent = Task { reminder_sent: true, ..rent_task() };
        let undated = Task { due_at: None, ..rent_task() };
        assert!(due_for_reminder(&[completed, sent, undated], now).is_empty());
    }

    #[test]
    fn zero_offset_fires_within_tolerance_of_due() {
        let task = Task { remind_before_minutes: 0, ..rent_task() };
        assert!(!is_due_for_reminder(&task, at(2026, 1, 20, 21, 29, 0)));
        assert!(is_due_for_reminder(&task, at(2026, 1, 20, 21, 29, 55)));
    }

    #[test]
    fn message_names_task_and_due_time() {
        let message = ReminderMessage::for_task(&rent_task());
        assert_eq!(message.subject, "Task Reminder: Pay rent");
        assert_eq!(message.body, "Reminder!\n\nTask: Pay rent\nDue: 2026-01-20 21:30\n");
    }

    #[test]
    fn fires_once_then_marks_sent() {
        let sink = Arc::new(RecordingSink::default());
        let (_dir, store, engine) = engine_with(sink.clone());
        let task = store
            .add_task(
                TaskDraft::new("Pay rent")
                    .due_at(at(2026, 1, 20, 21, 30, 0))
                    .remind_before(60),
            )
            .expect("add");

        let now = at(2026, 1, 20, 20, 30, 5);
        assert_eq!(engine.due_for_reminder(now).expect("due").len(), 1);
        let report = engine.check_reminders_at(now).expect("check");
        assert_eq!(report.sent, vec![task.id]);
        assert!(store.get_task(task.id).expect("get").expect("present").reminder_sent);

        let again = engine.check_reminders_at(now).expect("second check");
        assert!(again.sent.is_empty());
        assert!(engine.due_for_reminder(at(2026, 1, 20, 20, 31, 0)).expect("due").is_empty());
        assert_eq!(sink.sent.lock().expect("lock").len(), 1);
    }

    #[test]
    fn missed_reminders_are_not_sent_after_due() {
        let sink = Arc::new(RecordingSink::default());
        let (_dir, store, engine) = engine_with(sink.clone());
        store
            .add_task(TaskDraft::new("Pay rent").due_at(at(2026, 1, 20, 21, 30, 0)))
            .expect("add");

        let report = engine.check_reminders_at(at(2026, 1, 20, 21, 31, 0)).expect("check");
        assert_eq!(report, ReminderReport::default());
        assert!(sink.sent.lock().expect("lock").is_empty());
    }

    #[test]
    fn send_failure_keeps_reminder_armed_and_continues_batch() {
        let sink = Arc::new(RecordingSink {
            fail_subjects_containing: Some("rent".to_string()),
            ..RecordingSink::default()
        });
        let (_dir, store, engine) = engine_with(sink.clone());
        let due = at(2026, 1, 20, 21, 30, 0);
        let rent = store.add_task(TaskDraft::new("Pay rent").due_at(due)).expect("add");
        let gym = store.add_task(TaskDraft::new("Gym").due_at(due)).expect("add");

        let report = engine.check_reminders_at(at(2026, 1, 20, 21, 0, 0)).expect("check");
        assert_eq!(report.sent, vec![gym.id]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, rent.id);
        assert!(!store.get_task(rent.id).expect("get").expect("present").reminder_sent);
        assert!(store.get_task(gym.id).expect("get").expect("present").reminder_sent);
    }

    #[test]
    fn edit_rearms_a_sent_reminder() {
        let sink = Arc::new(RecordingSink::default());
        let (_dir, store, engine) = engine_with(sink.clone());
        let due = at(2026, 1, 20, 21, 30, 0);
        let task = store.add_task(TaskDraft::new("Pay rent").due_at(due)).expect("add");
        let now = at(2026, 1, 20, 21, 0, 0);
        engine.check_reminders_at(now).expect("first");

        store
            .update_task(task.id, TaskDraft::new("Pay rent").due_at(due))
            .expect("update");
        let report = engine.check_reminders_at(now).expect("after edit");
        assert_eq!(report.sent, vec![task.id]);
        assert_eq!(sink.sent.lock().expect("lock").len(), 2);
    }

    #[test]
    fn completed_tasks_are_not_reminded() {
        let sink = Arc::new(RecordingSink::default());
        let (_dir, store, engine) = engine_with(sink.clone());
        let task = store
            .add_task(TaskDraft::new("Pay rent").due_at(at(2026, 1, 20, 21, 30, 0)))
            .expect("add");
        store.set_completed(task.id, true).expect("complete");

        let report = engine.check_reminders_at(at(2026, 1, 20, 21, 0, 0)).expect("check");
        assert!(report.sent.is_empty());
    }

    #[test]
    fn corrupt_store_is_reported_to_the_caller() {
        let sink = Arc::new(RecordingSink::default());
        let (dir, _store, engine) = engine_with(sink);
        std::fs::write(dir.path().join("tasks.json"), "[{\"title\": \"no id\"}]").expect("write");
        assert!(matches!(
            engine.check_reminders_at(Local::now()),
            Err(AppError::CorruptStore(_))
        ));
        engine.check_reminders();
    }
}
