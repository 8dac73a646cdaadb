use crate::models::{Task, TaskRow, TaskStatus};
use crate::time_parsing::format_due;
use chrono::{DateTime, Local};

pub fn status_of(task: &Task, now: DateTime<Local>) -> TaskStatus {
    if task.completed {
        TaskStatus::Complete
    } else if task.is_overdue(now) {
        TaskStatus::NotDoneOverdue
    } else {
        TaskStatus::Incomplete
    }
}

/// Display order key. Fields compare in declaration order: open before done,
/// overdue first, dated before undated, earliest due, then highest priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SortKey {
    completed: bool,
    not_overdue: bool,
    undated: bool,
    due_at: Option<DateTime<Local>>,
    priority: u8,
}

pub fn sort_key(task: &Task, now: DateTime<Local>) -> SortKey {
    SortKey {
        completed: task.completed,
        not_overdue: !task.is_overdue(now),
        undated: task.due_at.is_none(),
        due_at: task.due_at,
        priority: task.priority.as_number(),
    }
}

/// Stable sort, so equal keys keep store order.
pub fn sort_tasks(tasks: &mut [Task], now: DateTime<Local>) {
    tasks.sort_by_key(|task| sort_key(task, now));
}

pub fn display_rows(tasks: &[Task], now: DateTime<Local>) -> Vec<TaskRow> {
    let mut ordered = tasks.to_vec();
    sort_tasks(&mut ordered, now);
    ordered
        .into_iter()
        .map(|task| {
            let status = status_of(&task, now);
            TaskRow {
                id: task.id,
                due: task.due_at.as_ref().map(format_due).unwrap_or_default(),
                priority: task.priority.label().to_string(),
                status,
                status_label: status.label().to_string(),
                title: task.title,
            }
        })
        .collect()
}
