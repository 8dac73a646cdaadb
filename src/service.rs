use crate::errors::{AppError, AppResult};
use crate::models::{Priority, Task, TaskDraft, TaskForm, TaskRow, DEFAULT_PRIORITY};
use crate::ordering::display_rows;
use crate::store::TaskStore;
use crate::time_parsing::{
    format_due, format_reminder_offset, parse_due_date_time, parse_reminder_offset,
};
use chrono::{DateTime, Local};
use std::sync::Arc;

/// Boundary for front ends: takes raw form text, returns typed errors they can
/// show to the user.
#[derive(Clone)]
pub struct TaskService {
    store: Arc<TaskStore>,
}

impl TaskService {
    pub fn new(store: Arc<TaskStore>) -> Self {
        Self { store }
    }

    pub fn validate(form: &TaskForm) -> AppResult<TaskDraft> {
        let title = form.title.trim();
        if title.is_empty() {
            return Err(AppError::Validation("Title cannot be empty.".to_string()));
        }
        let remind_before_minutes = parse_reminder_offset(&form.remind)?;
        let due_at = parse_due_date_time(&form.due)?;
        let priority = parse_priority(&form.priority)?;
        Ok(TaskDraft {
            title: title.to_string(),
            due_at,
            priority,
            remind_before_minutes,
        })
    }

    pub fn list_tasks(&self) -> AppResult<Vec<Task>> {
        self.store.list_tasks()
    }

    pub fn get_task(&self, id: u64) -> AppResult<Option<Task>> {
        self.store.get_task(id)
    }

    pub fn add_task(&self, form: &TaskForm) -> AppResult<Task> {
        self.store.add_task(Self::validate(form)?)
    }

    pub fn update_task(&self, id: u64, form: &TaskForm) -> AppResult<Option<Task>> {
        self.store.update_task(id, Self::validate(form)?)
    }

    pub fn delete_task(&self, id: u64) -> AppResult<bool> {
        self.store.delete_task(id)
    }

    pub fn set_completed(&self, id: u64, completed: bool) -> AppResult<Option<Task>> {
        self.store.set_completed(id, completed)
    }

    pub fn rows(&self, now: DateTime<Local>) -> AppResult<Vec<TaskRow>> {
        Ok(display_rows(&self.store.list_tasks()?, now))
    }

    /// Form pre-filled from a stored task, for editing.
    pub fn edit_form(&self, id: u64) -> AppResult<Option<TaskForm>> {
        Ok(self.store.get_task(id)?.map(|task| TaskForm {
            title: task.title,
            due: task.due_at.as_ref().map(format_due).unwrap_or_default(),
            priority: task.priority.to_string(),
            remind: format_reminder_offset(task.remind_before_minutes),
        }))
    }
}

/// Accepts `2`, `2 - Medium` or `medium`. Blank means Medium.
pub fn parse_priority(text: &str) -> AppResult<Priority> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(DEFAULT_PRIORITY);
    }
    let head = trimmed.split('-').next().unwrap_or_default().trim();
    if let Ok(number) = head.parse::<u8>() {
        return Priority::try_from(number).map_err(AppError::Validation);
    }
    Priority::ALL
        .into_iter()
        .find(|priority| priority.label().eq_ignore_ascii_case(trimmed))
        .ok_or_else(|| {
            AppError::Validation(format!(
                "Unknown priority '{trimmed}' (use 1-High, 2-Medium or 3-Low)"
            ))
        })
}
