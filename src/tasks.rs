//! To-do items with due-date reminders, mirrored to a flat JSON file.
//!
//! The file holds only unchecked tasks as `[{"text": ..., "due": "yyyy-MM-dd hh:mm"}]`
//! and is rewritten wholesale on every save. Completed tasks stay in memory
//! (shown checked) until the next load drops them.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// On-disk due format, 24-hour clock.
pub const DUE_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, Error)]
pub enum TaskStoreError {
    #[error("task description is empty")]
    EmptyDescription,
    #[error("invalid due date '{0}', expected yyyy-MM-dd hh:mm")]
    BadDue(String),
    #[error("no task with id {0}")]
    UnknownTask(u64),
    #[error("task file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("task file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TaskStoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub description: String,
    #[serde(serialize_with = "serialize_due")]
    pub due_at: NaiveDateTime,
    pub completed: bool,
}

impl Task {
    pub fn due_label(&self) -> String {
        self.due_at.format(DUE_FORMAT).to_string()
    }
}

fn serialize_due<S: serde::Serializer>(due: &NaiveDateTime, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&due.format(DUE_FORMAT).to_string())
}

pub fn parse_due(raw: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), DUE_FORMAT)
        .map_err(|_| TaskStoreError::BadDue(raw.to_string()))
}

/// One element of the persisted array.
#[derive(Debug, Serialize, Deserialize)]
struct StoredTask {
    text: String,
    due: String,
}

/// A message the task store wants shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskNotice {
    DueSoon(String),
    Overdue(String),
}

impl TaskNotice {
    pub fn text(&self) -> &str {
        match self {
            TaskNotice::DueSoon(t) | TaskNotice::Overdue(t) => t,
        }
    }
}

pub type ReminderSink = Box<dyn Fn(TaskNotice) + Send>;

pub struct TaskStore {
    path: PathBuf,
    tasks: Vec<Task>,
    next_id: u64,
    on_reminder: ReminderSink,
}

impl TaskStore {
    /// Opens the store at `path`. A missing, unreadable or malformed file
    /// leaves the store empty and is never an error.
    pub fn open(path: impl Into<PathBuf>, on_reminder: ReminderSink) -> Self {
        let mut store = Self {
            path: path.into(),
            tasks: Vec::new(),
            next_id: 1,
            on_reminder,
        };
        store.reload();
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Tasks in insertion order, completed ones included.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Re-reads the file, replacing the in-memory list, and returns the tasks.
    pub fn load_all(&mut self) -> Vec<Task> {
        if self.reload() {
            self.persist();
        }
        self.tasks.clone()
    }

    /// Returns whether the file was read successfully.
    fn reload(&mut self) -> bool {
        self.tasks.clear();
        match read_file(&self.path) {
            Ok(Some(stored)) => {
                for (description, due_at) in stored {
                    self.push(description, due_at);
                }
                log::info!("Loaded {} task(s) from {}", self.tasks.len(), self.path.display());
                true
            }
            Ok(None) => false,
            Err(e) => {
                log::warn!("Failed to load tasks from {}: {e}", self.path.display());
                false
            }
        }
    }

    fn push(&mut self, description: String, due_at: NaiveDateTime) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.tasks.push(Task {
            id,
            description,
            due_at,
            completed: false,
        });
        id
    }

    pub fn add(&mut self, description: &str, due_at: NaiveDateTime) -> Result<TaskId> {
        let description = description.trim();
        if description.is_empty() {
            return Err(TaskStoreError::EmptyDescription);
        }
        let id = self.push(description.to_string(), due_at);
        self.persist();
        Ok(id)
    }

    pub fn mark_complete(&mut self, id: TaskId) -> Result<()> {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(TaskStoreError::UnknownTask(id.0))?;
        task.completed = true;
        self.persist();
        Ok(())
    }

    /// Unchecked tasks due within `lead_minutes` of `now`, plus unchecked
    /// overdue ones. Overdue tasks come back on every call until completed.
    pub fn due_soon(&self, lead_minutes: i64, now: NaiveDateTime) -> Vec<Task> {
        let horizon = now + Duration::minutes(lead_minutes);
        self.tasks
            .iter()
            .filter(|t| !t.completed && t.due_at <= horizon)
            .cloned()
            .collect()
    }

    /// Sends a notice through the reminder sink for every `due_soon` task.
    pub fn check_reminders(&self, lead_minutes: i64, now: NaiveDateTime) {
        for task in self.due_soon(lead_minutes, now) {
            let notice = if task.due_at < now {
                TaskNotice::Overdue(format!("Task '{}' is due!", task.description))
            } else {
                TaskNotice::DueSoon(format!(
                    "Reminder: {} (Due: {})",
                    task.description,
                    task.due_label()
                ))
            };
            (self.on_reminder)(notice);
        }
    }

    /// Writes every unchecked task, replacing the file's contents.
    pub fn save(&self) -> Result<()> {
        let stored: Vec<StoredTask> = self
            .tasks
            .iter()
            .filter(|t| !t.completed)
            .map(|t| StoredTask {
                text: t.description.clone(),
                due: t.due_label(),
            })
            .collect();
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string(&stored)?)?;
        Ok(())
    }

    fn persist(&self) {
        if let Err(e) = self.save() {
            log::error!("Failed to save tasks to {}: {e}", self.path.display());
        }
    }
}

/// `Ok(None)` when there is no file yet. Any bad entry fails the whole file.
fn read_file(path: &Path) -> Result<Option<Vec<(String, NaiveDateTime)>>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)?;
    let stored: Vec<StoredTask> = serde_json::from_str(&contents)?;
    let tasks = stored
        .into_iter()
        .map(|s| -> Result<(String, NaiveDateTime)> { Ok((s.text, parse_due(&s.due)?)) })
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(tasks))
}
