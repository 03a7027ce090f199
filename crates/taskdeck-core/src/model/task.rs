use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::workspace::{UserId, WorkspaceId};
use super::{ParseEnumError, normalize, timestamp};
use crate::error::SyncError;

pub type TaskId = i64;

/// The four lifecycle columns. BACKLOG never shows on the board.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Done,
    Backlog,
}

impl TaskStatus {
    /// Columns a task can be dropped on, in board order.
    pub const BOARD_COLUMNS: [Self; 3] = [Self::Todo, Self::InProgress, Self::Done];

    const fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "TODO",
            Self::InProgress => "IN_PROGRESS",
            Self::Done => "DONE",
            Self::Backlog => "BACKLOG",
        }
    }

    /// Column heading used by board renderers.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Todo => "To Do",
            Self::InProgress => "In Progress",
            Self::Done => "Done",
            Self::Backlog => "Backlog",
        }
    }

    #[must_use]
    pub const fn is_board_column(self) -> bool {
        !matches!(self, Self::Backlog)
    }
}

/// P0 is the most urgent.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum TaskPriority {
    P0,
    P1,
    #[default]
    P2,
    P3,
}

impl TaskPriority {
    const fn as_str(self) -> &'static str {
        match self {
            Self::P0 => "P0",
            Self::P1 => "P1",
            Self::P2 => "P2",
            Self::P3 => "P3",
        }
    }
}

/// A task as returned by the service. The server owns every field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: TaskPriority,
    pub workspace_id: WorkspaceId,
    #[serde(default)]
    pub assignee_id: Option<UserId>,
    #[serde(default, with = "timestamp::option")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Copy of this task with `status` replaced; timestamps untouched.
    #[must_use]
    pub fn with_status(&self, status: TaskStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
}

/// Inbox row: a task plus the name of the workspace it lives in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskWithWorkspace {
    #[serde(flatten)]
    pub task: Task,
    pub workspace_name: String,
}

/// Body of `POST /workspaces/{id}/tasks`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "timestamp::option"
    )]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<UserId>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Reject drafts the service would refuse, before any network call.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Validation`] when the title is blank.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.title.trim().is_empty() {
            return Err(SyncError::invalid("task title must not be empty"));
        }
        Ok(())
    }
}

/// Body of `PATCH /tasks/{id}`: only fields that are `Some` are sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "timestamp::option"
    )]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<UserId>,
}

impl TaskPatch {
    #[must_use]
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// # Errors
    ///
    /// Returns [`SyncError::Validation`] for an empty patch or a blank title.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.is_empty() {
            return Err(SyncError::invalid("nothing to update"));
        }
        if self.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(SyncError::invalid("task title must not be empty"));
        }
        Ok(())
    }

    /// Local preview of what the server will do with this patch.
    #[must_use]
    pub fn apply_to(&self, task: &Task) -> Task {
        let mut next = task.clone();
        if let Some(title) = &self.title {
            next.title.clone_from(title);
        }
        if let Some(description) = &self.description {
            next.description = Some(description.clone());
        }
        if let Some(status) = self.status {
            next.status = status;
        }
        if let Some(priority) = self.priority {
            next.priority = priority;
        }
        if let Some(due) = self.due_date {
            next.due_date = Some(due);
        }
        if let Some(assignee) = self.assignee_id {
            next.assignee_id = Some(assignee);
        }
        next
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "TODO" | "TO_DO" => Ok(Self::Todo),
            "IN_PROGRESS" | "INPROGRESS" | "DOING" => Ok(Self::InProgress),
            "DONE" => Ok(Self::Done),
            "BACKLOG" => Ok(Self::Backlog),
            _ => Err(ParseEnumError {
                expected: "status",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for TaskPriority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "P0" => Ok(Self::P0),
            "P1" => Ok(Self::P1),
            "P2" => Ok(Self::P2),
            "P3" => Ok(Self::P3),
            _ => Err(ParseEnumError {
                expected: "priority",
                got: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Task, TaskDraft, TaskPatch, TaskPriority, TaskStatus, TaskWithWorkspace};
    use std::str::FromStr;

    const SERVER_TASK: &str = r#"{
        "id": 12,
        "title": "Ship it",
        "description": null,
        "status": "IN_PROGRESS",
        "priority": "P1",
        "due_date": null,
        "assignee_id": 3,
        "workspace_id": 7,
        "created_at": "2025-03-01T09:30:00.123456",
        "updated_at": "2025-03-02T10:00:00"
    }"#;

    #[test]
    fn decodes_service_task() {
        let task: Task = serde_json::from_str(SERVER_TASK).unwrap();
        assert_eq!(task.id, 12);
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.priority, TaskPriority::P1);
        assert_eq!(task.workspace_id, 7);
        assert_eq!(task.assignee_id, Some(3));
        assert!(task.updated_at > task.created_at);
    }

    #[test]
    fn decodes_inbox_row_with_flattened_task() {
        let mut value: serde_json::Value = serde_json::from_str(SERVER_TASK).unwrap();
        value["workspace_name"] = "Launch".into();
        let row: TaskWithWorkspace = serde_json::from_value(value).unwrap();
        assert_eq!(row.workspace_name, "Launch");
        assert_eq!(row.task.id, 12);
    }

    #[test]
    fn status_parsing_is_forgiving() {
        assert_eq!(TaskStatus::from_str("todo").unwrap(), TaskStatus::Todo);
        assert_eq!(
            TaskStatus::from_str("in-progress").unwrap(),
            TaskStatus::InProgress
        );
        assert_eq!(
            TaskStatus::from_str(" In Progress ").unwrap(),
            TaskStatus::InProgress
        );
        assert_eq!(TaskStatus::from_str("backlog").unwrap(), TaskStatus::Backlog);
        assert!(TaskStatus::from_str("blocked").is_err());
        assert!(TaskPriority::from_str("p4").is_err());
        assert_eq!(TaskPriority::from_str("p0").unwrap(), TaskPriority::P0);
    }

    #[test]
    fn display_matches_wire_form() {
        for status in [
            TaskStatus::Todo,
            TaskStatus::InProgress,
            TaskStatus::Done,
            TaskStatus::Backlog,
        ] {
            let wire = serde_json::to_string(&status).unwrap();
            assert_eq!(wire, format!("\"{status}\""));
        }
    }

    #[test]
    fn backlog_is_not_a_board_column() {
        assert!(!TaskStatus::Backlog.is_board_column());
        assert!(TaskStatus::BOARD_COLUMNS.iter().all(|s| s.is_board_column()));
    }

    #[test]
    fn draft_omits_unset_fields() {
        let draft = TaskDraft::new("Write docs");
        let json = serde_json::to_value(&draft).unwrap();
        assert_eq!(json, serde_json::json!({ "title": "Write docs" }));
        assert!(draft.validate().is_ok());
        assert!(TaskDraft::new("   ").validate().is_err());
    }

    #[test]
    fn patch_only_serializes_set_fields() {
        let patch = TaskPatch::status(TaskStatus::Done);
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "DONE" }));
        assert!(TaskPatch::default().validate().is_err());
    }

    #[test]
    fn patch_preview_keeps_untouched_fields() {
        let task: Task = serde_json::from_str(SERVER_TASK).unwrap();
        let patch = TaskPatch {
            title: Some("Ship it today".into()),
            ..TaskPatch::default()
        };
        let next = patch.apply_to(&task);
        assert_eq!(next.title, "Ship it today");
        assert_eq!(next.status, task.status);
        assert_eq!(next.assignee_id, task.assignee_id);
    }

    #[test]
    fn new_tasks_default_to_todo_and_p2() {
        assert_eq!(TaskStatus::default(), TaskStatus::Todo);
        assert_eq!(TaskPriority::default(), TaskPriority::P2);
    }
}
