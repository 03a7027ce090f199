//! Task, workspace and user value types as they travel over the wire.

pub mod task;
pub mod timestamp;
pub mod workspace;

pub use task::{Task, TaskDraft, TaskId, TaskPatch, TaskPriority, TaskStatus, TaskWithWorkspace};
pub use workspace::{
    AccessToken, User, UserId, Workspace, WorkspaceId, WorkspaceMember, WorkspaceRole,
    WorkspaceType,
};

use std::fmt;

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseEnumError {}

/// Normalize user input for enum parsing: `in-progress`, `In Progress` and
/// `IN_PROGRESS` all compare equal.
pub(crate) fn normalize(input: &str) -> String {
    input
        .trim()
        .chars()
        .map(|c| match c {
            '-' | ' ' => '_',
            other => other.to_ascii_uppercase(),
        })
        .collect()
}
