//! Read-side projections of a cached task list: kanban columns and the
//! status/assignee filter used by list views.

use serde::Serialize;

use crate::model::{Task, TaskStatus, UserId};

/// One kanban column, tasks in list order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardColumn {
    pub status: TaskStatus,
    pub title: &'static str,
    pub tasks: Vec<Task>,
}

/// The three board columns. BACKLOG tasks are counted but not shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Board {
    pub columns: Vec<BoardColumn>,
    pub hidden_backlog: usize,
}

impl Board {
    #[must_use]
    pub fn project(tasks: &[Task]) -> Self {
        let columns = TaskStatus::BOARD_COLUMNS
            .iter()
            .map(|&status| BoardColumn {
                status,
                title: status.title(),
                tasks: tasks.iter().filter(|t| t.status == status).cloned().collect(),
            })
            .collect();
        let hidden_backlog = tasks
            .iter()
            .filter(|t| !t.status.is_board_column())
            .count();
        Self {
            columns,
            hidden_backlog,
        }
    }

    #[must_use]
    pub fn column(&self, status: TaskStatus) -> Option<&BoardColumn> {
        self.columns.iter().find(|c| c.status == status)
    }

    /// Number of cards on the board.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.iter().map(|c| c.tasks.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Same filters the list endpoint accepts, applied to a cached list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub assignee_id: Option<UserId>,
}

impl TaskFilter {
    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        self.status.is_none_or(|s| task.status == s)
            && self
                .assignee_id
                .is_none_or(|a| task.assignee_id == Some(a))
    }

    #[must_use]
    pub fn apply<'a>(&self, tasks: &'a [Task]) -> Vec<&'a Task> {
        tasks.iter().filter(|t| self.matches(t)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::task;

    fn sample() -> Vec<Task> {
        vec![
            task(1, 7, TaskStatus::Todo),
            task(2, 7, TaskStatus::Backlog),
            task(3, 7, TaskStatus::Done),
            task(4, 7, TaskStatus::Todo),
        ]
    }

    #[test]
    fn backlog_is_not_on_the_board() {
        let board = Board::project(&sample());
        let statuses: Vec<_> = board.columns.iter().map(|c| c.status).collect();
        assert_eq!(statuses, TaskStatus::BOARD_COLUMNS.to_vec());
        assert_eq!(board.len(), 3);
        assert_eq!(board.hidden_backlog, 1);

        let todo: Vec<_> = board
            .column(TaskStatus::Todo)
            .map(|c| c.tasks.iter().map(|t| t.id).collect())
            .unwrap_or_default();
        assert_eq!(todo, vec![1, 4]);
        assert!(board.column(TaskStatus::InProgress).is_some_and(|c| c.tasks.is_empty()));
    }

    #[test]
    fn filter_by_status_and_assignee() {
        let mut tasks = sample();
        tasks[3].assignee_id = Some(5);

        let todo = TaskFilter {
            status: Some(TaskStatus::Todo),
            ..TaskFilter::default()
        };
        assert_eq!(todo.apply(&tasks).len(), 2);

        let mine = TaskFilter {
            status: Some(TaskStatus::Todo),
            assignee_id: Some(5),
        };
        let ids: Vec<_> = mine.apply(&tasks).iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![4]);

        assert_eq!(TaskFilter::default().apply(&tasks).len(), 4);
    }
}
