//! Task CRUD, board grouping, and parent-project counter maintenance.

use super::timeline::insert_timeline_event;
use super::{Database, now_ms};
use crate::error::StoreError;
use crate::types::{
    NewTask, NewTimelineEvent, Priority, Task, TaskBoard, TaskPatch, TaskStatus, TimelineKind,
};
use crate::watch::MutationKind;
use anyhow::Result;
use rusqlite::{Connection, Row, params};
use tracing::{debug, error};
use uuid::Uuid;

pub(crate) fn parse_task_row(row: &Row) -> rusqlite::Result<Task> {
    let status_str: String = row.get("status")?;
    let status = TaskStatus::from_str(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown task status: {status_str}").into(),
        )
    })?;
    let priority_str: String = row.get("priority")?;

    Ok(Task {
        id: row.get("id")?,
        tenant_id: row.get("tenant_id")?,
        project_id: row.get("project_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        status,
        priority: Priority::from_str(&priority_str).unwrap_or_default(),
        assignee_id: row.get("assignee_id")?,
        reporter_id: row.get("reporter_id")?,
        comments_count: row.get("comments_count")?,
        attachments_count: row.get("attachments_count")?,
        due_date: row.get("due_date")?,
        completed_at: row.get("completed_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Internal helper to get a task using an existing connection.
pub(crate) fn get_task_internal(conn: &Connection, task_id: &str) -> Result<Option<Task>> {
    let mut stmt = conn.prepare("SELECT * FROM tasks WHERE id = ?1")?;

    let result = stmt.query_row(params![task_id], parse_task_row);

    match result {
        Ok(task) => Ok(Some(task)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl Database {
    /// Create a new task. In one transaction: insert the row, bump the
    /// parent project's `tasks_total` via in-place arithmetic, and log a
    /// timeline event of kind `task`.
    pub fn create_task(&self, input: NewTask) -> Result<Task> {
        if input.tenant_id.trim().is_empty() {
            return Err(StoreError::missing_field("tenant_id").into());
        }
        if input.project_id.trim().is_empty() {
            return Err(StoreError::missing_field("project_id").into());
        }
        if input.reporter_id.trim().is_empty() {
            return Err(StoreError::missing_field("reporter_id").into());
        }

        let task_id = Uuid::now_v7().to_string();
        let now = now_ms();
        let status = input.status.unwrap_or(TaskStatus::Backlog);
        let priority = input.priority.unwrap_or_default();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            // The counter lives on the project row; a missing parent means
            // the increment has nowhere to land.
            let bumped = tx.execute(
                "UPDATE projects SET tasks_total = tasks_total + 1, updated_at = ?1
                 WHERE id = ?2",
                params![now, &input.project_id],
            )?;
            if bumped == 0 {
                return Err(StoreError::project_not_found(&input.project_id).into());
            }

            tx.execute(
                "INSERT INTO tasks (
                    id, tenant_id, project_id, title, description, status, priority,
                    assignee_id, reporter_id, comments_count, attachments_count,
                    due_date, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, 0, ?10, ?11, ?12)",
                params![
                    &task_id,
                    &input.tenant_id,
                    &input.project_id,
                    &input.title,
                    &input.description,
                    status.as_str(),
                    priority.as_str(),
                    &input.assignee_id,
                    &input.reporter_id,
                    &input.due_date,
                    now,
                    now,
                ],
            )?;

            insert_timeline_event(
                &tx,
                &NewTimelineEvent {
                    tenant_id: input.tenant_id.clone(),
                    project_id: input.project_id.clone(),
                    kind: TimelineKind::Task,
                    title: input.title.clone(),
                    description: Some("Task created".to_string()),
                    actor_id: Some(input.reporter_id.clone()),
                },
                now,
            )?;

            tx.commit()?;
            Ok(())
        })
        .inspect_err(|e| error!("create_task failed: {e:#}"))?;

        debug!(task_id = %task_id, project_id = %input.project_id, "task created");
        self.watchers().publish(
            self,
            &[
                MutationKind::TaskChanged {
                    project_id: input.project_id.clone(),
                },
                MutationKind::ProjectChanged {
                    tenant_id: input.tenant_id.clone(),
                    project_id: input.project_id.clone(),
                },
                MutationKind::TimelineAppended {
                    project_id: input.project_id.clone(),
                },
            ],
        );

        Ok(Task {
            id: task_id,
            tenant_id: input.tenant_id,
            project_id: input.project_id,
            title: input.title,
            description: input.description,
            status,
            priority,
            assignee_id: input.assignee_id,
            reporter_id: input.reporter_id,
            comments_count: 0,
            attachments_count: 0,
            due_date: input.due_date,
            completed_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Get a task by ID.
    pub fn get_task(&self, task_id: &str) -> Result<Option<Task>> {
        self.with_conn(|conn| get_task_internal(conn, task_id))
    }

    /// List all tasks of a project, newest-created-first.
    pub fn list_tasks(&self, project_id: &str) -> Result<Vec<Task>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM tasks WHERE project_id = ?1
                 ORDER BY created_at DESC, rowid DESC",
            )?;

            let tasks = stmt
                .query_map(params![project_id], parse_task_row)?
                .filter_map(|r| r.ok())
                .collect();

            Ok(tasks)
        })
    }

    /// Update a task. Merges fields and restamps `updated_at`. Moving
    /// status to `done` without an explicit completion timestamp stamps
    /// `completed_at` in the same write, so a done task always carries one.
    pub fn update_task(&self, task_id: &str, patch: TaskPatch) -> Result<Task> {
        let now = now_ms();

        let task = self
            .with_conn(|conn| {
                let task = get_task_internal(conn, task_id)?
                    .ok_or_else(|| StoreError::task_not_found(task_id))?;

                let new_title = patch.title.unwrap_or(task.title.clone());
                let new_description = patch.description.unwrap_or(task.description.clone());
                let new_status = patch.status.unwrap_or(task.status);
                let new_priority = patch.priority.unwrap_or(task.priority);
                let new_assignee_id = patch.assignee_id.unwrap_or(task.assignee_id.clone());
                let new_due_date = patch.due_date.unwrap_or(task.due_date);

                let mut new_completed_at = patch.completed_at.unwrap_or(task.completed_at);
                if new_status == TaskStatus::Done && new_completed_at.is_none() {
                    new_completed_at = Some(now);
                }

                conn.execute(
                    "UPDATE tasks SET
                        title = ?1, description = ?2, status = ?3, priority = ?4,
                        assignee_id = ?5, due_date = ?6, completed_at = ?7, updated_at = ?8
                    WHERE id = ?9",
                    params![
                        new_title,
                        new_description,
                        new_status.as_str(),
                        new_priority.as_str(),
                        new_assignee_id,
                        new_due_date,
                        new_completed_at,
                        now,
                        task_id,
                    ],
                )?;

                Ok(Task {
                    title: new_title,
                    description: new_description,
                    status: new_status,
                    priority: new_priority,
                    assignee_id: new_assignee_id,
                    due_date: new_due_date,
                    completed_at: new_completed_at,
                    updated_at: now,
                    ..task
                })
            })
            .inspect_err(|e| error!("update_task failed: {e:#}"))?;

        self.watchers().publish(
            self,
            &[MutationKind::TaskChanged {
                project_id: task.project_id.clone(),
            }],
        );

        Ok(task)
    }

    /// Hard-delete a task and decrement the parent project's `tasks_total`,
    /// in one transaction. The delete is scoped by both id and project id,
    /// so a mismatched parent deletes nothing; deleting a missing id is a
    /// no-op and leaves the counter untouched.
    pub fn delete_task(&self, task_id: &str, project_id: &str) -> Result<()> {
        let now = now_ms();

        let deleted = self
            .with_conn_mut(|conn| {
                let tx = conn.transaction()?;

                let task = match get_task_internal(&tx, task_id)? {
                    Some(task) if task.project_id == project_id => task,
                    _ => return Ok(None),
                };

                tx.execute(
                    "DELETE FROM tasks WHERE id = ?1 AND project_id = ?2",
                    params![task_id, project_id],
                )?;
                tx.execute(
                    "UPDATE projects SET tasks_total = tasks_total - 1, updated_at = ?1
                     WHERE id = ?2",
                    params![now, project_id],
                )?;

                tx.commit()?;
                Ok(Some(task))
            })
            .inspect_err(|e| error!("delete_task failed: {e:#}"))?;

        if let Some(task) = deleted {
            debug!(task_id = %task_id, project_id = %project_id, "task deleted");
            self.watchers().publish(
                self,
                &[
                    MutationKind::TaskChanged {
                        project_id: project_id.to_string(),
                    },
                    MutationKind::ProjectChanged {
                        tenant_id: task.tenant_id.clone(),
                        project_id: project_id.to_string(),
                    },
                ],
            );
        }

        Ok(())
    }

    /// Group a project's tasks into the six fixed board columns, oldest
    /// first within each column. Rows whose stored status no longer parses
    /// are dropped rather than failing the read, so the board always
    /// renders.
    pub fn task_board(&self, project_id: &str) -> Result<TaskBoard> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM tasks WHERE project_id = ?1
                 ORDER BY created_at, rowid",
            )?;

            let mut board = TaskBoard::default();
            for task in stmt
                .query_map(params![project_id], parse_task_row)?
                .filter_map(|r| r.ok())
            {
                board.push(task);
            }

            Ok(board)
        })
    }
}
