//! Task comment CRUD and the task comment counter.
//!
//! The counter moves via in-place SQL arithmetic, never read-modify-write,
//! so concurrent comment creates cannot lose increments to each other.

use super::{Database, now_ms};
use crate::error::StoreError;
use crate::types::{Comment, NewComment};
use crate::watch::MutationKind;
use anyhow::Result;
use rusqlite::{Connection, Row, params};
use tracing::{debug, error};
use uuid::Uuid;

pub(crate) fn parse_comment_row(row: &Row) -> rusqlite::Result<Comment> {
    let edited: i64 = row.get("edited")?;

    Ok(Comment {
        id: row.get("id")?,
        tenant_id: row.get("tenant_id")?,
        task_id: row.get("task_id")?,
        author_id: row.get("author_id")?,
        content: row.get("content")?,
        edited: edited != 0,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn get_comment_internal(conn: &Connection, comment_id: &str) -> Result<Option<Comment>> {
    let mut stmt = conn.prepare("SELECT * FROM task_comments WHERE id = ?1")?;

    let result = stmt.query_row(params![comment_id], parse_comment_row);

    match result {
        Ok(comment) => Ok(Some(comment)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn task_project_id(conn: &Connection, task_id: &str) -> Result<Option<String>> {
    let result = conn.query_row(
        "SELECT project_id FROM tasks WHERE id = ?1",
        params![task_id],
        |row| row.get(0),
    );

    match result {
        Ok(project_id) => Ok(Some(project_id)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl Database {
    /// Create a comment. In one transaction: insert the row and bump the
    /// parent task's `comments_count` by 1 via atomic increment.
    pub fn create_comment(&self, input: NewComment) -> Result<Comment> {
        if input.task_id.trim().is_empty() {
            return Err(StoreError::missing_field("task_id").into());
        }
        if input.author_id.trim().is_empty() {
            return Err(StoreError::missing_field("author_id").into());
        }
        if input.content.trim().is_empty() {
            return Err(StoreError::missing_field("content").into());
        }

        let comment_id = Uuid::now_v7().to_string();
        let now = now_ms();

        let project_id = self
            .with_conn_mut(|conn| {
                let tx = conn.transaction()?;

                let project_id = task_project_id(&tx, &input.task_id)?
                    .ok_or_else(|| StoreError::task_not_found(&input.task_id))?;

                tx.execute(
                    "INSERT INTO task_comments (
                        id, tenant_id, task_id, author_id, content, edited,
                        created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7)",
                    params![
                        &comment_id,
                        &input.tenant_id,
                        &input.task_id,
                        &input.author_id,
                        &input.content,
                        now,
                        now,
                    ],
                )?;

                tx.execute(
                    "UPDATE tasks SET comments_count = comments_count + 1 WHERE id = ?1",
                    params![&input.task_id],
                )?;

                tx.commit()?;
                Ok(project_id)
            })
            .inspect_err(|e| error!("create_comment failed: {e:#}"))?;

        debug!(comment_id = %comment_id, task_id = %input.task_id, "comment created");
        self.watchers()
            .publish(self, &[MutationKind::TaskChanged { project_id }]);

        Ok(Comment {
            id: comment_id,
            tenant_id: input.tenant_id,
            task_id: input.task_id,
            author_id: input.author_id,
            content: input.content,
            edited: false,
            created_at: now,
            updated_at: now,
        })
    }

    /// Get a comment by ID.
    pub fn get_comment(&self, comment_id: &str) -> Result<Option<Comment>> {
        self.with_conn(|conn| get_comment_internal(conn, comment_id))
    }

    /// List a task's comments, oldest-first.
    pub fn list_comments(&self, task_id: &str) -> Result<Vec<Comment>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM task_comments WHERE task_id = ?1
                 ORDER BY created_at, rowid",
            )?;

            let comments = stmt
                .query_map(params![task_id], parse_comment_row)?
                .filter_map(|r| r.ok())
                .collect();

            Ok(comments)
        })
    }

    /// Replace a comment's content, marking it edited and restamping
    /// `updated_at`.
    pub fn update_comment(&self, comment_id: &str, content: &str) -> Result<Comment> {
        if content.trim().is_empty() {
            return Err(StoreError::missing_field("content").into());
        }

        let now = now_ms();

        self.with_conn(|conn| {
            let comment = get_comment_internal(conn, comment_id)?
                .ok_or_else(|| StoreError::comment_not_found(comment_id))?;

            conn.execute(
                "UPDATE task_comments SET content = ?1, edited = 1, updated_at = ?2
                 WHERE id = ?3",
                params![content, now, comment_id],
            )?;

            Ok(Comment {
                content: content.to_string(),
                edited: true,
                updated_at: now,
                ..comment
            })
        })
        .inspect_err(|e| error!("update_comment failed: {e:#}"))
    }

    /// Hard-delete a comment and decrement the parent task's
    /// `comments_count`, in one transaction. The delete is scoped by both
    /// id and task id; a missing or mismatched row is a no-op and leaves
    /// the counter untouched.
    pub fn delete_comment(&self, comment_id: &str, task_id: &str) -> Result<()> {
        let deleted = self
            .with_conn_mut(|conn| {
                let tx = conn.transaction()?;

                let Some(comment) = get_comment_internal(&tx, comment_id)? else {
                    return Ok(None);
                };
                if comment.task_id != task_id {
                    return Ok(None);
                }

                tx.execute(
                    "DELETE FROM task_comments WHERE id = ?1 AND task_id = ?2",
                    params![comment_id, task_id],
                )?;
                tx.execute(
                    "UPDATE tasks SET comments_count = comments_count - 1 WHERE id = ?1",
                    params![task_id],
                )?;

                let project_id = task_project_id(&tx, task_id)?;
                tx.commit()?;
                Ok(project_id)
            })
            .inspect_err(|e| error!("delete_comment failed: {e:#}"))?;

        if let Some(project_id) = deleted {
            debug!(comment_id = %comment_id, task_id = %task_id, "comment deleted");
            self.watchers()
                .publish(self, &[MutationKind::TaskChanged { project_id }]);
        }

        Ok(())
    }
}
