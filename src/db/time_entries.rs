//! Time entry CRUD and the project actual-hours accumulator.

use super::{Database, now_ms};
use crate::error::StoreError;
use crate::types::{NewTimeEntry, TimeEntry};
use crate::watch::MutationKind;
use anyhow::Result;
use rusqlite::{Connection, Row, params};
use tracing::{debug, error};
use uuid::Uuid;

pub(crate) fn parse_time_entry_row(row: &Row) -> rusqlite::Result<TimeEntry> {
    Ok(TimeEntry {
        id: row.get("id")?,
        tenant_id: row.get("tenant_id")?,
        project_id: row.get("project_id")?,
        task_id: row.get("task_id")?,
        user_id: row.get("user_id")?,
        description: row.get("description")?,
        started_at: row.get("started_at")?,
        ended_at: row.get("ended_at")?,
        duration_minutes: row.get("duration_minutes")?,
        created_at: row.get("created_at")?,
    })
}

fn get_time_entry_internal(conn: &Connection, entry_id: &str) -> Result<Option<TimeEntry>> {
    let mut stmt = conn.prepare("SELECT * FROM time_entries WHERE id = ?1")?;

    let result = stmt.query_row(params![entry_id], parse_time_entry_row);

    match result {
        Ok(entry) => Ok(Some(entry)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl Database {
    /// Create a time entry. In one transaction: insert the row and add
    /// `duration_minutes / 60` hours to the parent project's
    /// `actual_hours`.
    pub fn create_time_entry(&self, input: NewTimeEntry) -> Result<TimeEntry> {
        if input.tenant_id.trim().is_empty() {
            return Err(StoreError::missing_field("tenant_id").into());
        }
        if input.project_id.trim().is_empty() {
            return Err(StoreError::missing_field("project_id").into());
        }
        if input.duration_minutes < 0 {
            return Err(
                StoreError::invalid_value("duration_minutes", "duration must not be negative")
                    .into(),
            );
        }

        let entry_id = Uuid::now_v7().to_string();
        let now = now_ms();
        let hours = input.duration_minutes as f64 / 60.0;

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let bumped = tx.execute(
                "UPDATE projects SET actual_hours = actual_hours + ?1, updated_at = ?2
                 WHERE id = ?3",
                params![hours, now, &input.project_id],
            )?;
            if bumped == 0 {
                return Err(StoreError::project_not_found(&input.project_id).into());
            }

            tx.execute(
                "INSERT INTO time_entries (
                    id, tenant_id, project_id, task_id, user_id, description,
                    started_at, ended_at, duration_minutes, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    &entry_id,
                    &input.tenant_id,
                    &input.project_id,
                    &input.task_id,
                    &input.user_id,
                    &input.description,
                    &input.started_at,
                    &input.ended_at,
                    input.duration_minutes,
                    now,
                ],
            )?;

            tx.commit()?;
            Ok(())
        })
        .inspect_err(|e| error!("create_time_entry failed: {e:#}"))?;

        debug!(entry_id = %entry_id, project_id = %input.project_id, "time entry created");
        self.watchers().publish(
            self,
            &[MutationKind::ProjectChanged {
                tenant_id: input.tenant_id.clone(),
                project_id: input.project_id.clone(),
            }],
        );

        Ok(TimeEntry {
            id: entry_id,
            tenant_id: input.tenant_id,
            project_id: input.project_id,
            task_id: input.task_id,
            user_id: input.user_id,
            description: input.description,
            started_at: input.started_at,
            ended_at: input.ended_at,
            duration_minutes: input.duration_minutes,
            created_at: now,
        })
    }

    /// Get a time entry by ID.
    pub fn get_time_entry(&self, entry_id: &str) -> Result<Option<TimeEntry>> {
        self.with_conn(|conn| get_time_entry_internal(conn, entry_id))
    }

    /// List a project's time entries, newest-created-first.
    pub fn list_time_entries(&self, project_id: &str) -> Result<Vec<TimeEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM time_entries WHERE project_id = ?1
                 ORDER BY created_at DESC, rowid DESC",
            )?;

            let entries = stmt
                .query_map(params![project_id], parse_time_entry_row)?
                .filter_map(|r| r.ok())
                .collect();

            Ok(entries)
        })
    }

    /// Hard-delete a time entry, subtracting its hours contribution from
    /// the parent project in the same transaction. Deleting a missing id
    /// is a no-op.
    pub fn delete_time_entry(&self, entry_id: &str) -> Result<()> {
        let now = now_ms();

        let deleted = self
            .with_conn_mut(|conn| {
                let tx = conn.transaction()?;

                let entry = match get_time_entry_internal(&tx, entry_id)? {
                    Some(entry) => entry,
                    None => return Ok(None),
                };

                tx.execute("DELETE FROM time_entries WHERE id = ?1", params![entry_id])?;

                let hours = entry.duration_minutes as f64 / 60.0;
                tx.execute(
                    "UPDATE projects SET actual_hours = actual_hours - ?1, updated_at = ?2
                     WHERE id = ?3",
                    params![hours, now, &entry.project_id],
                )?;

                tx.commit()?;
                Ok(Some(entry))
            })
            .inspect_err(|e| error!("delete_time_entry failed: {e:#}"))?;

        if let Some(entry) = deleted {
            debug!(entry_id = %entry_id, "time entry deleted");
            self.watchers().publish(
                self,
                &[MutationKind::ProjectChanged {
                    tenant_id: entry.tenant_id,
                    project_id: entry.project_id,
                }],
            );
        }

        Ok(())
    }
}
