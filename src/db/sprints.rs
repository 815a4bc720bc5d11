//! Sprint CRUD.

use super::timeline::insert_timeline_event;
use super::{Database, now_ms};
use crate::error::StoreError;
use crate::types::{NewSprint, NewTimelineEvent, Sprint, SprintPatch, SprintStatus, TimelineKind};
use crate::watch::MutationKind;
use anyhow::Result;
use rusqlite::{Connection, Row, params};
use tracing::{debug, error};
use uuid::Uuid;

pub(crate) fn parse_sprint_row(row: &Row) -> rusqlite::Result<Sprint> {
    let status_str: String = row.get("status")?;
    let status = SprintStatus::from_str(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown sprint status: {status_str}").into(),
        )
    })?;

    Ok(Sprint {
        id: row.get("id")?,
        tenant_id: row.get("tenant_id")?,
        project_id: row.get("project_id")?,
        name: row.get("name")?,
        goal: row.get("goal")?,
        start_date: row.get("start_date")?,
        end_date: row.get("end_date")?,
        capacity_points: row.get("capacity_points")?,
        total_story_points: row.get("total_story_points")?,
        completed_story_points: row.get("completed_story_points")?,
        status,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn get_sprint_internal(conn: &Connection, sprint_id: &str) -> Result<Option<Sprint>> {
    let mut stmt = conn.prepare("SELECT * FROM sprints WHERE id = ?1")?;

    let result = stmt.query_row(params![sprint_id], parse_sprint_row);

    match result {
        Ok(sprint) => Ok(Some(sprint)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl Database {
    /// Create a sprint and log a timeline event of kind `sprint` in the
    /// same transaction.
    pub fn create_sprint(&self, input: NewSprint) -> Result<Sprint> {
        if input.tenant_id.trim().is_empty() {
            return Err(StoreError::missing_field("tenant_id").into());
        }
        if input.project_id.trim().is_empty() {
            return Err(StoreError::missing_field("project_id").into());
        }

        let sprint_id = Uuid::now_v7().to_string();
        let now = now_ms();
        let capacity_points = input.capacity_points.unwrap_or(0);

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO sprints (
                    id, tenant_id, project_id, name, goal, start_date, end_date,
                    capacity_points, status, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    &sprint_id,
                    &input.tenant_id,
                    &input.project_id,
                    &input.name,
                    &input.goal,
                    &input.start_date,
                    &input.end_date,
                    capacity_points,
                    SprintStatus::Planned.as_str(),
                    now,
                    now,
                ],
            )?;

            insert_timeline_event(
                &tx,
                &NewTimelineEvent {
                    tenant_id: input.tenant_id.clone(),
                    project_id: input.project_id.clone(),
                    kind: TimelineKind::Sprint,
                    title: input.name.clone(),
                    description: Some("Sprint created".to_string()),
                    actor_id: None,
                },
                now,
            )?;

            tx.commit()?;
            Ok(())
        })
        .inspect_err(|e| error!("create_sprint failed: {e:#}"))?;

        debug!(sprint_id = %sprint_id, project_id = %input.project_id, "sprint created");
        self.watchers().publish(
            self,
            &[
                MutationKind::SprintChanged {
                    project_id: input.project_id.clone(),
                },
                MutationKind::TimelineAppended {
                    project_id: input.project_id.clone(),
                },
            ],
        );

        Ok(Sprint {
            id: sprint_id,
            tenant_id: input.tenant_id,
            project_id: input.project_id,
            name: input.name,
            goal: input.goal,
            start_date: input.start_date,
            end_date: input.end_date,
            capacity_points,
            total_story_points: 0,
            completed_story_points: 0,
            status: SprintStatus::Planned,
            created_at: now,
            updated_at: now,
        })
    }

    /// Get a sprint by ID.
    pub fn get_sprint(&self, sprint_id: &str) -> Result<Option<Sprint>> {
        self.with_conn(|conn| get_sprint_internal(conn, sprint_id))
    }

    /// List a project's sprints, ordered by start date.
    pub fn list_sprints(&self, project_id: &str) -> Result<Vec<Sprint>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM sprints WHERE project_id = ?1
                 ORDER BY start_date, created_at, rowid",
            )?;

            let sprints = stmt
                .query_map(params![project_id], parse_sprint_row)?
                .filter_map(|r| r.ok())
                .collect();

            Ok(sprints)
        })
    }

    /// Update a sprint. Merges fields and restamps `updated_at`.
    pub fn update_sprint(&self, sprint_id: &str, patch: SprintPatch) -> Result<Sprint> {
        let now = now_ms();

        let sprint = self
            .with_conn(|conn| {
                let sprint = get_sprint_internal(conn, sprint_id)?
                    .ok_or_else(|| StoreError::sprint_not_found(sprint_id))?;

                let new_name = patch.name.unwrap_or(sprint.name.clone());
                let new_goal = patch.goal.unwrap_or(sprint.goal.clone());
                let new_start_date = patch.start_date.unwrap_or(sprint.start_date);
                let new_end_date = patch.end_date.unwrap_or(sprint.end_date);
                let new_capacity = patch.capacity_points.unwrap_or(sprint.capacity_points);
                let new_total = patch.total_story_points.unwrap_or(sprint.total_story_points);
                let new_completed = patch
                    .completed_story_points
                    .unwrap_or(sprint.completed_story_points);
                let new_status = patch.status.unwrap_or(sprint.status);

                conn.execute(
                    "UPDATE sprints SET
                        name = ?1, goal = ?2, start_date = ?3, end_date = ?4,
                        capacity_points = ?5, total_story_points = ?6,
                        completed_story_points = ?7, status = ?8, updated_at = ?9
                    WHERE id = ?10",
                    params![
                        new_name,
                        new_goal,
                        new_start_date,
                        new_end_date,
                        new_capacity,
                        new_total,
                        new_completed,
                        new_status.as_str(),
                        now,
                        sprint_id,
                    ],
                )?;

                Ok(Sprint {
                    name: new_name,
                    goal: new_goal,
                    start_date: new_start_date,
                    end_date: new_end_date,
                    capacity_points: new_capacity,
                    total_story_points: new_total,
                    completed_story_points: new_completed,
                    status: new_status,
                    updated_at: now,
                    ..sprint
                })
            })
            .inspect_err(|e| error!("update_sprint failed: {e:#}"))?;

        self.watchers().publish(
            self,
            &[MutationKind::SprintChanged {
                project_id: sprint.project_id.clone(),
            }],
        );

        Ok(sprint)
    }

    /// Hard-delete a sprint. Deleting a missing id is a no-op.
    pub fn delete_sprint(&self, sprint_id: &str) -> Result<()> {
        let deleted = self
            .with_conn(|conn| {
                let sprint = get_sprint_internal(conn, sprint_id)?;
                if sprint.is_some() {
                    conn.execute("DELETE FROM sprints WHERE id = ?1", params![sprint_id])?;
                }
                Ok(sprint)
            })
            .inspect_err(|e| error!("delete_sprint failed: {e:#}"))?;

        if let Some(sprint) = deleted {
            debug!(sprint_id = %sprint_id, "sprint deleted");
            self.watchers().publish(
                self,
                &[MutationKind::SprintChanged {
                    project_id: sprint.project_id,
                }],
            );
        }

        Ok(())
    }
}
