//! Milestone CRUD and parent-project milestone counters.

use super::timeline::insert_timeline_event;
use super::{Database, now_ms};
use crate::error::StoreError;
use crate::types::{
    Milestone, MilestonePatch, MilestoneStatus, NewMilestone, NewTimelineEvent, TimelineKind,
};
use crate::watch::MutationKind;
use anyhow::Result;
use rusqlite::{Connection, Row, params};
use tracing::{debug, error};
use uuid::Uuid;

pub(crate) fn parse_milestone_row(row: &Row) -> rusqlite::Result<Milestone> {
    let status_str: String = row.get("status")?;
    let status = MilestoneStatus::from_str(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown milestone status: {status_str}").into(),
        )
    })?;

    Ok(Milestone {
        id: row.get("id")?,
        tenant_id: row.get("tenant_id")?,
        project_id: row.get("project_id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        due_date: row.get("due_date")?,
        status,
        tasks_total: row.get("tasks_total")?,
        tasks_completed: row.get("tasks_completed")?,
        completion_percentage: row.get("completion_percentage")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn get_milestone_internal(conn: &Connection, milestone_id: &str) -> Result<Option<Milestone>> {
    let mut stmt = conn.prepare("SELECT * FROM milestones WHERE id = ?1")?;

    let result = stmt.query_row(params![milestone_id], parse_milestone_row);

    match result {
        Ok(milestone) => Ok(Some(milestone)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl Database {
    /// Create a milestone. In one transaction: insert the row, bump the
    /// parent project's `milestones_total`, and log a timeline event of
    /// kind `milestone`.
    pub fn create_milestone(&self, input: NewMilestone) -> Result<Milestone> {
        if input.tenant_id.trim().is_empty() {
            return Err(StoreError::missing_field("tenant_id").into());
        }
        if input.project_id.trim().is_empty() {
            return Err(StoreError::missing_field("project_id").into());
        }

        let milestone_id = Uuid::now_v7().to_string();
        let now = now_ms();
        let status = input.status.unwrap_or(MilestoneStatus::Upcoming);

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let bumped = tx.execute(
                "UPDATE projects SET milestones_total = milestones_total + 1, updated_at = ?1
                 WHERE id = ?2",
                params![now, &input.project_id],
            )?;
            if bumped == 0 {
                return Err(StoreError::project_not_found(&input.project_id).into());
            }

            tx.execute(
                "INSERT INTO milestones (
                    id, tenant_id, project_id, name, description, due_date,
                    status, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    &milestone_id,
                    &input.tenant_id,
                    &input.project_id,
                    &input.name,
                    &input.description,
                    &input.due_date,
                    status.as_str(),
                    now,
                    now,
                ],
            )?;

            insert_timeline_event(
                &tx,
                &NewTimelineEvent {
                    tenant_id: input.tenant_id.clone(),
                    project_id: input.project_id.clone(),
                    kind: TimelineKind::Milestone,
                    title: input.name.clone(),
                    description: Some("Milestone created".to_string()),
                    actor_id: None,
                },
                now,
            )?;

            tx.commit()?;
            Ok(())
        })
        .inspect_err(|e| error!("create_milestone failed: {e:#}"))?;

        debug!(milestone_id = %milestone_id, project_id = %input.project_id, "milestone created");
        self.watchers().publish(
            self,
            &[
                MutationKind::MilestoneChanged {
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

        Ok(Milestone {
            id: milestone_id,
            tenant_id: input.tenant_id,
            project_id: input.project_id,
            name: input.name,
            description: input.description,
            due_date: input.due_date,
            status,
            tasks_total: 0,
            tasks_completed: 0,
            completion_percentage: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Get a milestone by ID.
    pub fn get_milestone(&self, milestone_id: &str) -> Result<Option<Milestone>> {
        self.with_conn(|conn| get_milestone_internal(conn, milestone_id))
    }

    /// List a project's milestones, ordered by due date.
    pub fn list_milestones(&self, project_id: &str) -> Result<Vec<Milestone>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM milestones WHERE project_id = ?1
                 ORDER BY due_date, created_at, rowid",
            )?;

            let milestones = stmt
                .query_map(params![project_id], parse_milestone_row)?
                .filter_map(|r| r.ok())
                .collect();

            Ok(milestones)
        })
    }

    /// Update a milestone. Merges fields and restamps `updated_at`. A
    /// status move into or out of `completed` adjusts the parent project's
    /// `milestones_completed` in the same transaction.
    pub fn update_milestone(&self, milestone_id: &str, patch: MilestonePatch) -> Result<Milestone> {
        let now = now_ms();

        let milestone = self
            .with_conn_mut(|conn| {
                let tx = conn.transaction()?;

                let milestone = get_milestone_internal(&tx, milestone_id)?
                    .ok_or_else(|| StoreError::milestone_not_found(milestone_id))?;

                let new_name = patch.name.unwrap_or(milestone.name.clone());
                let new_description = patch.description.unwrap_or(milestone.description.clone());
                let new_due_date = patch.due_date.unwrap_or(milestone.due_date);
                let new_status = patch.status.unwrap_or(milestone.status);
                let new_tasks_total = patch.tasks_total.unwrap_or(milestone.tasks_total);
                let new_tasks_completed =
                    patch.tasks_completed.unwrap_or(milestone.tasks_completed);
                let new_percentage = patch
                    .completion_percentage
                    .unwrap_or(milestone.completion_percentage);

                let was_completed = milestone.status == MilestoneStatus::Completed;
                let is_completed = new_status == MilestoneStatus::Completed;
                if was_completed != is_completed {
                    let delta = if is_completed { 1 } else { -1 };
                    tx.execute(
                        "UPDATE projects
                         SET milestones_completed = milestones_completed + ?1, updated_at = ?2
                         WHERE id = ?3",
                        params![delta, now, &milestone.project_id],
                    )?;
                }

                tx.execute(
                    "UPDATE milestones SET
                        name = ?1, description = ?2, due_date = ?3, status = ?4,
                        tasks_total = ?5, tasks_completed = ?6,
                        completion_percentage = ?7, updated_at = ?8
                    WHERE id = ?9",
                    params![
                        new_name,
                        new_description,
                        new_due_date,
                        new_status.as_str(),
                        new_tasks_total,
                        new_tasks_completed,
                        new_percentage,
                        now,
                        milestone_id,
                    ],
                )?;

                tx.commit()?;

                Ok(Milestone {
                    name: new_name,
                    description: new_description,
                    due_date: new_due_date,
                    status: new_status,
                    tasks_total: new_tasks_total,
                    tasks_completed: new_tasks_completed,
                    completion_percentage: new_percentage,
                    updated_at: now,
                    ..milestone
                })
            })
            .inspect_err(|e| error!("update_milestone failed: {e:#}"))?;

        self.watchers().publish(
            self,
            &[
                MutationKind::MilestoneChanged {
                    project_id: milestone.project_id.clone(),
                },
                MutationKind::ProjectChanged {
                    tenant_id: milestone.tenant_id.clone(),
                    project_id: milestone.project_id.clone(),
                },
            ],
        );

        Ok(milestone)
    }

    /// Hard-delete a milestone and decrement the parent project's
    /// `milestones_total` (and `milestones_completed` when the milestone
    /// was completed), in one transaction. Deleting a missing id is a
    /// no-op.
    pub fn delete_milestone(&self, milestone_id: &str) -> Result<()> {
        let now = now_ms();

        let deleted = self
            .with_conn_mut(|conn| {
                let tx = conn.transaction()?;

                let milestone = match get_milestone_internal(&tx, milestone_id)? {
                    Some(milestone) => milestone,
                    None => return Ok(None),
                };

                tx.execute(
                    "DELETE FROM milestones WHERE id = ?1",
                    params![milestone_id],
                )?;

                let completed_delta = if milestone.status == MilestoneStatus::Completed {
                    1
                } else {
                    0
                };
                tx.execute(
                    "UPDATE projects SET
                        milestones_total = milestones_total - 1,
                        milestones_completed = milestones_completed - ?1,
                        updated_at = ?2
                     WHERE id = ?3",
                    params![completed_delta, now, &milestone.project_id],
                )?;

                tx.commit()?;
                Ok(Some(milestone))
            })
            .inspect_err(|e| error!("delete_milestone failed: {e:#}"))?;

        if let Some(milestone) = deleted {
            debug!(milestone_id = %milestone_id, "milestone deleted");
            self.watchers().publish(
                self,
                &[
                    MutationKind::MilestoneChanged {
                        project_id: milestone.project_id.clone(),
                    },
                    MutationKind::ProjectChanged {
                        tenant_id: milestone.tenant_id,
                        project_id: milestone.project_id,
                    },
                ],
            );
        }

        Ok(())
    }
}
