//! Project CRUD, soft-delete archival, and progress recomputation.

use super::timeline::insert_timeline_event;
use super::{Database, completion_percentage, now_ms};
use crate::error::StoreError;
use crate::types::{
    NewProject, NewTimelineEvent, Priority, Project, ProjectPatch, ProjectStatus, TimelineKind,
};
use crate::watch::MutationKind;
use anyhow::Result;
use rusqlite::{Connection, Row, params};
use tracing::{debug, error};
use uuid::Uuid;

pub(crate) fn parse_project_row(row: &Row) -> rusqlite::Result<Project> {
    let status_str: String = row.get("status")?;
    let status = ProjectStatus::from_str(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown project status: {status_str}").into(),
        )
    })?;
    let priority_str: String = row.get("priority")?;

    Ok(Project {
        id: row.get("id")?,
        tenant_id: row.get("tenant_id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        status,
        priority: Priority::from_str(&priority_str).unwrap_or_default(),
        owner_id: row.get("owner_id")?,
        manager_id: row.get("manager_id")?,
        budget_allocated: row.get("budget_allocated")?,
        budget_spent: row.get("budget_spent")?,
        tasks_total: row.get("tasks_total")?,
        tasks_completed: row.get("tasks_completed")?,
        milestones_total: row.get("milestones_total")?,
        milestones_completed: row.get("milestones_completed")?,
        completion_percentage: row.get("completion_percentage")?,
        actual_hours: row.get("actual_hours")?,
        archived_at: row.get("archived_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Internal helper to get a project using an existing connection.
pub(crate) fn get_project_internal(conn: &Connection, project_id: &str) -> Result<Option<Project>> {
    let mut stmt = conn.prepare("SELECT * FROM projects WHERE id = ?1")?;

    let result = stmt.query_row(params![project_id], parse_project_row);

    match result {
        Ok(project) => Ok(Some(project)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl Database {
    /// Create a new project. Requires a tenant id and an owner id; logs a
    /// "Project created" timeline event with the owner as actor in the same
    /// transaction.
    pub fn create_project(&self, input: NewProject) -> Result<Project> {
        if input.tenant_id.trim().is_empty() {
            return Err(StoreError::missing_field("tenant_id").into());
        }
        if input.owner_id.trim().is_empty() {
            return Err(StoreError::missing_field("owner_id").into());
        }

        let project_id = Uuid::now_v7().to_string();
        let now = now_ms();
        let status = input.status.unwrap_or(ProjectStatus::Draft);
        let priority = input.priority.unwrap_or_default();
        let budget_allocated = input.budget_allocated.unwrap_or(0.0);

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO projects (
                    id, tenant_id, name, description, status, priority,
                    owner_id, manager_id, budget_allocated, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    &project_id,
                    &input.tenant_id,
                    &input.name,
                    &input.description,
                    status.as_str(),
                    priority.as_str(),
                    &input.owner_id,
                    &input.manager_id,
                    budget_allocated,
                    now,
                    now,
                ],
            )?;

            insert_timeline_event(
                &tx,
                &NewTimelineEvent {
                    tenant_id: input.tenant_id.clone(),
                    project_id: project_id.clone(),
                    kind: TimelineKind::Note,
                    title: "Project created".to_string(),
                    description: Some(input.name.clone()),
                    actor_id: Some(input.owner_id.clone()),
                },
                now,
            )?;

            tx.commit()?;
            Ok(())
        })
        .inspect_err(|e| error!("create_project failed: {e:#}"))?;

        debug!(project_id = %project_id, tenant_id = %input.tenant_id, "project created");
        self.watchers().publish(
            self,
            &[
                MutationKind::ProjectChanged {
                    tenant_id: input.tenant_id.clone(),
                    project_id: project_id.clone(),
                },
                MutationKind::TimelineAppended {
                    project_id: project_id.clone(),
                },
            ],
        );

        Ok(Project {
            id: project_id,
            tenant_id: input.tenant_id,
            name: input.name,
            description: input.description,
            status,
            priority,
            owner_id: input.owner_id,
            manager_id: input.manager_id,
            budget_allocated,
            budget_spent: 0.0,
            tasks_total: 0,
            tasks_completed: 0,
            milestones_total: 0,
            milestones_completed: 0,
            completion_percentage: 0,
            actual_hours: 0.0,
            archived_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Get a project by ID. Missing rows are `Ok(None)`, not errors.
    pub fn get_project(&self, project_id: &str) -> Result<Option<Project>> {
        self.with_conn(|conn| get_project_internal(conn, project_id))
    }

    /// List all projects of a tenant, newest-created-first.
    pub fn list_projects(&self, tenant_id: &str) -> Result<Vec<Project>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM projects WHERE tenant_id = ?1
                 ORDER BY created_at DESC, rowid DESC",
            )?;

            let projects = stmt
                .query_map(params![tenant_id], parse_project_row)?
                .filter_map(|r| r.ok())
                .collect();

            Ok(projects)
        })
    }

    /// Update a project. Merges the given fields and restamps `updated_at`.
    /// Cross-field invariants are not validated here; overspent budgets pass
    /// through.
    pub fn update_project(&self, project_id: &str, patch: ProjectPatch) -> Result<Project> {
        let now = now_ms();

        let project = self
            .with_conn(|conn| {
                let project = get_project_internal(conn, project_id)?
                    .ok_or_else(|| StoreError::project_not_found(project_id))?;

                let new_name = patch.name.unwrap_or(project.name.clone());
                let new_description = patch.description.unwrap_or(project.description.clone());
                let new_status = patch.status.unwrap_or(project.status);
                let new_priority = patch.priority.unwrap_or(project.priority);
                let new_manager_id = patch.manager_id.unwrap_or(project.manager_id.clone());
                let new_budget_allocated =
                    patch.budget_allocated.unwrap_or(project.budget_allocated);
                let new_budget_spent = patch.budget_spent.unwrap_or(project.budget_spent);

                conn.execute(
                    "UPDATE projects SET
                        name = ?1, description = ?2, status = ?3, priority = ?4,
                        manager_id = ?5, budget_allocated = ?6, budget_spent = ?7,
                        updated_at = ?8
                    WHERE id = ?9",
                    params![
                        new_name,
                        new_description,
                        new_status.as_str(),
                        new_priority.as_str(),
                        new_manager_id,
                        new_budget_allocated,
                        new_budget_spent,
                        now,
                        project_id,
                    ],
                )?;

                Ok(Project {
                    name: new_name,
                    description: new_description,
                    status: new_status,
                    priority: new_priority,
                    manager_id: new_manager_id,
                    budget_allocated: new_budget_allocated,
                    budget_spent: new_budget_spent,
                    updated_at: now,
                    ..project
                })
            })
            .inspect_err(|e| error!("update_project failed: {e:#}"))?;

        self.watchers().publish(
            self,
            &[MutationKind::ProjectChanged {
                tenant_id: project.tenant_id.clone(),
                project_id: project_id.to_string(),
            }],
        );

        Ok(project)
    }

    /// Soft-delete a project: status moves to `archived` and `archived_at`
    /// is stamped. Child entities are left in place and stay queryable
    /// under the archived project.
    pub fn archive_project(&self, project_id: &str) -> Result<Project> {
        let now = now_ms();

        let project = self
            .with_conn(|conn| {
                let project = get_project_internal(conn, project_id)?
                    .ok_or_else(|| StoreError::project_not_found(project_id))?;

                conn.execute(
                    "UPDATE projects SET status = ?1, archived_at = ?2, updated_at = ?3
                     WHERE id = ?4",
                    params![ProjectStatus::Archived.as_str(), now, now, project_id],
                )?;

                Ok(Project {
                    status: ProjectStatus::Archived,
                    archived_at: Some(now),
                    updated_at: now,
                    ..project
                })
            })
            .inspect_err(|e| error!("archive_project failed: {e:#}"))?;

        debug!(project_id = %project_id, "project archived");
        self.watchers().publish(
            self,
            &[MutationKind::ProjectChanged {
                tenant_id: project.tenant_id.clone(),
                project_id: project_id.to_string(),
            }],
        );

        Ok(project)
    }

    /// Authoritatively recompute the project's completion from its tasks:
    /// `completion_percentage = round(100 * done / total)` (0 with no
    /// tasks) and `tasks_completed`. Task writes do not trigger this;
    /// callers invoke it after status changes they care about.
    pub fn update_project_progress(&self, project_id: &str) -> Result<Project> {
        let now = now_ms();

        let project = self
            .with_conn_mut(|conn| {
                let tx = conn.transaction()?;

                let project = get_project_internal(&tx, project_id)?
                    .ok_or_else(|| StoreError::project_not_found(project_id))?;

                let (total, done): (i64, i64) = tx.query_row(
                    "SELECT COUNT(*),
                            COALESCE(SUM(CASE WHEN status = 'done' THEN 1 ELSE 0 END), 0)
                     FROM tasks WHERE project_id = ?1",
                    params![project_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;

                let percentage = completion_percentage(done, total);

                tx.execute(
                    "UPDATE projects SET
                        completion_percentage = ?1, tasks_completed = ?2, updated_at = ?3
                     WHERE id = ?4",
                    params![percentage, done, now, project_id],
                )?;

                tx.commit()?;

                Ok(Project {
                    completion_percentage: percentage,
                    tasks_completed: done,
                    updated_at: now,
                    ..project
                })
            })
            .inspect_err(|e| error!("update_project_progress failed: {e:#}"))?;

        self.watchers().publish(
            self,
            &[MutationKind::ProjectChanged {
                tenant_id: project.tenant_id.clone(),
                project_id: project_id.to_string(),
            }],
        );

        Ok(project)
    }
}
