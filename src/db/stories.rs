//! Story CRUD, filtered listings, and the progress/status rule.
//!
//! Stories are nested under a project: every query here is project-scoped.

use super::{Database, now_ms};
use crate::error::StoreError;
use crate::types::{NewStory, Priority, Story, StoryFilter, StoryOrder, StoryPatch, StoryStatus};
use crate::watch::MutationKind;
use anyhow::Result;
use rusqlite::{Connection, Row, params, params_from_iter};
use tracing::{debug, error};
use uuid::Uuid;

/// Status derived from a progress value. Once `update_progress` is used,
/// progress is the single source of truth for status: 0 is draft, 100 is
/// done, anything in between is in progress, whatever the story was set to
/// manually before.
pub fn status_for_progress(progress: i64) -> StoryStatus {
    match progress {
        0 => StoryStatus::Draft,
        100 => StoryStatus::Done,
        _ => StoryStatus::InProgress,
    }
}

fn validate_points(points: i64) -> Result<()> {
    if !(0..=100).contains(&points) {
        return Err(StoreError::out_of_range("story_points", 0, 100).into());
    }
    Ok(())
}

fn validate_progress(progress: i64) -> Result<()> {
    if !(0..=100).contains(&progress) {
        return Err(StoreError::out_of_range("progress", 0, 100).into());
    }
    Ok(())
}

/// Build the ORDER BY clause for a story listing.
fn story_order_clause(order: Option<StoryOrder>) -> &'static str {
    match order {
        Some(StoryOrder::PriorityDesc) => {
            " ORDER BY CASE priority
                 WHEN 'critical' THEN 3 WHEN 'high' THEN 2
                 WHEN 'medium' THEN 1 ELSE 0 END DESC,
               created_at DESC, rowid DESC"
        }
        Some(StoryOrder::UpdatedDesc) => " ORDER BY updated_at DESC, rowid DESC",
        _ => " ORDER BY created_at DESC, rowid DESC",
    }
}

/// Build a filtered story query. Each set filter field appends one AND
/// clause; filters are independent and combinable.
fn build_story_query(project_id: &str, filter: &StoryFilter) -> (String, Vec<String>) {
    let mut sql = String::from("SELECT * FROM stories WHERE project_id = ?1");
    let mut args: Vec<String> = vec![project_id.to_string()];

    if let Some(ref epic_id) = filter.epic_id {
        args.push(epic_id.clone());
        sql.push_str(&format!(" AND epic_id = ?{}", args.len()));
    }
    if let Some(ref sprint_id) = filter.sprint_id {
        args.push(sprint_id.clone());
        sql.push_str(&format!(" AND sprint_id = ?{}", args.len()));
    }
    if let Some(status) = filter.status {
        args.push(status.as_str().to_string());
        sql.push_str(&format!(" AND status = ?{}", args.len()));
    }
    if let Some(priority) = filter.priority {
        args.push(priority.as_str().to_string());
        sql.push_str(&format!(" AND priority = ?{}", args.len()));
    }
    if let Some(ref assignee_id) = filter.assignee_id {
        args.push(assignee_id.clone());
        sql.push_str(&format!(" AND assignee_id = ?{}", args.len()));
    }

    sql.push_str(story_order_clause(filter.order));

    if let Some(limit) = filter.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }

    (sql, args)
}

pub(crate) fn parse_story_row(row: &Row) -> rusqlite::Result<Story> {
    let status_str: String = row.get("status")?;
    let status = StoryStatus::from_str(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown story status: {status_str}").into(),
        )
    })?;
    let priority_str: String = row.get("priority")?;

    let criteria_json: String = row.get("acceptance_criteria")?;
    let tags_json: String = row.get("tags")?;

    Ok(Story {
        id: row.get("id")?,
        tenant_id: row.get("tenant_id")?,
        project_id: row.get("project_id")?,
        epic_id: row.get("epic_id")?,
        sprint_id: row.get("sprint_id")?,
        title: row.get("title")?,
        as_a: row.get("as_a")?,
        i_want: row.get("i_want")?,
        so_that: row.get("so_that")?,
        status,
        priority: Priority::from_str(&priority_str).unwrap_or_default(),
        story_points: row.get("story_points")?,
        assignee_id: row.get("assignee_id")?,
        acceptance_criteria: serde_json::from_str(&criteria_json).unwrap_or_default(),
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        progress: row.get("progress")?,
        tasks_total: row.get("tasks_total")?,
        tasks_completed: row.get("tasks_completed")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn get_story_internal(conn: &Connection, story_id: &str) -> Result<Option<Story>> {
    let mut stmt = conn.prepare("SELECT * FROM stories WHERE id = ?1")?;

    let result = stmt.query_row(params![story_id], parse_story_row);

    match result {
        Ok(story) => Ok(Some(story)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl Database {
    /// Create a story. Validation runs before any statement: non-empty
    /// title, story points and progress within 0..=100. Defaults: status
    /// draft, priority medium, progress 0, counters 0.
    pub fn create_story(&self, input: NewStory) -> Result<Story> {
        if input.tenant_id.trim().is_empty() {
            return Err(StoreError::missing_field("tenant_id").into());
        }
        if input.project_id.trim().is_empty() {
            return Err(StoreError::missing_field("project_id").into());
        }
        if input.title.trim().is_empty() {
            return Err(StoreError::invalid_value("title", "title must not be empty").into());
        }
        if let Some(points) = input.story_points {
            validate_points(points)?;
        }
        let progress = input.progress.unwrap_or(0);
        validate_progress(progress)?;

        let story_id = Uuid::now_v7().to_string();
        let now = now_ms();
        let status = input.status.unwrap_or(StoryStatus::Draft);
        let priority = input.priority.unwrap_or_default();
        let criteria_json = serde_json::to_string(&input.acceptance_criteria)?;
        let tags_json = serde_json::to_string(&input.tags)?;

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO stories (
                    id, tenant_id, project_id, epic_id, sprint_id, title,
                    as_a, i_want, so_that, status, priority, story_points,
                    assignee_id, acceptance_criteria, tags, progress,
                    created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                          ?13, ?14, ?15, ?16, ?17, ?18)",
                params![
                    &story_id,
                    &input.tenant_id,
                    &input.project_id,
                    &input.epic_id,
                    &input.sprint_id,
                    &input.title,
                    &input.as_a,
                    &input.i_want,
                    &input.so_that,
                    status.as_str(),
                    priority.as_str(),
                    &input.story_points,
                    &input.assignee_id,
                    &criteria_json,
                    &tags_json,
                    progress,
                    now,
                    now,
                ],
            )?;
            Ok(())
        })
        .inspect_err(|e| error!("create_story failed: {e:#}"))?;

        debug!(story_id = %story_id, project_id = %input.project_id, "story created");
        self.watchers().publish(
            self,
            &[MutationKind::StoryChanged {
                project_id: input.project_id.clone(),
            }],
        );

        Ok(Story {
            id: story_id,
            tenant_id: input.tenant_id,
            project_id: input.project_id,
            epic_id: input.epic_id,
            sprint_id: input.sprint_id,
            title: input.title,
            as_a: input.as_a,
            i_want: input.i_want,
            so_that: input.so_that,
            status,
            priority,
            story_points: input.story_points,
            assignee_id: input.assignee_id,
            acceptance_criteria: input.acceptance_criteria,
            tags: input.tags,
            progress,
            tasks_total: 0,
            tasks_completed: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Get a story by ID.
    pub fn get_story(&self, story_id: &str) -> Result<Option<Story>> {
        self.with_conn(|conn| get_story_internal(conn, story_id))
    }

    /// List a project's stories with the given filter. Each set filter
    /// field narrows the result (AND semantics); default order is
    /// newest-created-first.
    pub fn list_stories(&self, project_id: &str, filter: &StoryFilter) -> Result<Vec<Story>> {
        let (sql, args) = build_story_query(project_id, filter);

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;

            let stories = stmt
                .query_map(params_from_iter(args.iter()), parse_story_row)?
                .filter_map(|r| r.ok())
                .collect();

            Ok(stories)
        })
    }

    /// Update a story. Merges fields and restamps `updated_at`.
    pub fn update_story(&self, story_id: &str, patch: StoryPatch) -> Result<Story> {
        if let Some(ref title) = patch.title {
            if title.trim().is_empty() {
                return Err(StoreError::invalid_value("title", "title must not be empty").into());
            }
        }
        if let Some(Some(points)) = patch.story_points {
            validate_points(points)?;
        }

        let now = now_ms();

        let story = self
            .with_conn(|conn| {
                let story = get_story_internal(conn, story_id)?
                    .ok_or_else(|| StoreError::story_not_found(story_id))?;

                let new_title = patch.title.unwrap_or(story.title.clone());
                let new_as_a = patch.as_a.unwrap_or(story.as_a.clone());
                let new_i_want = patch.i_want.unwrap_or(story.i_want.clone());
                let new_so_that = patch.so_that.unwrap_or(story.so_that.clone());
                let new_status = patch.status.unwrap_or(story.status);
                let new_priority = patch.priority.unwrap_or(story.priority);
                let new_points = patch.story_points.unwrap_or(story.story_points);
                let new_assignee = patch.assignee_id.unwrap_or(story.assignee_id.clone());
                let new_criteria = patch
                    .acceptance_criteria
                    .unwrap_or(story.acceptance_criteria.clone());
                let new_tags = patch.tags.unwrap_or(story.tags.clone());

                conn.execute(
                    "UPDATE stories SET
                        title = ?1, as_a = ?2, i_want = ?3, so_that = ?4,
                        status = ?5, priority = ?6, story_points = ?7,
                        assignee_id = ?8, acceptance_criteria = ?9, tags = ?10,
                        updated_at = ?11
                    WHERE id = ?12",
                    params![
                        new_title,
                        new_as_a,
                        new_i_want,
                        new_so_that,
                        new_status.as_str(),
                        new_priority.as_str(),
                        new_points,
                        new_assignee,
                        serde_json::to_string(&new_criteria)?,
                        serde_json::to_string(&new_tags)?,
                        now,
                        story_id,
                    ],
                )?;

                Ok(Story {
                    title: new_title,
                    as_a: new_as_a,
                    i_want: new_i_want,
                    so_that: new_so_that,
                    status: new_status,
                    priority: new_priority,
                    story_points: new_points,
                    assignee_id: new_assignee,
                    acceptance_criteria: new_criteria,
                    tags: new_tags,
                    updated_at: now,
                    ..story
                })
            })
            .inspect_err(|e| error!("update_story failed: {e:#}"))?;

        self.watchers().publish(
            self,
            &[MutationKind::StoryChanged {
                project_id: story.project_id.clone(),
            }],
        );

        Ok(story)
    }

    /// Hard-delete a story. Deleting a missing id is a no-op.
    pub fn delete_story(&self, story_id: &str) -> Result<()> {
        let deleted = self
            .with_conn(|conn| {
                let story = get_story_internal(conn, story_id)?;
                if story.is_some() {
                    conn.execute("DELETE FROM stories WHERE id = ?1", params![story_id])?;
                }
                Ok(story)
            })
            .inspect_err(|e| error!("delete_story failed: {e:#}"))?;

        if let Some(story) = deleted {
            debug!(story_id = %story_id, "story deleted");
            self.watchers().publish(
                self,
                &[MutationKind::StoryChanged {
                    project_id: story.project_id,
                }],
            );
        }

        Ok(())
    }

    /// Set a story's progress, deriving status from it: 0 is draft, 100 is
    /// done, anything else is in progress. Overwrites manually set
    /// statuses; idempotent for a given progress value.
    pub fn update_progress(&self, story_id: &str, progress: i64) -> Result<Story> {
        validate_progress(progress)?;

        let now = now_ms();
        let status = status_for_progress(progress);

        let story = self
            .with_conn(|conn| {
                let story = get_story_internal(conn, story_id)?
                    .ok_or_else(|| StoreError::story_not_found(story_id))?;

                conn.execute(
                    "UPDATE stories SET progress = ?1, status = ?2, updated_at = ?3
                     WHERE id = ?4",
                    params![progress, status.as_str(), now, story_id],
                )?;

                Ok(Story {
                    progress,
                    status,
                    updated_at: now,
                    ..story
                })
            })
            .inspect_err(|e| error!("update_progress failed: {e:#}"))?;

        self.watchers().publish(
            self,
            &[MutationKind::StoryChanged {
                project_id: story.project_id.clone(),
            }],
        );

        Ok(story)
    }

    /// Stories with no sprint assignment, highest priority first.
    pub fn backlog(&self, project_id: &str) -> Result<Vec<Story>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM stories
                 WHERE project_id = ?1 AND sprint_id IS NULL
                 ORDER BY CASE priority
                     WHEN 'critical' THEN 3 WHEN 'high' THEN 2
                     WHEN 'medium' THEN 1 ELSE 0 END DESC,
                   created_at DESC, rowid DESC",
            )?;

            let stories = stmt
                .query_map(params![project_id], parse_story_row)?
                .filter_map(|r| r.ok())
                .collect();

            Ok(stories)
        })
    }

    /// Stories belonging to an epic, newest-created-first.
    pub fn stories_by_epic(&self, project_id: &str, epic_id: &str) -> Result<Vec<Story>> {
        self.list_stories(
            project_id,
            &StoryFilter {
                epic_id: Some(epic_id.to_string()),
                order: Some(StoryOrder::CreatedDesc),
                ..Default::default()
            },
        )
    }

    /// Stories assigned to a sprint, newest-created-first.
    pub fn stories_by_sprint(&self, project_id: &str, sprint_id: &str) -> Result<Vec<Story>> {
        self.list_stories(
            project_id,
            &StoryFilter {
                sprint_id: Some(sprint_id.to_string()),
                order: Some(StoryOrder::CreatedDesc),
                ..Default::default()
            },
        )
    }

    /// Stories in the `ready` state, highest priority first.
    pub fn ready_stories(&self, project_id: &str) -> Result<Vec<Story>> {
        self.list_stories(
            project_id,
            &StoryFilter {
                status: Some(StoryStatus::Ready),
                order: Some(StoryOrder::PriorityDesc),
                ..Default::default()
            },
        )
    }

    /// Assign a story to a sprint, or unassign with `None`.
    pub fn assign_to_sprint(&self, story_id: &str, sprint_id: Option<&str>) -> Result<Story> {
        self.assign_story_field(story_id, "sprint_id", sprint_id)
    }

    /// Assign a story to an epic, or unassign with `None`.
    pub fn assign_to_epic(&self, story_id: &str, epic_id: Option<&str>) -> Result<Story> {
        self.assign_story_field(story_id, "epic_id", epic_id)
    }

    fn assign_story_field(
        &self,
        story_id: &str,
        field: &'static str,
        value: Option<&str>,
    ) -> Result<Story> {
        let now = now_ms();

        let story = self
            .with_conn(|conn| {
                let story = get_story_internal(conn, story_id)?
                    .ok_or_else(|| StoreError::story_not_found(story_id))?;

                conn.execute(
                    &format!("UPDATE stories SET {field} = ?1, updated_at = ?2 WHERE id = ?3"),
                    params![value, now, story_id],
                )?;

                let value = value.map(str::to_string);
                Ok(match field {
                    "sprint_id" => Story {
                        sprint_id: value,
                        updated_at: now,
                        ..story
                    },
                    _ => Story {
                        epic_id: value,
                        updated_at: now,
                        ..story
                    },
                })
            })
            .inspect_err(|e| error!("assign_story_field failed: {e:#}"))?;

        self.watchers().publish(
            self,
            &[MutationKind::StoryChanged {
                project_id: story.project_id.clone(),
            }],
        );

        Ok(story)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_a_pure_function_of_progress() {
        assert_eq!(status_for_progress(0), StoryStatus::Draft);
        assert_eq!(status_for_progress(1), StoryStatus::InProgress);
        assert_eq!(status_for_progress(50), StoryStatus::InProgress);
        assert_eq!(status_for_progress(99), StoryStatus::InProgress);
        assert_eq!(status_for_progress(100), StoryStatus::Done);
    }

    #[test]
    fn filter_clauses_compose_with_and() {
        let filter = StoryFilter {
            epic_id: Some("e1".into()),
            status: Some(StoryStatus::Ready),
            limit: Some(10),
            ..Default::default()
        };
        let (sql, args) = build_story_query("p1", &filter);
        assert!(sql.contains("project_id = ?1"));
        assert!(sql.contains("epic_id = ?2"));
        assert!(sql.contains("status = ?3"));
        assert!(sql.contains("LIMIT 10"));
        assert_eq!(args, vec!["p1", "e1", "ready"]);
    }

    #[test]
    fn empty_filter_only_scopes_by_project() {
        let (sql, args) = build_story_query("p1", &StoryFilter::default());
        assert!(!sql.contains(" AND "));
        assert!(sql.contains("ORDER BY created_at DESC"));
        assert_eq!(args, vec!["p1"]);
    }
}
