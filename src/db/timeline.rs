//! Append-only project timeline log.
//!
//! Rows are inserted and read, never updated or deleted; the layer exposes
//! no mutation surface for them.

use super::{Database, now_ms};
use crate::types::{NewTimelineEvent, TimelineEvent, TimelineKind};
use crate::watch::MutationKind;
use anyhow::Result;
use rusqlite::{Connection, Row, params};
use tracing::error;
use uuid::Uuid;

pub(crate) fn parse_timeline_row(row: &Row) -> rusqlite::Result<TimelineEvent> {
    let kind_str: String = row.get("kind")?;
    let kind = TimelineKind::from_str(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown timeline kind: {kind_str}").into(),
        )
    })?;

    Ok(TimelineEvent {
        id: row.get("id")?,
        tenant_id: row.get("tenant_id")?,
        project_id: row.get("project_id")?,
        kind,
        title: row.get("title")?,
        description: row.get("description")?,
        actor_id: row.get("actor_id")?,
        created_at: row.get("created_at")?,
    })
}

/// Insert a timeline event using an existing connection, so entity writes
/// can log inside their own transaction. Returns the new event id.
pub(crate) fn insert_timeline_event(
    conn: &Connection,
    event: &NewTimelineEvent,
    now: i64,
) -> Result<String> {
    let event_id = Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO timeline_events (
            id, tenant_id, project_id, kind, title, description, actor_id, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            &event_id,
            &event.tenant_id,
            &event.project_id,
            event.kind.as_str(),
            &event.title,
            &event.description,
            &event.actor_id,
            now,
        ],
    )?;
    Ok(event_id)
}

impl Database {
    /// Append an event to a project's timeline and return its id.
    pub fn log_event(&self, event: NewTimelineEvent) -> Result<String> {
        let now = now_ms();

        let event_id = self
            .with_conn(|conn| insert_timeline_event(conn, &event, now))
            .inspect_err(|e| error!("log_event failed: {e:#}"))?;

        self.watchers().publish(
            self,
            &[MutationKind::TimelineAppended {
                project_id: event.project_id.clone(),
            }],
        );

        Ok(event_id)
    }

    /// Read a project's timeline, newest-first, capped at `limit` (the
    /// configured page size when `None`).
    pub fn get_timeline(
        &self,
        project_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<TimelineEvent>> {
        let limit = limit.unwrap_or(self.timeline_page_size());

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM timeline_events WHERE project_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2",
            )?;

            let events = stmt
                .query_map(params![project_id, limit as i64], parse_timeline_row)?
                .filter_map(|r| r.ok())
                .collect();

            Ok(events)
        })
    }
}
