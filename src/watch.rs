//! Live query watchers.
//!
//! Tracks which read models (single project, tenant project list, task
//! board, sprint/milestone lists, timeline, story lists) are being watched.
//! When a write commits, it reports the categories of data it changed and
//! the registry re-runs each affected watcher's query, invoking its callback
//! with fresh data.
//!
//! Watchers are owned by a [`WatchGuard`]: dropping the guard unregisters
//! the watcher, so a consumer cannot forget to unsubscribe. Callbacks run on
//! the mutating thread after its transaction has committed; a single watcher
//! therefore observes a monotonically consistent sequence of snapshots. No
//! ordering is guaranteed between distinct watchers.

use crate::db::Database;
use crate::types::{
    Milestone, Project, Sprint, Story, StoryFilter, TaskBoard, TimelineEvent,
};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::warn;

/// Categories of mutations that affect watched read models.
/// Each write path reports the kinds of data it changed after commit, and
/// the registry maps those to affected watchers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationKind {
    /// A project row was created, updated, archived, or had its counters
    /// moved.
    ProjectChanged {
        tenant_id: String,
        project_id: String,
    },
    /// A task under the project was created, updated, or deleted (including
    /// comment-counter changes on a task).
    TaskChanged { project_id: String },
    /// A sprint under the project changed.
    SprintChanged { project_id: String },
    /// A milestone under the project changed.
    MilestoneChanged { project_id: String },
    /// A story under the project changed.
    StoryChanged { project_id: String },
    /// A timeline event was appended to the project's log.
    TimelineAppended { project_id: String },
}

/// What a single watcher is looking at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interest {
    /// One project document.
    Project(String),
    /// All projects of a tenant.
    ProjectList(String),
    /// The task board of a project.
    Board(String),
    /// The sprint list of a project.
    Sprints(String),
    /// The milestone list of a project.
    Milestones(String),
    /// The timeline of a project.
    Timeline(String),
    /// Stories of a project (the watcher's own filter narrows further).
    Stories(String),
}

impl MutationKind {
    /// Whether this mutation can change the data behind the given interest.
    pub fn affects(&self, interest: &Interest) -> bool {
        match self {
            MutationKind::ProjectChanged {
                tenant_id,
                project_id,
            } => match interest {
                Interest::Project(id) => id == project_id,
                Interest::ProjectList(tenant) => tenant == tenant_id,
                _ => false,
            },
            MutationKind::TaskChanged { project_id } => {
                matches!(interest, Interest::Board(p) if p == project_id)
            }
            MutationKind::SprintChanged { project_id } => {
                matches!(interest, Interest::Sprints(p) if p == project_id)
            }
            MutationKind::MilestoneChanged { project_id } => {
                matches!(interest, Interest::Milestones(p) if p == project_id)
            }
            MutationKind::StoryChanged { project_id } => {
                matches!(interest, Interest::Stories(p) if p == project_id)
            }
            MutationKind::TimelineAppended { project_id } => {
                matches!(interest, Interest::Timeline(p) if p == project_id)
            }
        }
    }
}

type NotifyFn = Arc<dyn Fn(&Database) -> Result<()> + Send + Sync>;

struct Watcher {
    interest: Interest,
    notify: NotifyFn,
}

/// Registry of live watchers, shared by all clones of a [`Database`].
pub struct WatchRegistry {
    watchers: Mutex<HashMap<u64, Watcher>>,
    next_id: AtomicU64,
}

impl WatchRegistry {
    pub(crate) fn new() -> Self {
        Self {
            watchers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn register(&self, interest: Interest, notify: NotifyFn) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut map = self.watchers.lock().unwrap();
        map.insert(id, Watcher { interest, notify });
        id
    }

    fn remove(&self, id: u64) {
        let mut map = self.watchers.lock().unwrap();
        map.remove(&id);
    }

    /// Number of registered watchers.
    pub fn len(&self) -> usize {
        self.watchers.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver fresh snapshots to every watcher affected by the given
    /// mutations. The watcher map lock is released before any query runs, so
    /// callbacks may register or drop watchers freely.
    pub(crate) fn publish(&self, db: &Database, mutations: &[MutationKind]) {
        let affected: Vec<NotifyFn> = {
            let map = self.watchers.lock().unwrap();
            if map.is_empty() {
                return;
            }
            map.values()
                .filter(|w| mutations.iter().any(|m| m.affects(&w.interest)))
                .map(|w| Arc::clone(&w.notify))
                .collect()
        };

        for notify in affected {
            if let Err(e) = notify(db) {
                warn!("Watcher refresh failed: {}", e);
            }
        }
    }
}

/// RAII handle for a registered watcher. Dropping it unregisters the
/// watcher; no callbacks are delivered afterwards.
pub struct WatchGuard {
    registry: Weak<WatchRegistry>,
    id: u64,
}

impl WatchGuard {
    fn new(registry: &Arc<WatchRegistry>, id: u64) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            id,
        }
    }

    /// Explicitly unregister the watcher (equivalent to dropping the guard).
    pub fn cancel(self) {}
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

impl Database {
    fn watch_with(
        &self,
        interest: Interest,
        notify: NotifyFn,
    ) -> Result<WatchGuard> {
        let id = self.watchers().register(interest, Arc::clone(&notify));
        let guard = WatchGuard::new(self.watchers(), id);
        // Initial snapshot: the watcher fires once with current state before
        // this call returns. A failing first read surfaces to the caller.
        notify(self)?;
        Ok(guard)
    }

    /// Watch a single project document. Fires immediately with current
    /// state, then after every write touching the project row.
    pub fn watch_project<F>(&self, project_id: &str, callback: F) -> Result<WatchGuard>
    where
        F: Fn(Option<Project>) + Send + Sync + 'static,
    {
        let id = project_id.to_string();
        self.watch_with(
            Interest::Project(id.clone()),
            Arc::new(move |db| {
                callback(db.get_project(&id)?);
                Ok(())
            }),
        )
    }

    /// Watch the full project list of a tenant, newest-created-first.
    pub fn watch_projects<F>(&self, tenant_id: &str, callback: F) -> Result<WatchGuard>
    where
        F: Fn(Vec<Project>) + Send + Sync + 'static,
    {
        let tenant = tenant_id.to_string();
        self.watch_with(
            Interest::ProjectList(tenant.clone()),
            Arc::new(move |db| {
                callback(db.list_projects(&tenant)?);
                Ok(())
            }),
        )
    }

    /// Watch a project's task board (six fixed status buckets).
    pub fn watch_board<F>(&self, project_id: &str, callback: F) -> Result<WatchGuard>
    where
        F: Fn(TaskBoard) + Send + Sync + 'static,
    {
        let id = project_id.to_string();
        self.watch_with(
            Interest::Board(id.clone()),
            Arc::new(move |db| {
                callback(db.task_board(&id)?);
                Ok(())
            }),
        )
    }

    /// Watch a project's sprint list.
    pub fn watch_sprints<F>(&self, project_id: &str, callback: F) -> Result<WatchGuard>
    where
        F: Fn(Vec<Sprint>) + Send + Sync + 'static,
    {
        let id = project_id.to_string();
        self.watch_with(
            Interest::Sprints(id.clone()),
            Arc::new(move |db| {
                callback(db.list_sprints(&id)?);
                Ok(())
            }),
        )
    }

    /// Watch a project's milestone list.
    pub fn watch_milestones<F>(&self, project_id: &str, callback: F) -> Result<WatchGuard>
    where
        F: Fn(Vec<Milestone>) + Send + Sync + 'static,
    {
        let id = project_id.to_string();
        self.watch_with(
            Interest::Milestones(id.clone()),
            Arc::new(move |db| {
                callback(db.list_milestones(&id)?);
                Ok(())
            }),
        )
    }

    /// Watch a project's timeline, newest-first, capped at `limit` (default
    /// page size when `None`).
    pub fn watch_timeline<F>(
        &self,
        project_id: &str,
        limit: Option<usize>,
        callback: F,
    ) -> Result<WatchGuard>
    where
        F: Fn(Vec<TimelineEvent>) + Send + Sync + 'static,
    {
        let id = project_id.to_string();
        self.watch_with(
            Interest::Timeline(id.clone()),
            Arc::new(move |db| {
                callback(db.get_timeline(&id, limit)?);
                Ok(())
            }),
        )
    }

    /// Watch a filtered story list of a project. Any story change in the
    /// project re-runs the query; the filter narrows what the callback sees.
    pub fn watch_stories<F>(
        &self,
        project_id: &str,
        filter: StoryFilter,
        callback: F,
    ) -> Result<WatchGuard>
    where
        F: Fn(Vec<Story>) + Send + Sync + 'static,
    {
        let id = project_id.to_string();
        self.watch_with(
            Interest::Stories(id.clone()),
            Arc::new(move |db| {
                callback(db.list_stories(&id, &filter)?);
                Ok(())
            }),
        )
    }
}
