//! Core entity types for the opsgraph data layer.
//!
//! Statuses and priorities are closed enums rather than open strings, so an
//! invalid value is unrepresentable in the API. Rows whose stored status no
//! longer parses are skipped by grouping reads instead of failing them.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a project. `Archived` is the soft-delete state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Draft,
    Planning,
    InProgress,
    OnHold,
    Completed,
    Cancelled,
    Archived,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Draft => "draft",
            ProjectStatus::Planning => "planning",
            ProjectStatus::InProgress => "in_progress",
            ProjectStatus::OnHold => "on_hold",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Cancelled => "cancelled",
            ProjectStatus::Archived => "archived",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(ProjectStatus::Draft),
            "planning" => Some(ProjectStatus::Planning),
            "in_progress" => Some(ProjectStatus::InProgress),
            "on_hold" => Some(ProjectStatus::OnHold),
            "completed" => Some(ProjectStatus::Completed),
            "cancelled" => Some(ProjectStatus::Cancelled),
            "archived" => Some(ProjectStatus::Archived),
            _ => None,
        }
    }
}

/// Kanban status of a task. The board groups tasks into these six buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Backlog,
    Todo,
    InProgress,
    InReview,
    Done,
    Blocked,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Backlog => "backlog",
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::InReview => "in_review",
            TaskStatus::Done => "done",
            TaskStatus::Blocked => "blocked",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "backlog" => Some(TaskStatus::Backlog),
            "todo" => Some(TaskStatus::Todo),
            "in_progress" => Some(TaskStatus::InProgress),
            "in_review" => Some(TaskStatus::InReview),
            "done" => Some(TaskStatus::Done),
            "blocked" => Some(TaskStatus::Blocked),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SprintStatus {
    Planned,
    Active,
    Completed,
}

impl SprintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SprintStatus::Planned => "planned",
            SprintStatus::Active => "active",
            SprintStatus::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "planned" => Some(SprintStatus::Planned),
            "active" => Some(SprintStatus::Active),
            "completed" => Some(SprintStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneStatus {
    Upcoming,
    InProgress,
    Completed,
    Delayed,
}

impl MilestoneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MilestoneStatus::Upcoming => "upcoming",
            MilestoneStatus::InProgress => "in_progress",
            MilestoneStatus::Completed => "completed",
            MilestoneStatus::Delayed => "delayed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "upcoming" => Some(MilestoneStatus::Upcoming),
            "in_progress" => Some(MilestoneStatus::InProgress),
            "completed" => Some(MilestoneStatus::Completed),
            "delayed" => Some(MilestoneStatus::Delayed),
            _ => None,
        }
    }
}

/// Status of a story. `update_progress` derives this from the progress
/// value; manually set values survive only until the next progress update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryStatus {
    Draft,
    Ready,
    InProgress,
    Review,
    Done,
    Accepted,
}

impl StoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoryStatus::Draft => "draft",
            StoryStatus::Ready => "ready",
            StoryStatus::InProgress => "in_progress",
            StoryStatus::Review => "review",
            StoryStatus::Done => "done",
            StoryStatus::Accepted => "accepted",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(StoryStatus::Draft),
            "ready" => Some(StoryStatus::Ready),
            "in_progress" => Some(StoryStatus::InProgress),
            "review" => Some(StoryStatus::Review),
            "done" => Some(StoryStatus::Done),
            "accepted" => Some(StoryStatus::Accepted),
            _ => None,
        }
    }
}

/// Priority shared by every entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            "critical" => Some(Priority::Critical),
            _ => None,
        }
    }

    /// Sort weight for priority-descending queries (higher = first).
    pub fn weight(&self) -> i32 {
        match self {
            Priority::Critical => 3,
            Priority::High => 2,
            Priority::Medium => 1,
            Priority::Low => 0,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

/// Kind of a timeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineKind {
    Note,
    Task,
    Sprint,
    Milestone,
    Document,
    Team,
}

impl TimelineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimelineKind::Note => "note",
            TimelineKind::Task => "task",
            TimelineKind::Sprint => "sprint",
            TimelineKind::Milestone => "milestone",
            TimelineKind::Document => "document",
            TimelineKind::Team => "team",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "note" => Some(TimelineKind::Note),
            "task" => Some(TimelineKind::Task),
            "sprint" => Some(TimelineKind::Sprint),
            "milestone" => Some(TimelineKind::Milestone),
            "document" => Some(TimelineKind::Document),
            "team" => Some(TimelineKind::Team),
            _ => None,
        }
    }
}

/// A project. Counters (`tasks_total`, `milestones_total`, `actual_hours`)
/// are maintained transactionally by the child entities' write paths;
/// `completion_percentage` and `tasks_completed` are authoritatively
/// recomputed only by `update_project_progress`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub priority: Priority,
    pub owner_id: String,
    pub manager_id: Option<String>,
    pub budget_allocated: f64,
    pub budget_spent: f64,
    pub tasks_total: i64,
    pub tasks_completed: i64,
    pub milestones_total: i64,
    pub milestones_completed: i64,
    pub completion_percentage: i64,
    pub actual_hours: f64,
    pub archived_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Input for creating a project. Identity and timestamps are assigned by
/// the layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProject {
    pub tenant_id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: Option<ProjectStatus>,
    pub priority: Option<Priority>,
    pub owner_id: String,
    pub manager_id: Option<String>,
    pub budget_allocated: Option<f64>,
}

/// Partial update for a project. `None` leaves a field untouched;
/// `Some(None)` on a clearable field clears it.
#[derive(Debug, Clone, Default)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<ProjectStatus>,
    pub priority: Option<Priority>,
    pub manager_id: Option<Option<String>>,
    pub budget_allocated: Option<f64>,
    pub budget_spent: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub tenant_id: String,
    pub project_id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub assignee_id: Option<String>,
    pub reporter_id: String,
    pub comments_count: i64,
    pub attachments_count: i64,
    pub due_date: Option<i64>,
    pub completed_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub tenant_id: String,
    pub project_id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub assignee_id: Option<String>,
    pub reporter_id: String,
    pub due_date: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub assignee_id: Option<Option<String>>,
    pub due_date: Option<Option<i64>>,
    pub completed_at: Option<Option<i64>>,
}

/// Tasks of one project grouped into the six fixed board columns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskBoard {
    pub backlog: Vec<Task>,
    pub todo: Vec<Task>,
    pub in_progress: Vec<Task>,
    pub in_review: Vec<Task>,
    pub done: Vec<Task>,
    pub blocked: Vec<Task>,
}

impl TaskBoard {
    /// Push a task into its status bucket.
    pub fn push(&mut self, task: Task) {
        match task.status {
            TaskStatus::Backlog => self.backlog.push(task),
            TaskStatus::Todo => self.todo.push(task),
            TaskStatus::InProgress => self.in_progress.push(task),
            TaskStatus::InReview => self.in_review.push(task),
            TaskStatus::Done => self.done.push(task),
            TaskStatus::Blocked => self.blocked.push(task),
        }
    }

    pub fn len(&self) -> usize {
        self.backlog.len()
            + self.todo.len()
            + self.in_progress.len()
            + self.in_review.len()
            + self.done.len()
            + self.blocked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sprint {
    pub id: String,
    pub tenant_id: String,
    pub project_id: String,
    pub name: String,
    pub goal: Option<String>,
    pub start_date: Option<i64>,
    pub end_date: Option<i64>,
    pub capacity_points: i64,
    pub total_story_points: i64,
    pub completed_story_points: i64,
    pub status: SprintStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSprint {
    pub tenant_id: String,
    pub project_id: String,
    pub name: String,
    pub goal: Option<String>,
    pub start_date: Option<i64>,
    pub end_date: Option<i64>,
    pub capacity_points: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct SprintPatch {
    pub name: Option<String>,
    pub goal: Option<Option<String>>,
    pub start_date: Option<Option<i64>>,
    pub end_date: Option<Option<i64>>,
    pub capacity_points: Option<i64>,
    pub total_story_points: Option<i64>,
    pub completed_story_points: Option<i64>,
    pub status: Option<SprintStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    pub id: String,
    pub tenant_id: String,
    pub project_id: String,
    pub name: String,
    pub description: Option<String>,
    pub due_date: Option<i64>,
    pub status: MilestoneStatus,
    pub tasks_total: i64,
    pub tasks_completed: i64,
    pub completion_percentage: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMilestone {
    pub tenant_id: String,
    pub project_id: String,
    pub name: String,
    pub description: Option<String>,
    pub due_date: Option<i64>,
    pub status: Option<MilestoneStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct MilestonePatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub due_date: Option<Option<i64>>,
    pub status: Option<MilestoneStatus>,
    pub tasks_total: Option<i64>,
    pub tasks_completed: Option<i64>,
    pub completion_percentage: Option<i64>,
}

/// A logged block of time against a project (optionally against one task).
/// Creating one adds `duration_minutes / 60` hours to the project's actual
/// hours; deleting one subtracts the same amount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeEntry {
    pub id: String,
    pub tenant_id: String,
    pub project_id: String,
    pub task_id: Option<String>,
    pub user_id: Option<String>,
    pub description: Option<String>,
    pub started_at: Option<i64>,
    pub ended_at: Option<i64>,
    pub duration_minutes: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTimeEntry {
    pub tenant_id: String,
    pub project_id: String,
    pub task_id: Option<String>,
    pub user_id: Option<String>,
    pub description: Option<String>,
    pub started_at: Option<i64>,
    pub ended_at: Option<i64>,
    pub duration_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub tenant_id: String,
    pub task_id: String,
    pub author_id: String,
    pub content: String,
    pub edited: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewComment {
    pub tenant_id: String,
    pub task_id: String,
    pub author_id: String,
    pub content: String,
}

/// An immutable audit-log entry recording a notable action on a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub id: String,
    pub tenant_id: String,
    pub project_id: String,
    pub kind: TimelineKind,
    pub title: String,
    pub description: Option<String>,
    pub actor_id: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTimelineEvent {
    pub tenant_id: String,
    pub project_id: String,
    pub kind: TimelineKind,
    pub title: String,
    pub description: Option<String>,
    pub actor_id: Option<String>,
}

/// A user story nested under a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Story {
    pub id: String,
    pub tenant_id: String,
    pub project_id: String,
    pub epic_id: Option<String>,
    pub sprint_id: Option<String>,
    pub title: String,
    pub as_a: Option<String>,
    pub i_want: Option<String>,
    pub so_that: Option<String>,
    pub status: StoryStatus,
    pub priority: Priority,
    pub story_points: Option<i64>,
    pub assignee_id: Option<String>,
    pub acceptance_criteria: Vec<String>,
    pub tags: Vec<String>,
    pub progress: i64,
    pub tasks_total: i64,
    pub tasks_completed: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStory {
    pub tenant_id: String,
    pub project_id: String,
    pub epic_id: Option<String>,
    pub sprint_id: Option<String>,
    pub title: String,
    pub as_a: Option<String>,
    pub i_want: Option<String>,
    pub so_that: Option<String>,
    pub status: Option<StoryStatus>,
    pub priority: Option<Priority>,
    pub story_points: Option<i64>,
    pub assignee_id: Option<String>,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub progress: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct StoryPatch {
    pub title: Option<String>,
    pub as_a: Option<Option<String>>,
    pub i_want: Option<Option<String>>,
    pub so_that: Option<Option<String>>,
    pub status: Option<StoryStatus>,
    pub priority: Option<Priority>,
    pub story_points: Option<Option<i64>>,
    pub assignee_id: Option<Option<String>>,
    pub acceptance_criteria: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
}

/// Field to order story listings by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoryOrder {
    CreatedDesc,
    PriorityDesc,
    UpdatedDesc,
}

/// Filter for story listings. Each set field appends one AND clause.
#[derive(Debug, Clone, Default)]
pub struct StoryFilter {
    pub epic_id: Option<String>,
    pub sprint_id: Option<String>,
    pub status: Option<StoryStatus>,
    pub priority: Option<Priority>,
    pub assignee_id: Option<String>,
    pub order: Option<StoryOrder>,
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for s in [
            TaskStatus::Backlog,
            TaskStatus::Todo,
            TaskStatus::InProgress,
            TaskStatus::InReview,
            TaskStatus::Done,
            TaskStatus::Blocked,
        ] {
            assert_eq!(TaskStatus::from_str(s.as_str()), Some(s));
        }
        assert_eq!(TaskStatus::from_str("shipped"), None);
    }

    #[test]
    fn priority_weight_orders_descending() {
        assert!(Priority::Critical.weight() > Priority::High.weight());
        assert!(Priority::High.weight() > Priority::Medium.weight());
        assert!(Priority::Medium.weight() > Priority::Low.weight());
    }

    #[test]
    fn board_push_routes_by_status() {
        let mut board = TaskBoard::default();
        let mut task = Task {
            id: "t1".into(),
            tenant_id: "acme".into(),
            project_id: "p1".into(),
            title: "x".into(),
            description: None,
            status: TaskStatus::Todo,
            priority: Priority::Medium,
            assignee_id: None,
            reporter_id: "u1".into(),
            comments_count: 0,
            attachments_count: 0,
            due_date: None,
            completed_at: None,
            created_at: 0,
            updated_at: 0,
        };
        board.push(task.clone());
        task.status = TaskStatus::Blocked;
        board.push(task);
        assert_eq!(board.todo.len(), 1);
        assert_eq!(board.blocked.len(), 1);
        assert_eq!(board.len(), 2);
    }
}
