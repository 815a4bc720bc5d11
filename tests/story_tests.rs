//! Integration tests for the story layer: validation, filtered listings,
//! and the progress/status rule.

use opsgraph::Database;
use opsgraph::types::{
    NewProject, NewStory, Priority, ProjectStatus, StoryFilter, StoryOrder, StoryPatch,
    StoryStatus,
};

fn setup() -> (Database, String) {
    let db = Database::open_in_memory().expect("Failed to create in-memory database");
    let project = db
        .create_project(NewProject {
            tenant_id: "acme".to_string(),
            name: "Mobile app".to_string(),
            description: None,
            status: Some(ProjectStatus::InProgress),
            priority: None,
            owner_id: "user-1".to_string(),
            manager_id: None,
            budget_allocated: None,
        })
        .unwrap();
    (db, project.id)
}

fn sample_story(project_id: &str, title: &str) -> NewStory {
    NewStory {
        tenant_id: "acme".to_string(),
        project_id: project_id.to_string(),
        epic_id: None,
        sprint_id: None,
        title: title.to_string(),
        as_a: Some("registered user".to_string()),
        i_want: Some("to reset my password".to_string()),
        so_that: Some("I can regain access".to_string()),
        status: None,
        priority: None,
        story_points: Some(5),
        assignee_id: None,
        acceptance_criteria: vec!["email is sent".to_string()],
        tags: vec!["auth".to_string()],
        progress: None,
    }
}

mod crud {
    use super::*;

    #[test]
    fn create_applies_defaults_and_round_trips() {
        let (db, project_id) = setup();

        let story = db.create_story(sample_story(&project_id, "Password reset")).unwrap();

        assert_eq!(story.status, StoryStatus::Draft);
        assert_eq!(story.priority, Priority::Medium);
        assert_eq!(story.progress, 0);
        assert_eq!(story.tasks_total, 0);

        let fetched = db.get_story(&story.id).unwrap().expect("story");
        assert_eq!(fetched.title, "Password reset");
        assert_eq!(fetched.as_a.as_deref(), Some("registered user"));
        assert_eq!(fetched.story_points, Some(5));
        assert_eq!(fetched.acceptance_criteria, vec!["email is sent"]);
        assert_eq!(fetched.tags, vec!["auth"]);
    }

    #[test]
    fn create_rejects_empty_title() {
        let (db, project_id) = setup();

        let mut input = sample_story(&project_id, "x");
        input.title = "   ".to_string();
        assert!(db.create_story(input).is_err());
    }

    #[test]
    fn create_rejects_out_of_range_points_and_progress() {
        let (db, project_id) = setup();

        let mut too_many_points = sample_story(&project_id, "a");
        too_many_points.story_points = Some(101);
        assert!(db.create_story(too_many_points).is_err());

        let mut negative_progress = sample_story(&project_id, "b");
        negative_progress.progress = Some(-1);
        assert!(db.create_story(negative_progress).is_err());

        // Nothing was written
        assert!(db.list_stories(&project_id, &StoryFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn update_merges_and_validates() {
        let (db, project_id) = setup();
        let story = db.create_story(sample_story(&project_id, "Login")).unwrap();

        let updated = db
            .update_story(
                &story.id,
                StoryPatch {
                    priority: Some(Priority::High),
                    tags: Some(vec!["auth".to_string(), "p1".to_string()]),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.priority, Priority::High);
        assert_eq!(updated.tags.len(), 2);
        assert_eq!(updated.title, "Login");

        let bad = db.update_story(
            &story.id,
            StoryPatch {
                story_points: Some(Some(500)),
                ..Default::default()
            },
        );
        assert!(bad.is_err());
    }

    #[test]
    fn delete_is_hard_and_idempotent() {
        let (db, project_id) = setup();
        let story = db.create_story(sample_story(&project_id, "Login")).unwrap();

        db.delete_story(&story.id).unwrap();
        assert!(db.get_story(&story.id).unwrap().is_none());
        db.delete_story(&story.id).unwrap();
    }

    #[test]
    fn get_returns_none_for_unknown_id() {
        let (db, _) = setup();
        assert!(db.get_story("missing").unwrap().is_none());
    }
}

mod progress {
    use super::*;

    #[test]
    fn progress_drives_status_end_to_end() {
        let (db, project_id) = setup();
        let story = db.create_story(sample_story(&project_id, "Checkout")).unwrap();
        assert_eq!(story.status, StoryStatus::Draft);

        let mid = db.update_progress(&story.id, 45).unwrap();
        assert_eq!(mid.progress, 45);
        assert_eq!(mid.status, StoryStatus::InProgress);

        let done = db.update_progress(&story.id, 100).unwrap();
        assert_eq!(done.status, StoryStatus::Done);

        // Status is not sticky: dropping back to zero returns to draft
        let reset = db.update_progress(&story.id, 0).unwrap();
        assert_eq!(reset.status, StoryStatus::Draft);
    }

    #[test]
    fn progress_overwrites_manual_status() {
        let (db, project_id) = setup();
        let story = db.create_story(sample_story(&project_id, "Checkout")).unwrap();

        db.update_story(
            &story.id,
            StoryPatch {
                status: Some(StoryStatus::Review),
                ..Default::default()
            },
        )
        .unwrap();

        let updated = db.update_progress(&story.id, 60).unwrap();
        assert_eq!(updated.status, StoryStatus::InProgress);
    }

    #[test]
    fn update_progress_is_idempotent() {
        let (db, project_id) = setup();
        let story = db.create_story(sample_story(&project_id, "Checkout")).unwrap();

        let first = db.update_progress(&story.id, 45).unwrap();
        let second = db.update_progress(&story.id, 45).unwrap();

        assert_eq!(first.progress, second.progress);
        assert_eq!(first.status, second.status);
    }

    #[test]
    fn out_of_range_progress_is_rejected() {
        let (db, project_id) = setup();
        let story = db.create_story(sample_story(&project_id, "Checkout")).unwrap();

        assert!(db.update_progress(&story.id, 101).is_err());
        assert!(db.update_progress(&story.id, -1).is_err());

        // The stored story is untouched
        let fetched = db.get_story(&story.id).unwrap().unwrap();
        assert_eq!(fetched.progress, 0);
        assert_eq!(fetched.status, StoryStatus::Draft);
    }

    #[test]
    fn update_progress_on_missing_story_fails() {
        let (db, _) = setup();
        assert!(db.update_progress("missing", 50).is_err());
    }
}

mod listings {
    use super::*;

    #[test]
    fn filters_combine_with_and_semantics() {
        let (db, project_id) = setup();

        let mut a = sample_story(&project_id, "A");
        a.epic_id = Some("epic-1".to_string());
        a.priority = Some(Priority::High);
        db.create_story(a).unwrap();

        let mut b = sample_story(&project_id, "B");
        b.epic_id = Some("epic-1".to_string());
        db.create_story(b).unwrap();

        let mut c = sample_story(&project_id, "C");
        c.priority = Some(Priority::High);
        db.create_story(c).unwrap();

        let both = db
            .list_stories(
                &project_id,
                &StoryFilter {
                    epic_id: Some("epic-1".to_string()),
                    priority: Some(Priority::High),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].title, "A");
    }

    #[test]
    fn limit_caps_results() {
        let (db, project_id) = setup();
        for i in 0..5 {
            db.create_story(sample_story(&project_id, &format!("S{i}"))).unwrap();
        }

        let capped = db
            .list_stories(
                &project_id,
                &StoryFilter {
                    limit: Some(2),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(capped.len(), 2);
    }

    #[test]
    fn backlog_is_unassigned_stories_priority_first() {
        let (db, project_id) = setup();

        let mut urgent = sample_story(&project_id, "Urgent");
        urgent.priority = Some(Priority::Critical);
        db.create_story(urgent).unwrap();

        let mut planned = sample_story(&project_id, "Planned");
        planned.sprint_id = Some("sprint-1".to_string());
        db.create_story(planned).unwrap();

        db.create_story(sample_story(&project_id, "Later")).unwrap();

        let backlog = db.backlog(&project_id).unwrap();
        assert_eq!(backlog.len(), 2);
        assert_eq!(backlog[0].title, "Urgent");
        assert!(backlog.iter().all(|s| s.sprint_id.is_none()));
    }

    #[test]
    fn epic_sprint_and_ready_wrappers_filter_correctly() {
        let (db, project_id) = setup();

        let mut in_epic = sample_story(&project_id, "In epic");
        in_epic.epic_id = Some("epic-9".to_string());
        db.create_story(in_epic).unwrap();

        let mut in_sprint = sample_story(&project_id, "In sprint");
        in_sprint.sprint_id = Some("sprint-9".to_string());
        db.create_story(in_sprint).unwrap();

        let mut ready = sample_story(&project_id, "Ready one");
        ready.status = Some(StoryStatus::Ready);
        db.create_story(ready).unwrap();

        assert_eq!(db.stories_by_epic(&project_id, "epic-9").unwrap().len(), 1);
        assert_eq!(db.stories_by_sprint(&project_id, "sprint-9").unwrap().len(), 1);
        let ready_list = db.ready_stories(&project_id).unwrap();
        assert_eq!(ready_list.len(), 1);
        assert_eq!(ready_list[0].title, "Ready one");
    }

    #[test]
    fn listings_are_project_scoped() {
        let (db, project_id) = setup();
        let other = db
            .create_project(NewProject {
                tenant_id: "acme".to_string(),
                name: "Other".to_string(),
                description: None,
                status: None,
                priority: None,
                owner_id: "user-1".to_string(),
                manager_id: None,
                budget_allocated: None,
            })
            .unwrap();

        db.create_story(sample_story(&project_id, "Mine")).unwrap();
        db.create_story(sample_story(&other.id, "Theirs")).unwrap();

        let stories = db.list_stories(&project_id, &StoryFilter::default()).unwrap();
        assert_eq!(stories.len(), 1);
        assert_eq!(stories[0].title, "Mine");
    }

    #[test]
    fn priority_order_sorts_descending() {
        let (db, project_id) = setup();

        let mut low = sample_story(&project_id, "Low");
        low.priority = Some(Priority::Low);
        db.create_story(low).unwrap();

        let mut critical = sample_story(&project_id, "Critical");
        critical.priority = Some(Priority::Critical);
        db.create_story(critical).unwrap();

        let stories = db
            .list_stories(
                &project_id,
                &StoryFilter {
                    order: Some(StoryOrder::PriorityDesc),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(stories[0].title, "Critical");
        assert_eq!(stories[1].title, "Low");
    }
}

mod assignment {
    use super::*;

    #[test]
    fn assign_and_unassign_sprint() {
        let (db, project_id) = setup();
        let story = db.create_story(sample_story(&project_id, "S")).unwrap();

        let assigned = db.assign_to_sprint(&story.id, Some("sprint-1")).unwrap();
        assert_eq!(assigned.sprint_id.as_deref(), Some("sprint-1"));
        assert_eq!(db.stories_by_sprint(&project_id, "sprint-1").unwrap().len(), 1);

        let unassigned = db.assign_to_sprint(&story.id, None).unwrap();
        assert!(unassigned.sprint_id.is_none());
        assert_eq!(db.backlog(&project_id).unwrap().len(), 1);
    }

    #[test]
    fn assign_and_unassign_epic() {
        let (db, project_id) = setup();
        let story = db.create_story(sample_story(&project_id, "S")).unwrap();

        db.assign_to_epic(&story.id, Some("epic-1")).unwrap();
        assert_eq!(db.stories_by_epic(&project_id, "epic-1").unwrap().len(), 1);

        let unassigned = db.assign_to_epic(&story.id, None).unwrap();
        assert!(unassigned.epic_id.is_none());
    }

    #[test]
    fn assign_missing_story_fails() {
        let (db, _) = setup();
        assert!(db.assign_to_sprint("missing", Some("sprint-1")).is_err());
    }
}
