use crate::checklist::Checklist;
use crate::error::{PlaybooksError, Result};
use crate::id::new_id;
use crate::mutation::{ensure_ids, Mutation};
use crate::normalize::null_as_empty;
use crate::playbook::Playbook;
use crate::types::{RunStatus, RunType, TimelineEventType};
use serde::{Deserialize, Serialize};

/// Title of the checklist every standalone run starts with.
pub const DEFAULT_CHECKLIST_TITLE: &str = "Tasks";

// ---------------------------------------------------------------------------
// StatusPost
// ---------------------------------------------------------------------------

/// One entry of a run's status history. Posts are never edited, only
/// soft-deleted through `delete_at`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusPost {
    pub id: String,
    pub status: RunStatus,
    pub create_at: i64,
    pub delete_at: i64,
}

impl StatusPost {
    pub fn new(status: RunStatus, create_at: i64) -> Self {
        Self {
            id: new_id(),
            status,
            create_at,
            delete_at: 0,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.delete_at != 0
    }
}

// ---------------------------------------------------------------------------
// TimelineEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub id: String,
    pub playbook_run_id: String,
    pub create_at: i64,
    #[serde(default)]
    pub delete_at: i64,
    pub event_at: i64,
    pub event_type: TimelineEventType,
    #[serde(default)]
    pub summary: String,
    /// Opaque JSON text interpreted by whoever renders the timeline.
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub post_id: String,
    #[serde(default)]
    pub subject_user_id: String,
    #[serde(default)]
    pub creator_user_id: String,
}

impl TimelineEvent {
    pub fn new(playbook_run_id: impl Into<String>, event_type: TimelineEventType, at: i64) -> Self {
        Self {
            id: new_id(),
            playbook_run_id: playbook_run_id.into(),
            create_at: at,
            delete_at: 0,
            event_at: at,
            event_type,
            summary: String::new(),
            details: String::new(),
            post_id: String::new(),
            subject_user_id: String::new(),
            creator_user_id: String::new(),
        }
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    pub fn subject(mut self, user_id: impl Into<String>) -> Self {
        self.subject_user_id = user_id.into();
        self
    }

    pub fn creator(mut self, user_id: impl Into<String>) -> Self {
        self.creator_user_id = user_id.into();
        self
    }

    pub fn post(mut self, post_id: impl Into<String>) -> Self {
        self.post_id = post_id.into();
        self
    }

    pub fn is_deleted(&self) -> bool {
        self.delete_at != 0
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Caller-supplied fields for a new run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewRun {
    pub name: String,
    pub description: String,
    pub owner_user_id: String,
    pub reporter_user_id: String,
    pub team_id: String,
    pub channel_id: String,
}

impl NewRun {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Where a run's checklists come from.
#[derive(Debug, Clone, Copy)]
pub enum RunKind<'a> {
    /// No template: the run gets a single empty "Tasks" checklist.
    Standalone,
    /// Checklists and defaults are copied from the playbook.
    FromPlaybook(&'a Playbook),
}

// ---------------------------------------------------------------------------
// PlaybookRun
// ---------------------------------------------------------------------------

/// The run aggregate. Owns its checklists outright; status posts and
/// timeline events are append-only logs.
///
/// `update_at` never goes backwards and is kept at or above every
/// checklist's `update_at`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybookRun {
    pub id: String,
    pub name: String,
    pub description: String,
    pub owner_user_id: String,
    pub reporter_user_id: String,
    pub team_id: String,
    pub channel_id: String,
    pub create_at: i64,
    pub update_at: i64,
    pub end_at: i64,
    pub delete_at: i64,
    pub playbook_id: String,
    #[serde(rename = "type")]
    pub run_type: RunType,
    #[serde(deserialize_with = "null_as_empty")]
    pub checklists: Vec<Checklist>,
    #[serde(deserialize_with = "null_as_empty")]
    pub status_posts: Vec<StatusPost>,
    pub current_status: RunStatus,
    pub last_status_update_at: i64,
    pub reminder_post_id: String,
    /// Seconds.
    pub previous_reminder: i64,
    pub reminder_timer_default_seconds: i64,
    #[serde(deserialize_with = "null_as_empty")]
    pub invited_user_ids: Vec<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub invited_group_ids: Vec<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub participant_ids: Vec<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub broadcast_channel_ids: Vec<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub webhook_on_creation_urls: Vec<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub webhook_on_status_update_urls: Vec<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub timeline_events: Vec<TimelineEvent>,
    pub retrospective: String,
    pub retrospective_published_at: i64,
    pub retrospective_was_canceled: bool,
    pub retrospective_reminder_interval_seconds: i64,
    pub message_on_join: String,
}

impl PlaybookRun {
    /// Build a run created at `now`. Every checklist and item is stamped with
    /// `now` and given an id.
    pub fn new(new: NewRun, kind: RunKind<'_>, now: i64) -> Self {
        let mut run = Self {
            id: new_id(),
            name: new.name,
            description: new.description,
            owner_user_id: new.owner_user_id,
            reporter_user_id: new.reporter_user_id,
            team_id: new.team_id,
            channel_id: new.channel_id,
            create_at: now,
            update_at: now,
            current_status: RunStatus::InProgress,
            ..Self::default()
        };

        match kind {
            RunKind::Standalone => {
                run.run_type = RunType::ChannelChecklist;
                run.checklists.push(Checklist {
                    update_at: now,
                    ..Checklist::new(DEFAULT_CHECKLIST_TITLE)
                });
            }
            RunKind::FromPlaybook(playbook) => {
                run.run_type = RunType::Playbook;
                run.playbook_id = playbook.id.clone();
                run.checklists = playbook.instantiate_checklists(now);
                run.reminder_timer_default_seconds = playbook.reminder_timer_default_seconds;
                run.retrospective_reminder_interval_seconds =
                    playbook.retrospective_reminder_interval_seconds;
                run.invited_user_ids = playbook.invited_user_ids.clone();
                run.invited_group_ids = playbook.invited_group_ids.clone();
                run.broadcast_channel_ids = playbook.broadcast_channel_ids.clone();
                if run.description.is_empty() {
                    run.description = playbook.description.clone();
                }
            }
        }
        for checklist in &mut run.checklists {
            ensure_ids(checklist);
        }
        run
    }

    pub fn is_standalone(&self) -> bool {
        self.playbook_id.is_empty()
    }

    /// True unless the current status is Resolved or Archived.
    pub fn is_active(&self) -> bool {
        !self.current_status.is_resolved()
    }

    /// When the run was resolved, derived from the status history.
    ///
    /// Walks the posts newest first, skipping deleted ones, and returns the
    /// creation time of the oldest post in the trailing stretch of Resolved
    /// or Archived posts. Returns 0 when that stretch is empty. If the newest
    /// post predates post statuses (empty status), `end_at` is returned.
    pub fn resolved_at(&self) -> i64 {
        if self
            .status_posts
            .last()
            .is_some_and(|p| p.status == RunStatus::Unset)
        {
            return self.end_at;
        }

        let mut resolved: Option<&StatusPost> = None;
        for post in self.status_posts.iter().rev() {
            if post.is_deleted() {
                continue;
            }
            if !post.status.is_resolved() {
                break;
            }
            resolved = Some(post);
        }
        resolved.map_or(0, |p| p.create_at)
    }

    /// Checklist ids in display order.
    pub fn checklists_order(&self) -> Vec<&str> {
        self.checklists.iter().map(|c| c.id.as_str()).collect()
    }

    /// Raise the run's `update_at` to `timestamp`. Never lowers it.
    pub fn stamp(&mut self, timestamp: i64) {
        self.update_at = self.update_at.max(timestamp);
    }

    /// Stamp the run when a mutation was applied.
    pub fn stamp_mutation(&mut self, mutation: Mutation) {
        if let Some(ts) = mutation.timestamp() {
            self.stamp(ts);
        }
    }

    pub fn add_status_post(&mut self, post: StatusPost) {
        self.status_posts.push(post);
    }

    /// Soft-delete a status post. Deleting an already deleted post is a no-op.
    pub fn remove_status_post(&mut self, post_id: &str, now: i64) -> Result<Mutation> {
        let post = self
            .status_posts
            .iter_mut()
            .find(|p| p.id == post_id)
            .ok_or_else(|| PlaybooksError::StatusPostNotFound(post_id.to_string()))?;
        if post.is_deleted() {
            return Ok(Mutation::Unchanged);
        }
        post.delete_at = now;
        Ok(Mutation::Applied { timestamp: now })
    }

    pub fn add_timeline_event(&mut self, event: TimelineEvent) {
        self.timeline_events.push(event);
    }

    /// Soft-delete a timeline event.
    pub fn remove_timeline_event(&mut self, event_id: &str, now: i64) -> Result<Mutation> {
        let event = self
            .timeline_events
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or_else(|| PlaybooksError::TimelineEventNotFound(event_id.to_string()))?;
        if event.is_deleted() {
            return Ok(Mutation::Unchanged);
        }
        event.delete_at = now;
        Ok(Mutation::Applied { timestamp: now })
    }

    /// Timeline events that have not been deleted, oldest first.
    pub fn visible_timeline(&self) -> impl Iterator<Item = &TimelineEvent> {
        self.timeline_events.iter().filter(|e| !e.is_deleted())
    }

    /// Whether `user_id` owns or participates in the run.
    pub fn involves(&self, user_id: &str) -> bool {
        self.owner_user_id == user_id || self.participant_ids.iter().any(|p| p == user_id)
    }
}

/// One page of runs plus the total before paging.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GetPlaybookRunsResults {
    pub total_count: usize,
    pub page_count: usize,
    pub has_more: bool,
    #[serde(deserialize_with = "null_as_empty")]
    pub items: Vec<PlaybookRun>,
}
