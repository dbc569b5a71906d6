use crate::checklist::{Checklist, ChecklistItem};
use crate::id::new_id;
use crate::normalize::null_as_empty;
use crate::task_action::TaskAction;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Template records
// ---------------------------------------------------------------------------

/// An item inside a playbook template. Carries no run state: no item state,
/// assignee, or timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybookChecklistItem {
    pub title: String,
    pub description: String,
    pub command: String,
    /// Milliseconds after run creation; zero means no due date.
    pub due_date_relative: i64,
    #[serde(deserialize_with = "null_as_empty")]
    pub task_actions: Vec<TaskAction>,
}

impl PlaybookChecklistItem {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    fn instantiate(&self, now: i64) -> ChecklistItem {
        ChecklistItem {
            id: new_id(),
            title: self.title.clone(),
            description: self.description.clone(),
            command: self.command.clone(),
            due_date: if self.due_date_relative != 0 {
                now + self.due_date_relative
            } else {
                0
            },
            task_actions: self.task_actions.clone(),
            update_at: now,
            ..ChecklistItem::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybookChecklist {
    pub title: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub items: Vec<PlaybookChecklistItem>,
}

impl PlaybookChecklist {
    pub fn new(title: impl Into<String>, items: Vec<PlaybookChecklistItem>) -> Self {
        Self {
            title: title.into(),
            items,
        }
    }

    /// Parse `"Title:first,second"` into a template checklist. Items are
    /// trimmed and blanks dropped.
    pub fn parse_spec(spec: &str) -> Self {
        let (title, rest) = spec.split_once(':').unwrap_or((spec, ""));
        let items = rest
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(PlaybookChecklistItem::new)
            .collect();
        Self::new(title.trim(), items)
    }
}

// ---------------------------------------------------------------------------
// Playbook
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Playbook {
    pub id: String,
    pub title: String,
    pub description: String,
    pub team_id: String,
    pub create_at: i64,
    pub update_at: i64,
    pub delete_at: i64,
    pub num_stages: i64,
    pub num_steps: i64,
    pub num_runs: i64,
    pub num_actions: i64,
    pub last_run_at: i64,
    #[serde(deserialize_with = "null_as_empty")]
    pub checklists: Vec<PlaybookChecklist>,
    #[serde(deserialize_with = "null_as_empty")]
    pub member_ids: Vec<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub invited_user_ids: Vec<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub invited_group_ids: Vec<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub broadcast_channel_ids: Vec<String>,
    pub reminder_message_template: String,
    pub reminder_timer_default_seconds: i64,
    pub retrospective_template: String,
    pub retrospective_reminder_interval_seconds: i64,
    #[serde(deserialize_with = "null_as_empty")]
    pub signal_any_keywords: Vec<String>,
}

impl Playbook {
    pub fn new(title: impl Into<String>, checklists: Vec<PlaybookChecklist>, now: i64) -> Self {
        let mut playbook = Self {
            id: new_id(),
            title: title.into(),
            create_at: now,
            update_at: now,
            checklists,
            ..Self::default()
        };
        playbook.recount();
        playbook
    }

    /// Refresh the stage/step/action counters from the template checklists.
    pub fn recount(&mut self) {
        self.num_stages = self.checklists.len() as i64;
        self.num_steps = self.checklists.iter().map(|c| c.items.len() as i64).sum();
        self.num_actions = self
            .checklists
            .iter()
            .flat_map(|c| &c.items)
            .map(|i| i.task_actions.len() as i64)
            .sum();
    }

    pub fn is_deleted(&self) -> bool {
        self.delete_at != 0
    }

    /// Convert template checklists into run checklists with fresh ids, every
    /// checklist and item stamped with `now`.
    pub fn instantiate_checklists(&self, now: i64) -> Vec<Checklist> {
        self.checklists
            .iter()
            .map(|template| Checklist {
                id: new_id(),
                title: template.title.clone(),
                items: template.items.iter().map(|i| i.instantiate(now)).collect(),
                update_at: now,
            })
            .collect()
    }
}

/// One page of playbooks plus the total before paging.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GetPlaybooksResults {
    pub total_count: usize,
    pub page_count: usize,
    pub has_more: bool,
    #[serde(deserialize_with = "null_as_empty")]
    pub items: Vec<Playbook>,
}
