use crate::clock::{resolve_timestamp, Clock};
use crate::error::{PlaybooksError, Result};
use crate::normalize::null_as_empty;
use crate::task_action::TaskAction;
use crate::types::ChecklistItemState;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ChecklistItem
// ---------------------------------------------------------------------------

/// An item inside a run checklist.
///
/// Empty `assignee_id`/`command` mean "none", and a zero timestamp means
/// "never", matching what clients already expect on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChecklistItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub state: ChecklistItemState,
    pub state_modified: i64,
    pub state_modified_post_id: String,
    pub assignee_id: String,
    pub assignee_modified: i64,
    pub assignee_modified_post_id: String,
    pub command: String,
    pub command_last_run: i64,
    pub due_date: i64,
    #[serde(deserialize_with = "null_as_empty")]
    pub task_actions: Vec<TaskAction>,
    pub update_at: i64,
}

impl ChecklistItem {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn assignee(&self) -> Option<&str> {
        (!self.assignee_id.is_empty()).then_some(self.assignee_id.as_str())
    }

    pub fn command(&self) -> Option<&str> {
        (!self.command.is_empty()).then_some(self.command.as_str())
    }

    pub fn due(&self) -> Option<i64> {
        (self.due_date != 0).then_some(self.due_date)
    }

    pub fn is_closed(&self) -> bool {
        self.state == ChecklistItemState::Closed
    }
}

// ---------------------------------------------------------------------------
// Checklist
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Checklist {
    pub id: String,
    pub title: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub items: Vec<ChecklistItem>,
    pub update_at: i64,
}

impl Checklist {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Item ids in display order.
    pub fn items_order(&self) -> Vec<&str> {
        self.items.iter().map(|i| i.id.as_str()).collect()
    }

    /// "3/5 done, 1 in progress"
    pub fn summarize(&self) -> String {
        let total = self.items.len();
        let done = self.items.iter().filter(|i| i.is_closed()).count();
        let in_progress = self
            .items
            .iter()
            .filter(|i| i.state == ChecklistItemState::InProgress)
            .count();
        format!("{done}/{total} done, {in_progress} in progress")
    }
}

// ---------------------------------------------------------------------------
// Index validation
// ---------------------------------------------------------------------------

pub fn is_valid_checklist_index(checklists: &[Checklist], checklist: usize) -> bool {
    checklist < checklists.len()
}

pub fn is_valid_checklist_item_index(checklists: &[Checklist], checklist: usize, item: usize) -> bool {
    checklists
        .get(checklist)
        .is_some_and(|c| item < c.items.len())
}

pub(crate) fn check_checklist_index(checklists: &[Checklist], checklist: usize) -> Result<()> {
    if !is_valid_checklist_index(checklists, checklist) {
        return Err(PlaybooksError::ChecklistNotFound(checklist));
    }
    Ok(())
}

pub(crate) fn check_item_index(checklists: &[Checklist], checklist: usize, item: usize) -> Result<()> {
    check_checklist_index(checklists, checklist)?;
    if !is_valid_checklist_item_index(checklists, checklist, item) {
        return Err(PlaybooksError::ChecklistItemNotFound { checklist, item });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Timestamp cascade
// ---------------------------------------------------------------------------

/// Set `item.update_at` to `timestamp`, or to the clock's current time when
/// `timestamp` is zero. Returns the value written.
pub fn update_checklist_item_timestamp(item: &mut ChecklistItem, timestamp: i64, clock: &dyn Clock) -> i64 {
    let ts = resolve_timestamp(timestamp, clock);
    item.update_at = ts;
    ts
}

/// Stamp a checklist and an item with the same resolved timestamp. The clock
/// is read at most once, so both fields are always equal afterwards.
pub fn update_checklist_and_item_timestamp(
    checklist: &mut Checklist,
    item: &mut ChecklistItem,
    timestamp: i64,
    clock: &dyn Clock,
) -> i64 {
    let ts = resolve_timestamp(timestamp, clock);
    item.update_at = ts;
    checklist.update_at = ts;
    ts
}

/// Stamp every checklist and every item in `checklists` with `now`.
pub fn update_all_checklists_and_items_timestamps(checklists: &mut [Checklist], now: i64) {
    for checklist in checklists {
        checklist.update_at = now;
        for item in &mut checklist.items {
            item.update_at = now;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
