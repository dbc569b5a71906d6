//! Index-based mutations on a run's checklists.
//!
//! Every function validates its indices before touching anything, resolves
//! the timestamp once, and reports whether it changed the checklists. The
//! owning run is stamped by the caller with the returned timestamp.
//!
//! Item-level changes (state, assignee, command, due date, task actions,
//! edits) stamp the item and its checklist together. Checklist-level changes
//! and item moves stamp checklists only: moving an item never touches the
//! item's own timestamps.

use crate::checklist::{
    check_checklist_index, check_item_index, update_all_checklists_and_items_timestamps,
    update_checklist_and_item_timestamp, Checklist, ChecklistItem,
};
use crate::clock::{resolve_timestamp, Clock};
use crate::error::{PlaybooksError, Result};
use crate::id::new_id;
use crate::task_action::TaskAction;
use crate::types::ChecklistItemState;

// ---------------------------------------------------------------------------
// Stamp / Mutation
// ---------------------------------------------------------------------------

/// When a mutation happens: an explicit timestamp, or zero for "now".
#[derive(Clone, Copy)]
pub struct Stamp<'a> {
    timestamp: i64,
    clock: &'a dyn Clock,
}

impl<'a> Stamp<'a> {
    pub fn now(clock: &'a dyn Clock) -> Self {
        Self { timestamp: 0, clock }
    }

    pub fn at(timestamp: i64, clock: &'a dyn Clock) -> Self {
        Self { timestamp, clock }
    }

    /// Reads the clock only when no explicit timestamp was given.
    pub fn resolve(self) -> i64 {
        resolve_timestamp(self.timestamp, self.clock)
    }
}

impl std::fmt::Debug for Stamp<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stamp").field("timestamp", &self.timestamp).finish()
    }
}

/// Outcome of a mutation. `Unchanged` is a recognized no-op, not an error:
/// nothing was written and no timestamp advanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Applied { timestamp: i64 },
    Unchanged,
}

impl Mutation {
    pub fn is_applied(self) -> bool {
        matches!(self, Mutation::Applied { .. })
    }

    pub fn timestamp(self) -> Option<i64> {
        match self {
            Mutation::Applied { timestamp } => Some(timestamp),
            Mutation::Unchanged => None,
        }
    }
}

/// Optional replacements for an item's editable text fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemEdit {
    pub title: Option<String>,
    pub command: Option<String>,
    pub description: Option<String>,
}

impl ItemEdit {
    pub fn rename(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }
}

/// Give the checklist and its items ids where they have none.
pub fn ensure_ids(checklist: &mut Checklist) {
    if checklist.id.is_empty() {
        checklist.id = new_id();
    }
    for item in &mut checklist.items {
        if item.id.is_empty() {
            item.id = new_id();
        }
    }
}

fn item_mut(checklists: &mut [Checklist], checklist: usize, item: usize) -> &mut ChecklistItem {
    &mut checklists[checklist].items[item]
}

/// Apply `f` to an already validated item and stamp it with its checklist.
fn apply_to_item(
    checklists: &mut [Checklist],
    checklist: usize,
    item: usize,
    stamp: Stamp<'_>,
    f: impl FnOnce(&mut ChecklistItem, i64),
) -> Mutation {
    let list = &mut checklists[checklist];
    let mut target = std::mem::take(&mut list.items[item]);
    let ts = update_checklist_and_item_timestamp(list, &mut target, stamp.timestamp, stamp.clock);
    f(&mut target, ts);
    list.items[item] = target;
    Mutation::Applied { timestamp: ts }
}

// ---------------------------------------------------------------------------
// Checklist operations
// ---------------------------------------------------------------------------

/// Append a checklist, stamping it and all of its items.
pub fn add_checklist(checklists: &mut Vec<Checklist>, mut checklist: Checklist, stamp: Stamp<'_>) -> Mutation {
    ensure_ids(&mut checklist);
    let ts = stamp.resolve();
    update_all_checklists_and_items_timestamps(std::slice::from_mut(&mut checklist), ts);
    checklists.push(checklist);
    Mutation::Applied { timestamp: ts }
}

/// Append a copy of the checklist at `index` with fresh ids.
pub fn duplicate_checklist(checklists: &mut Vec<Checklist>, index: usize, stamp: Stamp<'_>) -> Result<Mutation> {
    check_checklist_index(checklists, index)?;
    let mut duplicate = checklists[index].clone();
    duplicate.id = String::new();
    for item in &mut duplicate.items {
        item.id = String::new();
    }
    Ok(add_checklist(checklists, duplicate, stamp))
}

/// Remove and return the checklist at `index`.
pub fn remove_checklist(
    checklists: &mut Vec<Checklist>,
    index: usize,
    stamp: Stamp<'_>,
) -> Result<(Checklist, Mutation)> {
    check_checklist_index(checklists, index)?;
    let ts = stamp.resolve();
    let removed = checklists.remove(index);
    Ok((removed, Mutation::Applied { timestamp: ts }))
}

pub fn rename_checklist(
    checklists: &mut [Checklist],
    index: usize,
    title: impl Into<String>,
    stamp: Stamp<'_>,
) -> Result<Mutation> {
    check_checklist_index(checklists, index)?;
    let ts = stamp.resolve();
    let checklist = &mut checklists[index];
    checklist.title = title.into();
    checklist.update_at = ts;
    Ok(Mutation::Applied { timestamp: ts })
}

/// Move the checklist at `source` so it ends up at `dest`. Only the moved
/// checklist is stamped.
pub fn move_checklist(
    checklists: &mut Vec<Checklist>,
    source: usize,
    dest: usize,
    stamp: Stamp<'_>,
) -> Result<Mutation> {
    check_checklist_index(checklists, source)?;
    if dest >= checklists.len() {
        return Err(PlaybooksError::InvalidDestination(format!(
            "checklist {dest} is out of range"
        )));
    }
    let ts = stamp.resolve();
    let mut moved = checklists.remove(source);
    moved.update_at = ts;
    checklists.insert(dest, moved);
    Ok(Mutation::Applied { timestamp: ts })
}

// ---------------------------------------------------------------------------
// Item list operations
// ---------------------------------------------------------------------------

/// Append `item` to the checklist at `checklist`.
pub fn add_checklist_item(
    checklists: &mut [Checklist],
    checklist: usize,
    mut item: ChecklistItem,
    stamp: Stamp<'_>,
) -> Result<Mutation> {
    check_checklist_index(checklists, checklist)?;
    if item.id.is_empty() {
        item.id = new_id();
    }
    let list = &mut checklists[checklist];
    let ts = update_checklist_and_item_timestamp(list, &mut item, stamp.timestamp, stamp.clock);
    list.items.push(item);
    Ok(Mutation::Applied { timestamp: ts })
}

/// Insert a copy of the item right after the original, with a fresh id.
pub fn duplicate_checklist_item(
    checklists: &mut [Checklist],
    checklist: usize,
    item: usize,
    stamp: Stamp<'_>,
) -> Result<Mutation> {
    check_item_index(checklists, checklist, item)?;
    let list = &mut checklists[checklist];
    let mut copy = list.items[item].clone();
    copy.id = new_id();
    let ts = update_checklist_and_item_timestamp(list, &mut copy, stamp.timestamp, stamp.clock);
    list.items.insert(item + 1, copy);
    Ok(Mutation::Applied { timestamp: ts })
}

/// Remove and return the item. The checklist is stamped.
pub fn remove_checklist_item(
    checklists: &mut [Checklist],
    checklist: usize,
    item: usize,
    stamp: Stamp<'_>,
) -> Result<(ChecklistItem, Mutation)> {
    check_item_index(checklists, checklist, item)?;
    let ts = stamp.resolve();
    let list = &mut checklists[checklist];
    let removed = list.items.remove(item);
    list.update_at = ts;
    Ok((removed, Mutation::Applied { timestamp: ts }))
}

/// Replace any of the item's title, command and description. A changed
/// command clears `command_last_run`.
pub fn edit_checklist_item(
    checklists: &mut [Checklist],
    checklist: usize,
    item: usize,
    edit: ItemEdit,
    stamp: Stamp<'_>,
) -> Result<Mutation> {
    check_item_index(checklists, checklist, item)?;
    Ok(apply_to_item(checklists, checklist, item, stamp, |it, _| {
        if let Some(title) = edit.title {
            it.title = title;
        }
        if let Some(description) = edit.description {
            it.description = description;
        }
        if let Some(command) = edit.command {
            if it.command != command {
                it.command_last_run = 0;
            }
            it.command = command;
        }
    }))
}

/// Move an item within or across checklists.
///
/// Within one checklist `dest_item` must name an existing position; across
/// checklists it may also be one past the end. Source and destination
/// checklists are stamped. The item's own timestamps are left as they were.
pub fn move_checklist_item(
    checklists: &mut [Checklist],
    source_checklist: usize,
    source_item: usize,
    dest_checklist: usize,
    dest_item: usize,
    stamp: Stamp<'_>,
) -> Result<Mutation> {
    check_item_index(checklists, source_checklist, source_item)?;
    if dest_checklist >= checklists.len() {
        return Err(PlaybooksError::InvalidDestination(format!(
            "checklist {dest_checklist} is out of range"
        )));
    }
    let dest_len = checklists[dest_checklist].items.len();
    let same = source_checklist == dest_checklist;
    if (same && dest_item >= dest_len) || dest_item > dest_len {
        return Err(PlaybooksError::InvalidDestination(format!(
            "item {dest_item} is out of range"
        )));
    }

    let ts = stamp.resolve();
    let moved = checklists[source_checklist].items.remove(source_item);
    checklists[dest_checklist].items.insert(dest_item, moved);
    checklists[source_checklist].update_at = ts;
    checklists[dest_checklist].update_at = ts;
    Ok(Mutation::Applied { timestamp: ts })
}

// ---------------------------------------------------------------------------
// Item state machine
// ---------------------------------------------------------------------------

/// Move the item to `new_state`. Any valid state may follow any other;
/// re-applying the current state is a no-op.
pub fn modify_checked_state(
    checklists: &mut [Checklist],
    checklist: usize,
    item: usize,
    new_state: ChecklistItemState,
    stamp: Stamp<'_>,
) -> Result<Mutation> {
    check_item_index(checklists, checklist, item)?;
    if item_mut(checklists, checklist, item).state == new_state {
        return Ok(Mutation::Unchanged);
    }
    Ok(apply_to_item(checklists, checklist, item, stamp, |it, ts| {
        it.state = new_state;
        it.state_modified = ts;
    }))
}

/// String form of [`modify_checked_state`] for callers holding raw input.
pub fn modify_checked_state_str(
    checklists: &mut [Checklist],
    checklist: usize,
    item: usize,
    new_state: &str,
    stamp: Stamp<'_>,
) -> Result<Mutation> {
    if !ChecklistItemState::is_valid(new_state) {
        return Err(PlaybooksError::InvalidItemState(new_state.to_string()));
    }
    let state = new_state.parse()?;
    modify_checked_state(checklists, checklist, item, state, stamp)
}

/// Open items become closed; anything else becomes open.
pub fn toggle_checked_state(
    checklists: &mut [Checklist],
    checklist: usize,
    item: usize,
    stamp: Stamp<'_>,
) -> Result<Mutation> {
    check_item_index(checklists, checklist, item)?;
    let next = match item_mut(checklists, checklist, item).state {
        ChecklistItemState::Open => ChecklistItemState::Closed,
        _ => ChecklistItemState::Open,
    };
    modify_checked_state(checklists, checklist, item, next, stamp)
}

/// Assign the item to `assignee_id` (empty to unassign). Idempotent.
pub fn set_assignee(
    checklists: &mut [Checklist],
    checklist: usize,
    item: usize,
    assignee_id: &str,
    stamp: Stamp<'_>,
) -> Result<Mutation> {
    check_item_index(checklists, checklist, item)?;
    if item_mut(checklists, checklist, item).assignee_id == assignee_id {
        return Ok(Mutation::Unchanged);
    }
    Ok(apply_to_item(checklists, checklist, item, stamp, |it, ts| {
        it.assignee_id = assignee_id.to_string();
        it.assignee_modified = ts;
    }))
}

/// Replace the item's command. A different command has never been run, so
/// `command_last_run` resets to zero; the item is stamped either way.
pub fn set_command(
    checklists: &mut [Checklist],
    checklist: usize,
    item: usize,
    command: &str,
    stamp: Stamp<'_>,
) -> Result<Mutation> {
    check_item_index(checklists, checklist, item)?;
    Ok(apply_to_item(checklists, checklist, item, stamp, |it, _| {
        if it.command != command {
            it.command_last_run = 0;
        }
        it.command = command.to_string();
    }))
}

/// Record a successful run of the item's command.
pub fn record_command_run(
    checklists: &mut [Checklist],
    checklist: usize,
    item: usize,
    stamp: Stamp<'_>,
) -> Result<Mutation> {
    check_item_index(checklists, checklist, item)?;
    if item_mut(checklists, checklist, item).command.is_empty() {
        return Err(PlaybooksError::MissingCommand { checklist, item });
    }
    Ok(apply_to_item(checklists, checklist, item, stamp, |it, ts| {
        it.command_last_run = ts;
    }))
}

/// Set the absolute due date in milliseconds (zero clears it).
pub fn set_due_date(
    checklists: &mut [Checklist],
    checklist: usize,
    item: usize,
    due_date: i64,
    stamp: Stamp<'_>,
) -> Result<Mutation> {
    check_item_index(checklists, checklist, item)?;
    Ok(apply_to_item(checklists, checklist, item, stamp, |it, _| {
        it.due_date = due_date;
    }))
}

/// Replace the item's task actions wholesale. Type tags are not checked.
pub fn set_task_actions(
    checklists: &mut [Checklist],
    checklist: usize,
    item: usize,
    task_actions: Vec<TaskAction>,
    stamp: Stamp<'_>,
) -> Result<Mutation> {
    check_item_index(checklists, checklist, item)?;
    Ok(apply_to_item(checklists, checklist, item, stamp, |it, _| {
        it.task_actions = task_actions;
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
