use crate::cmd::report;
use crate::output::print_json;
use crate::project::Project;
use anyhow::Context;
use clap::Subcommand;
use playbooks_core::{
    checklist::ChecklistItem,
    mutation::ItemEdit,
    task_action::{Action, KeywordsByUsersPayload, TaskAction, Trigger},
};
use std::path::Path;

#[derive(Subcommand)]
pub enum ItemSubcommand {
    /// Append an item to a checklist
    Add {
        run: String,
        checklist: usize,
        #[arg(required = true)]
        title: Vec<String>,
        #[arg(long)]
        command: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Change an item's title, command or description
    Edit {
        run: String,
        checklist: usize,
        item: usize,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        command: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Remove an item
    Remove {
        run: String,
        checklist: usize,
        item: usize,
    },
    /// Move an item within or across checklists
    Move {
        run: String,
        checklist: usize,
        item: usize,
        dest_checklist: usize,
        dest_item: usize,
    },
    /// Insert a copy of an item right after it
    Duplicate {
        run: String,
        checklist: usize,
        item: usize,
    },
    /// Set an item's state: open, in_progress or closed
    State {
        run: String,
        checklist: usize,
        item: usize,
        state: String,
    },
    /// Flip an item between open and closed
    Toggle {
        run: String,
        checklist: usize,
        item: usize,
    },
    /// Assign an item (omit the assignee to unassign)
    Assign {
        run: String,
        checklist: usize,
        item: usize,
        #[arg(default_value = "")]
        assignee: String,
    },
    /// Set an item's slash command (omit to clear)
    Command {
        run: String,
        checklist: usize,
        item: usize,
        #[arg(default_value = "")]
        command: String,
    },
    /// Record a run of the item's slash command and print it
    RunCommand {
        run: String,
        checklist: usize,
        item: usize,
    },
    /// Set an item's due date in epoch milliseconds (0 clears)
    Due {
        run: String,
        checklist: usize,
        item: usize,
        #[arg(allow_negative_numbers = true)]
        due: i64,
    },
    /// Replace an item's task actions (no flags clears them)
    Actions {
        run: String,
        checklist: usize,
        item: usize,
        /// Keywords that trigger the action, comma-separated
        #[arg(long, value_delimiter = ',')]
        keywords: Vec<String>,
        /// Only these users' messages trigger, comma-separated
        #[arg(long, value_delimiter = ',')]
        users: Vec<String>,
        /// Close the item when triggered
        #[arg(long)]
        mark_done: bool,
        /// Full task action list as JSON (overrides the other flags)
        #[arg(long)]
        raw: Option<String>,
    },
}

pub fn run(root: &Path, user: &str, subcmd: ItemSubcommand, json: bool) -> anyhow::Result<()> {
    let project = Project::open(root)?;
    let service = &project.service;
    match subcmd {
        ItemSubcommand::Add {
            run,
            checklist,
            title,
            command,
            description,
        } => {
            let mut item = ChecklistItem::new(title.join(" "));
            item.command = command.unwrap_or_default();
            item.description = description.unwrap_or_default();
            let m = service
                .add_checklist_item(&run, checklist, item)
                .with_context(|| format!("failed to add item to checklist {checklist}"))?;
            report(&run, "add_item", m, json)?;
        }
        ItemSubcommand::Edit {
            run,
            checklist,
            item,
            title,
            command,
            description,
        } => {
            if title.is_none() && command.is_none() && description.is_none() {
                anyhow::bail!("nothing to edit; pass --title, --command or --description");
            }
            let edit = ItemEdit {
                title,
                command,
                description,
            };
            let m = service
                .edit_checklist_item(&run, checklist, item, edit)
                .with_context(|| format!("failed to edit item {checklist}.{item}"))?;
            report(&run, "edit_item", m, json)?;
        }
        ItemSubcommand::Remove {
            run,
            checklist,
            item,
        } => {
            let removed = service
                .remove_checklist_item(&run, checklist, item)
                .with_context(|| format!("failed to remove item {checklist}.{item}"))?;
            if json {
                print_json(&serde_json::json!({ "run_id": run, "removed": removed }))?;
            } else {
                println!("Removed item '{}' from run {run}", removed.title);
            }
        }
        ItemSubcommand::Move {
            run,
            checklist,
            item,
            dest_checklist,
            dest_item,
        } => {
            let m = service
                .move_checklist_item(&run, checklist, item, dest_checklist, dest_item)
                .with_context(|| {
                    format!("failed to move item {checklist}.{item} to {dest_checklist}.{dest_item}")
                })?;
            report(&run, "move_item", m, json)?;
        }
        ItemSubcommand::Duplicate {
            run,
            checklist,
            item,
        } => {
            let m = service
                .duplicate_checklist_item(&run, checklist, item)
                .with_context(|| format!("failed to duplicate item {checklist}.{item}"))?;
            report(&run, "duplicate_item", m, json)?;
        }
        ItemSubcommand::State {
            run,
            checklist,
            item,
            state,
        } => {
            let m = service
                .modify_checked_state(&run, user, checklist, item, wire_state(&state))
                .with_context(|| format!("failed to set state of item {checklist}.{item}"))?;
            report(&run, "state", m, json)?;
        }
        ItemSubcommand::Toggle {
            run,
            checklist,
            item,
        } => {
            let m = service
                .toggle_checked_state(&run, user, checklist, item)
                .with_context(|| format!("failed to toggle item {checklist}.{item}"))?;
            report(&run, "toggle", m, json)?;
        }
        ItemSubcommand::Assign {
            run,
            checklist,
            item,
            assignee,
        } => {
            let m = service
                .set_assignee(&run, user, checklist, item, &assignee)
                .with_context(|| format!("failed to assign item {checklist}.{item}"))?;
            report(&run, "assign", m, json)?;
        }
        ItemSubcommand::Command {
            run,
            checklist,
            item,
            command,
        } => {
            let m = service
                .set_command(&run, checklist, item, &command)
                .with_context(|| format!("failed to set command of item {checklist}.{item}"))?;
            report(&run, "command", m, json)?;
        }
        ItemSubcommand::RunCommand {
            run,
            checklist,
            item,
        } => {
            let command = service
                .run_checklist_item_slash_command(&run, user, checklist, item)
                .with_context(|| format!("failed to run command of item {checklist}.{item}"))?;
            if json {
                print_json(&serde_json::json!({ "run_id": run, "command": command }))?;
            } else {
                println!("{command}");
            }
        }
        ItemSubcommand::Due {
            run,
            checklist,
            item,
            due,
        } => {
            let m = service
                .set_due_date(&run, checklist, item, due)
                .with_context(|| format!("failed to set due date of item {checklist}.{item}"))?;
            report(&run, "due", m, json)?;
        }
        ItemSubcommand::Actions {
            run,
            checklist,
            item,
            keywords,
            users,
            mark_done,
            raw,
        } => {
            let actions = match raw {
                Some(raw) => serde_json::from_str::<Vec<TaskAction>>(&raw)
                    .context("--raw must be a JSON list of task actions")?,
                None => build_actions(keywords, users, mark_done)?,
            };
            let m = service
                .set_task_actions(&run, checklist, item, actions)
                .with_context(|| format!("failed to set actions of item {checklist}.{item}"))?;
            report(&run, "actions", m, json)?;
        }
    }
    project.save()
}

/// Item states as stored; `open` is the empty string on the wire.
fn wire_state(state: &str) -> &str {
    if state.eq_ignore_ascii_case("open") {
        ""
    } else {
        state
    }
}

/// One keyword trigger with an optional mark-as-done action, or nothing
/// when no keywords are given.
fn build_actions(
    keywords: Vec<String>,
    user_ids: Vec<String>,
    mark_done: bool,
) -> anyhow::Result<Vec<TaskAction>> {
    let keywords: Vec<String> = keywords
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();
    if keywords.is_empty() {
        return Ok(Vec::new());
    }
    let trigger = Trigger::keywords_by_users(&KeywordsByUsersPayload { keywords, user_ids })?;
    let mut actions = Vec::new();
    if mark_done {
        actions.push(Action::mark_item_as_done(true)?);
    }
    Ok(vec![TaskAction::new(trigger, actions)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_maps_to_empty_state() {
        assert_eq!(wire_state("open"), "");
        assert_eq!(wire_state("OPEN"), "");
        assert_eq!(wire_state("closed"), "closed");
    }

    #[test]
    fn keywords_build_one_action() {
        let actions = build_actions(vec!["done".into(), " ".into()], vec![], true).unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].trigger.trigger_type, "keywords_by_users");
        assert_eq!(actions[0].actions[0].action_type, "mark_item_as_done");
        assert!(build_actions(vec![], vec![], true).unwrap().is_empty());
    }
}
