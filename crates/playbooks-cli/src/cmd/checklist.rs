use crate::cmd::report;
use crate::output::print_json;
use crate::project::Project;
use anyhow::Context;
use clap::Subcommand;
use playbooks_core::checklist::{Checklist, ChecklistItem};
use std::path::Path;

#[derive(Subcommand)]
pub enum ChecklistSubcommand {
    /// Append a checklist to a run
    Add {
        run: String,
        #[arg(required = true)]
        title: Vec<String>,
        /// Item title; repeat for several items
        #[arg(long = "item")]
        items: Vec<String>,
    },
    /// Rename a checklist
    Rename {
        run: String,
        checklist: usize,
        #[arg(required = true)]
        title: Vec<String>,
    },
    /// Remove a checklist and its items
    Remove { run: String, checklist: usize },
    /// Move a checklist to another position
    Move {
        run: String,
        checklist: usize,
        dest: usize,
    },
    /// Append a copy of a checklist with fresh ids
    Duplicate { run: String, checklist: usize },
}

pub fn run(root: &Path, subcmd: ChecklistSubcommand, json: bool) -> anyhow::Result<()> {
    let project = Project::open(root)?;
    let service = &project.service;
    match subcmd {
        ChecklistSubcommand::Add { run, title, items } => {
            let mut checklist = Checklist::new(title.join(" "));
            checklist.items = items.into_iter().map(ChecklistItem::new).collect();
            let m = service
                .add_checklist(&run, checklist)
                .with_context(|| format!("failed to add checklist to run '{run}'"))?;
            report(&run, "add_checklist", m, json)?;
        }
        ChecklistSubcommand::Rename {
            run,
            checklist,
            title,
        } => {
            let m = service
                .rename_checklist(&run, checklist, &title.join(" "))
                .with_context(|| format!("failed to rename checklist {checklist}"))?;
            report(&run, "rename_checklist", m, json)?;
        }
        ChecklistSubcommand::Remove { run, checklist } => {
            let removed = service
                .remove_checklist(&run, checklist)
                .with_context(|| format!("failed to remove checklist {checklist}"))?;
            if json {
                print_json(&serde_json::json!({ "run_id": run, "removed": removed }))?;
            } else {
                println!(
                    "Removed checklist '{}' ({} items) from run {run}",
                    removed.title,
                    removed.items.len()
                );
            }
        }
        ChecklistSubcommand::Move {
            run,
            checklist,
            dest,
        } => {
            let m = service
                .move_checklist(&run, checklist, dest)
                .with_context(|| format!("failed to move checklist {checklist} to {dest}"))?;
            report(&run, "move_checklist", m, json)?;
        }
        ChecklistSubcommand::Duplicate { run, checklist } => {
            let m = service
                .duplicate_checklist(&run, checklist)
                .with_context(|| format!("failed to duplicate checklist {checklist}"))?;
            report(&run, "duplicate_checklist", m, json)?;
        }
    }
    project.save()
}
