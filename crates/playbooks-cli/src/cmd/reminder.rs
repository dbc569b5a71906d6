use crate::cmd::report;
use crate::output::{format_millis, print_json, print_table};
use crate::project::Project;
use anyhow::Context;
use clap::Subcommand;
use playbooks_core::{
    clock::{Clock, SystemClock},
    scheduler::JobOnceScheduler,
    service::ReminderOutcome,
};
use std::path::Path;

#[derive(Subcommand)]
pub enum ReminderSubcommand {
    /// List pending reminders
    List,
    /// Replace a run's status reminder (0 cancels it)
    Set {
        run: String,
        #[arg(allow_negative_numbers = true)]
        seconds: i64,
    },
    /// Cancel a run's status reminder
    Clear { run: String },
    /// Fire every reminder that is due
    Tick {
        /// Treat this epoch-millisecond instant as now
        #[arg(long)]
        now: Option<i64>,
    },
}

pub fn run(root: &Path, subcmd: ReminderSubcommand, json: bool) -> anyhow::Result<()> {
    let project = Project::open(root)?;
    match subcmd {
        ReminderSubcommand::List => list(&project, json)?,
        ReminderSubcommand::Set { run, seconds } => {
            let m = project
                .service
                .set_new_reminder(&run, seconds)
                .with_context(|| format!("failed to set reminder for run '{run}'"))?;
            report(&run, "reminder", m, json)?;
        }
        ReminderSubcommand::Clear { run } => {
            project.service.remove_reminder(&run);
            if json {
                print_json(&serde_json::json!({ "run_id": run, "cleared": true }))?;
            } else {
                println!("Cleared reminder for run {run}");
            }
        }
        ReminderSubcommand::Tick { now } => {
            tick(&project, now.unwrap_or_else(|| SystemClock.now_millis()), json)?
        }
    }
    project.save()
}

fn list(project: &Project, json: bool) -> anyhow::Result<()> {
    let jobs = project.scheduler().list_scheduled();
    if json {
        print_json(&jobs)?;
        return Ok(());
    }
    if jobs.is_empty() {
        println!("No pending reminders.");
        return Ok(());
    }
    let rows: Vec<Vec<String>> = jobs
        .iter()
        .map(|j| vec![j.key.clone(), format_millis(j.run_at)])
        .collect();
    print_table(&["KEY", "DUE"], rows);
    Ok(())
}

/// Take every job due at `now` and let the service decide what it means,
/// as of `now`. A reminder whose run has vanished is reported as skipped.
fn tick(project: &Project, now: i64, json: bool) -> anyhow::Result<()> {
    let due = project.scheduler().take_due(now);
    let mut outcomes = Vec::with_capacity(due.len());
    for job in due {
        let outcome = match project.service.handle_reminder_at(&job.key, now) {
            Ok(outcome) => outcome,
            Err(e) if e.is_not_found() => {
                tracing::warn!(key = %job.key, "reminder for a missing run");
                ReminderOutcome::Skipped {
                    key: job.key,
                    reason: e.to_string(),
                }
            }
            Err(e) => return Err(e).with_context(|| format!("reminder '{}' failed", job.key)),
        };
        outcomes.push(outcome);
    }

    if json {
        print_json(&outcomes)?;
        return Ok(());
    }
    if outcomes.is_empty() {
        println!("No reminders due.");
        return Ok(());
    }
    for outcome in &outcomes {
        match outcome {
            ReminderOutcome::StatusUpdateDue {
                run_id,
                owner_user_id,
                ..
            } => println!("Run {run_id}: status update due from {owner_user_id}"),
            ReminderOutcome::RetrospectiveDue {
                run_id,
                next_reminder_at,
            } => match next_reminder_at {
                Some(at) => println!(
                    "Run {run_id}: retrospective due (next reminder {})",
                    format_millis(*at)
                ),
                None => println!("Run {run_id}: retrospective due"),
            },
            ReminderOutcome::Skipped { key, reason } => println!("Skipped {key}: {reason}"),
        }
    }
    Ok(())
}
