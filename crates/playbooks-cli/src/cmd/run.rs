use crate::cmd::report;
use crate::output::{format_millis, or_dash, print_json, print_table};
use crate::project::Project;
use anyhow::Context;
use clap::Subcommand;
use playbooks_core::{
    filter::PlaybookRunFilterOptions,
    run::{NewRun, PlaybookRun, TimelineEvent},
    service::StatusUpdateOptions,
    types::{ChecklistItemState, TimelineEventType},
};
use std::path::Path;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum RunSubcommand {
    /// Start a run, standalone or from a playbook
    Create {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Owner user id (default: the acting user)
        #[arg(long)]
        owner: Option<String>,
        #[arg(long, default_value = "")]
        team: String,
        #[arg(long, default_value = "")]
        channel: String,
        /// Playbook id to copy checklists and defaults from
        #[arg(long)]
        playbook: Option<String>,
    },
    /// List runs matching the given filters
    List(ListArgs),
    /// Show a run with its checklists
    Show { id: String },
    /// Post a status update
    Status {
        id: String,
        /// Reported, Active, InProgress, Finished, Resolved or Archived
        status: String,
        #[arg(long, default_value = "")]
        message: String,
        /// Seconds until the next status reminder (0 = none)
        #[arg(long, default_value = "0")]
        reminder: i64,
    },
    /// Soft-delete a status post
    RemovePost { id: String, post_id: String },
    /// Finish a run
    Finish { id: String },
    /// Bring a finished run back in progress
    Restore { id: String },
    /// Delete a run and its pending reminders
    Delete { id: String },
    /// Print when the run was resolved (0 = not resolved)
    ResolvedAt { id: String },
    /// Hand the run to another owner
    Owner { id: String, owner: String },
    /// Publish the retrospective text
    Retro {
        id: String,
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Cancel the retrospective
    CancelRetro { id: String },
    /// Show the visible timeline
    Timeline { id: String },
    /// Add a timeline event from a post
    Event {
        id: String,
        #[arg(required = true)]
        summary: Vec<String>,
        #[arg(long, default_value = "")]
        post: String,
        /// Opaque JSON details
        #[arg(long, default_value = "")]
        details: String,
    },
    /// Soft-delete a timeline event
    RemoveEvent { id: String, event_id: String },
}

#[derive(clap::Args)]
pub struct ListArgs {
    #[arg(long, default_value = "")]
    team: String,
    #[arg(long, default_value = "")]
    owner: String,
    /// Owner or participant
    #[arg(long, default_value = "")]
    member: String,
    /// Current status; repeat to match any of several
    #[arg(long = "status")]
    statuses: Vec<String>,
    /// Case-insensitive substring of the run name
    #[arg(long, default_value = "")]
    search: String,
    #[arg(long, default_value = "")]
    playbook: String,
    #[arg(long, default_value = "")]
    sort: String,
    #[arg(long, default_value = "")]
    direction: String,
    #[arg(long, default_value = "0")]
    page: i64,
    /// Page size (default: config per_page_default)
    #[arg(long)]
    per_page: Option<i64>,
    #[arg(long, default_value = "0")]
    active_gte: i64,
    #[arg(long, default_value = "0")]
    active_lt: i64,
    #[arg(long, default_value = "0")]
    started_gte: i64,
    #[arg(long, default_value = "0")]
    started_lt: i64,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(root: &Path, user: &str, subcmd: RunSubcommand, json: bool) -> anyhow::Result<()> {
    let project = Project::open(root)?;
    match subcmd {
        RunSubcommand::Create {
            name,
            description,
            owner,
            team,
            channel,
            playbook,
        } => {
            let new = NewRun {
                name,
                description,
                owner_user_id: owner.unwrap_or_else(|| user.to_string()),
                reporter_user_id: user.to_string(),
                team_id: team,
                channel_id: channel,
            };
            create(&project, new, playbook.as_deref(), json)?
        }
        RunSubcommand::List(args) => list(&project, args, json)?,
        RunSubcommand::Show { id } => show(&project, &id, json)?,
        RunSubcommand::Status {
            id,
            status,
            message,
            reminder,
        } => {
            let options = StatusUpdateOptions {
                status,
                message,
                reminder,
            };
            update_status(&project, &id, user, options, json)?
        }
        RunSubcommand::RemovePost { id, post_id } => {
            let m = project
                .service
                .remove_status_post(&id, &post_id)
                .with_context(|| format!("failed to remove status post '{post_id}'"))?;
            report(&id, "remove_post", m, json)?
        }
        RunSubcommand::Finish { id } => {
            let m = project
                .service
                .finish_run(&id, user)
                .with_context(|| format!("failed to finish run '{id}'"))?;
            report(&id, "finish", m, json)?
        }
        RunSubcommand::Delete { id } => {
            project
                .service
                .delete_run(&id)
                .with_context(|| format!("failed to delete run '{id}'"))?;
            if json {
                print_json(&serde_json::json!({ "run_id": id, "deleted": true }))?;
            } else {
                println!("Deleted run {id}");
            }
        }
        RunSubcommand::Restore { id } => {
            let m = project
                .service
                .restore_run(&id, user)
                .with_context(|| format!("failed to restore run '{id}'"))?;
            report(&id, "restore", m, json)?
        }
        RunSubcommand::ResolvedAt { id } => resolved_at(&project, &id, json)?,
        RunSubcommand::Owner { id, owner } => {
            let m = project
                .service
                .change_owner(&id, user, &owner)
                .with_context(|| format!("failed to change owner of run '{id}'"))?;
            report(&id, "owner", m, json)?
        }
        RunSubcommand::Retro { id, text } => {
            let m = project
                .service
                .publish_retrospective(&id, user, &text.join(" "))
                .with_context(|| format!("failed to publish retrospective for '{id}'"))?;
            report(&id, "retro", m, json)?
        }
        RunSubcommand::CancelRetro { id } => {
            let m = project
                .service
                .cancel_retrospective(&id, user)
                .with_context(|| format!("failed to cancel retrospective for '{id}'"))?;
            report(&id, "cancel_retro", m, json)?
        }
        RunSubcommand::Timeline { id } => timeline(&project, &id, json)?,
        RunSubcommand::Event {
            id,
            summary,
            post,
            details,
        } => add_event(&project, &id, user, &summary.join(" "), &post, &details, json)?,
        RunSubcommand::RemoveEvent { id, event_id } => {
            let m = project
                .service
                .remove_timeline_event(&id, &event_id)
                .with_context(|| format!("failed to remove event '{event_id}'"))?;
            report(&id, "remove_event", m, json)?
        }
    }
    project.save()
}

// ---------------------------------------------------------------------------
// create / list / show
// ---------------------------------------------------------------------------

fn create(project: &Project, new: NewRun, playbook: Option<&str>, json: bool) -> anyhow::Result<()> {
    let name = new.name.clone();
    let run = project
        .service
        .create_run(new, playbook)
        .with_context(|| format!("failed to create run '{name}'"))?;

    if json {
        print_json(&run)?;
    } else {
        println!("Created run [{}]: {}", run.id, run.name);
        for (i, checklist) in run.checklists.iter().enumerate() {
            println!("  {i}. {} ({} items)", checklist.title, checklist.items.len());
        }
    }
    Ok(())
}

fn list(project: &Project, args: ListArgs, json: bool) -> anyhow::Result<()> {
    let options = PlaybookRunFilterOptions {
        team_id: args.team,
        page: args.page,
        per_page: args
            .per_page
            .unwrap_or(project.service.config().page_size() as i64),
        sort: args.sort,
        direction: args.direction,
        status: String::new(),
        statuses: args.statuses,
        owner_id: args.owner,
        member_id: args.member,
        search_term: args.search,
        playbook_id: args.playbook,
        active_gte: args.active_gte,
        active_lt: args.active_lt,
        started_gte: args.started_gte,
        started_lt: args.started_lt,
    };
    let results = project.service.get_runs(&options).context("failed to list runs")?;

    if json {
        print_json(&results)?;
        return Ok(());
    }

    if results.items.is_empty() {
        println!("No runs.");
        return Ok(());
    }
    let rows: Vec<Vec<String>> = results
        .items
        .iter()
        .map(|r| {
            vec![
                r.id.clone(),
                r.name.clone(),
                r.current_status.to_string(),
                or_dash(&r.owner_user_id),
                format_millis(r.create_at),
            ]
        })
        .collect();
    print_table(&["ID", "NAME", "STATUS", "OWNER", "CREATED"], rows);
    if results.has_more {
        println!(
            "\n{} of {} runs shown (page {} of {})",
            results.items.len(),
            results.total_count,
            options.page.max(0) + 1,
            results.page_count
        );
    }
    Ok(())
}

fn show(project: &Project, id: &str, json: bool) -> anyhow::Result<()> {
    let run = project
        .service
        .get_run(id)
        .with_context(|| format!("run '{id}' not found"))?;

    if json {
        print_json(&run)?;
        return Ok(());
    }
    print_run(&run);
    Ok(())
}

fn print_run(run: &PlaybookRun) {
    println!("Run:      {} [{}]", run.name, run.id);
    println!("Status:   {}", run.current_status);
    println!("Type:     {}", run.run_type);
    println!("Owner:    {}", or_dash(&run.owner_user_id));
    if !run.playbook_id.is_empty() {
        println!("Playbook: {}", run.playbook_id);
    }
    println!("Created:  {}", format_millis(run.create_at));
    println!("Updated:  {}", format_millis(run.update_at));
    if run.end_at != 0 {
        println!("Ended:    {}", format_millis(run.end_at));
    }
    let resolved = run.resolved_at();
    if resolved != 0 {
        println!("Resolved: {}", format_millis(resolved));
    }
    if !run.description.is_empty() {
        println!("\n{}", run.description);
    }

    for (c, checklist) in run.checklists.iter().enumerate() {
        println!("\n{c}. {} ({})", checklist.title, checklist.summarize());
        for (i, item) in checklist.items.iter().enumerate() {
            let mark = match item.state {
                ChecklistItemState::Closed => "x",
                ChecklistItemState::InProgress => "~",
                ChecklistItemState::Open => " ",
            };
            let mut line = format!("   {c}.{i} [{mark}] {}", item.title);
            if let Some(assignee) = item.assignee() {
                line.push_str(&format!(" @{assignee}"));
            }
            if let Some(command) = item.command() {
                line.push_str(&format!(" `{command}`"));
            }
            if let Some(due) = item.due() {
                line.push_str(&format!(" due {}", format_millis(due)));
            }
            println!("{line}");
        }
    }
}

// ---------------------------------------------------------------------------
// status / resolved-at
// ---------------------------------------------------------------------------

fn update_status(
    project: &Project,
    id: &str,
    user: &str,
    options: StatusUpdateOptions,
    json: bool,
) -> anyhow::Result<()> {
    let post = project
        .service
        .update_status(id, user, options)
        .with_context(|| format!("failed to update status of run '{id}'"))?;

    if json {
        print_json(&serde_json::json!({ "run_id": id, "post": post }))?;
    } else {
        println!("Run {id}: status {} [{}]", post.status, post.id);
    }
    Ok(())
}

fn resolved_at(project: &Project, id: &str, json: bool) -> anyhow::Result<()> {
    let at = project
        .service
        .resolved_at(id)
        .with_context(|| format!("run '{id}' not found"))?;

    if json {
        print_json(&serde_json::json!({ "run_id": id, "resolved_at": at }))?;
    } else if at == 0 {
        println!("Run {id} is not resolved");
    } else {
        println!("Run {id} resolved at {} ({at})", format_millis(at));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// timeline
// ---------------------------------------------------------------------------

fn timeline(project: &Project, id: &str, json: bool) -> anyhow::Result<()> {
    let run = project
        .service
        .get_run(id)
        .with_context(|| format!("run '{id}' not found"))?;
    let events: Vec<&TimelineEvent> = run.visible_timeline().collect();

    if json {
        print_json(&events)?;
        return Ok(());
    }
    if events.is_empty() {
        println!("No timeline events.");
        return Ok(());
    }
    let rows: Vec<Vec<String>> = events
        .iter()
        .map(|e| {
            vec![
                e.id.clone(),
                format_millis(e.event_at),
                e.event_type.to_string(),
                e.summary.clone(),
            ]
        })
        .collect();
    print_table(&["ID", "AT", "TYPE", "SUMMARY"], rows);
    Ok(())
}

fn add_event(
    project: &Project,
    id: &str,
    user: &str,
    summary: &str,
    post: &str,
    details: &str,
    json: bool,
) -> anyhow::Result<()> {
    let event = TimelineEvent::new(id, TimelineEventType::EventFromPost, 0)
        .summary(summary)
        .details(details)
        .post(post)
        .creator(user);
    let event = project
        .service
        .add_timeline_event(id, event)
        .with_context(|| format!("failed to add event to run '{id}'"))?;

    if json {
        print_json(&event)?;
    } else {
        println!("Added event [{}]: {}", event.id, event.summary);
    }
    Ok(())
}
