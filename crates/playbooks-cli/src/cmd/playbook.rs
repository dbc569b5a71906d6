use crate::output::{format_millis, print_json, print_table};
use crate::project::Project;
use anyhow::Context;
use clap::Subcommand;
use playbooks_core::{
    filter::PlaybookFilterOptions,
    playbook::{Playbook, PlaybookChecklist},
};
use std::path::Path;

#[derive(Subcommand)]
pub enum PlaybookSubcommand {
    /// Create a playbook template
    Create {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "")]
        team: String,
        /// Checklist as "Title:first item,second item"; repeat for several
        #[arg(long = "checklist")]
        checklists: Vec<String>,
        /// Seconds until the first status reminder of each run
        #[arg(long, default_value = "0")]
        reminder: i64,
        /// Seconds between retrospective reminders once a run finishes
        #[arg(long, default_value = "0")]
        retro_interval: i64,
        /// Users invited to every run, comma-separated
        #[arg(long, value_delimiter = ',')]
        invite: Vec<String>,
    },
    /// List playbooks
    List {
        /// id, title, stages or steps
        #[arg(long, default_value = "")]
        sort: String,
        #[arg(long, default_value = "")]
        direction: String,
        #[arg(long, default_value = "0")]
        page: i64,
        #[arg(long)]
        per_page: Option<i64>,
    },
    /// Show a playbook and its template checklists
    Show { id: String },
}

pub fn run(root: &Path, subcmd: PlaybookSubcommand, json: bool) -> anyhow::Result<()> {
    let project = Project::open(root)?;
    match subcmd {
        PlaybookSubcommand::Create {
            title,
            description,
            team,
            checklists,
            reminder,
            retro_interval,
            invite,
        } => {
            let template = Playbook {
                title,
                description,
                team_id: team,
                checklists: checklists.iter().map(|s| PlaybookChecklist::parse_spec(s)).collect(),
                reminder_timer_default_seconds: reminder,
                retrospective_reminder_interval_seconds: retro_interval,
                invited_user_ids: invite,
                ..Playbook::default()
            };
            create(&project, template, json)
        }
        PlaybookSubcommand::List {
            sort,
            direction,
            page,
            per_page,
        } => {
            let options = PlaybookFilterOptions {
                sort,
                direction,
                page,
                per_page: per_page.unwrap_or(project.service.config().page_size() as i64),
            };
            list(&project, &options, json)
        }
        PlaybookSubcommand::Show { id } => show(&project, &id, json),
    }
}

fn create(project: &Project, template: Playbook, json: bool) -> anyhow::Result<()> {
    let title = template.title.clone();
    let playbook = project
        .service
        .create_playbook_from(template)
        .with_context(|| format!("failed to create playbook '{title}'"))?;

    if json {
        print_json(&playbook)?;
    } else {
        println!(
            "Created playbook [{}]: {} ({} checklists, {} items)",
            playbook.id, playbook.title, playbook.num_stages, playbook.num_steps
        );
    }
    Ok(())
}

fn list(project: &Project, options: &PlaybookFilterOptions, json: bool) -> anyhow::Result<()> {
    let results = project
        .service
        .get_playbooks(options)
        .context("failed to list playbooks")?;

    if json {
        print_json(&results)?;
        return Ok(());
    }
    if results.items.is_empty() {
        println!("No playbooks.");
        return Ok(());
    }
    let rows: Vec<Vec<String>> = results
        .items
        .iter()
        .map(|p| {
            vec![
                p.id.clone(),
                p.title.clone(),
                p.num_stages.to_string(),
                p.num_steps.to_string(),
                p.num_runs.to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "TITLE", "STAGES", "STEPS", "RUNS"], rows);
    Ok(())
}

fn show(project: &Project, id: &str, json: bool) -> anyhow::Result<()> {
    let playbook = project
        .service
        .get_playbook(id)
        .with_context(|| format!("playbook '{id}' not found"))?;

    if json {
        print_json(&playbook)?;
        return Ok(());
    }

    println!("Playbook: {} [{}]", playbook.title, playbook.id);
    println!("Created:  {}", format_millis(playbook.create_at));
    println!("Runs:     {} (last {})", playbook.num_runs, format_millis(playbook.last_run_at));
    if playbook.reminder_timer_default_seconds > 0 {
        println!("Reminder: every {}s", playbook.reminder_timer_default_seconds);
    }
    if !playbook.description.is_empty() {
        println!("\n{}", playbook.description);
    }
    for (c, checklist) in playbook.checklists.iter().enumerate() {
        println!("\n{c}. {}", checklist.title);
        for (i, item) in checklist.items.iter().enumerate() {
            println!("   {c}.{i} {}", item.title);
        }
    }
    Ok(())
}
