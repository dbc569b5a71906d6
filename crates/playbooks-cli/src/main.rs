mod cmd;
mod output;
mod project;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    checklist::ChecklistSubcommand, config::ConfigSubcommand, item::ItemSubcommand,
    playbook::PlaybookSubcommand, reminder::ReminderSubcommand, run::RunSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "playbooks",
    about = "Track playbook runs: checklists, items, status updates and reminders",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .playbooks/)
    #[arg(long, global = true, env = "PLAYBOOKS_ROOT")]
    root: Option<PathBuf>,

    /// Acting user id, recorded on timeline events
    #[arg(long, global = true, env = "PLAYBOOKS_USER", default_value = "")]
    user: String,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize .playbooks/ in the current project
    Init,

    /// Create, inspect and move runs through their lifecycle
    Run {
        #[command(subcommand)]
        subcommand: RunSubcommand,
    },

    /// Manage the checklists of a run
    Checklist {
        #[command(subcommand)]
        subcommand: ChecklistSubcommand,
    },

    /// Manage the items of a run's checklists
    Item {
        #[command(subcommand)]
        subcommand: ItemSubcommand,
    },

    /// Manage playbook templates
    Playbook {
        #[command(subcommand)]
        subcommand: PlaybookSubcommand,
    },

    /// Inspect and fire scheduled reminders
    Reminder {
        #[command(subcommand)]
        subcommand: ReminderSubcommand,
    },

    /// Inspect the project configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    let user = cli.user.as_str();

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root, cli.json),
        Commands::Run { subcommand } => cmd::run::run(&root, user, subcommand, cli.json),
        Commands::Checklist { subcommand } => cmd::checklist::run(&root, subcommand, cli.json),
        Commands::Item { subcommand } => cmd::item::run(&root, user, subcommand, cli.json),
        Commands::Playbook { subcommand } => cmd::playbook::run(&root, subcommand, cli.json),
        Commands::Reminder { subcommand } => cmd::reminder::run(&root, subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
