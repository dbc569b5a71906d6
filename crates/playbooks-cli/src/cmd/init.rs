use crate::output::print_json;
use anyhow::Context;
use playbooks_core::{config::Config, io, paths, store::FileStore};
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    if !json {
        println!("Initializing playbooks in: {}", root.display());
    }

    FileStore::init(root).context("failed to create .playbooks/")?;

    let config_path = paths::config_path(root);
    let created_config = !config_path.exists();
    if created_config {
        Config::default().save(root).context("failed to write config.yaml")?;
    }

    let created_jobs = io::write_if_missing(&paths::jobs_path(root), b"[]\n")
        .context("failed to write jobs.yaml")?;

    if json {
        print_json(&serde_json::json!({
            "root": root.display().to_string(),
            "created_config": created_config,
            "created_jobs": created_jobs,
        }))?;
        return Ok(());
    }

    let mark = |created: bool| if created { "created:" } else { "exists: " };
    println!("  {} {}", mark(created_config), paths::CONFIG_FILE);
    println!("  {} {}", mark(created_jobs), paths::JOBS_FILE);
    println!("\nNext: playbooks run create --name \"...\"");
    Ok(())
}
