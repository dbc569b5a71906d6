pub mod checklist;
pub mod config;
pub mod init;
pub mod item;
pub mod playbook;
pub mod reminder;
pub mod run;

use crate::output::print_json;
use playbooks_core::mutation::Mutation;

/// Output for calls that only say whether the run changed.
pub fn report(run_id: &str, action: &str, m: Mutation, json: bool) -> anyhow::Result<()> {
    if json {
        print_json(&serde_json::json!({
            "run_id": run_id,
            "action": action,
            "applied": m.is_applied(),
            "timestamp": m.timestamp(),
        }))?;
    } else if m.is_applied() {
        println!("Run {run_id}: {action} applied");
    } else {
        println!("Run {run_id}: {action} unchanged");
    }
    Ok(())
}
