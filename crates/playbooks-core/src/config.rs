use crate::error::Result;
use crate::filter::PER_PAGE_DEFAULT;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Project settings stored in `.playbooks/config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_per_page")]
    pub per_page_default: usize,
    /// Status reminder scheduled on run creation, in seconds. Zero disables.
    #[serde(default)]
    pub reminder_default_seconds: i64,
    /// Retrospective reminder interval for runs that don't set one.
    #[serde(default)]
    pub retrospective_reminder_interval_seconds: i64,
    /// Report before/after snapshots of every mutated run to the observer.
    #[serde(default = "default_incremental_updates")]
    pub incremental_updates: bool,
}

fn default_per_page() -> usize {
    PER_PAGE_DEFAULT
}

fn default_incremental_updates() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            per_page_default: default_per_page(),
            reminder_default_seconds: 0,
            retrospective_reminder_interval_seconds: 0,
            incremental_updates: default_incremental_updates(),
        }
    }
}

impl Config {
    /// Load from `root`, falling back to defaults when no file exists yet.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.reminder_default_seconds < 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "reminder_default_seconds is negative ({}); reminders will not be scheduled",
                    self.reminder_default_seconds
                ),
            });
        }

        if self.retrospective_reminder_interval_seconds < 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "retrospective_reminder_interval_seconds is negative ({})",
                    self.retrospective_reminder_interval_seconds
                ),
            });
        }

        if self.per_page_default == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!("per_page_default is 0; listing falls back to {PER_PAGE_DEFAULT}"),
            });
        }

        warnings
    }

    /// Page size the front end should ask for when the user gives none.
    pub fn page_size(&self) -> usize {
        if self.per_page_default == 0 {
            PER_PAGE_DEFAULT
        } else {
            self.per_page_default
        }
    }
}
