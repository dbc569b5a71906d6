use anyhow::Context;
use playbooks_core::{
    clock::SystemClock,
    config::Config,
    paths,
    scheduler::MemoryScheduler,
    service::PlaybookRunService,
    store::FileStore,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An opened project: the file store, the persisted reminder queue and a
/// service wired over both.
pub struct Project {
    root: PathBuf,
    scheduler: Arc<MemoryScheduler>,
    pub service: PlaybookRunService,
}

impl Project {
    pub fn open(root: &Path) -> anyhow::Result<Self> {
        let store = Arc::new(
            FileStore::open(root)
                .with_context(|| format!("failed to open project at {}", root.display()))?,
        );
        let config = Config::load(root).context("failed to load config")?;
        let scheduler = Arc::new(
            MemoryScheduler::load(&paths::jobs_path(root)).context("failed to load reminders")?,
        );
        let service = PlaybookRunService::new(
            store.clone(),
            store,
            scheduler.clone(),
            Arc::new(SystemClock),
            config,
        );
        Ok(Self {
            root: root.to_path_buf(),
            scheduler,
            service,
        })
    }

    pub fn scheduler(&self) -> &MemoryScheduler {
        &self.scheduler
    }

    /// Persist the reminder queue. Call after every command that may have
    /// scheduled or cancelled a job.
    pub fn save(&self) -> anyhow::Result<()> {
        self.scheduler
            .save(&paths::jobs_path(&self.root))
            .context("failed to save reminders")
    }
}
