//! Persistence for runs and playbooks.
//!
//! Stores hand back exactly what they were given: no default-filling and no
//! normalization beyond what serde does on the way in. A missing key is
//! always a not-found error.

use crate::error::{PlaybooksError, Result};
use crate::filter::{page_count, paginate, PlaybookFilterOptions, PlaybookRunFilterOptions};
use crate::io;
use crate::paths;
use crate::playbook::{GetPlaybooksResults, Playbook};
use crate::run::{GetPlaybookRunsResults, PlaybookRun};
use crate::types::{SortDirection, SortField};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

pub trait PlaybookRunStore: Send + Sync {
    fn get_playbook_run(&self, id: &str) -> Result<PlaybookRun>;
    fn create_playbook_run(&self, run: &PlaybookRun) -> Result<()>;
    fn update_playbook_run(&self, run: &PlaybookRun) -> Result<()>;
    fn delete_playbook_run(&self, id: &str) -> Result<()>;
    fn list_playbook_runs(&self) -> Result<Vec<PlaybookRun>>;

    /// Filter, sort and page runs. Options are validated first.
    fn get_playbook_runs(&self, options: &PlaybookRunFilterOptions) -> Result<GetPlaybookRunsResults> {
        query_runs(self.list_playbook_runs()?, options)
    }
}

pub trait PlaybookStore: Send + Sync {
    fn get_playbook(&self, id: &str) -> Result<Playbook>;
    fn create_playbook(&self, playbook: &Playbook) -> Result<()>;
    fn update_playbook(&self, playbook: &Playbook) -> Result<()>;
    fn delete_playbook(&self, id: &str) -> Result<()>;
    fn list_playbooks(&self) -> Result<Vec<Playbook>>;

    /// Sort and page playbooks that have not been deleted.
    fn get_playbooks(&self, options: &PlaybookFilterOptions) -> Result<GetPlaybooksResults> {
        query_playbooks(self.list_playbooks()?, options)
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

fn run_matches(run: &PlaybookRun, o: &PlaybookRunFilterOptions) -> bool {
    if !o.team_id.is_empty() && run.team_id != o.team_id {
        return false;
    }
    if !o.owner_id.is_empty() && run.owner_user_id != o.owner_id {
        return false;
    }
    if !o.member_id.is_empty() && !run.involves(&o.member_id) {
        return false;
    }
    if !o.playbook_id.is_empty() && run.playbook_id != o.playbook_id {
        return false;
    }
    let status = run.current_status.as_str();
    if !o.status.is_empty() && !status.eq_ignore_ascii_case(&o.status) {
        return false;
    }
    if !o.statuses.is_empty() && !o.statuses.iter().any(|s| status.eq_ignore_ascii_case(s)) {
        return false;
    }
    if !o.search_term.is_empty()
        && !run
            .name
            .to_lowercase()
            .contains(&o.search_term.to_lowercase())
    {
        return false;
    }
    // Active in [gte, lt): still open or ended at/after gte, and created before lt.
    if o.active_gte > 0 && run.end_at != 0 && run.end_at < o.active_gte {
        return false;
    }
    if o.active_lt > 0 && run.create_at >= o.active_lt {
        return false;
    }
    if o.started_gte > 0 && run.create_at < o.started_gte {
        return false;
    }
    if o.started_lt > 0 && run.create_at >= o.started_lt {
        return false;
    }
    true
}

fn compare_runs(a: &PlaybookRun, b: &PlaybookRun, field: SortField) -> Ordering {
    let primary = match field {
        SortField::Id => Ordering::Equal,
        SortField::Name => a.name.cmp(&b.name),
        SortField::OwnerUserId => a.owner_user_id.cmp(&b.owner_user_id),
        SortField::TeamId => a.team_id.cmp(&b.team_id),
        SortField::EndAt => a.end_at.cmp(&b.end_at),
        SortField::Status => a.current_status.as_str().cmp(b.current_status.as_str()),
        SortField::LastStatusUpdateAt => a.last_status_update_at.cmp(&b.last_status_update_at),
        _ => a.create_at.cmp(&b.create_at),
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

fn compare_playbooks(a: &Playbook, b: &Playbook, field: SortField) -> Ordering {
    let primary = match field {
        SortField::Title => a.title.cmp(&b.title),
        SortField::Stages => a.num_stages.cmp(&b.num_stages),
        SortField::Steps => a.num_steps.cmp(&b.num_steps),
        _ => Ordering::Equal,
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

fn directed(ordering: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

/// Apply run filter options to an unordered set of runs.
pub fn query_runs(runs: Vec<PlaybookRun>, options: &PlaybookRunFilterOptions) -> Result<GetPlaybookRunsResults> {
    let options = options.validate()?;
    let field = options.sort_field()?;
    let direction = options.sort_direction()?;

    let mut matched: Vec<PlaybookRun> = runs.into_iter().filter(|r| run_matches(r, &options)).collect();
    matched.sort_by(|a, b| directed(compare_runs(a, b, field), direction));

    let per_page = options.per_page as usize;
    let total_count = matched.len();
    let (items, has_more) = paginate(matched, options.page as usize, per_page);
    Ok(GetPlaybookRunsResults {
        total_count,
        page_count: page_count(total_count, per_page),
        has_more,
        items,
    })
}

/// Apply playbook filter options, skipping deleted playbooks.
pub fn query_playbooks(playbooks: Vec<Playbook>, options: &PlaybookFilterOptions) -> Result<GetPlaybooksResults> {
    let options = options.validate()?;
    let field = options.sort_field()?;
    let direction = options.sort_direction()?;

    let mut live: Vec<Playbook> = playbooks.into_iter().filter(|p| !p.is_deleted()).collect();
    live.sort_by(|a, b| directed(compare_playbooks(a, b, field), direction));

    let per_page = options.per_page as usize;
    let total_count = live.len();
    let (items, has_more) = paginate(live, options.page as usize, per_page);
    Ok(GetPlaybooksResults {
        total_count,
        page_count: page_count(total_count, per_page),
        has_more,
        items,
    })
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryStore {
    runs: RwLock<HashMap<String, PlaybookRun>>,
    playbooks: RwLock<HashMap<String, Playbook>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn runs(&self) -> RwLockReadGuard<'_, HashMap<String, PlaybookRun>> {
        self.runs.read().unwrap_or_else(|e| e.into_inner())
    }

    fn runs_mut(&self) -> RwLockWriteGuard<'_, HashMap<String, PlaybookRun>> {
        self.runs.write().unwrap_or_else(|e| e.into_inner())
    }

    fn playbooks(&self) -> RwLockReadGuard<'_, HashMap<String, Playbook>> {
        self.playbooks.read().unwrap_or_else(|e| e.into_inner())
    }

    fn playbooks_mut(&self) -> RwLockWriteGuard<'_, HashMap<String, Playbook>> {
        self.playbooks.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl PlaybookRunStore for MemoryStore {
    fn get_playbook_run(&self, id: &str) -> Result<PlaybookRun> {
        self.runs()
            .get(id)
            .cloned()
            .ok_or_else(|| PlaybooksError::RunNotFound(id.to_string()))
    }

    fn create_playbook_run(&self, run: &PlaybookRun) -> Result<()> {
        self.runs_mut().insert(run.id.clone(), run.clone());
        Ok(())
    }

    fn update_playbook_run(&self, run: &PlaybookRun) -> Result<()> {
        let mut runs = self.runs_mut();
        let slot = runs
            .get_mut(&run.id)
            .ok_or_else(|| PlaybooksError::RunNotFound(run.id.clone()))?;
        *slot = run.clone();
        Ok(())
    }

    fn delete_playbook_run(&self, id: &str) -> Result<()> {
        self.runs_mut()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| PlaybooksError::RunNotFound(id.to_string()))
    }

    fn list_playbook_runs(&self) -> Result<Vec<PlaybookRun>> {
        Ok(self.runs().values().cloned().collect())
    }
}

impl PlaybookStore for MemoryStore {
    fn get_playbook(&self, id: &str) -> Result<Playbook> {
        self.playbooks()
            .get(id)
            .cloned()
            .ok_or_else(|| PlaybooksError::PlaybookNotFound(id.to_string()))
    }

    fn create_playbook(&self, playbook: &Playbook) -> Result<()> {
        self.playbooks_mut()
            .insert(playbook.id.clone(), playbook.clone());
        Ok(())
    }

    fn update_playbook(&self, playbook: &Playbook) -> Result<()> {
        let mut playbooks = self.playbooks_mut();
        let slot = playbooks
            .get_mut(&playbook.id)
            .ok_or_else(|| PlaybooksError::PlaybookNotFound(playbook.id.clone()))?;
        *slot = playbook.clone();
        Ok(())
    }

    fn delete_playbook(&self, id: &str) -> Result<()> {
        self.playbooks_mut()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| PlaybooksError::PlaybookNotFound(id.to_string()))
    }

    fn list_playbooks(&self) -> Result<Vec<Playbook>> {
        Ok(self.playbooks().values().cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// FileStore
// ---------------------------------------------------------------------------

/// One YAML file per run under `.playbooks/runs/` and per playbook under
/// `.playbooks/playbooks/`, written atomically.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create the directory layout under `root` and open a store on it.
    pub fn init(root: &Path) -> Result<Self> {
        io::ensure_dir(&paths::runs_dir(root))?;
        io::ensure_dir(&paths::templates_dir(root))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Open an existing layout. Fails with `NotInitialized` when `root` has
    /// no `.playbooks/` directory.
    pub fn open(root: &Path) -> Result<Self> {
        if !paths::is_initialized(root) {
            return Err(PlaybooksError::NotInitialized);
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run_file(&self, id: &str) -> Option<PathBuf> {
        paths::is_safe_file_stem(id).then(|| paths::run_path(&self.root, id))
    }

    fn playbook_file(&self, id: &str) -> Option<PathBuf> {
        paths::is_safe_file_stem(id).then(|| paths::playbook_path(&self.root, id))
    }

    fn load_all<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "yaml"))
            .collect();
        files.sort();
        files.iter().map(|p| io::read_yaml(p)).collect()
    }
}

impl PlaybookRunStore for FileStore {
    fn get_playbook_run(&self, id: &str) -> Result<PlaybookRun> {
        match self.run_file(id) {
            Some(path) if path.exists() => io::read_yaml(&path),
            _ => Err(PlaybooksError::RunNotFound(id.to_string())),
        }
    }

    fn create_playbook_run(&self, run: &PlaybookRun) -> Result<()> {
        let path = self
            .run_file(&run.id)
            .ok_or_else(|| PlaybooksError::InvalidId {
                field: "id",
                value: run.id.clone(),
            })?;
        io::write_yaml(&path, run)
    }

    fn update_playbook_run(&self, run: &PlaybookRun) -> Result<()> {
        match self.run_file(&run.id) {
            Some(path) if path.exists() => io::write_yaml(&path, run),
            _ => Err(PlaybooksError::RunNotFound(run.id.clone())),
        }
    }

    fn delete_playbook_run(&self, id: &str) -> Result<()> {
        match self.run_file(id) {
            Some(path) if path.exists() => Ok(std::fs::remove_file(path)?),
            _ => Err(PlaybooksError::RunNotFound(id.to_string())),
        }
    }

    fn list_playbook_runs(&self) -> Result<Vec<PlaybookRun>> {
        Self::load_all(&paths::runs_dir(&self.root))
    }
}

impl PlaybookStore for FileStore {
    fn get_playbook(&self, id: &str) -> Result<Playbook> {
        match self.playbook_file(id) {
            Some(path) if path.exists() => io::read_yaml(&path),
            _ => Err(PlaybooksError::PlaybookNotFound(id.to_string())),
        }
    }

    fn create_playbook(&self, playbook: &Playbook) -> Result<()> {
        let path = self
            .playbook_file(&playbook.id)
            .ok_or_else(|| PlaybooksError::InvalidId {
                field: "id",
                value: playbook.id.clone(),
            })?;
        io::write_yaml(&path, playbook)
    }

    fn update_playbook(&self, playbook: &Playbook) -> Result<()> {
        match self.playbook_file(&playbook.id) {
            Some(path) if path.exists() => io::write_yaml(&path, playbook),
            _ => Err(PlaybooksError::PlaybookNotFound(playbook.id.clone())),
        }
    }

    fn delete_playbook(&self, id: &str) -> Result<()> {
        match self.playbook_file(id) {
            Some(path) if path.exists() => Ok(std::fs::remove_file(path)?),
            _ => Err(PlaybooksError::PlaybookNotFound(id.to_string())),
        }
    }

    fn list_playbooks(&self) -> Result<Vec<Playbook>> {
        Self::load_all(&paths::templates_dir(&self.root))
    }
}
