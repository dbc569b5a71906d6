use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const PLAYBOOKS_DIR: &str = ".playbooks";
pub const RUNS_DIR: &str = ".playbooks/runs";
pub const TEMPLATES_DIR: &str = ".playbooks/playbooks";

pub const CONFIG_FILE: &str = ".playbooks/config.yaml";
pub const JOBS_FILE: &str = ".playbooks/jobs.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn playbooks_dir(root: &Path) -> PathBuf {
    root.join(PLAYBOOKS_DIR)
}

pub fn runs_dir(root: &Path) -> PathBuf {
    root.join(RUNS_DIR)
}

pub fn run_path(root: &Path, id: &str) -> PathBuf {
    runs_dir(root).join(format!("{id}.yaml"))
}

pub fn templates_dir(root: &Path) -> PathBuf {
    root.join(TEMPLATES_DIR)
}

pub fn playbook_path(root: &Path, id: &str) -> PathBuf {
    templates_dir(root).join(format!("{id}.yaml"))
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn jobs_path(root: &Path) -> PathBuf {
    root.join(JOBS_FILE)
}

pub fn is_initialized(root: &Path) -> bool {
    playbooks_dir(root).is_dir()
}

// ---------------------------------------------------------------------------
// File names
// ---------------------------------------------------------------------------

static STEM_RE: OnceLock<Regex> = OnceLock::new();

fn stem_re() -> &'static Regex {
    STEM_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").unwrap())
}

/// Ids double as file stems; reject anything that could escape the
/// directory it is joined onto.
pub fn is_safe_file_stem(id: &str) -> bool {
    stem_re().is_match(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_under_root() {
        let root = Path::new("/proj");
        assert_eq!(run_path(root, "abc"), PathBuf::from("/proj/.playbooks/runs/abc.yaml"));
        assert_eq!(
            playbook_path(root, "p1"),
            PathBuf::from("/proj/.playbooks/playbooks/p1.yaml")
        );
        assert_eq!(config_path(root), PathBuf::from("/proj/.playbooks/config.yaml"));
        assert_eq!(jobs_path(root), PathBuf::from("/proj/.playbooks/jobs.yaml"));
    }

    #[test]
    fn file_stems() {
        assert!(is_safe_file_stem("q3fp9k1mxbgydcdyo7k7a1r5ge"));
        assert!(is_safe_file_stem("run-1"));
        assert!(!is_safe_file_stem("../etc/passwd"));
        assert!(!is_safe_file_stem(""));
        assert!(!is_safe_file_stem("a/b"));
    }
}
