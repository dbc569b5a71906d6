//! Query options for listing runs and playbooks.
//!
//! Options are plain values. `validate` never touches its receiver: it
//! returns a normalized copy, or an error with the original left as it was.

use crate::error::{PlaybooksError, Result};
use crate::id::validate_optional_id;
use crate::types::{SortDirection, SortField};
use serde::{Deserialize, Serialize};

/// Page size used when the caller asks for zero or fewer items per page.
pub const PER_PAGE_DEFAULT: usize = 1000;

fn normalize_per_page(per_page: i64) -> i64 {
    if per_page <= 0 {
        PER_PAGE_DEFAULT as i64
    } else {
        per_page
    }
}

/// Lower-case `sort` and match it against `allowed`. Empty picks `default`.
fn normalize_sort(sort: &str, allowed: &[SortField], default: SortField) -> Result<String> {
    let lower = sort.to_lowercase();
    if lower.is_empty() {
        return Ok(default.as_str().to_string());
    }
    SortField::find_in(allowed, &lower)
        .map(|f| f.as_str().to_string())
        .ok_or(PlaybooksError::UnsupportedSort(lower))
}

/// Upper-case `direction` and match it against ASC/DESC. Empty is ASC.
fn normalize_direction(direction: &str) -> Result<String> {
    if direction.is_empty() {
        return Ok(SortDirection::Asc.as_str().to_string());
    }
    let parsed: SortDirection = direction.parse()?;
    Ok(parsed.as_str().to_string())
}

/// Number of pages needed for `total` items at `per_page` each.
pub fn page_count(total: usize, per_page: usize) -> usize {
    if per_page == 0 {
        return 0;
    }
    total.div_ceil(per_page)
}

/// Slice out page `page` (zero-based) of `items`.
pub fn paginate<T>(items: Vec<T>, page: usize, per_page: usize) -> (Vec<T>, bool) {
    let total = items.len();
    let start = page.saturating_mul(per_page).min(total);
    let end = start.saturating_add(per_page).min(total);
    let has_more = end < total;
    let page_items = items.into_iter().skip(start).take(end - start).collect();
    (page_items, has_more)
}

// ---------------------------------------------------------------------------
// PlaybookFilterOptions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybookFilterOptions {
    pub sort: String,
    pub direction: String,
    pub page: i64,
    pub per_page: i64,
}

impl PlaybookFilterOptions {
    /// Normalized copy: sort defaults to `id`, direction to `ASC`, and a
    /// non-positive page size to [`PER_PAGE_DEFAULT`].
    pub fn validate(&self) -> Result<Self> {
        let mut options = self.clone();
        options.per_page = normalize_per_page(options.per_page);
        options.page = options.page.max(0);
        options.sort = normalize_sort(&options.sort, SortField::for_playbooks(), SortField::Id)?;
        options.direction = normalize_direction(&options.direction)?;
        Ok(options)
    }

    /// Parsed sort field. Call on validated options.
    pub fn sort_field(&self) -> Result<SortField> {
        SortField::find_in(SortField::for_playbooks(), &self.sort)
            .ok_or_else(|| PlaybooksError::UnsupportedSort(self.sort.clone()))
    }

    pub fn sort_direction(&self) -> Result<SortDirection> {
        self.direction.parse()
    }
}

// ---------------------------------------------------------------------------
// PlaybookRunFilterOptions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybookRunFilterOptions {
    pub team_id: String,
    pub page: i64,
    pub per_page: i64,
    pub sort: String,
    pub direction: String,
    /// Current status to match exactly.
    pub status: String,
    /// Any of these current statuses.
    pub statuses: Vec<String>,
    pub owner_id: String,
    /// Owner or participant.
    pub member_id: String,
    pub search_term: String,
    pub playbook_id: String,
    /// Zero means unset for every time bound.
    pub active_gte: i64,
    pub active_lt: i64,
    pub started_gte: i64,
    pub started_lt: i64,
}

impl PlaybookRunFilterOptions {
    /// Normalized copy. Sort defaults to `create_at`, direction to `ASC`,
    /// negative time bounds are clamped to zero, and non-blank id filters
    /// must be well-formed.
    pub fn validate(&self) -> Result<Self> {
        let mut options = self.clone();
        options.per_page = normalize_per_page(options.per_page);
        options.page = options.page.max(0);
        options.sort = normalize_sort(&options.sort, SortField::for_runs(), SortField::CreateAt)?;
        options.direction = normalize_direction(&options.direction)?;

        validate_optional_id("team_id", &options.team_id)?;
        validate_optional_id("owner_id", &options.owner_id)?;
        validate_optional_id("member_id", &options.member_id)?;
        validate_optional_id("playbook_id", &options.playbook_id)?;

        options.active_gte = options.active_gte.max(0);
        options.active_lt = options.active_lt.max(0);
        options.started_gte = options.started_gte.max(0);
        options.started_lt = options.started_lt.max(0);
        Ok(options)
    }

    pub fn sort_field(&self) -> Result<SortField> {
        SortField::find_in(SortField::for_runs(), &self.sort)
            .ok_or_else(|| PlaybooksError::UnsupportedSort(self.sort.clone()))
    }

    pub fn sort_direction(&self) -> Result<SortDirection> {
        self.direction.parse()
    }
}
