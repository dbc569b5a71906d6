use crate::error::PlaybooksError;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// RunStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a run, as recorded on the run and on each status post.
///
/// `Unset` only occurs on status posts written before posts carried a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RunStatus {
    #[default]
    #[serde(rename = "")]
    Unset,
    Reported,
    Active,
    InProgress,
    Finished,
    Resolved,
    Archived,
}

impl RunStatus {
    pub fn all() -> &'static [RunStatus] {
        &[
            RunStatus::Reported,
            RunStatus::Active,
            RunStatus::InProgress,
            RunStatus::Finished,
            RunStatus::Resolved,
            RunStatus::Archived,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Unset => "",
            RunStatus::Reported => "Reported",
            RunStatus::Active => "Active",
            RunStatus::InProgress => "InProgress",
            RunStatus::Finished => "Finished",
            RunStatus::Resolved => "Resolved",
            RunStatus::Archived => "Archived",
        }
    }

    /// Resolved and Archived both count as "done" for resolution tracking.
    pub fn is_resolved(self) -> bool {
        matches!(self, RunStatus::Resolved | RunStatus::Archived)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = PlaybooksError;

    /// Parses a status name case-insensitively. The legacy empty status is
    /// never accepted from input.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RunStatus::all()
            .iter()
            .copied()
            .find(|st| st.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| PlaybooksError::InvalidStatus(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// RunType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RunType {
    #[default]
    #[serde(rename = "playbook")]
    Playbook,
    #[serde(rename = "channelChecklist")]
    ChannelChecklist,
}

impl RunType {
    pub fn as_str(self) -> &'static str {
        match self {
            RunType::Playbook => "playbook",
            RunType::ChannelChecklist => "channelChecklist",
        }
    }
}

impl fmt::Display for RunType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunType {
    type Err = PlaybooksError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "playbook" => Ok(RunType::Playbook),
            "channelChecklist" | "channel_checklist" => Ok(RunType::ChannelChecklist),
            _ => Err(PlaybooksError::InvalidRunType(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ChecklistItemState
// ---------------------------------------------------------------------------

/// State of a run checklist item. The zero value is `Open`, serialized as `""`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChecklistItemState {
    #[default]
    #[serde(rename = "")]
    Open,
    #[serde(rename = "in_progress")]
    InProgress,
    #[serde(rename = "closed")]
    Closed,
}

impl ChecklistItemState {
    pub fn all() -> &'static [ChecklistItemState] {
        &[
            ChecklistItemState::Open,
            ChecklistItemState::InProgress,
            ChecklistItemState::Closed,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChecklistItemState::Open => "",
            ChecklistItemState::InProgress => "in_progress",
            ChecklistItemState::Closed => "closed",
        }
    }

    /// Returns true if `s` names one of the three item states.
    pub fn is_valid(s: &str) -> bool {
        Self::all().iter().any(|st| st.as_str() == s)
    }
}

impl fmt::Display for ChecklistItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecklistItemState::Open => f.write_str("open"),
            other => f.write_str(other.as_str()),
        }
    }
}

impl std::str::FromStr for ChecklistItemState {
    type Err = PlaybooksError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "open" => Ok(ChecklistItemState::Open),
            "in_progress" => Ok(ChecklistItemState::InProgress),
            "closed" => Ok(ChecklistItemState::Closed),
            _ => Err(PlaybooksError::InvalidItemState(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// TimelineEventType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineEventType {
    #[serde(rename = "incident_created")]
    RunCreated,
    TaskStateModified,
    StatusUpdated,
    OwnerChanged,
    AssigneeChanged,
    RanSlashCommand,
    EventFromPost,
    UserJoinedLeft,
    PublishedRetrospective,
    CanceledRetrospective,
    RunFinished,
    RunRestored,
}

impl TimelineEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            TimelineEventType::RunCreated => "incident_created",
            TimelineEventType::TaskStateModified => "task_state_modified",
            TimelineEventType::StatusUpdated => "status_updated",
            TimelineEventType::OwnerChanged => "owner_changed",
            TimelineEventType::AssigneeChanged => "assignee_changed",
            TimelineEventType::RanSlashCommand => "ran_slash_command",
            TimelineEventType::EventFromPost => "event_from_post",
            TimelineEventType::UserJoinedLeft => "user_joined_left",
            TimelineEventType::PublishedRetrospective => "published_retrospective",
            TimelineEventType::CanceledRetrospective => "canceled_retrospective",
            TimelineEventType::RunFinished => "run_finished",
            TimelineEventType::RunRestored => "run_restored",
        }
    }
}

impl fmt::Display for TimelineEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SortField
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    CreateAt,
    Id,
    Name,
    OwnerUserId,
    TeamId,
    EndAt,
    Status,
    LastStatusUpdateAt,
    Title,
    Stages,
    Steps,
}

impl SortField {
    /// Sort fields accepted when listing runs.
    pub fn for_runs() -> &'static [SortField] {
        &[
            SortField::CreateAt,
            SortField::Id,
            SortField::Name,
            SortField::OwnerUserId,
            SortField::TeamId,
            SortField::EndAt,
            SortField::Status,
            SortField::LastStatusUpdateAt,
        ]
    }

    /// Sort fields accepted when listing playbooks.
    pub fn for_playbooks() -> &'static [SortField] {
        &[
            SortField::Id,
            SortField::Title,
            SortField::Stages,
            SortField::Steps,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortField::CreateAt => "create_at",
            SortField::Id => "id",
            SortField::Name => "name",
            SortField::OwnerUserId => "owner_user_id",
            SortField::TeamId => "team_id",
            SortField::EndAt => "end_at",
            SortField::Status => "status",
            SortField::LastStatusUpdateAt => "last_status_update_at",
            SortField::Title => "title",
            SortField::Stages => "stages",
            SortField::Steps => "steps",
        }
    }

    /// Looks up `s` (already normalized) within an allow-list.
    pub fn find_in(allowed: &[SortField], s: &str) -> Option<SortField> {
        allowed.iter().copied().find(|f| f.as_str() == s)
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SortField {
    type Err = PlaybooksError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        Self::find_in(Self::for_runs(), &lower)
            .or_else(|| Self::find_in(Self::for_playbooks(), &lower))
            .ok_or_else(|| PlaybooksError::UnsupportedSort(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// SortDirection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SortDirection {
    type Err = PlaybooksError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ASC" => Ok(SortDirection::Asc),
            "DESC" => Ok(SortDirection::Desc),
            _ => Err(PlaybooksError::UnsupportedDirection(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
