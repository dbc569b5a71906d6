use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlaybooksError {
    #[error("not initialized: run 'playbooks init'")]
    NotInitialized,

    #[error("playbook run not found: {0}")]
    RunNotFound(String),

    #[error("playbook not found: {0}")]
    PlaybookNotFound(String),

    #[error("checklist not found: index {0}")]
    ChecklistNotFound(usize),

    #[error("checklist item not found: checklist {checklist}, item {item}")]
    ChecklistItemNotFound { checklist: usize, item: usize },

    #[error("timeline event not found: {0}")]
    TimelineEventNotFound(String),

    #[error("status post not found: {0}")]
    StatusPostNotFound(String),

    #[error("checklist item has no command: checklist {checklist}, item {item}")]
    MissingCommand { checklist: usize, item: usize },

    #[error("{0} title must not be empty")]
    EmptyTitle(&'static str),

    #[error("invalid destination: {0}")]
    InvalidDestination(String),

    #[error("invalid checklist item state '{0}'")]
    InvalidItemState(String),

    #[error("invalid run status '{0}'")]
    InvalidStatus(String),

    #[error("invalid run type '{0}'")]
    InvalidRunType(String),

    #[error("unsupported sort '{0}'")]
    UnsupportedSort(String),

    #[error("unsupported direction '{0}'")]
    UnsupportedDirection(String),

    #[error("bad parameter '{field}': must be 26 characters or blank")]
    InvalidId { field: &'static str, value: String },

    #[error("invalid reminder: {0} seconds")]
    InvalidReminder(i64),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("scheduler error: {0}")]
    Scheduler(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Coarse classification callers use to map errors onto responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    Internal,
}

impl PlaybooksError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlaybooksError::RunNotFound(_)
            | PlaybooksError::PlaybookNotFound(_)
            | PlaybooksError::ChecklistNotFound(_)
            | PlaybooksError::ChecklistItemNotFound { .. }
            | PlaybooksError::TimelineEventNotFound(_)
            | PlaybooksError::StatusPostNotFound(_) => ErrorKind::NotFound,
            PlaybooksError::InvalidDestination(_)
            | PlaybooksError::MissingCommand { .. }
            | PlaybooksError::EmptyTitle(_)
            | PlaybooksError::InvalidItemState(_)
            | PlaybooksError::InvalidStatus(_)
            | PlaybooksError::InvalidRunType(_)
            | PlaybooksError::UnsupportedSort(_)
            | PlaybooksError::UnsupportedDirection(_)
            | PlaybooksError::InvalidId { .. }
            | PlaybooksError::InvalidReminder(_)
            | PlaybooksError::InvalidConfig(_) => ErrorKind::InvalidArgument,
            PlaybooksError::NotInitialized
            | PlaybooksError::Scheduler(_)
            | PlaybooksError::Io(_)
            | PlaybooksError::Yaml(_)
            | PlaybooksError::Json(_) => ErrorKind::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

pub type Result<T> = std::result::Result<T, PlaybooksError>;
