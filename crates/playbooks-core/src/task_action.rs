//! Declarative trigger/action pairs attached to checklist items.
//!
//! Type tags and payloads are stored opaquely. Nothing here executes an
//! action; an automation engine reads these records and decides what to do.

use crate::error::Result;
use crate::normalize::null_as_empty;
use serde::{Deserialize, Serialize};

pub const KEYWORDS_BY_USERS_TRIGGER_TYPE: &str = "keywords_by_users";
pub const MARK_ITEM_AS_DONE_ACTION_TYPE: &str = "mark_item_as_done";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Trigger {
    #[serde(rename = "type")]
    pub trigger_type: String,
    #[serde(default)]
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskAction {
    pub trigger: Trigger,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub actions: Vec<Action>,
}

/// Payload shape understood by the `keywords_by_users` trigger.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeywordsByUsersPayload {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub keywords: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub user_ids: Vec<String>,
}

/// Payload shape understood by the `mark_item_as_done` action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MarkItemAsDonePayload {
    pub enabled: bool,
}

impl Trigger {
    pub fn new(trigger_type: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            trigger_type: trigger_type.into(),
            payload: payload.into(),
        }
    }

    pub fn keywords_by_users(payload: &KeywordsByUsersPayload) -> Result<Self> {
        Ok(Self::new(
            KEYWORDS_BY_USERS_TRIGGER_TYPE,
            serde_json::to_string(payload)?,
        ))
    }
}

impl Action {
    pub fn new(action_type: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            payload: payload.into(),
        }
    }

    pub fn mark_item_as_done(enabled: bool) -> Result<Self> {
        Ok(Self::new(
            MARK_ITEM_AS_DONE_ACTION_TYPE,
            serde_json::to_string(&MarkItemAsDonePayload { enabled })?,
        ))
    }
}

impl TaskAction {
    pub fn new(trigger: Trigger, actions: Vec<Action>) -> Self {
        Self { trigger, actions }
    }
}
