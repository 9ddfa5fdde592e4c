use serde::{Deserialize, Serialize};

use crate::entities::{poll, poll_option};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollView {
    pub id: i32,
    pub identifier: String,
    pub title: String,
    pub created_at: i64,
}

impl From<poll::Model> for PollView {
    fn from(model: poll::Model) -> Self {
        Self {
            id: model.id,
            identifier: model.identifier,
            title: model.title,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionView {
    pub id: i32,
    pub poll_id: i32,
    pub title: String,
    pub weight: i32,
}

impl From<poll_option::Model> for OptionView {
    fn from(model: poll_option::Model) -> Self {
        Self {
            id: model.id,
            poll_id: model.poll_id,
            title: model.title,
            weight: model.weight,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollDetailView {
    pub poll: PollView,
    pub options: Vec<OptionView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionResult {
    pub option_id: i32,
    pub title: String,
    pub votes: i64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollResults {
    pub poll_id: i32,
    pub options: Vec<OptionResult>,
    pub total_votes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteReceipt {
    pub vote_id: i32,
    pub poll_id: i32,
    pub option_id: i32,
    pub voter_id: i64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollStatusView {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HasVotedView {
    pub poll_id: i32,
    pub voter_id: i64,
    pub has_voted: bool,
}

// Request/Response types for the poll HTTP API

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollCreateRequest {
    pub identifier: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionSaveRequest {
    /// Present when editing an existing option
    #[serde(default)]
    pub id: Option<i32>,
    #[serde(default)]
    pub poll_id: Option<i32>,
    pub title: String,
    #[serde(default)]
    pub weight: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionSaveResponse {
    pub option: OptionView,
    pub status: String, // "created" or "updated"
    pub message: String,
    pub redirect: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteSubmissionRequest {
    pub option_id: i32,
    pub voter_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteSubmissionResponse {
    pub vote: VoteReceipt,
    /// Absent when the vote was stored but the tally could not be read back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<PollResults>,
}
