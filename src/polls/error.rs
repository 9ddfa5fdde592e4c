use sea_orm::DbErr;

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("database error: {0}")]
    Persistence(#[from] DbErr),
    #[error("{0}")]
    Validation(String),
    #[error("voter {voter_id} has already voted in poll {poll_id}")]
    AlreadyVoted { poll_id: i32, voter_id: i64 },
    #[error("option {option_id} does not belong to poll {poll_id}")]
    OptionMismatch { poll_id: i32, option_id: i32 },
    #[error("the poll system is disabled")]
    Disabled,
}

impl PollError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        let message = message.into();
        assert!(!message.is_empty(), "Validation message cannot be empty");
        Self::Validation(message)
    }
}
