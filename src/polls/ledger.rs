//! Append-only vote ledger and the duplicate-vote guard.
//!
//! The guard read is an early exit. The unique `(poll_id, voter_id)` index is
//! what actually keeps a voter to one vote per poll, and a violation of it is
//! reported as [`PollError::AlreadyVoted`].

use std::collections::HashMap;

use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect, SqlErr};

use crate::entities::poll_vote;

use super::PollError;

/// Longest textual IP address we store (IPv6).
pub const MAX_IP_ADDRESS_LEN: usize = 45;

pub type VoteId = i32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVote {
    pub poll_id: i32,
    pub option_id: i32,
    pub voter_id: i64,
    pub ip_address: String,
    pub timestamp: i64,
}

pub async fn has_voted<C>(conn: &C, poll_id: i32, voter_id: i64) -> Result<bool, PollError>
where
    C: ConnectionTrait,
{
    let existing = poll_vote::Entity::find()
        .select_only()
        .column(poll_vote::Column::Id)
        .filter(poll_vote::Column::PollId.eq(poll_id))
        .filter(poll_vote::Column::VoterId.eq(voter_id))
        .into_tuple::<i32>()
        .one(conn)
        .await?;

    Ok(existing.is_some())
}

pub async fn append_vote<C>(conn: &C, vote: NewVote) -> Result<VoteId, PollError>
where
    C: ConnectionTrait,
{
    if vote.ip_address.len() > MAX_IP_ADDRESS_LEN {
        return Err(PollError::validation(format!(
            "IP address exceeds {MAX_IP_ADDRESS_LEN} character limit"
        )));
    }
    assert!(vote.timestamp >= 0, "Vote timestamp must be non-negative");

    let NewVote {
        poll_id,
        option_id,
        voter_id,
        ip_address,
        timestamp,
    } = vote;

    let row = poll_vote::ActiveModel {
        id: NotSet,
        poll_id: Set(poll_id),
        option_id: Set(option_id),
        voter_id: Set(voter_id),
        ip_address: Set(ip_address),
        timestamp: Set(timestamp),
    };

    match poll_vote::Entity::insert(row).exec(conn).await {
        Ok(inserted) => Ok(inserted.last_insert_id),
        Err(err) => match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                Err(PollError::AlreadyVoted { poll_id, voter_id })
            }
            _ => Err(PollError::Persistence(err)),
        },
    }
}

/// Vote counts keyed by option id, from a single grouped query.
pub async fn option_counts<C>(conn: &C, poll_id: i32) -> Result<HashMap<i32, i64>, PollError>
where
    C: ConnectionTrait,
{
    let rows = poll_vote::Entity::find()
        .select_only()
        .column(poll_vote::Column::OptionId)
        .column_as(poll_vote::Column::Id.count(), "votes")
        .filter(poll_vote::Column::PollId.eq(poll_id))
        .group_by(poll_vote::Column::OptionId)
        .into_tuple::<(i32, i64)>()
        .all(conn)
        .await?;

    let counts = rows.into_iter().collect::<HashMap<_, _>>();
    assert!(
        counts.values().all(|count| *count > 0),
        "Grouped vote counts must be positive"
    );
    Ok(counts)
}
