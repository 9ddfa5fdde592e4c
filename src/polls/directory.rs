use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, SqlErr,
};

use crate::entities::prelude::*;
use crate::entities::{poll, poll_option, poll_vote};

use super::PollError;

pub async fn find_poll<C>(conn: &C, poll_id: i32) -> Result<Option<poll::Model>, PollError>
where
    C: ConnectionTrait,
{
    Ok(Poll::find_by_id(poll_id).one(conn).await?)
}

/// Lowest id wins if storage ever holds duplicate identifiers.
pub async fn find_poll_by_identifier<C>(
    conn: &C,
    identifier: &str,
) -> Result<Option<poll::Model>, PollError>
where
    C: ConnectionTrait,
{
    let poll = Poll::find()
        .filter(poll::Column::Identifier.eq(identifier))
        .order_by_asc(poll::Column::Id)
        .one(conn)
        .await?;
    Ok(poll)
}

pub async fn find_option<C>(
    conn: &C,
    option_id: i32,
) -> Result<Option<poll_option::Model>, PollError>
where
    C: ConnectionTrait,
{
    Ok(PollOption::find_by_id(option_id).one(conn).await?)
}

pub async fn list_options<C>(conn: &C, poll_id: i32) -> Result<Vec<poll_option::Model>, PollError>
where
    C: ConnectionTrait,
{
    let options = PollOption::find()
        .filter(poll_option::Column::PollId.eq(poll_id))
        .order_by_asc(poll_option::Column::Weight)
        .order_by_asc(poll_option::Column::Id)
        .all(conn)
        .await?;

    assert!(
        options.windows(2).all(|pair| pair[0].weight <= pair[1].weight),
        "Options must be ordered by weight"
    );
    Ok(options)
}

pub async fn list_polls<C>(conn: &C) -> Result<Vec<poll::Model>, PollError>
where
    C: ConnectionTrait,
{
    let polls = Poll::find()
        .order_by_desc(poll::Column::CreatedAt)
        .order_by_desc(poll::Column::Id)
        .all(conn)
        .await?;
    Ok(polls)
}

pub async fn insert_poll<C>(
    conn: &C,
    identifier: &str,
    title: &str,
    created_at: i64,
) -> Result<poll::Model, PollError>
where
    C: ConnectionTrait,
{
    let row = poll::ActiveModel {
        id: NotSet,
        identifier: Set(identifier.to_string()),
        title: Set(title.to_string()),
        created_at: Set(created_at),
    };

    row.insert(conn).await.map_err(|err| match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            PollError::validation(format!("Poll identifier {identifier} is already in use"))
        }
        _ => PollError::Persistence(err),
    })
}

pub async fn insert_option<C>(
    conn: &C,
    poll_id: i32,
    title: &str,
    weight: i32,
) -> Result<poll_option::Model, PollError>
where
    C: ConnectionTrait,
{
    let row = poll_option::ActiveModel {
        id: NotSet,
        poll_id: Set(poll_id),
        title: Set(title.to_string()),
        weight: Set(weight),
    };
    Ok(row.insert(conn).await?)
}

pub async fn update_option<C>(
    conn: &C,
    existing: poll_option::Model,
    title: &str,
    weight: i32,
) -> Result<poll_option::Model, PollError>
where
    C: ConnectionTrait,
{
    let mut row = existing.into_active_model();
    row.title = Set(title.to_string());
    row.weight = Set(weight);
    Ok(row.update(conn).await?)
}

/// Removes a poll together with its options and votes. Returns false when the
/// poll does not exist.
pub async fn delete_poll<C>(conn: &C, poll_id: i32) -> Result<bool, PollError>
where
    C: ConnectionTrait,
{
    PollVote::delete_many()
        .filter(poll_vote::Column::PollId.eq(poll_id))
        .exec(conn)
        .await?;
    PollOption::delete_many()
        .filter(poll_option::Column::PollId.eq(poll_id))
        .exec(conn)
        .await?;
    let deleted = Poll::delete_by_id(poll_id).exec(conn).await?;

    assert!(deleted.rows_affected <= 1, "Poll id must be unique");
    Ok(deleted.rows_affected == 1)
}
