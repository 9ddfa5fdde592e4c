//! Poll service facade.
//!
//! Composes the directory, the vote ledger and the tally into the operations
//! the HTTP layer calls. Reads return `Ok(None)` or an empty collection for
//! absent records and `Err` for storage failures; the caller decides how to
//! surface either.

use std::sync::Arc;

use sea_orm::{DatabaseConnection, TransactionTrait};
use tracing::{debug, info, warn};

use crate::entities::{poll, poll_option};
use crate::models::poll::{PollResults, VoteReceipt};

pub mod clock;
pub mod directory;
mod error;
pub mod ledger;
pub mod tally;

pub use clock::{Clock, SystemClock};
pub use error::PollError;

pub const MAX_IDENTIFIER_LEN: usize = 128;
pub const MAX_TITLE_LEN: usize = 255;

/// Shown when an option form arrives without a poll to attach to.
pub const OPTION_WITHOUT_POLL: &str = "Failed to associate this option with a poll.";

/// Where the option form sends the user after a failed save.
pub const DEFAULT_REDIRECT: &str = "/";

/// Snapshot of the system-wide poll settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub enabled: bool,
}

/// The acting user as seen by the request that carries the vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voter {
    pub user_id: i64,
    pub ip_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollForm {
    pub identifier: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionForm {
    pub id: Option<i32>,
    pub poll_id: Option<i32>,
    pub title: String,
    pub weight: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    Created,
    Updated,
}

impl SaveStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SaveStatus::Created => "created",
            SaveStatus::Updated => "updated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedOption {
    pub option: poll_option::Model,
    pub status: SaveStatus,
}

impl SavedOption {
    pub fn redirect(&self) -> String {
        option_list_path(self.option.poll_id)
    }
}

pub fn option_list_path(poll_id: i32) -> String {
    format!("/polls/{poll_id}/options")
}

#[derive(Clone)]
pub struct PollService {
    database: DatabaseConnection,
    settings: PollSettings,
    clock: Arc<dyn Clock>,
}

impl PollService {
    pub fn new(
        database: DatabaseConnection,
        settings: PollSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            database,
            settings,
            clock,
        }
    }

    pub fn is_poll_enabled(&self) -> bool {
        self.settings.enabled
    }

    pub async fn get_poll(&self, poll_id: i32) -> Result<Option<poll::Model>, PollError> {
        directory::find_poll(&self.database, poll_id).await
    }

    pub async fn get_poll_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<poll::Model>, PollError> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Ok(None);
        }
        directory::find_poll_by_identifier(&self.database, identifier).await
    }

    pub async fn get_option(
        &self,
        option_id: i32,
    ) -> Result<Option<poll_option::Model>, PollError> {
        directory::find_option(&self.database, option_id).await
    }

    pub async fn get_options(&self, poll_id: i32) -> Result<Vec<poll_option::Model>, PollError> {
        directory::list_options(&self.database, poll_id).await
    }

    pub async fn get_all_polls(&self) -> Result<Vec<poll::Model>, PollError> {
        directory::list_polls(&self.database).await
    }

    pub async fn has_user_voted(&self, poll_id: i32, voter_id: i64) -> Result<bool, PollError> {
        ledger::has_voted(&self.database, poll_id, voter_id).await
    }

    /// Counts and percentages per option, or `None` when the poll does not exist.
    pub async fn get_results(&self, poll_id: i32) -> Result<Option<PollResults>, PollError> {
        let Some(poll) = directory::find_poll(&self.database, poll_id).await? else {
            return Ok(None);
        };
        let options = directory::list_options(&self.database, poll.id).await?;
        let counts = ledger::option_counts(&self.database, poll.id).await?;
        let results = tally::tally(poll.id, &options, &counts);
        debug!(
            poll_id = poll.id,
            total_votes = results.total_votes,
            "Computed poll results"
        );
        Ok(Some(results))
    }

    /// Records one vote for `voter`, refusing a second vote in the same poll.
    ///
    /// The poll, option and guard reads run in the same transaction as the
    /// insert. Concurrent submissions that both pass the guard are settled by
    /// the unique `(poll_id, voter_id)` index.
    pub async fn record_vote(
        &self,
        poll_id: i32,
        option_id: i32,
        voter: &Voter,
    ) -> Result<VoteReceipt, PollError> {
        if !self.is_poll_enabled() {
            return Err(PollError::Disabled);
        }
        if voter.user_id < 0 {
            return Err(PollError::validation("voter id must be non-negative"));
        }

        let txn = self.database.begin().await?;

        let poll = directory::find_poll(&txn, poll_id)
            .await?
            .ok_or_else(|| PollError::not_found("poll", poll_id))?;
        let option = directory::find_option(&txn, option_id)
            .await?
            .ok_or_else(|| PollError::not_found("option", option_id))?;
        if option.poll_id != poll.id {
            return Err(PollError::OptionMismatch {
                poll_id: poll.id,
                option_id: option.id,
            });
        }

        if ledger::has_voted(&txn, poll.id, voter.user_id).await? {
            return Err(PollError::AlreadyVoted {
                poll_id: poll.id,
                voter_id: voter.user_id,
            });
        }

        let timestamp = self.clock.now();
        let vote_id = ledger::append_vote(
            &txn,
            ledger::NewVote {
                poll_id: poll.id,
                option_id: option.id,
                voter_id: voter.user_id,
                ip_address: voter.ip_address.clone(),
                timestamp,
            },
        )
        .await?;
        txn.commit().await?;

        info!(
            poll_id = poll.id,
            option_id = option.id,
            voter_id = voter.user_id,
            vote_id,
            "Vote recorded"
        );

        Ok(VoteReceipt {
            vote_id,
            poll_id: poll.id,
            option_id: option.id,
            voter_id: voter.user_id,
            timestamp,
        })
    }

    pub async fn create_poll(&self, form: PollForm) -> Result<poll::Model, PollError> {
        let identifier = canonicalize_text(&form.identifier, MAX_IDENTIFIER_LEN, "identifier")?;
        let title = canonicalize_text(&form.title, MAX_TITLE_LEN, "title")?;

        let created_at = self.clock.now();
        let created =
            directory::insert_poll(&self.database, &identifier, &title, created_at).await?;
        info!(poll_id = created.id, identifier = %created.identifier, "Poll created");
        Ok(created)
    }

    /// Saves a new or edited option. A form without a poll id is rejected and
    /// nothing is written.
    pub async fn save_option(&self, form: OptionForm) -> Result<SavedOption, PollError> {
        let Some(poll_id) = form.poll_id else {
            warn!(option_id = ?form.id, "Rejected option save without a poll");
            return Err(PollError::validation(OPTION_WITHOUT_POLL));
        };
        let title = canonicalize_text(&form.title, MAX_TITLE_LEN, "title")?;

        let txn = self.database.begin().await?;
        if directory::find_poll(&txn, poll_id).await?.is_none() {
            return Err(PollError::not_found("poll", poll_id));
        }

        let saved = match form.id {
            Some(option_id) => {
                let existing = directory::find_option(&txn, option_id)
                    .await?
                    .ok_or_else(|| PollError::not_found("option", option_id))?;
                // Moving an option would orphan the votes cast for it.
                if existing.poll_id != poll_id {
                    return Err(PollError::OptionMismatch { poll_id, option_id });
                }
                let option = directory::update_option(&txn, existing, &title, form.weight).await?;
                SavedOption {
                    option,
                    status: SaveStatus::Updated,
                }
            }
            None => {
                let option = directory::insert_option(&txn, poll_id, &title, form.weight).await?;
                SavedOption {
                    option,
                    status: SaveStatus::Created,
                }
            }
        };
        txn.commit().await?;

        info!(
            poll_id,
            option_id = saved.option.id,
            status = saved.status.as_str(),
            "Option saved"
        );
        Ok(saved)
    }

    pub async fn delete_poll(&self, poll_id: i32) -> Result<(), PollError> {
        let txn = self.database.begin().await?;
        if !directory::delete_poll(&txn, poll_id).await? {
            return Err(PollError::not_found("poll", poll_id));
        }
        txn.commit().await?;
        info!(poll_id, "Poll deleted");
        Ok(())
    }
}

fn canonicalize_text(value: &str, max_len: usize, label: &str) -> Result<String, PollError> {
    assert!(max_len > 0, "Maximum length must be positive");
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(PollError::validation(format!("{label} must not be empty")));
    }
    if trimmed.chars().count() > max_len {
        return Err(PollError::validation(format!(
            "{label} exceeds {max_len} character limit"
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use sea_orm::{EntityTrait, PaginatorTrait};

    use super::*;
    use crate::entities::{poll_option, poll_vote};
    use crate::polls::clock::ManualClock;
    use crate::testing::{memory_database, poll_service};

    fn voter(user_id: i64) -> Voter {
        Voter {
            user_id,
            ip_address: "198.51.100.23".to_string(),
        }
    }

    async fn seeded(service: &PollService) -> (poll::Model, Vec<poll_option::Model>) {
        let poll = service
            .create_poll(PollForm {
                identifier: "favorite-color".to_string(),
                title: "Favorite color?".to_string(),
            })
            .await
            .expect("poll created");

        let mut options = Vec::new();
        for (title, weight) in [("A", 0), ("B", 1), ("C", 2)] {
            let saved = service
                .save_option(OptionForm {
                    id: None,
                    poll_id: Some(poll.id),
                    title: title.to_string(),
                    weight,
                })
                .await
                .expect("option saved");
            options.push(saved.option);
        }
        (poll, options)
    }

    #[tokio::test]
    async fn favorite_color_results() {
        let service = poll_service(memory_database().await, true);
        let (poll, options) = seeded(&service).await;

        service.record_vote(poll.id, options[0].id, &voter(1)).await.unwrap();
        service.record_vote(poll.id, options[0].id, &voter(2)).await.unwrap();
        service.record_vote(poll.id, options[1].id, &voter(3)).await.unwrap();

        let results = service
            .get_results(poll.id)
            .await
            .unwrap()
            .expect("poll exists");
        assert_eq!(results.total_votes, 3);
        let percentages = results
            .options
            .iter()
            .map(|r| r.percentage)
            .collect::<Vec<_>>();
        assert_eq!(percentages, vec![66.67, 33.33, 0.0]);
        let votes = results.options.iter().map(|r| r.votes).collect::<Vec<_>>();
        assert_eq!(votes, vec![2, 1, 0]);
    }

    #[tokio::test]
    async fn results_distinguish_missing_poll_from_empty_poll() {
        let service = poll_service(memory_database().await, true);
        assert!(service.get_results(404).await.unwrap().is_none());

        let empty = service
            .create_poll(PollForm {
                identifier: "empty".to_string(),
                title: "Nothing yet".to_string(),
            })
            .await
            .unwrap();
        let results = service.get_results(empty.id).await.unwrap().unwrap();
        assert!(results.options.is_empty());
        assert_eq!(results.total_votes, 0);
    }

    #[tokio::test]
    async fn guard_reports_vote_after_recording() {
        let service = poll_service(memory_database().await, true);
        let (poll, options) = seeded(&service).await;

        assert!(!service.has_user_voted(poll.id, 5).await.unwrap());
        service.record_vote(poll.id, options[2].id, &voter(5)).await.unwrap();
        assert!(service.has_user_voted(poll.id, 5).await.unwrap());
    }

    #[tokio::test]
    async fn second_vote_from_same_voter_is_rejected() {
        let database = memory_database().await;
        let service = poll_service(database.clone(), true);
        let (poll, options) = seeded(&service).await;

        service.record_vote(poll.id, options[0].id, &voter(8)).await.unwrap();
        let err = service
            .record_vote(poll.id, options[1].id, &voter(8))
            .await
            .unwrap_err();

        assert!(matches!(err, PollError::AlreadyVoted { voter_id: 8, .. }));
        let stored = poll_vote::Entity::find().count(&database).await.unwrap();
        assert_eq!(stored, 1);
    }

    #[tokio::test]
    async fn concurrent_votes_from_same_voter_persist_once() {
        let database = memory_database().await;
        let service = poll_service(database.clone(), true);
        let (poll, options) = seeded(&service).await;

        let shared = voter(11);
        let (first, second) = tokio::join!(
            service.record_vote(poll.id, options[0].id, &shared),
            service.record_vote(poll.id, options[1].id, &shared),
        );

        assert_eq!(
            [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count(),
            1
        );
        let stored = poll_vote::Entity::find().count(&database).await.unwrap();
        assert_eq!(stored, 1);
    }

    #[tokio::test]
    async fn vote_for_option_of_another_poll_is_rejected() {
        let database = memory_database().await;
        let service = poll_service(database.clone(), true);
        let (poll, _) = seeded(&service).await;
        let other = service
            .create_poll(PollForm {
                identifier: "other".to_string(),
                title: "Other".to_string(),
            })
            .await
            .unwrap();
        let foreign = service
            .save_option(OptionForm {
                id: None,
                poll_id: Some(other.id),
                title: "Elsewhere".to_string(),
                weight: 0,
            })
            .await
            .unwrap()
            .option;

        let err = service
            .record_vote(poll.id, foreign.id, &voter(1))
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::OptionMismatch { .. }));
        assert_eq!(poll_vote::Entity::find().count(&database).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn vote_against_missing_records_is_not_found() {
        let service = poll_service(memory_database().await, true);
        let (poll, _) = seeded(&service).await;

        let missing_poll = service.record_vote(999, 1, &voter(1)).await.unwrap_err();
        assert!(matches!(missing_poll, PollError::NotFound { entity: "poll", .. }));

        let missing_option = service
            .record_vote(poll.id, 999, &voter(1))
            .await
            .unwrap_err();
        assert!(matches!(
            missing_option,
            PollError::NotFound {
                entity: "option",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn disabled_system_refuses_votes() {
        let database = memory_database().await;
        let enabled = poll_service(database.clone(), true);
        let (poll, options) = seeded(&enabled).await;

        let disabled = poll_service(database.clone(), false);
        assert!(!disabled.is_poll_enabled());
        let err = disabled
            .record_vote(poll.id, options[0].id, &voter(1))
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::Disabled));
        assert_eq!(poll_vote::Entity::find().count(&database).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn vote_timestamp_comes_from_clock() {
        let database = memory_database().await;
        let clock = Arc::new(ManualClock::starting_at(1_700_000_000));
        let service = PollService::new(
            database.clone(),
            PollSettings { enabled: true },
            clock.clone(),
        );
        let (poll, options) = seeded(&service).await;

        clock.advance(60);
        let receipt = service
            .record_vote(poll.id, options[0].id, &voter(3))
            .await
            .unwrap();
        assert_eq!(receipt.timestamp, 1_700_000_060);

        let stored = poll_vote::Entity::find_by_id(receipt.vote_id)
            .one(&database)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.timestamp, 1_700_000_060);
        assert_eq!(stored.ip_address, "198.51.100.23");
    }

    #[tokio::test]
    async fn option_without_poll_persists_nothing() {
        let database = memory_database().await;
        let service = poll_service(database.clone(), true);

        let err = service
            .save_option(OptionForm {
                id: None,
                poll_id: None,
                title: "Dangling".to_string(),
                weight: 0,
            })
            .await
            .unwrap_err();

        match err {
            PollError::Validation(message) => assert_eq!(message, OPTION_WITHOUT_POLL),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(
            poll_option::Entity::find().count(&database).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn editing_an_option_keeps_it_in_place() {
        let service = poll_service(memory_database().await, true);
        let (poll, options) = seeded(&service).await;

        let saved = service
            .save_option(OptionForm {
                id: Some(options[0].id),
                poll_id: Some(poll.id),
                title: "  Azure  ".to_string(),
                weight: 10,
            })
            .await
            .unwrap();

        assert_eq!(saved.status, SaveStatus::Updated);
        assert_eq!(saved.option.title, "Azure");
        assert_eq!(saved.redirect(), format!("/polls/{}/options", poll.id));

        let titles = service
            .get_options(poll.id)
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.title)
            .collect::<Vec<_>>();
        assert_eq!(titles, vec!["B", "C", "Azure"]);
    }

    #[tokio::test]
    async fn blank_titles_and_identifiers_are_rejected() {
        let service = poll_service(memory_database().await, true);

        let err = service
            .create_poll(PollForm {
                identifier: "   ".to_string(),
                title: "Title".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::Validation(_)));

        let long_title = "x".repeat(MAX_TITLE_LEN + 1);
        let err = service
            .create_poll(PollForm {
                identifier: "ok".to_string(),
                title: long_title,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::Validation(_)));
    }

    #[tokio::test]
    async fn all_polls_are_listed_newest_first() {
        let database = memory_database().await;
        let clock = Arc::new(ManualClock::starting_at(100));
        let service = PollService::new(database, PollSettings { enabled: true }, clock.clone());

        for identifier in ["first", "second", "third"] {
            service
                .create_poll(PollForm {
                    identifier: identifier.to_string(),
                    title: identifier.to_uppercase(),
                })
                .await
                .unwrap();
            clock.advance(5);
        }

        let identifiers = service
            .get_all_polls()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.identifier)
            .collect::<Vec<_>>();
        assert_eq!(identifiers, vec!["third", "second", "first"]);

        let by_identifier = service
            .get_poll_by_identifier(" second ")
            .await
            .unwrap()
            .expect("trimmed identifier resolves");
        assert_eq!(by_identifier.title, "SECOND");
    }

    #[tokio::test]
    async fn deleting_a_poll_drops_votes_and_options() {
        let database = memory_database().await;
        let service = poll_service(database.clone(), true);
        let (poll, options) = seeded(&service).await;
        service.record_vote(poll.id, options[0].id, &voter(1)).await.unwrap();

        service.delete_poll(poll.id).await.unwrap();

        assert!(service.get_poll(poll.id).await.unwrap().is_none());
        assert!(service.get_option(options[0].id).await.unwrap().is_none());
        assert_eq!(poll_vote::Entity::find().count(&database).await.unwrap(), 0);
        assert!(matches!(
            service.delete_poll(poll.id).await.unwrap_err(),
            PollError::NotFound { .. }
        ));
    }
}
