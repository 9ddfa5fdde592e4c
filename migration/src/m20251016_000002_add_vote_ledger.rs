use sea_orm_migration::prelude::*;

use crate::m20251016_000001_create_poll_tables::{PollOptions, Polls};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Append-only vote ledger
        manager
            .create_table(
                Table::create()
                    .table(PollVotes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PollVotes::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PollVotes::PollId).integer().not_null())
                    .col(ColumnDef::new(PollVotes::OptionId).integer().not_null())
                    .col(ColumnDef::new(PollVotes::VoterId).big_integer().not_null())
                    .col(
                        ColumnDef::new(PollVotes::IpAddress)
                            .string_len(45) // IPv6 max length
                            .not_null(),
                    )
                    .col(ColumnDef::new(PollVotes::Timestamp).big_integer().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_poll_votes_poll")
                            .from(PollVotes::Table, PollVotes::PollId)
                            .to(Polls::Table, Polls::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_poll_votes_option")
                            .from(PollVotes::Table, PollVotes::OptionId)
                            .to(PollOptions::Table, PollOptions::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One vote per voter per poll
        manager
            .create_index(
                Index::create()
                    .name("idx_poll_votes_poll_voter")
                    .table(PollVotes::Table)
                    .col(PollVotes::PollId)
                    .col(PollVotes::VoterId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Tally grouping
        manager
            .create_index(
                Index::create()
                    .name("idx_poll_votes_poll_option")
                    .table(PollVotes::Table)
                    .col(PollVotes::PollId)
                    .col(PollVotes::OptionId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PollVotes::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum PollVotes {
    Table,
    Id,
    PollId,
    OptionId,
    VoterId,
    IpAddress,
    Timestamp,
}
