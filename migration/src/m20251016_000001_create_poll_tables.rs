use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Polls::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Polls::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Polls::Identifier)
                            .string_len(128)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Polls::Title).string_len(255).not_null())
                    .col(ColumnDef::new(Polls::CreatedAt).big_integer().not_null())
                    .to_owned(),
            )
            .await?;

        // Identifier lookups assume uniqueness, so storage enforces it.
        manager
            .create_index(
                Index::create()
                    .name("idx_polls_identifier")
                    .table(Polls::Table)
                    .col(Polls::Identifier)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_polls_created_at")
                    .table(Polls::Table)
                    .col(Polls::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PollOptions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PollOptions::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PollOptions::PollId).integer().not_null())
                    .col(
                        ColumnDef::new(PollOptions::Title)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PollOptions::Weight)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_poll_options_poll")
                            .from(PollOptions::Table, PollOptions::PollId)
                            .to(Polls::Table, Polls::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_poll_options_poll_weight")
                    .table(PollOptions::Table)
                    .col(PollOptions::PollId)
                    .col(PollOptions::Weight)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PollOptions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Polls::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
pub(crate) enum Polls {
    Table,
    Id,
    Identifier,
    Title,
    CreatedAt,
}

#[derive(DeriveIden)]
pub(crate) enum PollOptions {
    Table,
    Id,
    PollId,
    Title,
    Weight,
}
