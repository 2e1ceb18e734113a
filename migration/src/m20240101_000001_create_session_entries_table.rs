use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SessionEntries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SessionEntries::Key)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SessionEntries::Value).text().not_null())
                    .col(ColumnDef::new(SessionEntries::ExpiresAt).big_integer().null())
                    .col(
                        ColumnDef::new(SessionEntries::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Expiry sweeps scan by deadline
        manager
            .create_index(
                Index::create()
                    .name("idx_session_entries_expires_at")
                    .table(SessionEntries::Table)
                    .col(SessionEntries::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SessionEntries::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SessionEntries {
    Table,
    Key,
    Value,
    ExpiresAt,
    UpdatedAt,
}
