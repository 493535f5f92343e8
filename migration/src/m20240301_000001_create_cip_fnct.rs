use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ========== CIP FUNCTION STATE ==========
        manager
            .create_table(
                Table::create()
                    .table(CipFnct::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(CipFnct::CipId).text().not_null().default(""))
                    .col(ColumnDef::new(CipFnct::Id).text().not_null())
                    .col(ColumnDef::new(CipFnct::Type).text().not_null())
                    .col(ColumnDef::new(CipFnct::Data).json_binary().not_null())
                    .col(
                        ColumnDef::new(CipFnct::CreatedOn)
                            .timestamp_with_time_zone()
                            .extra("DEFAULT NOW()"),
                    )
                    .col(ColumnDef::new(CipFnct::UpdatedOn).timestamp_with_time_zone())
                    .primary_key(Index::create().col(CipFnct::Id).col(CipFnct::Type))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_cip_fnct_cip_id")
                    .table(CipFnct::Table)
                    .col(CipFnct::CipId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CipFnct::Table).if_exists().to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CipFnct {
    Table,
    CipId,
    Id,
    Type,
    Data,
    CreatedOn,
    UpdatedOn,
}
