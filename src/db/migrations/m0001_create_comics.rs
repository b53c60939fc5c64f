use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Comics::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Comics::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Comics::OwnerId).string().not_null())
                    .col(ColumnDef::new(Comics::Prompt).text().not_null())
                    .col(ColumnDef::new(Comics::Title).string().null())
                    .col(
                        ColumnDef::new(Comics::Status)
                            .string_len(1)
                            .not_null()
                            .default("c"),
                    )
                    .col(ColumnDef::new(Comics::ImageUrls).text().null())
                    .col(ColumnDef::new(Comics::Captions).text().null())
                    .col(ColumnDef::new(Comics::DroppedScenes).text().null())
                    .col(
                        ColumnDef::new(Comics::RequestedAt)
                            .date_time()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Comics::CreatedAt).date_time().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_comics_owner_created")
                    .table(Comics::Table)
                    .col(Comics::OwnerId)
                    .col(Comics::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Comics::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Comics {
    Table,
    Id,
    OwnerId,
    Prompt,
    Title,
    Status,
    ImageUrls,
    Captions,
    DroppedScenes,
    RequestedAt,
    CreatedAt,
}
