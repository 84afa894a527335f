use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CollectionItem::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(CollectionItem::Workspace).string().not_null())
                    .col(ColumnDef::new(CollectionItem::Collection).string().not_null())
                    .col(ColumnDef::new(CollectionItem::ItemId).string().not_null())
                    .col(ColumnDef::new(CollectionItem::Value).text().not_null())
                    .col(
                        ColumnDef::new(CollectionItem::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .col(CollectionItem::Workspace)
                            .col(CollectionItem::Collection)
                            .col(CollectionItem::ItemId),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CollectionItem::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum CollectionItem {
    Table,
    Workspace,
    Collection,
    ItemId,
    Value,
    UpdatedAt,
}
