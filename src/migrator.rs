//! Embedded schema migrations, applied by `db::run_migrations` and
//! `quote-admin migrate`.

use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_profiles_table::Migration),
            Box::new(m20240301_000002_create_products_table::Migration),
            Box::new(m20240301_000003_create_quotes_table::Migration),
            Box::new(m20240301_000004_create_bom_items_table::Migration),
            Box::new(m20240301_000005_create_margin_settings_table::Migration),
        ]
    }
}

mod m20240301_000001_create_profiles_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_profiles_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Profiles::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Profiles::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Profiles::Email)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Profiles::FullName).string().null())
                        .col(
                            ColumnDef::new(Profiles::Role)
                                .string()
                                .not_null()
                                .default("sales"),
                        )
                        .col(
                            ColumnDef::new(Profiles::Active)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Profiles::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Profiles::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Profiles::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Profiles {
        Table,
        Id,
        Email,
        FullName,
        Role,
        Active,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000002_create_products_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_products_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Products::ParentId).uuid().null())
                        .col(ColumnDef::new(Products::Level).integer().not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Description).text().null())
                        .col(ColumnDef::new(Products::PartNumberCode).string().null())
                        .col(ColumnDef::new(Products::SlotCount).integer().null())
                        .col(ColumnDef::new(Products::SlotSpan).integer().null())
                        .col(ColumnDef::new(Products::InputCount).integer().null())
                        .col(ColumnDef::new(Products::BushingCount).integer().null())
                        .col(
                            ColumnDef::new(Products::Price)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::Cost)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::Enabled)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Products::SortOrder)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_products_parent")
                                .from(Products::Table, Products::ParentId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_parent_id")
                        .table(Products::Table)
                        .col(Products::ParentId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_level")
                        .table(Products::Table)
                        .col(Products::Level)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Products {
        Table,
        Id,
        ParentId,
        Level,
        Name,
        Description,
        PartNumberCode,
        SlotCount,
        SlotSpan,
        InputCount,
        BushingCount,
        Price,
        Cost,
        Enabled,
        SortOrder,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000003_create_quotes_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_quotes_table"
        }
    }

    fn money(col: Quotes) -> ColumnDef {
        ColumnDef::new(col)
            .decimal_len(19, 4)
            .not_null()
            .default(0)
            .to_owned()
    }

    fn percent(col: Quotes, precision: u32) -> ColumnDef {
        ColumnDef::new(col)
            .decimal_len(precision, 2)
            .not_null()
            .default(0)
            .to_owned()
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Quotes::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Quotes::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Quotes::QuoteNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Quotes::CustomerName).string().not_null())
                        .col(ColumnDef::new(Quotes::CustomerEmail).string().null())
                        .col(ColumnDef::new(Quotes::OracleCustomerId).string().null())
                        .col(ColumnDef::new(Quotes::SfdcOpportunity).string().null())
                        .col(
                            ColumnDef::new(Quotes::Status)
                                .string()
                                .not_null()
                                .default("draft"),
                        )
                        .col(
                            ColumnDef::new(Quotes::WorkflowState)
                                .string()
                                .not_null()
                                .default("draft"),
                        )
                        .col(
                            ColumnDef::new(Quotes::RequiresFinanceApproval)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(money(Quotes::OriginalValue))
                        .col(money(Quotes::DiscountedValue))
                        .col(money(Quotes::TotalCost))
                        .col(money(Quotes::GrossProfit))
                        .col(percent(Quotes::OriginalMargin, 9))
                        .col(percent(Quotes::DiscountedMargin, 9))
                        .col(percent(Quotes::RequestedDiscount, 5))
                        .col(ColumnDef::new(Quotes::DiscountJustification).text().null())
                        .col(
                            ColumnDef::new(Quotes::Currency)
                                .string()
                                .not_null()
                                .default("USD"),
                        )
                        .col(ColumnDef::new(Quotes::ShippingTerms).string().null())
                        .col(ColumnDef::new(Quotes::PaymentTerms).string().null())
                        .col(ColumnDef::new(Quotes::CreatedBy).uuid().not_null())
                        .col(
                            ColumnDef::new(Quotes::SubmittedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Quotes::ReviewedBy).uuid().null())
                        .col(
                            ColumnDef::new(Quotes::ReviewedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Quotes::ReviewNotes).text().null())
                        .col(ColumnDef::new(Quotes::FinanceReviewedBy).uuid().null())
                        .col(
                            ColumnDef::new(Quotes::FinanceReviewedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Quotes::FinanceNotes).text().null())
                        .col(
                            ColumnDef::new(Quotes::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Quotes::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Quotes::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_quotes_workflow_state")
                        .table(Quotes::Table)
                        .col(Quotes::WorkflowState)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_quotes_created_by")
                        .table(Quotes::Table)
                        .col(Quotes::CreatedBy)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Quotes::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden, Clone, Copy)]
    pub(super) enum Quotes {
        Table,
        Id,
        QuoteNumber,
        CustomerName,
        CustomerEmail,
        OracleCustomerId,
        SfdcOpportunity,
        Status,
        WorkflowState,
        RequiresFinanceApproval,
        OriginalValue,
        DiscountedValue,
        TotalCost,
        GrossProfit,
        OriginalMargin,
        DiscountedMargin,
        RequestedDiscount,
        DiscountJustification,
        Currency,
        ShippingTerms,
        PaymentTerms,
        CreatedBy,
        SubmittedAt,
        ReviewedBy,
        ReviewedAt,
        ReviewNotes,
        FinanceReviewedBy,
        FinanceReviewedAt,
        FinanceNotes,
        CreatedAt,
        UpdatedAt,
        Version,
    }
}

mod m20240301_000004_create_bom_items_table {
    use super::m20240301_000002_create_products_table::Products;
    use super::m20240301_000003_create_quotes_table::Quotes;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_bom_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(BomItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(BomItems::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(BomItems::QuoteId).uuid().not_null())
                        .col(ColumnDef::new(BomItems::ParentItemId).uuid().null())
                        .col(ColumnDef::new(BomItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(BomItems::Name).string().not_null())
                        .col(ColumnDef::new(BomItems::PartNumber).string().null())
                        .col(ColumnDef::new(BomItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(BomItems::UnitPrice)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BomItems::UnitCost)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BomItems::TotalPrice)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(BomItems::SlotNumber).integer().null())
                        .col(ColumnDef::new(BomItems::SlotSpan).integer().null())
                        .col(ColumnDef::new(BomItems::Configuration).json().null())
                        .col(
                            ColumnDef::new(BomItems::Position)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(BomItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_bom_items_quote")
                                .from(BomItems::Table, BomItems::QuoteId)
                                .to(Quotes::Table, Quotes::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_bom_items_product")
                                .from(BomItems::Table, BomItems::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_bom_items_quote_id")
                        .table(BomItems::Table)
                        .col(BomItems::QuoteId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(BomItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum BomItems {
        Table,
        Id,
        QuoteId,
        ParentItemId,
        ProductId,
        Name,
        PartNumber,
        Quantity,
        UnitPrice,
        UnitCost,
        TotalPrice,
        SlotNumber,
        SlotSpan,
        Configuration,
        Position,
        CreatedAt,
    }
}

mod m20240301_000005_create_margin_settings_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000005_create_margin_settings_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Single row keyed by id = 1; absent until an admin first saves settings
            manager
                .create_table(
                    Table::create()
                        .table(MarginSettings::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(MarginSettings::Id)
                                .integer()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MarginSettings::ThresholdPercent)
                                .decimal_len(5, 2)
                                .not_null()
                                .default(25),
                        )
                        .col(
                            ColumnDef::new(MarginSettings::RemoteDisplaySuffix)
                                .string()
                                .not_null()
                                .default("-RD"),
                        )
                        .col(
                            ColumnDef::new(MarginSettings::EmptySlotCode)
                                .string()
                                .not_null()
                                .default("X"),
                        )
                        .col(ColumnDef::new(MarginSettings::UpdatedBy).uuid().null())
                        .col(
                            ColumnDef::new(MarginSettings::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(MarginSettings::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum MarginSettings {
        Table,
        Id,
        ThresholdPercent,
        RemoteDisplaySuffix,
        EmptySlotCode,
        UpdatedBy,
        UpdatedAt,
    }
}
