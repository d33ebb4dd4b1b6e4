use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_resources_table::Migration),
            Box::new(m20240601_000002_create_resource_movements_table::Migration),
            Box::new(m20240601_000003_create_tickets_table::Migration),
            Box::new(m20240601_000004_create_field_reports_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240601_000001_create_resources_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_resources_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Resources::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Resources::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Resources::Code)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Resources::Status).string().not_null())
                        .col(ColumnDef::new(Resources::CustodianId).uuid())
                        .col(ColumnDef::new(Resources::Location).string())
                        .col(ColumnDef::new(Resources::AssignedAt).timestamp_with_time_zone())
                        .col(ColumnDef::new(Resources::SaleDate).timestamp_with_time_zone())
                        .col(ColumnDef::new(Resources::SalePrice).decimal_len(10, 2))
                        .col(
                            ColumnDef::new(Resources::NextMaintenanceDue)
                                .timestamp_with_time_zone(),
                        )
                        .col(ColumnDef::new(Resources::MaintenanceIntervalDays).integer())
                        .col(ColumnDef::new(Resources::Notes).text())
                        .col(
                            ColumnDef::new(Resources::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Resources::UpdatedAt).timestamp_with_time_zone())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_resources_status")
                        .table(Resources::Table)
                        .col(Resources::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_resources_custodian")
                        .table(Resources::Table)
                        .col(Resources::CustodianId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Resources::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    pub enum Resources {
        Table,
        Id,
        Code,
        Status,
        CustodianId,
        Location,
        AssignedAt,
        SaleDate,
        SalePrice,
        NextMaintenanceDue,
        MaintenanceIntervalDays,
        Notes,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240601_000002_create_resource_movements_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000002_create_resource_movements_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ResourceMovements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ResourceMovements::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ResourceMovements::ResourceId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ResourceMovements::MovementType)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ResourceMovements::PreviousStatus).string())
                        .col(ColumnDef::new(ResourceMovements::NewStatus).string())
                        .col(ColumnDef::new(ResourceMovements::CustodianId).uuid())
                        .col(ColumnDef::new(ResourceMovements::OriginalCustodianId).uuid())
                        .col(ColumnDef::new(ResourceMovements::OriginalLocation).string())
                        .col(
                            ColumnDef::new(ResourceMovements::OriginalAssignedAt)
                                .timestamp_with_time_zone(),
                        )
                        .col(
                            ColumnDef::new(ResourceMovements::OriginalSaleDate)
                                .timestamp_with_time_zone(),
                        )
                        .col(
                            ColumnDef::new(ResourceMovements::OriginalSalePrice)
                                .decimal_len(10, 2),
                        )
                        .col(
                            ColumnDef::new(ResourceMovements::OriginalNextMaintenanceDue)
                                .timestamp_with_time_zone(),
                        )
                        .col(ColumnDef::new(ResourceMovements::CausalRefType).string())
                        .col(ColumnDef::new(ResourceMovements::CausalRefId).uuid())
                        .col(
                            ColumnDef::new(ResourceMovements::IsSubstituteLoan)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(ResourceMovements::ActorId).uuid())
                        .col(ColumnDef::new(ResourceMovements::Note).text())
                        .col(ColumnDef::new(ResourceMovements::Cost).decimal_len(10, 2))
                        .col(
                            ColumnDef::new(ResourceMovements::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        // No FK to resources: movements are audit history and
                        // must survive a resource row removed out of band.
                        // Restoration treats the orphaned entries as skips.
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_resource_movements_resource_created")
                        .table(ResourceMovements::Table)
                        .col(ResourceMovements::ResourceId)
                        .col(ResourceMovements::CreatedAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_resource_movements_causal_ref")
                        .table(ResourceMovements::Table)
                        .col(ResourceMovements::CausalRefType)
                        .col(ResourceMovements::CausalRefId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_resource_movements_type")
                        .table(ResourceMovements::Table)
                        .col(ResourceMovements::MovementType)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ResourceMovements::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    pub enum ResourceMovements {
        Table,
        Id,
        ResourceId,
        MovementType,
        PreviousStatus,
        NewStatus,
        CustodianId,
        OriginalCustodianId,
        OriginalLocation,
        OriginalAssignedAt,
        OriginalSaleDate,
        OriginalSalePrice,
        OriginalNextMaintenanceDue,
        CausalRefType,
        CausalRefId,
        IsSubstituteLoan,
        ActorId,
        Note,
        Cost,
        CreatedAt,
    }
}

mod m20240601_000003_create_tickets_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000003_create_tickets_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Tickets::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Tickets::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Tickets::Number)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Tickets::Subject).string().not_null())
                        .col(ColumnDef::new(Tickets::Status).string().not_null())
                        .col(ColumnDef::new(Tickets::CustodianId).uuid())
                        .col(ColumnDef::new(Tickets::ClosedAt).timestamp_with_time_zone())
                        .col(
                            ColumnDef::new(Tickets::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Tickets::UpdatedAt).timestamp_with_time_zone())
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Tickets::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    pub enum Tickets {
        Table,
        Id,
        Number,
        Subject,
        Status,
        CustodianId,
        ClosedAt,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240601_000004_create_field_reports_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000004_create_field_reports_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(FieldReports::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(FieldReports::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(FieldReports::Number)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(FieldReports::TicketId).uuid())
                        .col(ColumnDef::new(FieldReports::CustodianId).uuid())
                        .col(ColumnDef::new(FieldReports::Status).string().not_null())
                        .col(
                            ColumnDef::new(FieldReports::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(FieldReports::UpdatedAt).timestamp_with_time_zone())
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(FieldReports::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    pub enum FieldReports {
        Table,
        Id,
        Number,
        TicketId,
        CustodianId,
        Status,
        CreatedAt,
        UpdatedAt,
    }
}
