use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(
            m20260301_000001_create_ticketing_tables::Migration,
        )]
    }
}

mod m20260301_000001_create_ticketing_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260301_000001_create_ticketing_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Customers::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Customers::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Customers::StripeId).string().not_null())
                        .col(ColumnDef::new(Customers::Email).string().not_null())
                        .col(
                            ColumnDef::new(Customers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // At most one customer per provider customer id; a conflicting
            // insert from a concurrent webhook delivery is treated as
            // "already resolved" by the fulfillment writer.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_customers_stripe_id")
                        .table(Customers::Table)
                        .col(Customers::StripeId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::CustomerId).uuid().not_null())
                        .col(
                            ColumnDef::new(Orders::TotalMinor)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Orders::Status).string().not_null())
                        .col(
                            ColumnDef::new(Orders::StripeCheckoutSessionId)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // Exactly one order per checkout session under at-least-once
            // webhook delivery.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_checkout_session")
                        .table(Orders::Table)
                        .col(Orders::StripeCheckoutSessionId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_customer_id")
                        .table(Orders::Table)
                        .col(Orders::CustomerId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Tickets::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Tickets::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Tickets::OrderId).uuid().not_null())
                        .col(ColumnDef::new(Tickets::CustomerId).uuid().not_null())
                        .col(ColumnDef::new(Tickets::TicketTypeId).string().null())
                        .col(ColumnDef::new(Tickets::Status).string().not_null())
                        .col(
                            ColumnDef::new(Tickets::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_tickets_order_id")
                        .table(Tickets::Table)
                        .col(Tickets::OrderId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Tickets::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Customers::Table).to_owned())
                .await?;
            Ok(())
        }
    }

    #[derive(Iden)]
    enum Customers {
        Table,
        Id,
        StripeId,
        Email,
        CreatedAt,
    }

    #[derive(Iden)]
    enum Orders {
        Table,
        Id,
        CustomerId,
        TotalMinor,
        Status,
        StripeCheckoutSessionId,
        CreatedAt,
    }

    #[derive(Iden)]
    enum Tickets {
        Table,
        Id,
        OrderId,
        CustomerId,
        TicketTypeId,
        Status,
        CreatedAt,
    }
}
