//! Migration CLI for the entity state table.
//!
//! `cargo run -p migration -- up` applies pending migrations to `DATABASE_URL`;
//! the service also applies them on startup.

use sea_orm_migration::prelude::*;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    cli::run_cli(migration::Migrator).await;
}
