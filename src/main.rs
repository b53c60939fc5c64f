use clap::Parser;
use comicgen::config::{build_coordinator, setup_logging};
use sea_orm_migration::MigratorTrait;
use tracing::error;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = comicgen::cli::CliOptions::parse();

    if setup_logging(cli.debug).is_err() {
        return;
    }

    let db = match comicgen::db::connect_db(&cli.pipeline.database_path).await {
        Ok(db) => db,
        Err(err) => {
            error!("Database connection error: {}", err);
            return;
        }
    };

    if let Err(err) = comicgen::db::migrations::Migrator::up(&db, None).await {
        error!("Database migration error: {}", err);
        return;
    }

    let coordinator = match build_coordinator(&cli.pipeline, db) {
        Ok(coordinator) => coordinator,
        Err(err) => {
            error!("Configuration error: {:#}", err);
            return;
        }
    };

    if let Err(err) = comicgen::web::setup_server(
        &cli.listen_address,
        cli.port,
        &cli.owner_header,
        cli.pipeline.panel_dir.clone(),
        coordinator,
    )
    .await
    {
        error!("Application error: {}", err);
    }
}
