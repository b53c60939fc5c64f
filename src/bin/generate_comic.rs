use anyhow::{Context, Result, anyhow};
use clap::Parser;
use comicgen::cli::PipelineOptions;
use comicgen::config::{build_coordinator, setup_logging};
use comicgen::owner::OwnerId;
use comicgen::pipeline::Charge;
use sea_orm_migration::MigratorTrait;

/// Generate one comic from the command line.
///
/// Minimal UX:
///   generate_comic "a robot learns to paint"
#[derive(Parser, Debug)]
#[command(name = "generate_comic")]
#[command(about = "Plan, render and store one comic strip, printing the panel URLs")]
struct Args {
    /// The story idea
    idea: String,

    /// Owner the comic is stored and charged under
    #[arg(long, default_value = "cli", env = "COMICGEN_CLI_OWNER")]
    owner: String,

    /// Add purchased credits to the owner before running
    #[arg(long)]
    top_up: Option<i64>,

    /// Print the whole result as JSON instead of a listing
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    #[clap(flatten)]
    pipeline: PipelineOptions,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.debug).map_err(|err| anyhow!("Failed to set up logging: {err}"))?;

    let owner = OwnerId::new(&args.owner).context("Invalid owner")?;
    let db = comicgen::db::connect_db(&args.pipeline.database_path)
        .await
        .with_context(|| format!("Failed to open {}", args.pipeline.database_path))?;
    comicgen::db::migrations::Migrator::up(&db, None)
        .await
        .context("Failed to run migrations")?;
    tokio::fs::create_dir_all(&args.pipeline.panel_dir)
        .await
        .with_context(|| format!("Failed to create {}", args.pipeline.panel_dir.display()))?;

    let coordinator = build_coordinator(&args.pipeline, db)?;
    if let Some(amount) = args.top_up {
        let balance = coordinator.meter().top_up(&owner, amount).await?;
        eprintln!("Purchased balance for {owner}: {balance}");
    }

    let strip = coordinator.run(&args.idea, &owner).await?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&strip).context("Failed to encode result")?
        );
        return Ok(());
    }

    if let Some(title) = &strip.title {
        println!("{title}");
    }
    for panel in &strip.panels {
        println!("{}. {}\n   {}", panel.scene_index, panel.caption, panel.image_url);
    }
    if !strip.dropped_scenes.is_empty() {
        eprintln!("Dropped scenes: {:?}", strip.dropped_scenes);
    }
    match strip.record_id {
        Some(id) => eprintln!("Saved as comic {id}"),
        None => eprintln!("The comic could not be saved"),
    }
    match strip.charge {
        Charge::Daily => eprintln!("Paid from the daily allowance"),
        Charge::Purchased { remaining } => {
            eprintln!("Paid from purchased credits, {remaining} left")
        }
        Charge::Failed => eprintln!("Charging failed"),
    }
    Ok(())
}
