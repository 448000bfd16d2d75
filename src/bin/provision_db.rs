//! Creates the lead table and seeds the example lead. Safe to run repeatedly.

use clap::Parser;
use lead_genai_stream::config::{ConnectionSettings, CONFIG_FOLDER};
use lead_genai_stream::db::Database;
use lead_genai_stream::db_storage::{LeadRepository, LEADS_TABLE};
use lead_genai_stream::logging::{init_tracing, load_env_files};

#[derive(Debug, Parser)]
#[command(about = "Provision the lead table")]
struct Cli {
    /// Config filename inside the folder `config/`
    #[arg(long, default_value = "localhost.ini")]
    config_filename: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env_files(&[".env"]);
    init_tracing("lead_genai_stream=info,provision_db=info");
    let cli = Cli::parse();

    let settings = ConnectionSettings::load(CONFIG_FOLDER, &cli.config_filename)?;
    let db = Database::new(&settings.database_url()?).await?;
    let leads = LeadRepository::new(db.pool.clone());

    leads.ensure_table().await?;
    tracing::info!("Table {} is ready", LEADS_TABLE);

    match leads.seed_example_lead().await? {
        Some(user_id) => tracing::info!("Initial lead successfully created (user_id {})", user_id),
        None => tracing::info!("Initial lead already present, nothing to seed"),
    }

    Ok(())
}
