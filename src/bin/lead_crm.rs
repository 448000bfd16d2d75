//! CRUD web service over the lead table.

use clap::Parser;
use lead_genai_stream::config::{ConnectionSettings, CONFIG_FOLDER};
use lead_genai_stream::db::Database;
use lead_genai_stream::db_storage::LeadRepository;
use lead_genai_stream::handlers::{self, AppState};
use lead_genai_stream::logging::{init_tracing, load_env_files, shutdown_signal};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_governor::{governor::GovernorConfigBuilder, key_extractor::PeerIpKeyExtractor, GovernorLayer};

#[derive(Debug, Parser)]
#[command(about = "Lead CRM web service")]
struct Cli {
    /// Config filename inside the folder `config/`
    #[arg(long, default_value = "localhost.ini")]
    config_filename: String,

    #[arg(long, default_value = "localhost")]
    host: String,

    #[arg(long, env = "PORT", default_value_t = 8000)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env_files(&[".env"]);
    init_tracing("lead_genai_stream=debug,lead_crm=debug,tower_http=debug");
    let cli = Cli::parse();

    let settings = ConnectionSettings::load(CONFIG_FOLDER, &cli.config_filename)?;
    let db = Database::new(&settings.database_url()?).await?;
    tracing::info!("Database connection pool established");

    let state = Arc::new(AppState {
        leads: LeadRepository::new(db.pool.clone()),
    });

    // 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(PeerIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    let app = handlers::router(state).layer(GovernorLayer {
        config: governor_conf,
    });

    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}
