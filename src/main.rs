use clap::Parser;
use lead_genai_stream::broker::{create_consumer, create_producer, KafkaPublisher, KafkaSource};
use lead_genai_stream::config::{
    ApiKeys, ConnectionSettings, ServiceEndpoints, CONFIG_FOLDER, ENV_VAR_FILE,
};
use lead_genai_stream::enrichment::EnrichmentClient;
use lead_genai_stream::errors::ConfigError;
use lead_genai_stream::logging::{init_tracing, load_env_files, shutdown_signal};
use lead_genai_stream::pipeline::EnrichmentPipeline;
use lead_genai_stream::schema_registry::{LocalSchema, SchemaRegistryClient};
use lead_genai_stream::summarization::Summarizer;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

/// Schema of the records published to the enriched topic.
const ENRICHED_SCHEMA_PATH: &str = "schemas/clean_leads_enriched.avro";

/// GenAI Streaming Application
#[derive(Debug, Parser)]
#[command(about = "GenAI Streaming Application")]
struct Cli {
    /// Topic name
    #[arg(long, default_value = "clean_leads")]
    topic: String,

    /// Config filename for additional configuration, such as credentials
    /// (files must be inside the folder `config/`)
    #[arg(long, default_value = "localhost.ini")]
    config_filename: String,

    /// Consumer's Group ID
    #[arg(long, default_value = "demo-genai")]
    group_id: String,

    /// Consumer's Client ID
    #[arg(long, default_value = "demo-genai-01")]
    client_id: String,
}

fn print_api_key_hint() {
    println!("cat > {} <<EOF", ENV_VAR_FILE);
    println!("export OPENAI_API_KEY=<openAI_Key_here>       # https://platform.openai.com/docs/quickstart/account-setup");
    println!("export PROXYCURL_API_KEY=<ProxyURL_Key_here>  # https://nubela.co/proxycurl/");
    println!("export SERPAPI_API_KEY=<SERP_Key_here>     # https://serpapi.com/");
    println!("EOF\n");
}

/// Entry point of the streaming enrichment job.
///
/// Checks the API keys, loads the connection settings, builds the clients and
/// runs the loop until Ctrl-C or SIGTERM. Missing keys exit with status 1.
#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    load_env_files(&[ENV_VAR_FILE, ".env"]);

    init_tracing("lead_genai_stream=info");
    let cli = Cli::parse();

    let keys = match ApiKeys::from_env() {
        Ok(keys) => keys,
        Err(ConfigError::MissingEnv(name)) => {
            tracing::error!("Environment variable {} not defined!", name);
            tracing::warn!(
                "Generate the API Keys required and have them saved into the file '{}':",
                ENV_VAR_FILE
            );
            print_api_key_hint();
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => return Err(e.into()),
    };
    let endpoints = ServiceEndpoints::from_env()?;

    let settings = ConnectionSettings::load(CONFIG_FOLDER, &cli.config_filename)?;
    tracing::info!("Configuration loaded successfully");

    let registry = SchemaRegistryClient::new(settings.require_schema_registry()?)?;
    let destination_schema = LocalSchema::load(ENRICHED_SCHEMA_PATH)?;

    let producer = create_producer(&settings.kafka, &cli.client_id)?;
    let consumer = create_consumer(&settings.kafka, &cli.group_id, &cli.client_id)?;

    let pipeline = EnrichmentPipeline::new(
        registry,
        destination_schema,
        EnrichmentClient::new(&keys, &endpoints)?,
        Summarizer::new(&keys, &endpoints)?,
        KafkaPublisher::new(producer),
    );

    let source = KafkaSource::subscribe(consumer, &cli.topic)?;
    tracing::info!(
        "Started consumer {} ({}) on topic '{}'",
        cli.client_id,
        cli.group_id,
        cli.topic
    );

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            tracing::warn!("CTRL-C pressed by user!");
            shutdown.cancel();
        }
    });

    pipeline.run(&source, &shutdown).await;

    tracing::info!("Closing consumer {} ({})", cli.client_id, cli.group_id);
    source.close();

    Ok(ExitCode::SUCCESS)
}
