//! Lead GenAI Stream Library
//!
//! Enriches leads with public profile data. A streaming job consumes clean
//! lead events from Kafka, looks the person up through a search service,
//! scrapes the profile, summarizes it with a completion model and publishes
//! the enriched lead to a derived topic. A small CRUD service and a
//! provisioning tool manage the Postgres lead table.
//!
//! # Modules
//!
//! - `broker`: Kafka consumer/producer and the loop's source and sink traits.
//! - `config`: Ini connection settings, API keys and service endpoints.
//! - `db`: Database connection pool.
//! - `db_storage`: Lead table access.
//! - `delivery`: Publish outcome logging.
//! - `enrichment`: Profile URL lookup and profile scraping.
//! - `errors`: Error types.
//! - `handlers`: CRUD HTTP handlers.
//! - `logging`: Tracing subscriber setup.
//! - `models`: Data models.
//! - `pipeline`: The streaming enrichment loop.
//! - `schema_registry`: Schema registry client and Avro wire format.
//! - `summarization`: Prompt rendering and completion parsing.
//! - `templates`: Server-rendered CRM page.

pub mod broker;
pub mod config;
pub mod db;
pub mod db_storage;
pub mod delivery;
pub mod enrichment;
pub mod errors;
pub mod handlers;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod schema_registry;
pub mod summarization;
pub mod templates;
