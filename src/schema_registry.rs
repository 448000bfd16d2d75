//! Schema registry client and the Confluent wire format.
//!
//! A framed payload is a zero magic byte, the schema id as a big-endian `u32`,
//! then the Avro binary datum. Consumed payloads are decoded with the writer
//! schema looked up by id; produced payloads are encoded with a local schema
//! registered under `<topic>-value`.

use crate::config::SchemaRegistryConfig;
use crate::errors::PipelineError;
use apache_avro::{from_avro_datum, from_value, to_avro_datum, to_value, Schema};
use moka::future::Cache;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const MAGIC_BYTE: u8 = 0;
const HEADER_LEN: usize = 5;
const REGISTRY_CONTENT_TYPE: &str = "application/vnd.schemaregistry.v1+json";

/// Prepends the wire header to an Avro datum.
pub fn frame(schema_id: u32, datum: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(HEADER_LEN + datum.len());
    payload.push(MAGIC_BYTE);
    payload.extend_from_slice(&schema_id.to_be_bytes());
    payload.extend_from_slice(datum);
    payload
}

/// Splits a framed payload into schema id and datum.
pub fn unframe(payload: &[u8]) -> Result<(u32, &[u8]), PipelineError> {
    if payload.len() < HEADER_LEN {
        return Err(PipelineError::Serialization(format!(
            "payload of {} bytes is too short for a schema registry frame",
            payload.len()
        )));
    }
    if payload[0] != MAGIC_BYTE {
        return Err(PipelineError::Serialization(format!(
            "unknown magic byte {}",
            payload[0]
        )));
    }

    let id = u32::from_be_bytes([payload[1], payload[2], payload[3], payload[4]]);
    Ok((id, &payload[HEADER_LEN..]))
}

/// Subject name for the value schema of a topic.
pub fn value_subject(topic: &str) -> String {
    format!("{}-value", topic)
}

/// An Avro schema shipped with the application, kept with its source text
/// so it is registered exactly as written.
#[derive(Debug, Clone)]
pub struct LocalSchema {
    pub definition: String,
    pub schema: Schema,
}

impl LocalSchema {
    pub fn parse(definition: impl Into<String>) -> Result<Self, PipelineError> {
        let definition = definition.into();
        let schema = Schema::parse_str(&definition)?;
        Ok(Self { definition, schema })
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let definition = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read schema {}: {}", path.display(), e))?;
        Ok(Self::parse(definition)?)
    }
}

#[derive(Deserialize)]
struct SchemaByIdResponse {
    schema: String,
}

#[derive(Deserialize)]
struct RegisterResponse {
    id: u32,
}

/// HTTP client for a Confluent-compatible schema registry.
#[derive(Clone)]
pub struct SchemaRegistryClient {
    client: Client,
    base_url: String,
    basic_auth: Option<(String, String)>,
    /// Writer schemas by id. Ids are immutable in the registry.
    schemas_by_id: Cache<u32, Arc<Schema>>,
    /// Registered ids by subject.
    ids_by_subject: Cache<String, u32>,
}

impl SchemaRegistryClient {
    pub fn new(config: &SchemaRegistryConfig) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                PipelineError::Serialization(format!(
                    "Failed to create schema registry client: {}",
                    e
                ))
            })?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            basic_auth: config.basic_auth.clone(),
            schemas_by_id: Cache::builder().max_capacity(1_000).build(),
            ids_by_subject: Cache::builder().max_capacity(1_000).build(),
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.basic_auth {
            Some((user, pass)) => request.basic_auth(user, Some(pass)),
            None => request,
        }
    }

    /// Fetches (and caches) the schema registered under `id`.
    pub async fn schema_by_id(&self, id: u32) -> Result<Arc<Schema>, PipelineError> {
        if let Some(schema) = self.schemas_by_id.get(&id).await {
            return Ok(schema);
        }

        let url = format!("{}/schemas/ids/{}", self.base_url, id);
        tracing::debug!("Fetching schema id {} from {}", id, url);

        let response = self
            .authorize(self.client.get(&url))
            .header("Accept", REGISTRY_CONTENT_TYPE)
            .send()
            .await
            .map_err(|e| {
                PipelineError::Serialization(format!("Schema registry request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PipelineError::Serialization(format!(
                "Schema registry returned {} for schema id {}: {}",
                status, id, error_text
            )));
        }

        let body: SchemaByIdResponse = response.json().await.map_err(|e| {
            PipelineError::Serialization(format!("Failed to parse schema registry response: {}", e))
        })?;
        let schema = Arc::new(Schema::parse_str(&body.schema)?);

        self.schemas_by_id.insert(id, schema.clone()).await;
        Ok(schema)
    }

    /// Registers `schema` under `subject` and returns its id. Registering an
    /// identical schema again returns the existing id.
    pub async fn register(&self, subject: &str, schema: &LocalSchema) -> Result<u32, PipelineError> {
        if let Some(id) = self.ids_by_subject.get(subject).await {
            return Ok(id);
        }

        let url = format!("{}/subjects/{}/versions", self.base_url, subject);
        tracing::info!("Registering schema under subject '{}'", subject);

        let response = self
            .authorize(self.client.post(&url))
            .header("Content-Type", REGISTRY_CONTENT_TYPE)
            .json(&json!({ "schema": schema.definition }))
            .send()
            .await
            .map_err(|e| {
                PipelineError::Serialization(format!("Schema registry request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PipelineError::Serialization(format!(
                "Schema registration for '{}' failed {}: {}",
                subject, status, error_text
            )));
        }

        let body: RegisterResponse = response.json().await.map_err(|e| {
            PipelineError::Serialization(format!("Failed to parse registration response: {}", e))
        })?;

        tracing::info!("✓ Subject '{}' uses schema id {}", subject, body.id);
        self.ids_by_subject.insert(subject.to_string(), body.id).await;
        Ok(body.id)
    }

    /// Decodes a framed payload with the writer schema it references.
    pub async fn deserialize<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<T, PipelineError> {
        let (id, mut datum) = unframe(payload)?;
        let schema = self.schema_by_id(id).await?;
        let value = from_avro_datum(&schema, &mut datum, None)?;
        Ok(from_value::<T>(&value)?)
    }

    /// Encodes `record` with `schema`, registered for `topic`, into a framed payload.
    pub async fn serialize<T: Serialize>(
        &self,
        topic: &str,
        schema: &LocalSchema,
        record: &T,
    ) -> Result<Vec<u8>, PipelineError> {
        let id = self.register(&value_subject(topic), schema).await?;
        let datum = encode_datum(&schema.schema, record)?;
        Ok(frame(id, &datum))
    }
}

/// Avro binary encoding of `record` against `schema`, without framing.
pub fn encode_datum<T: Serialize>(schema: &Schema, record: &T) -> Result<Vec<u8>, PipelineError> {
    let value = to_value(record)?.resolve(schema)?;
    Ok(to_avro_datum(schema, value)?)
}
