//! Streaming enrichment loop
//!
//! For each lead consumed from the source topic:
//! 1. Decode the event against its registered schema
//! 2. Resolve the profile URL and scrape the profile
//! 3. Summarize the profile with the completion model
//! 4. Publish the enriched lead to `<source>_enriched` and wait for the ack
//!
//! Every failure is confined to its message: it is logged, nothing is
//! published for that message, and the loop moves on to the next poll.

use crate::broker::{EnrichedLeadPublisher, MessageSource};
use crate::delivery::{report_delivery, DeliveryOutcome};
use crate::enrichment::EnrichmentClient;
use crate::errors::PipelineError;
use crate::models::{CleanLeadEvent, EnrichedLead};
use crate::schema_registry::{LocalSchema, SchemaRegistryClient};
use crate::summarization::Summarizer;
use rdkafka::message::{Message, OwnedMessage};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Upper bound on one poll, so shutdown is noticed promptly while idle.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(250);

pub const ENRICHED_TOPIC_SUFFIX: &str = "_enriched";

/// Destination topic for a source topic.
pub fn enriched_topic(source_topic: &str) -> String {
    format!("{}{}", source_topic, ENRICHED_TOPIC_SUFFIX)
}

/// Plain-text search key for a lead: first name, last name, company.
pub fn information_key(event: &CleanLeadEvent) -> String {
    format!("{} {} {}", event.first_name, event.last_name, event.company)
}

/// Counters for one run of the loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopStats {
    /// Messages (or broker errors) returned by the source.
    pub received: u64,
    /// Enriched leads acknowledged by the broker.
    pub published: u64,
    /// Messages that produced no acknowledged enriched lead.
    pub skipped: u64,
}

/// The consume, enrich, produce cycle. Client handles are read-only once built.
pub struct EnrichmentPipeline<P> {
    registry: SchemaRegistryClient,
    destination_schema: LocalSchema,
    enrichment: EnrichmentClient,
    summarizer: Summarizer,
    publisher: P,
}

impl<P: EnrichedLeadPublisher> EnrichmentPipeline<P> {
    pub fn new(
        registry: SchemaRegistryClient,
        destination_schema: LocalSchema,
        enrichment: EnrichmentClient,
        summarizer: Summarizer,
        publisher: P,
    ) -> Self {
        Self {
            registry,
            destination_schema,
            enrichment,
            summarizer,
            publisher,
        }
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Polls `source` until `shutdown` is cancelled.
    ///
    /// Cancellation is only observed between messages: a message being
    /// processed always runs to the end of its publish.
    pub async fn run<S: MessageSource>(&self, source: &S, shutdown: &CancellationToken) -> LoopStats {
        let mut stats = LoopStats::default();

        loop {
            let polled = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                polled = source.poll(POLL_TIMEOUT) => polled,
            };

            let Some(polled) = polled else {
                continue;
            };
            stats.received += 1;

            let result = match polled {
                Ok(message) => self.process_message(&message).await,
                Err(e) => Err(PipelineError::Broker(e)),
            };

            match result {
                Ok(outcome) if outcome.is_delivered() => stats.published += 1,
                Ok(_) => stats.skipped += 1,
                Err(e) if e.is_external_service() => {
                    tracing::error!("An error occured (LLM): {}", e);
                    stats.skipped += 1;
                }
                Err(e) => {
                    tracing::error!("An error occured (Confluent Platform): {}", e);
                    stats.skipped += 1;
                }
            }
        }

        tracing::info!(
            "Enrichment loop stopped: {} received, {} published, {} skipped",
            stats.received,
            stats.published,
            stats.skipped
        );
        stats
    }

    /// Runs one consumed message through the whole cycle.
    ///
    /// Returns the delivery outcome of the enriched lead, or the error that
    /// stopped the message before anything was published.
    pub async fn process_message(
        &self,
        message: &OwnedMessage,
    ) -> Result<DeliveryOutcome, PipelineError> {
        let payload = message.payload().ok_or_else(|| {
            PipelineError::Serialization(format!(
                "Empty payload at {}[{}]@{}",
                message.topic(),
                message.partition(),
                message.offset()
            ))
        })?;

        let event: CleanLeadEvent = self.registry.deserialize(payload).await?;
        tracing::info!(
            "New message received: {}",
            serde_json::to_string(&event).unwrap_or_else(|_| format!("{:?}", event))
        );

        let enriched = self.enrich(&event).await?;

        let topic = enriched_topic(message.topic());
        tracing::info!("Producing enriched lead to topic: {}", topic);
        let value = self
            .registry
            .serialize(&topic, &self.destination_schema, &enriched)
            .await?;

        let key = enriched.user_id.to_string();
        let outcome = self.publisher.publish(&topic, &key, value).await;
        report_delivery(&outcome);
        Ok(outcome)
    }

    /// Lookup, scrape and summarize. Any failure means no enriched lead.
    pub async fn enrich(&self, event: &CleanLeadEvent) -> Result<EnrichedLead, PipelineError> {
        let information = information_key(event);
        tracing::info!("Search for information: {} with genAI!", information);

        let profile_url = self.enrichment.lookup_profile_url(&information).await?;
        tracing::info!("LinkedIn profile URL: {}", profile_url);

        let profile = self.enrichment.fetch_profile(&profile_url).await?;
        let summary = self.summarizer.summarize(&profile).await?;

        EnrichedLead::from_event(event, &summary, profile_url).map_err(|e| {
            PipelineError::Summarization(format!("Failed to serialize summary: {}", e))
        })
    }
}
