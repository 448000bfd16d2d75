/// End-to-end runs of the enrichment loop against mocked external services
///
/// The schema registry, search, scraping and completion APIs are served by
/// wiremock; the broker is replaced by a scripted source and a recording
/// publisher so the whole consume, enrich, produce cycle runs in-process.
use apache_avro::{from_avro_datum, from_value};
use async_trait::async_trait;
use lead_genai_stream::broker::{EnrichedLeadPublisher, MessageSource};
use lead_genai_stream::config::{ApiKeys, SchemaRegistryConfig, ServiceEndpoints};
use lead_genai_stream::delivery::DeliveryOutcome;
use lead_genai_stream::enrichment::EnrichmentClient;
use lead_genai_stream::models::{CleanLeadEvent, EnrichedLead, StructuredSummary};
use lead_genai_stream::pipeline::{EnrichmentPipeline, LoopStats};
use lead_genai_stream::schema_registry::{
    encode_datum, frame, unframe, LocalSchema, SchemaRegistryClient,
};
use lead_genai_stream::summarization::Summarizer;
use rdkafka::error::{KafkaError, KafkaResult, RDKafkaErrorCode};
use rdkafka::message::{OwnedMessage, Timestamp};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SOURCE_SCHEMA: &str = include_str!("../schemas/clean_leads.avro");
const ENRICHED_SCHEMA: &str = include_str!("../schemas/clean_leads_enriched.avro");
const SOURCE_SCHEMA_ID: u32 = 1;
const ENRICHED_SCHEMA_ID: u32 = 2;

// ============ Test doubles ============

/// Hands out a fixed list of poll results, then cancels the run.
struct ScriptedSource {
    messages: Mutex<VecDeque<KafkaResult<OwnedMessage>>>,
    shutdown: CancellationToken,
}

impl ScriptedSource {
    fn new(messages: Vec<KafkaResult<OwnedMessage>>, shutdown: CancellationToken) -> Self {
        Self {
            messages: Mutex::new(messages.into()),
            shutdown,
        }
    }
}

#[async_trait]
impl MessageSource for ScriptedSource {
    async fn poll(&self, _timeout: Duration) -> Option<KafkaResult<OwnedMessage>> {
        let next = self.messages.lock().unwrap().pop_front();
        if next.is_none() {
            self.shutdown.cancel();
        }
        next
    }
}

#[derive(Debug, Clone)]
struct Published {
    topic: String,
    key: String,
    payload: Vec<u8>,
}

#[derive(Default)]
struct RecordingPublisher {
    published: Mutex<Vec<Published>>,
}

impl RecordingPublisher {
    fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl EnrichedLeadPublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> DeliveryOutcome {
        let mut published = self.published.lock().unwrap();
        published.push(Published {
            topic: topic.to_string(),
            key: key.to_string(),
            payload,
        });
        DeliveryOutcome::Delivered {
            topic: topic.to_string(),
            key: key.to_string(),
            partition: 0,
            offset: published.len() as i64 - 1,
        }
    }
}

/// Broker stand-in that rejects the first `rejections` publishes, then acks.
struct RejectingPublisher {
    rejections: Mutex<usize>,
    inner: RecordingPublisher,
}

impl RejectingPublisher {
    fn new(rejections: usize) -> Self {
        Self {
            rejections: Mutex::new(rejections),
            inner: RecordingPublisher::default(),
        }
    }
}

#[async_trait]
impl EnrichedLeadPublisher for RejectingPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> DeliveryOutcome {
        let reject = {
            let mut remaining = self.rejections.lock().unwrap();
            let reject = *remaining > 0;
            *remaining = remaining.saturating_sub(1);
            reject
        };

        if reject {
            return DeliveryOutcome::Failed {
                topic: topic.to_string(),
                key: key.to_string(),
                error: "Message production error: MessageTimedOut (Local: Message timed out)"
                    .to_string(),
            };
        }
        self.inner.publish(topic, key, payload).await
    }
}

// ============ Fixtures ============

fn melinda_french_gates() -> CleanLeadEvent {
    CleanLeadEvent {
        user_id: 2,
        first_name: "Melinda".to_string(),
        last_name: "French Gates".to_string(),
        company: "Pivotal Ventures".to_string(),
        email_address: None,
        phone_number: None,
    }
}

fn bill_gates() -> CleanLeadEvent {
    CleanLeadEvent {
        user_id: 1,
        first_name: "Bill".to_string(),
        last_name: "Gates".to_string(),
        company: "Microsoft".to_string(),
        email_address: Some("billgates@example.com".to_string()),
        phone_number: Some("+1-202-555-0131".to_string()),
    }
}

fn valid_summary() -> StructuredSummary {
    StructuredSummary {
        summary: "Co-founder of Microsoft and philanthropist.".to_string(),
        latest_position: "Co-chair, Bill & Melinda Gates Foundation".to_string(),
        facts: vec![
            "Started Microsoft with Paul Allen in 1975".to_string(),
            "Publishes yearly book recommendations".to_string(),
        ],
        topic_of_interest: "Global health".to_string(),
        ice_breakers: vec![
            "Which book changed your mind this year?".to_string(),
            "What is next for malaria eradication?".to_string(),
        ],
    }
}

fn framed_event(event: &CleanLeadEvent) -> Vec<u8> {
    let schema = LocalSchema::parse(SOURCE_SCHEMA).unwrap();
    let datum = encode_datum(&schema.schema, event).unwrap();
    frame(SOURCE_SCHEMA_ID, &datum)
}

fn consumed(payload: Vec<u8>, offset: i64) -> KafkaResult<OwnedMessage> {
    Ok(OwnedMessage::new(
        Some(payload),
        None,
        "clean_leads".to_string(),
        Timestamp::NotAvailable,
        0,
        offset,
        None,
    ))
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "choices": [
            {"index": 0, "message": {"role": "assistant", "content": content}, "finish_reason": "stop"}
        ]
    })
}

async fn mount_registry(mock_server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(format!("/schemas/ids/{}", SOURCE_SCHEMA_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"schema": SOURCE_SCHEMA})))
        .mount(mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/subjects/clean_leads_enriched-value/versions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": ENRICHED_SCHEMA_ID})))
        .mount(mock_server)
        .await;
}

async fn mount_search(mock_server: &MockServer, status: u16, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(mock_server)
        .await;
}

async fn mount_scrape(mock_server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/proxycurl/api/v2/linkedin"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "full_name": "Bill Gates",
            "occupation": "Co-chair at Bill & Melinda Gates Foundation",
            "people_also_viewed": [{"name": "Satya Nadella"}]
        })))
        .mount(mock_server)
        .await;
}

async fn mount_completion(mock_server: &MockServer, content: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(content)))
        .mount(mock_server)
        .await;
}

fn pipeline(mock_server: &MockServer) -> EnrichmentPipeline<RecordingPublisher> {
    pipeline_with(mock_server, RecordingPublisher::default())
}

fn pipeline_with<P: EnrichedLeadPublisher>(
    mock_server: &MockServer,
    publisher: P,
) -> EnrichmentPipeline<P> {
    let keys = ApiKeys {
        openai: "test_openai".to_string(),
        proxycurl: "test_proxycurl".to_string(),
        serpapi: "test_serpapi".to_string(),
    };
    let endpoints = ServiceEndpoints::single_host(&mock_server.uri());
    let registry = SchemaRegistryClient::new(&SchemaRegistryConfig {
        url: mock_server.uri(),
        basic_auth: None,
    })
    .unwrap();

    EnrichmentPipeline::new(
        registry,
        LocalSchema::parse(ENRICHED_SCHEMA).unwrap(),
        EnrichmentClient::new(&keys, &endpoints).unwrap(),
        Summarizer::new(&keys, &endpoints).unwrap(),
        publisher,
    )
}

async fn run_with<P: EnrichedLeadPublisher>(
    pipeline: &EnrichmentPipeline<P>,
    messages: Vec<KafkaResult<OwnedMessage>>,
) -> LoopStats {
    let shutdown = CancellationToken::new();
    let source = ScriptedSource::new(messages, shutdown.clone());
    pipeline.run(&source, &shutdown).await
}

fn decode_enriched(payload: &[u8]) -> EnrichedLead {
    let (id, mut datum) = unframe(payload).unwrap();
    assert_eq!(id, ENRICHED_SCHEMA_ID);
    let schema = LocalSchema::parse(ENRICHED_SCHEMA).unwrap();
    let value = from_avro_datum(&schema.schema, &mut datum, None).unwrap();
    from_value::<EnrichedLead>(&value).unwrap()
}

// ============ Scenarios ============

#[tokio::test]
async fn test_lead_is_enriched_and_published() {
    let mock_server = MockServer::start().await;
    mount_registry(&mock_server).await;
    mount_search(
        &mock_server,
        200,
        json!({"answer_box": {"answer": "https://linkedin.com/in/billg"}}),
    )
    .await;
    mount_scrape(&mock_server).await;
    let summary = valid_summary();
    mount_completion(&mock_server, &serde_json::to_string(&summary).unwrap()).await;

    let pipeline = pipeline(&mock_server);
    let stats = run_with(&pipeline, vec![consumed(framed_event(&bill_gates()), 0)]).await;

    assert_eq!(
        stats,
        LoopStats {
            received: 1,
            published: 1,
            skipped: 0
        }
    );

    let published = pipeline.publisher().published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic, "clean_leads_enriched");
    assert_eq!(published[0].key, "1");

    let lead = decode_enriched(&published[0].payload);
    assert_eq!(lead.user_id, 1);
    assert_eq!(lead.first_name, "Bill");
    assert_eq!(lead.company, "Microsoft");
    assert_eq!(lead.email_address.as_deref(), Some("billgates@example.com"));
    assert_eq!(lead.linkedin_profile_url, "https://linkedin.com/in/billg");

    let context: StructuredSummary = serde_json::from_str(&lead.context).unwrap();
    assert_eq!(context, summary);
}

#[tokio::test]
async fn test_fenced_model_answer_is_accepted() {
    let mock_server = MockServer::start().await;
    mount_registry(&mock_server).await;
    mount_search(
        &mock_server,
        200,
        json!({"organic_results": [
            {"link": "https://www.linkedin.com/in/williamhgates", "snippet": "Co-chair"}
        ]}),
    )
    .await;
    mount_scrape(&mock_server).await;
    let fenced = format!(
        "```json\n{}\n```",
        serde_json::to_string_pretty(&valid_summary()).unwrap()
    );
    mount_completion(&mock_server, &fenced).await;

    let pipeline = pipeline(&mock_server);
    let stats = run_with(&pipeline, vec![consumed(framed_event(&bill_gates()), 0)]).await;

    assert_eq!(stats.published, 1);
    let lead = decode_enriched(&pipeline.publisher().published()[0].payload);
    assert_eq!(
        lead.linkedin_profile_url,
        "https://www.linkedin.com/in/williamhgates"
    );
}

#[tokio::test]
async fn test_search_error_skips_message_and_loop_continues() {
    let mock_server = MockServer::start().await;
    mount_registry(&mock_server).await;
    mount_search(&mock_server, 200, json!({"error": "Invalid API key."})).await;

    let pipeline = pipeline(&mock_server);
    let stats = run_with(
        &pipeline,
        vec![
            consumed(framed_event(&bill_gates()), 0),
            consumed(framed_event(&bill_gates()), 1),
        ],
    )
    .await;

    assert_eq!(
        stats,
        LoopStats {
            received: 2,
            published: 0,
            skipped: 2
        }
    );
    assert!(pipeline.publisher().published().is_empty());
}

#[tokio::test]
async fn test_unusable_model_answer_publishes_nothing() {
    let mock_server = MockServer::start().await;
    mount_registry(&mock_server).await;
    mount_search(
        &mock_server,
        200,
        json!({"answer_box": {"answer": "https://linkedin.com/in/billg"}}),
    )
    .await;
    mount_scrape(&mock_server).await;
    mount_completion(&mock_server, "Sorry, I cannot help with that.").await;

    let pipeline = pipeline(&mock_server);
    let stats = run_with(&pipeline, vec![consumed(framed_event(&bill_gates()), 0)]).await;

    assert_eq!(stats.skipped, 1);
    assert!(pipeline.publisher().published().is_empty());
}

#[tokio::test]
async fn test_broker_error_and_bad_payload_are_skipped() {
    let mock_server = MockServer::start().await;
    mount_registry(&mock_server).await;
    mount_search(
        &mock_server,
        200,
        json!({"answer_box": {"answer": "https://linkedin.com/in/billg"}}),
    )
    .await;
    mount_scrape(&mock_server).await;
    mount_completion(
        &mock_server,
        &serde_json::to_string(&valid_summary()).unwrap(),
    )
    .await;

    let pipeline = pipeline(&mock_server);
    let stats = run_with(
        &pipeline,
        vec![
            Err(KafkaError::MessageConsumption(
                RDKafkaErrorCode::BrokerTransportFailure,
            )),
            consumed(b"not avro".to_vec(), 1),
            consumed(framed_event(&bill_gates()), 2),
        ],
    )
    .await;

    assert_eq!(
        stats,
        LoopStats {
            received: 3,
            published: 1,
            skipped: 2
        }
    );
    assert_eq!(pipeline.publisher().published().len(), 1);
}

async fn mount_successful_enrichment(mock_server: &MockServer) {
    mount_registry(mock_server).await;
    mount_search(
        mock_server,
        200,
        json!({"answer_box": {"answer": "https://linkedin.com/in/billg"}}),
    )
    .await;
    mount_scrape(mock_server).await;
    mount_completion(
        mock_server,
        &serde_json::to_string(&valid_summary()).unwrap(),
    )
    .await;
}

#[tokio::test]
async fn test_rejected_publish_counts_as_skipped() {
    let mock_server = MockServer::start().await;
    mount_successful_enrichment(&mock_server).await;

    let pipeline = pipeline_with(&mock_server, RejectingPublisher::new(1));
    let stats = run_with(&pipeline, vec![consumed(framed_event(&bill_gates()), 0)]).await;

    assert_eq!(
        stats,
        LoopStats {
            received: 1,
            published: 0,
            skipped: 1
        }
    );
    assert!(pipeline.publisher().inner.published().is_empty());
}

#[tokio::test]
async fn test_rejected_publish_does_not_block_next_message() {
    let mock_server = MockServer::start().await;
    mount_successful_enrichment(&mock_server).await;

    let pipeline = pipeline_with(&mock_server, RejectingPublisher::new(1));
    let stats = run_with(
        &pipeline,
        vec![
            consumed(framed_event(&bill_gates()), 0),
            consumed(framed_event(&melinda_french_gates()), 1),
        ],
    )
    .await;

    assert_eq!(
        stats,
        LoopStats {
            received: 2,
            published: 1,
            skipped: 1
        }
    );
    let published = pipeline.publisher().inner.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].key, "2");
}

#[tokio::test]
async fn test_failed_lookup_is_followed_by_successful_publish() {
    let mock_server = MockServer::start().await;
    mount_registry(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "Bill Gates Microsoft"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"error": "Google hasn't returned any results for this query."})),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "Melinda French Gates Pivotal Ventures"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "organic_results": [
                {"link": "https://www.linkedin.com/in/melindafrenchgates", "snippet": "Founder"}
            ]
        })))
        .mount(&mock_server)
        .await;
    mount_scrape(&mock_server).await;
    mount_completion(
        &mock_server,
        &serde_json::to_string(&valid_summary()).unwrap(),
    )
    .await;

    let pipeline = pipeline(&mock_server);
    let stats = run_with(
        &pipeline,
        vec![
            consumed(framed_event(&bill_gates()), 0),
            consumed(framed_event(&melinda_french_gates()), 1),
        ],
    )
    .await;

    assert_eq!(
        stats,
        LoopStats {
            received: 2,
            published: 1,
            skipped: 1
        }
    );
    let published = pipeline.publisher().published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].key, "2");

    let lead = decode_enriched(&published[0].payload);
    assert_eq!(lead.user_id, 2);
    assert_eq!(lead.email_address, None);
    assert_eq!(
        lead.linkedin_profile_url,
        "https://www.linkedin.com/in/melindafrenchgates"
    );
}

#[tokio::test]
async fn test_cancelled_before_start_consumes_nothing() {
    let mock_server = MockServer::start().await;
    let pipeline = pipeline(&mock_server);

    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let source = ScriptedSource::new(
        vec![consumed(framed_event(&bill_gates()), 0)],
        shutdown.clone(),
    );

    let stats = pipeline.run(&source, &shutdown).await;

    assert_eq!(stats, LoopStats::default());
    assert_eq!(source.messages.lock().unwrap().len(), 1);
}
