//! Kafka plumbing: client construction, the polled message source and the
//! enriched-lead publisher.

use crate::delivery::DeliveryOutcome;
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaResult;
use rdkafka::message::{Message, OwnedMessage};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::collections::BTreeMap;
use std::time::Duration;

/// Where the loop reads messages from.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Waits at most `timeout` for the next message. `None` means nothing arrived.
    async fn poll(&self, timeout: Duration) -> Option<KafkaResult<OwnedMessage>>;
}

/// Where the loop writes enriched leads to.
#[async_trait]
pub trait EnrichedLeadPublisher: Send + Sync {
    /// Publishes one payload and waits until the broker acknowledges or rejects it.
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> DeliveryOutcome;
}

fn client_config(defaults: &[(&str, &str)], settings: &BTreeMap<String, String>) -> ClientConfig {
    let mut config = ClientConfig::new();
    for (key, value) in defaults {
        config.set(*key, *value);
    }
    // Settings from the ini file win over the defaults.
    for (key, value) in settings {
        config.set(key.as_str(), value.as_str());
    }
    config
}

/// Consumer for the source topic.
pub fn create_consumer(
    settings: &BTreeMap<String, String>,
    group_id: &str,
    client_id: &str,
) -> KafkaResult<StreamConsumer> {
    client_config(
        &[
            ("group.id", group_id),
            ("client.id", client_id),
            ("auto.offset.reset", "earliest"),
        ],
        settings,
    )
    .create()
}

/// Producer for the enriched topic.
pub fn create_producer(
    settings: &BTreeMap<String, String>,
    client_id: &str,
) -> KafkaResult<FutureProducer> {
    client_config(&[("acks", "all"), ("client.id", client_id)], settings).create()
}

/// [`MessageSource`] backed by a subscribed consumer.
pub struct KafkaSource {
    consumer: StreamConsumer,
}

impl KafkaSource {
    pub fn subscribe(consumer: StreamConsumer, topic: &str) -> KafkaResult<Self> {
        consumer.subscribe(&[topic])?;
        Ok(Self { consumer })
    }

    /// Leaves the group. Offsets are committed per the consumer's commit settings.
    pub fn close(self) {
        self.consumer.unsubscribe();
        drop(self.consumer);
    }
}

#[async_trait]
impl MessageSource for KafkaSource {
    async fn poll(&self, timeout: Duration) -> Option<KafkaResult<OwnedMessage>> {
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_elapsed) => None,
            Ok(result) => Some(result.map(|message| message.detach())),
        }
    }
}

/// [`EnrichedLeadPublisher`] backed by a producer.
pub struct KafkaPublisher {
    producer: FutureProducer,
}

impl KafkaPublisher {
    pub fn new(producer: FutureProducer) -> Self {
        Self { producer }
    }
}

#[async_trait]
impl EnrichedLeadPublisher for KafkaPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> DeliveryOutcome {
        let record = FutureRecord::to(topic).key(key).payload(&payload);

        match self.producer.send(record, Timeout::Never).await {
            Ok((partition, offset)) => DeliveryOutcome::Delivered {
                topic: topic.to_string(),
                key: key.to_string(),
                partition,
                offset,
            },
            Err((error, message)) => DeliveryOutcome::Failed {
                topic: message.topic().to_string(),
                key: key.to_string(),
                error: error.to_string(),
            },
        }
    }
}
