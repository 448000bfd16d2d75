//! Delivery acknowledgment sink: records the result of every publish.
//!
//! Outcomes are only logged. Nothing is retried or persisted.

/// Result of publishing one enriched lead.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    Delivered {
        topic: String,
        key: String,
        partition: i32,
        offset: i64,
    },
    Failed {
        topic: String,
        key: String,
        error: String,
    },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }
}

/// Logs a delivery outcome.
pub fn report_delivery(outcome: &DeliveryOutcome) {
    match outcome {
        DeliveryOutcome::Delivered {
            topic,
            key,
            partition,
            offset,
        } => {
            tracing::info!(
                "<Callback> Message successfully produced to Topic '{}': Key = {}, Partition = {}, Offset = {}",
                topic,
                key,
                partition,
                offset
            );
        }
        DeliveryOutcome::Failed { topic, key, error } => {
            tracing::error!(
                "<Callback> Delivery failed for Data record {} on Topic '{}': {}",
                key,
                topic,
                error
            );
        }
    }
}
