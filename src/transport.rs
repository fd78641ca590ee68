use async_trait::async_trait;

use crate::error::Result;

/// Properties attached to an outbound publication.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishProps {
    /// Correlation id the receiver uses to match a reply to its request
    pub correlation_id: Option<String>,
    /// Queue the receiver should publish its reply to
    pub reply_to: Option<String>,
}

impl PublishProps {
    /// Properties for a reply correlated to an inbound request
    pub fn correlated(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: Some(correlation_id.into()),
            reply_to: None,
        }
    }
}

/// The seam to the broker collaborator.
///
/// Everything below this trait (connection pooling, delivery mechanics,
/// acknowledgement wire ops) belongs to the messaging library; the
/// dispatch layer only declares queues, publishes, and polls replies.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Declare `name` and bind it to `exchange` under `routing_key`.
    /// An empty exchange means the broker's default direct exchange,
    /// which needs no explicit binding.
    async fn declare_queue(
        &self,
        name: &str,
        exchange: &str,
        routing_key: &str,
        durable: bool,
    ) -> Result<()>;

    /// Publish `payload` to `routing_key` on `exchange`.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        props: PublishProps,
    ) -> Result<()>;

    /// Poll a single message off `queue`, acknowledging it. `None` when
    /// the queue is empty.
    async fn get(&self, queue: &str) -> Result<Option<Vec<u8>>>;
}
