use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error};

use crate::error::{DispatchError, Result};
use crate::message::InboundMessage;
use crate::transport::{PublishProps, Transport};

/// Publishes correlated RPC replies back to the requesting client.
///
/// Failure here is logged and swallowed: a reply that cannot be delivered
/// must not halt processing of subsequent messages, so neither missing
/// correlation metadata nor a transport-level publish failure ever reaches
/// the caller.
#[derive(Clone)]
pub struct ReplySender {
    transport: Arc<dyn Transport>,
    exchange: String,
}

impl ReplySender {
    /// Create a reply sender publishing through `transport` on `exchange`
    pub fn new(transport: Arc<dyn Transport>, exchange: impl Into<String>) -> Self {
        Self {
            transport,
            exchange: exchange.into(),
        }
    }

    /// Send `payload` back to the queue and correlation id carried by
    /// `message`. Handlers with nothing meaningful to say pass an empty
    /// mapping.
    pub async fn respond(&self, message: &InboundMessage, payload: Value) {
        match self.try_respond(message, &payload).await {
            Ok(()) => debug!("replied with response {}", payload),
            Err(e) => error!("unable to reply to request: {e}"),
        }
    }

    async fn try_respond(&self, message: &InboundMessage, payload: &Value) -> Result<()> {
        let reply_to = message
            .reply_to()
            .ok_or_else(|| DispatchError::ReplyDelivery("missing 'reply_to' in request".into()))?;
        let correlation_id = message
            .correlation_id()
            .ok_or_else(|| DispatchError::ReplyDelivery("missing 'correlation_id' in request".into()))?;

        let body = serde_json::to_vec(payload)?;
        self.transport
            .publish(
                &self.exchange,
                reply_to,
                &body,
                PublishProps::correlated(correlation_id),
            )
            .await
    }
}

impl std::fmt::Debug for ReplySender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplySender")
            .field("exchange", &self.exchange)
            .finish()
    }
}
