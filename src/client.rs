use std::sync::Arc;

use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::message::Envelope;
use crate::transport::{PublishProps, Transport};

/// Caller side of the wire contract: publish a command with reply
/// correlation, then drain the correlated replies.
///
/// Replies land on a per-command queue named `<command>.client`. By
/// default requests are wrapped in the legacy `{command, data}` envelope;
/// switch that off to send the raw payload to a direct-mode handler.
pub struct RpcClient {
    transport: Arc<dyn Transport>,
    exchange: String,
    prefix: String,
    legacy: bool,
}

impl RpcClient {
    /// Create a client publishing through `transport` on `exchange`
    pub fn new(transport: Arc<dyn Transport>, exchange: impl Into<String>) -> Self {
        Self {
            transport,
            exchange: exchange.into(),
            prefix: "switchboard".to_string(),
            legacy: true,
        }
    }

    /// Wrap requests in the legacy envelope (the default) or send raw
    pub fn legacy(mut self, legacy: bool) -> Self {
        self.legacy = legacy;
        self
    }

    /// Prefix used to derive the server routing key from the command
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Publish `command` with `payload` and return the correlation id.
    ///
    /// The server queue defaults to `<prefix>.<command>`; pass
    /// `routing_key` to aim at a shared legacy queue instead.
    pub async fn call(
        &self,
        command: &str,
        payload: Value,
        routing_key: Option<&str>,
    ) -> Result<String> {
        let command = command.to_lowercase();
        let reply_queue = format!("{command}.client");
        self.transport
            .declare_queue(&reply_queue, &self.exchange, &reply_queue, false)
            .await?;

        let routing_key = routing_key
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}.{command}", self.prefix));

        let body = if self.legacy {
            Envelope::new(command.clone(), payload)?.to_bytes()?
        } else {
            serde_json::to_vec(&payload)?
        };

        let correlation_id = Uuid::new_v4().to_string();
        self.transport
            .publish(
                &self.exchange,
                &routing_key,
                &body,
                PublishProps {
                    correlation_id: Some(correlation_id.clone()),
                    reply_to: Some(reply_queue),
                },
            )
            .await?;

        debug!("sent {command:?} to {routing_key:?} (correlation_id: {correlation_id})");
        Ok(correlation_id)
    }

    /// Drain every reply currently queued for `command`
    pub async fn collect_replies(&self, command: &str) -> Result<Vec<Value>> {
        let queue = format!("{}.client", command.to_lowercase());
        let mut replies = Vec::new();
        while let Some(payload) = self.transport.get(&queue).await? {
            replies.push(serde_json::from_slice(&payload)?);
        }
        Ok(replies)
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("exchange", &self.exchange)
            .field("prefix", &self.prefix)
            .field("legacy", &self.legacy)
            .finish()
    }
}
