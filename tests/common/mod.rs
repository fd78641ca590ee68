//! In-memory transport and acker doubles shared by the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use switchboard::{DispatchError, InboundMessage, MessageAck, PublishProps, Result, Transport};

/// One recorded `declare_queue` call
#[derive(Debug, Clone, PartialEq)]
pub struct Declared {
    pub name: String,
    pub exchange: String,
    pub routing_key: String,
    pub durable: bool,
}

/// One recorded `publish` call
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub exchange: String,
    pub routing_key: String,
    pub payload: Value,
    pub props: PublishProps,
}

/// Transport double: records declarations and publications, and serves
/// `get` from the recorded publications keyed by routing key.
#[derive(Default)]
pub struct MemoryTransport {
    declared: Mutex<Vec<Declared>>,
    published: Mutex<Vec<Published>>,
    pub fail_publish: AtomicBool,
}

impl MemoryTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn declared(&self) -> Vec<Declared> {
        self.declared.lock().unwrap().clone()
    }

    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }

    /// Publications routed to `queue`
    pub fn sent_to(&self, queue: &str) -> Vec<Published> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.routing_key == queue)
            .cloned()
            .collect()
    }

    pub fn fail_publishes(&self) {
        self.fail_publish.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn declare_queue(
        &self,
        name: &str,
        exchange: &str,
        routing_key: &str,
        durable: bool,
    ) -> Result<()> {
        self.declared.lock().unwrap().push(Declared {
            name: name.to_string(),
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            durable,
        });
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        props: PublishProps,
    ) -> Result<()> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(DispatchError::handler_error("broker unavailable"));
        }
        self.published.lock().unwrap().push(Published {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            payload: serde_json::from_slice(payload)?,
            props,
        });
        Ok(())
    }

    async fn get(&self, queue: &str) -> Result<Option<Vec<u8>>> {
        let mut published = self.published.lock().unwrap();
        match published.iter().position(|p| p.routing_key == queue) {
            Some(index) => {
                let message = published.remove(index);
                Ok(Some(serde_json::to_vec(&message.payload)?))
            }
            None => Ok(None),
        }
    }
}

/// Acker double counting how many acks reach the transport
pub struct CountingAck(pub Arc<AtomicUsize>);

#[async_trait]
impl MessageAck for CountingAck {
    async fn ack(&self) -> Result<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Inbound message with default reply metadata, plus its ack counter
pub fn inbound(body: Value) -> (Arc<InboundMessage>, Arc<AtomicUsize>) {
    inbound_with(body, Some("caller.client"), Some("corr-1"))
}

/// Inbound message with explicit reply metadata, plus its ack counter
pub fn inbound_with(
    body: Value,
    reply_to: Option<&str>,
    correlation_id: Option<&str>,
) -> (Arc<InboundMessage>, Arc<AtomicUsize>) {
    let acks = Arc::new(AtomicUsize::new(0));
    let message = Arc::new(InboundMessage::new(
        body,
        reply_to.map(str::to_string),
        correlation_id.map(str::to_string),
        Box::new(CountingAck(Arc::clone(&acks))),
    ));
    (message, acks)
}
