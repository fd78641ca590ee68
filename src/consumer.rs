use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use lapin::options::BasicAckOptions;

use crate::connection::{ChannelAck, ConnectionManager};
use crate::error::Result;
use crate::message::InboundMessage;
use crate::registrator::Registrator;
use crate::registry::MessageCallback;

/// Start consuming every queue the registrator has bound handlers to.
///
/// One task is spawned per distinct queue. Direct mode runs each
/// registration's wrapped callback; legacy mode runs the message router
/// once per delivery on the shared queue. Callback errors are logged and
/// never terminate a loop; the tasks run until the connection closes.
///
/// Registration is expected to be complete before this is called.
pub async fn consume(
    registrator: &Registrator,
    connection: Arc<ConnectionManager>,
) -> Result<Vec<JoinHandle<()>>> {
    let targets = registrator.consumer_targets().await;
    let mut handles = Vec::with_capacity(targets.len());

    for (queue, callbacks) in targets {
        let consumer_tag = format!("switchboard-{}-{}", queue, Uuid::new_v4());
        let (channel, consumer) = connection.create_consumer(&queue, &consumer_tag).await?;
        handles.push(tokio::spawn(consume_queue(queue, channel, consumer, callbacks)));
    }

    info!("consuming {} queue(s)", handles.len());
    Ok(handles)
}

async fn consume_queue(
    queue: String,
    channel: lapin::Channel,
    consumer: lapin::Consumer,
    callbacks: Vec<MessageCallback>,
) {
    info!("consumer started for queue {queue:?}");

    let mut stream = consumer;
    while let Some(delivery_result) = stream.next().await {
        match delivery_result {
            Ok(delivery) => {
                let body: Value = match serde_json::from_slice(&delivery.data) {
                    Ok(body) => body,
                    Err(e) => {
                        // a poison message must not wedge the queue
                        error!("discarding undecodable payload on {queue:?}: {e}");
                        if let Err(e) = channel
                            .basic_ack(delivery.delivery_tag, BasicAckOptions::default())
                            .await
                        {
                            error!("failed to acknowledge discarded message: {e}");
                        }
                        continue;
                    }
                };

                let message = Arc::new(InboundMessage::new(
                    body.clone(),
                    delivery
                        .properties
                        .reply_to()
                        .as_ref()
                        .map(|s| s.as_str().to_string()),
                    delivery
                        .properties
                        .correlation_id()
                        .as_ref()
                        .map(|s| s.as_str().to_string()),
                    Box::new(ChannelAck {
                        channel: channel.clone(),
                        delivery_tag: delivery.delivery_tag,
                    }),
                ));

                debug!("delivery on {queue:?}: {body}");
                for callback in &callbacks {
                    if let Err(e) = callback(body.clone(), Arc::clone(&message)).await {
                        error!("handler on {queue:?} failed: {e}");
                    }
                }
            }
            Err(e) => {
                error!("error receiving delivery on {queue:?}: {e}");
            }
        }
    }

    warn!("consumer stopped for queue {queue:?}");
}
