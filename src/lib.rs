//! # Switchboard - Queue-Backed Command Dispatch
//!
//! Switchboard lets a process register named handler functions, bind each
//! to an AMQP queue, route inbound command messages to the right handler,
//! and send correlated replies back to RPC callers.
//!
//! Two routing strategies:
//! - **Direct mode**: one queue per handler, named `<prefix>.<handler>`
//!   unless overridden.
//! - **Legacy mode**: many commands multiplexed onto one shared queue,
//!   told apart by the `command` field of a `{command, data}` envelope.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use switchboard::{AmqpTransport, ConnectionManager, Registrator, RegistratorConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connection = Arc::new(ConnectionManager::new("amqp://localhost:5672"));
//!     connection.connect().await?;
//!     let transport = Arc::new(AmqpTransport::new(Arc::clone(&connection)));
//!
//!     let registrator = Registrator::new(RegistratorConfig::direct("svc"), transport)?;
//!     registrator
//!         .rpc("echo", |body| async move { Ok(body) })
//!         .await?;
//!
//!     for handle in switchboard::consume(&registrator, connection).await? {
//!         handle.await?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod connection;
pub mod consumer;
pub mod error;
pub mod handler;
pub mod message;
pub mod registrator;
pub mod registry;
pub mod reply;
pub mod router;
pub mod transport;

pub use client::RpcClient;
pub use connection::{AmqpTransport, ConnectionConfig, ConnectionManager};
pub use consumer::consume;
pub use error::{DispatchError, Result};
pub use handler::{FunctionHandler, Handler};
pub use message::{Envelope, InboundMessage, MessageAck};
pub use registrator::{DispatchMode, InvokeStyle, Registrator, RegistratorConfig};
pub use registry::{MessageCallback, QueueBinding, Registry};
pub use reply::ReplySender;
pub use router::MessageRouter;
pub use transport::{PublishProps, Transport};
