use std::future::Future;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// User-supplied processing for one inbound payload.
///
/// The return value is published verbatim as the RPC reply; task-style
/// registrations discard it. Handlers with nothing meaningful to return
/// answer with an empty mapping.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Process one message body
    async fn call(&self, body: Value) -> Result<Value>;

    /// Handler name for logging
    fn name(&self) -> &str {
        "handler"
    }
}

/// Adapter so plain async closures register without a trait impl
pub struct FunctionHandler<F> {
    name: String,
    function: F,
}

impl<F> FunctionHandler<F> {
    /// Wrap `function` under `name`
    pub fn new(name: impl Into<String>, function: F) -> Self {
        Self {
            name: name.into(),
            function,
        }
    }
}

#[async_trait]
impl<F, Fut> Handler for FunctionHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    async fn call(&self, body: Value) -> Result<Value> {
        (self.function)(body).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
