//! Topic handlers

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use switchboard_core::{Address, Envelope, HandlerFault, MessageId};

/// What a handler sees of an incoming request.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    /// Origin of the request, as stamped by the hub
    pub sender: Address,
    /// Topic the request was sent under
    pub topic: String,
    /// Request data
    pub payload: Value,
    /// Request id
    pub message_id: MessageId,
    /// Creation time, milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl From<&Envelope> for IncomingMessage {
    fn from(envelope: &Envelope) -> Self {
        Self {
            sender: envelope.origin.clone(),
            topic: envelope.topic.clone(),
            payload: envelope.payload.clone(),
            message_id: envelope.message_id,
            timestamp: envelope.timestamp,
        }
    }
}

/// Answers requests sent under one topic.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Produce the reply payload, or a fault to send back instead
    async fn handle(&self, message: IncomingMessage) -> Result<Value, HandlerFault>;
}

#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(IncomingMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerFault>> + Send + 'static,
{
    async fn handle(&self, message: IncomingMessage) -> Result<Value, HandlerFault> {
        (self)(message).await
    }
}
