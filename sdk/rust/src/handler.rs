//! Poll-and-dispatch helper built on top of [`Client`].
//!
//! Grounded in the original SDK's `MessageHandler`: fetch one message at a
//! time, run it through a list of callbacks in order, then acknowledge
//! (unless the caller wants to ack eagerly instead). Callbacks run
//! sequentially per message to avoid interleaving a single message's
//! side effects with its own acknowledgement.

use std::time::Duration;

use async_trait::async_trait;

use crate::client::{Client, FetchOptions};
use crate::error::Result;
use crate::types::{Message, StatusReport};

#[async_trait]
pub trait MessageCallback: Send + Sync {
    async fn handle(&self, message: &Message) -> Result<()>;
}

#[async_trait]
impl<F> MessageCallback for F
where
    F: Fn(&Message) -> futures::future::BoxFuture<'static, Result<()>> + Send + Sync,
{
    async fn handle(&self, message: &Message) -> Result<()> {
        (self)(message).await
    }
}

/// Whether a handled message is acknowledged immediately on receipt or
/// only after every callback has run successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckTiming {
    Immediate,
    AfterCallbacks,
}

pub struct MessageHandler {
    client: Client,
    subscription: String,
    callbacks: Vec<Box<dyn MessageCallback>>,
    ack_timing: AckTiming,
    message_limit: Option<usize>,
    poll_timeout: Duration,
}

impl MessageHandler {
    pub fn new(client: Client, subscription: impl Into<String>, callbacks: Vec<Box<dyn MessageCallback>>) -> Self {
        Self {
            client,
            subscription: subscription.into(),
            callbacks,
            ack_timing: AckTiming::AfterCallbacks,
            message_limit: None,
            poll_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_ack_timing(mut self, ack_timing: AckTiming) -> Self {
        self.ack_timing = ack_timing;
        self
    }

    pub fn with_message_limit(mut self, limit: usize) -> Self {
        self.message_limit = Some(limit);
        self
    }

    /// Runs until `message_limit` messages have been processed, or forever
    /// if none was set.
    pub async fn run(&self) -> Result<()> {
        let mut processed = 0usize;
        loop {
            let options = FetchOptions { count: Some(1), timeout: Some(self.poll_timeout), ..Default::default() };
            let messages = self.client.get_messages(&self.subscription, options).await?;

            for message in &messages {
                for callback in &self.callbacks {
                    if let Err(e) = callback.handle(message).await {
                        tracing::error!(error = %e, subscription = %self.subscription, "callback failed");
                    }
                }
                if self.ack_timing == AckTiming::AfterCallbacks {
                    self.ack(message).await;
                }

                processed += 1;
                if let Some(limit) = self.message_limit
                    && processed >= limit
                {
                    return Ok(());
                }
            }
        }
    }

    /// Retries a failed ack a few times with backoff before giving up and
    /// letting the message redeliver later. The original SDK left this as
    /// a `# TODO: Retry acknowledgement`; a dropped message here just
    /// means a redelivery, so a small bounded retry is worth it.
    async fn ack(&self, message: &Message) {
        let report = StatusReport::ok(message.publisher_name.clone(), message.sequence_number);
        let mut backoff = Duration::from_millis(200);

        for attempt in 0..ACK_RETRY_ATTEMPTS {
            match self.client.set_message_status(&self.subscription, &[report.clone()]).await {
                Ok(()) => return,
                Err(e) if attempt + 1 == ACK_RETRY_ATTEMPTS => {
                    tracing::error!(error = %e, subscription = %self.subscription, "failed to acknowledge message, it will be redelivered later");
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "ack failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }
}

const ACK_RETRY_ATTEMPTS: u32 = 3;
