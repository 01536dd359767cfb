//! Async client SDK for relaybus, a pull-based directory-change
//! provisioning bus.
//!
//! [`AdminClient`] manages subscriptions; [`Client`] fetches and
//! acknowledges messages for one subscription, or publishes events under a
//! publisher credential. [`MessageHandler`] wraps [`Client`] in a
//! fetch-dispatch-acknowledge loop for long-running consumers.

pub mod client;
pub mod error;
pub mod handler;
pub mod types;

pub use client::{AdminClient, Client, FetchOptions};
pub use error::{ClientError, Result};
pub use handler::{AckTiming, MessageCallback, MessageHandler};
pub use types::{
    KnownPublisher, Message, NewEvent, NewSubscription, PrefillStatus, PublisherName, StatusReport, Subscription,
};
