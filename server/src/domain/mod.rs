//! Domain model for the provisioning bus
//!
//! - `envelope` - the message unit published to `incoming` and fanned out
//! - `subscription` - subscription records and pre-fill status

pub mod envelope;
pub mod subscription;

pub use envelope::{DeliveredEnvelope, Envelope, KnownPublisher, PublisherName};
pub use subscription::{NewSubscription, PrefillStatus, Subscription};
