//! Event routing between live connections.
//!
//! The router resolves target identities against the connection registry and
//! delivers events fire-and-forget: no retry, no queueing for later
//! delivery.  A message to an unreachable identity is dropped after the
//! status is reported to the sender.

use std::sync::Arc;

use tracing::debug;

use courier_shared::protocol::ServerEvent;
use courier_shared::types::Identity;

use crate::registry::{ConnectionHandle, Registry};

/// Outcome of a single delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    NotDelivered { reason: String },
}

impl Delivery {
    fn not_online() -> Self {
        Delivery::NotDelivered {
            reason: "Recipient not online".to_string(),
        }
    }
}

/// Delivers events to recipients looked up in the [`Registry`].
#[derive(Clone)]
pub struct Router {
    registry: Arc<Registry>,
}

impl Router {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Deliver an event to a single identity.
    ///
    /// Absence from the registry is reported as not-delivered, not an
    /// error.  A send onto a closed connection is treated the same way.
    pub async fn deliver_to_one(&self, target: &str, event: ServerEvent) -> Delivery {
        match self.registry.lookup(target).await {
            Some(handle) if handle.send(event) => Delivery::Sent,
            Some(_) => {
                debug!(target = %target, "connection closed mid-delivery");
                Delivery::not_online()
            }
            None => {
                debug!(target = %target, "recipient not reachable");
                Delivery::not_online()
            }
        }
    }

    /// Deliver the same event independently to each identity.
    ///
    /// Recipients that are not reachable simply miss the event; no
    /// aggregated status is produced.
    pub async fn deliver_to_many(&self, identities: &[Identity], event: &ServerEvent) {
        for identity in identities {
            self.deliver_to_one(identity, event.clone()).await;
        }
    }

    /// Report a delivery outcome back to the originating connection only.
    pub fn deliver_status(&self, sender: &ConnectionHandle, delivery: &Delivery) {
        let event = match delivery {
            Delivery::Sent => ServerEvent::MessageStatus {
                status: "sent".to_string(),
                reason: None,
            },
            Delivery::NotDelivered { reason } => ServerEvent::MessageStatus {
                status: "failed".to_string(),
                reason: Some(reason.clone()),
            },
        };
        sender.send(event);
    }
}
