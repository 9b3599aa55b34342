//! Payment intents for slot unlocks
//!
//! Slot unlocks are never debited here. The engine emits an intent to the
//! payment collaborator and the unlock lands when that collaborator raises
//! the profile's unlocked counter.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::assets::Page;
use crate::nats::NatsClient;
use crate::types::Result;

/// Intent metadata tying the payment back to the unlock it funds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntentMetadata {
    pub account: String,
    pub page: Page,
    pub target_slot: u32,
}

/// A payment request handed to the external payment collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub amount: f64,
    pub destination: String,
    pub memo: String,
    pub metadata: IntentMetadata,
}

impl PaymentIntent {
    /// Build an unlock intent for a slot
    pub fn for_unlock(
        amount: f64,
        destination: &str,
        account: &str,
        page: Page,
        target_slot: u32,
    ) -> Self {
        Self {
            amount,
            destination: destination.to_string(),
            memo: format!("unlock {} slot {} for {}", page, target_slot, account),
            metadata: IntentMetadata {
                account: account.to_string(),
                page,
                target_slot,
            },
        }
    }
}

/// Publishes payment intents over NATS
pub struct PaymentEmitter {
    nats: Option<NatsClient>,
    subject: String,
    destination: String,
}

impl PaymentEmitter {
    pub fn new(nats: Option<NatsClient>, subject: &str, destination: &str) -> Self {
        Self {
            nats,
            subject: subject.to_string(),
            destination: destination.to_string(),
        }
    }

    /// Destination account intents are addressed to
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Emit an intent; fire-and-forget from the caller's perspective
    pub async fn emit(&self, intent: PaymentIntent) -> Result<()> {
        let payload = serde_json::to_vec(&intent)
            .map_err(|e| crate::types::LapidaryError::Internal(format!("intent encode: {}", e)))?;

        match &self.nats {
            Some(nats) => {
                nats.publish(&self.subject, Bytes::from(payload)).await?;
                info!(
                    account = %intent.metadata.account,
                    page = %intent.metadata.page,
                    target_slot = intent.metadata.target_slot,
                    amount = intent.amount,
                    "payment intent emitted"
                );
            }
            None => {
                warn!(
                    account = %intent.metadata.account,
                    target_slot = intent.metadata.target_slot,
                    "NATS not configured, payment intent dropped"
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlock_intent_carries_target_slot() {
        let intent = PaymentIntent::for_unlock(35.0, "lapidary.bank", "alice", Page::Mining, 5);
        assert_eq!(intent.amount, 35.0);
        assert_eq!(intent.destination, "lapidary.bank");
        assert_eq!(intent.metadata.target_slot, 5);
        assert_eq!(intent.metadata.page, Page::Mining);
        assert!(intent.memo.contains("slot 5"));
    }

    #[tokio::test]
    async fn emitter_without_nats_drops_but_succeeds() {
        let emitter = PaymentEmitter::new(None, "lapidary.payments.intent", "lapidary.bank");
        let intent = PaymentIntent::for_unlock(5.0, emitter.destination(), "bob", Page::Polishing, 2);
        assert!(emitter.emit(intent).await.is_ok());
    }
}
