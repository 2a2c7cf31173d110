//! Payment processor trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::RecordId;
use domain::Money;
use serde::{Deserialize, Serialize};

use crate::error::FulfillmentError;

/// A payment intent created with the external processor.
#[derive(Debug, Clone)]
pub struct PaymentIntent {
    /// The intent reference assigned by the processor.
    pub intent_id: String,
}

/// The outcome the processor reports for an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    /// Payment settled.
    Succeeded,

    /// Payment declined or errored.
    Failed,
}

/// A webhook delivery from the processor.
///
/// Deliveries are at-least-once; applying the same outcome twice must be a
/// no-op on the receiving side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentWebhook {
    /// The intent this delivery is about.
    pub intent_id: String,

    /// The reported outcome.
    pub outcome: PaymentOutcome,

    /// Processor-side refund reference, when the outcome follows a refund.
    pub processor_refund_id: Option<String>,
}

/// Trait for payment processor operations.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Creates a payment intent for a checkout total.
    async fn create_payment_intent(
        &self,
        checkout_id: RecordId,
        amount: Money,
    ) -> Result<PaymentIntent, FulfillmentError>;

    /// Requests a refund of a settled intent.
    async fn refund(&self, intent_id: &str) -> Result<(), FulfillmentError>;
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    intents: HashMap<String, (RecordId, Money)>,
    next_id: u32,
    fail_on_create: bool,
    delay: Option<Duration>,
}

/// In-memory payment processor for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentProcessor {
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentProcessor {
    /// Creates a new in-memory payment processor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the processor to fail intent creation.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create = fail;
    }

    /// Configures an artificial delay before answering, for timeout tests.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state.write().unwrap().delay = delay;
    }

    /// Returns the number of intents created.
    pub fn intent_count(&self) -> usize {
        self.state.read().unwrap().intents.len()
    }

    /// Returns true if an intent exists with the given ID.
    pub fn has_intent(&self, intent_id: &str) -> bool {
        self.state.read().unwrap().intents.contains_key(intent_id)
    }
}

#[async_trait]
impl PaymentProcessor for InMemoryPaymentProcessor {
    async fn create_payment_intent(
        &self,
        checkout_id: RecordId,
        amount: Money,
    ) -> Result<PaymentIntent, FulfillmentError> {
        let delay = self.state.read().unwrap().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.write().unwrap();

        if state.fail_on_create {
            return Err(FulfillmentError::PaymentProcessor(
                "intent creation refused".to_string(),
            ));
        }

        state.next_id += 1;
        let intent_id = format!("PI-{:04}", state.next_id);
        state
            .intents
            .insert(intent_id.clone(), (checkout_id, amount));

        Ok(PaymentIntent { intent_id })
    }

    async fn refund(&self, intent_id: &str) -> Result<(), FulfillmentError> {
        let mut state = self.state.write().unwrap();
        state.intents.remove(intent_id);
        Ok(())
    }
}
