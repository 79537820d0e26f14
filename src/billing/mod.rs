//! Billing module for token-metered subscriptions.
//!
//! Provides an append-only token ledger, subscription state tracking,
//! provider webhook reconciliation and a spend gate that meters AI
//! generation against the ledger.
//!
//! # Example
//!
//! ```rust,ignore
//! use lernwerk::billing::{
//!     default_plans, SpendGate, TokenLedger, WebhookHandler,
//! };
//! use lernwerk::generation::{GenerationRequest, Language};
//!
//! let plans = default_plans();
//! let webhooks = WebhookHandler::new(store.clone(), webhook_secret, plans);
//!
//! // Incoming webhook: verify, then process
//! let event = webhooks.verify_signature(&body, &signature_header)?;
//! webhooks.handle_event(event).await?;
//!
//! // Metered generation
//! let gate = SpendGate::new(store.clone(), generation_service);
//! let outcome = gate
//!     .spend(&user.id, 1, &GenerationRequest::Quiz {
//!         topic: "fractions".into(),
//!         level: "grade 5".into(),
//!         language: Language::De,
//!         num_questions: 10,
//!     })
//!     .await?;
//! ```

pub mod checkout;
pub mod error;
pub mod ledger;
pub mod plans;
pub mod spend;
pub mod storage;
pub mod subscription;
pub mod webhook;

// Ledger exports
pub use ledger::{TokenLedger, Transaction, TransactionKind};

// Plan exports
pub use plans::{default_plans, PlanBuilder, PlanConfig, Plans, PlansBuilder};

// Storage exports
pub use storage::{BillingStore, StoredSubscription, SubscriptionStatus};

// Subscription exports
pub use subscription::SubscriptionManager;

// Spend exports
pub use spend::{SpendGate, SpendOutcome};

// Checkout exports
pub use checkout::{
    CheckoutClient, CheckoutConfig, CheckoutManager, CheckoutMetadata, CheckoutRequest,
    CheckoutSession, CreateCheckoutSessionRequest,
};

// Webhook exports
pub use webhook::{WebhookEvent, WebhookEventData, WebhookHandler, WebhookOutcome};

// Error exports
pub use error::BillingError;

// Test exports
#[cfg(any(test, feature = "test-billing"))]
pub use storage::test::InMemoryBillingStore;

#[cfg(any(test, feature = "test-billing"))]
pub use checkout::test::MockCheckoutClient;
