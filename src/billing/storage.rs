//! Storage traits for billing data.
//!
//! Implement these traits to persist ledger rows and subscription state to
//! your database. An in-memory implementation is provided for testing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::error::BillingError;
use super::ledger::Transaction;

/// Trait for storing billing data.
///
/// Implement this trait to persist billing state to your database.
/// An in-memory implementation is provided for testing.
#[async_trait]
pub trait BillingStore: Send + Sync {
    // Ledger

    /// Append a transaction to the ledger. Rows are never updated or
    /// deleted afterwards.
    async fn append_transaction(&self, transaction: &Transaction) -> Result<()>;

    /// Sum of all transaction amounts for a user. 0 for unknown users.
    async fn balance(&self, user_id: &str) -> Result<i64>;

    /// All transactions for a user, in no particular order.
    async fn transactions_for_user(&self, user_id: &str) -> Result<Vec<Transaction>>;

    /// Append a debit only if the user's balance covers it.
    ///
    /// Returns `Ok(true)` if the debit was applied, `Ok(false)` if the
    /// balance was insufficient. The balance check and the append MUST be
    /// atomic with respect to other debits for the same user.
    ///
    /// # Important: Production Implementations MUST Keep This Atomic
    ///
    /// A read-then-append split across two statements reintroduces the
    /// overspend race this method exists to close. Examples:
    ///
    /// - **PostgreSQL**: `INSERT ... SELECT ... WHERE (SELECT
    ///   COALESCE(SUM(amount), 0) FROM transactions WHERE user_id = $1)
    ///   >= $2` inside one statement, or `SELECT ... FOR UPDATE` on an
    ///   account row.
    /// - **Redis**: a Lua script doing the check and the append together.
    async fn append_debit_if_affordable(&self, transaction: &Transaction) -> Result<bool>;

    /// Check whether any transaction carries the given reference id.
    ///
    /// Used to make webhook-driven credits idempotent even when the
    /// processed-event marker was lost.
    async fn transaction_exists_for_reference(&self, reference_id: &str) -> Result<bool>;

    // Subscription tracking

    /// Get the cached subscription for a user.
    async fn get_subscription(&self, user_id: &str) -> Result<Option<StoredSubscription>>;

    /// Save/update the cached subscription.
    async fn save_subscription(
        &self,
        user_id: &str,
        subscription: &StoredSubscription,
    ) -> Result<()>;

    /// Get subscription by provider subscription ID.
    async fn get_subscription_by_provider_id(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Option<(String, StoredSubscription)>>;

    // Webhook idempotency

    /// Check if a webhook event has already been processed.
    async fn is_event_processed(&self, event_id: &str) -> Result<bool>;

    /// Mark a webhook event as processed.
    async fn mark_event_processed(&self, event_id: &str) -> Result<()>;

    /// Clean up old processed events (default: no-op).
    async fn cleanup_old_events(&self, _older_than_days: u32) -> Result<usize> {
        Ok(0)
    }
}

/// Cached subscription state.
///
/// This is synced from the billing provider via webhooks to avoid API
/// calls on every request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredSubscription {
    /// Provider subscription ID (`sub_...` for Stripe).
    pub provider_subscription_id: Option<String>,
    /// Provider customer ID (`cus_...` for Stripe).
    pub provider_customer_id: Option<String>,
    /// Plan ID (internal plan identifier).
    pub plan_id: String,
    /// Subscription status.
    pub status: SubscriptionStatus,
    /// Monthly token allowance granted on each successful payment.
    pub monthly_token_limit: i64,
    /// Price in cents (for display purposes).
    pub price_cents: i64,
    /// End of the current paid period, if the provider reported one.
    pub expires_at: Option<DateTime<Utc>>,
    /// Created timestamp.
    pub created_at: DateTime<Utc>,
    /// Last updated timestamp.
    pub updated_at: DateTime<Utc>,
}

impl StoredSubscription {
    /// Create a new subscription record on a plan, inactive until the
    /// provider confirms payment.
    #[must_use]
    pub fn new(plan_id: impl Into<String>, monthly_token_limit: i64, price_cents: i64) -> Self {
        let now = Utc::now();
        Self {
            provider_subscription_id: None,
            provider_customer_id: None,
            plan_id: plan_id.into(),
            status: SubscriptionStatus::Inactive,
            monthly_token_limit,
            price_cents,
            expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the subscription entitles the user to paid features:
    /// status `Active` and not past `expires_at` (when set).
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
            && self.expires_at.map_or(true, |end| end > Utc::now())
    }

    /// Check if payment has failed.
    #[must_use]
    pub fn is_past_due(&self) -> bool {
        self.status == SubscriptionStatus::PastDue
    }

    /// Check if the subscription has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.status == SubscriptionStatus::Cancelled
    }
}

/// Subscription status.
///
/// A deliberately small state machine: provider statuses that do not
/// entitle the user to anything all collapse into `Inactive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Subscription is active and paid.
    Active,
    /// No entitlement: never paid, awaiting payment, or lapsed.
    Inactive,
    /// Payment failed, grace period until the provider retries.
    PastDue,
    /// Subscription has been cancelled.
    Cancelled,
}

impl SubscriptionStatus {
    /// Parse from a provider subscription status string.
    ///
    /// Known non-entitling provider statuses map to `Inactive`; a status
    /// we have never seen is rejected rather than silently mapped, so a
    /// provider API change surfaces as an error instead of a wrong grant.
    pub fn from_provider(status: &str) -> std::result::Result<Self, BillingError> {
        match status {
            "active" => Ok(Self::Active),
            "past_due" => Ok(Self::PastDue),
            "canceled" | "cancelled" => Ok(Self::Cancelled),
            "incomplete" | "incomplete_expired" | "unpaid" | "trialing" | "paused" => {
                Ok(Self::Inactive)
            }
            other => Err(BillingError::UnknownSubscriptionStatus {
                status: other.to_string(),
            }),
        }
    }

    /// Convert to the storage string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::PastDue => "past_due",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// In-memory billing store for testing.
#[cfg(any(test, feature = "test-billing"))]
pub mod test {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, RwLock};

    /// In-memory billing store for testing.
    ///
    /// Wraps data in Arc for cheap cloning.
    #[derive(Default, Clone)]
    pub struct InMemoryBillingStore {
        inner: Arc<InMemoryBillingStoreInner>,
    }

    #[derive(Default)]
    struct InMemoryBillingStoreInner {
        transactions: RwLock<Vec<Transaction>>,
        subscriptions: RwLock<HashMap<String, StoredSubscription>>,
        processed_events: RwLock<HashMap<String, u64>>,
    }

    impl InMemoryBillingStore {
        /// Create a new in-memory store.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Get all transactions (for testing).
        pub fn get_all_transactions(&self) -> Vec<Transaction> {
            self.inner.transactions.read().unwrap().clone()
        }

        /// Get all subscriptions (for testing).
        pub fn get_all_subscriptions(&self) -> HashMap<String, StoredSubscription> {
            self.inner.subscriptions.read().unwrap().clone()
        }

        /// Get all processed events (for testing).
        pub fn get_processed_events(&self) -> Vec<String> {
            self.inner
                .processed_events
                .read()
                .unwrap()
                .keys()
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl BillingStore for InMemoryBillingStore {
        async fn append_transaction(&self, transaction: &Transaction) -> Result<()> {
            self.inner
                .transactions
                .write()
                .unwrap()
                .push(transaction.clone());
            Ok(())
        }

        async fn balance(&self, user_id: &str) -> Result<i64> {
            Ok(self
                .inner
                .transactions
                .read()
                .unwrap()
                .iter()
                .filter(|t| t.user_id == user_id)
                .map(|t| t.amount)
                .sum())
        }

        async fn transactions_for_user(&self, user_id: &str) -> Result<Vec<Transaction>> {
            Ok(self
                .inner
                .transactions
                .read()
                .unwrap()
                .iter()
                .filter(|t| t.user_id == user_id)
                .cloned()
                .collect())
        }

        async fn append_debit_if_affordable(&self, transaction: &Transaction) -> Result<bool> {
            // The write lock spans check and append, so concurrent debits
            // for the same user serialize here.
            let mut transactions = self.inner.transactions.write().unwrap();

            let balance: i64 = transactions
                .iter()
                .filter(|t| t.user_id == transaction.user_id)
                .map(|t| t.amount)
                .sum();

            if balance + transaction.amount < 0 {
                return Ok(false);
            }

            transactions.push(transaction.clone());
            Ok(true)
        }

        async fn transaction_exists_for_reference(&self, reference_id: &str) -> Result<bool> {
            Ok(self
                .inner
                .transactions
                .read()
                .unwrap()
                .iter()
                .any(|t| t.reference_id.as_deref() == Some(reference_id)))
        }

        async fn get_subscription(&self, user_id: &str) -> Result<Option<StoredSubscription>> {
            Ok(self
                .inner
                .subscriptions
                .read()
                .unwrap()
                .get(user_id)
                .cloned())
        }

        async fn save_subscription(
            &self,
            user_id: &str,
            subscription: &StoredSubscription,
        ) -> Result<()> {
            self.inner
                .subscriptions
                .write()
                .unwrap()
                .insert(user_id.to_string(), subscription.clone());
            Ok(())
        }

        async fn get_subscription_by_provider_id(
            &self,
            provider_subscription_id: &str,
        ) -> Result<Option<(String, StoredSubscription)>> {
            let subs = self.inner.subscriptions.read().unwrap();
            for (user_id, sub) in subs.iter() {
                if sub.provider_subscription_id.as_deref() == Some(provider_subscription_id) {
                    return Ok(Some((user_id.clone(), sub.clone())));
                }
            }
            Ok(None)
        }

        async fn is_event_processed(&self, event_id: &str) -> Result<bool> {
            Ok(self
                .inner
                .processed_events
                .read()
                .unwrap()
                .contains_key(event_id))
        }

        async fn mark_event_processed(&self, event_id: &str) -> Result<()> {
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);

            self.inner
                .processed_events
                .write()
                .unwrap()
                .insert(event_id.to_string(), now);
            Ok(())
        }

        async fn cleanup_old_events(&self, older_than_days: u32) -> Result<usize> {
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);

            let cutoff = now.saturating_sub(u64::from(older_than_days) * 86400);
            let mut events = self.inner.processed_events.write().unwrap();
            let initial_len = events.len();
            events.retain(|_, &mut timestamp| timestamp >= cutoff);
            Ok(initial_len - events.len())
        }
    }
}
