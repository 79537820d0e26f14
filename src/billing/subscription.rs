//! Subscription state tracking and entitlement checks.
//!
//! The [`SubscriptionManager`] reads and writes the cached subscription
//! record that webhooks keep in sync with the billing provider. Handlers
//! and the spend gate consult it instead of calling the provider API.

use chrono::Utc;

use crate::error::Result;

use super::error::BillingError;
use super::plans::PlanConfig;
use super::storage::{BillingStore, StoredSubscription, SubscriptionStatus};

/// Manager for subscription state.
#[derive(Clone)]
pub struct SubscriptionManager<S: BillingStore> {
    store: S,
}

impl<S: BillingStore> SubscriptionManager<S> {
    /// Create a new subscription manager over a billing store.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Get the cached subscription for a user, if any.
    pub async fn subscription(&self, user_id: &str) -> Result<Option<StoredSubscription>> {
        self.store.get_subscription(user_id).await
    }

    /// Effective status for a user. Users without any subscription record
    /// are `Inactive`.
    pub async fn status(&self, user_id: &str) -> Result<SubscriptionStatus> {
        Ok(self
            .store
            .get_subscription(user_id)
            .await?
            .map(|s| s.status)
            .unwrap_or(SubscriptionStatus::Inactive))
    }

    /// Check whether the user is currently entitled to paid features.
    ///
    /// Only `Active` within the paid period entitles; `PastDue` users keep
    /// their remaining token balance but receive no new grants until
    /// payment recovers.
    pub async fn is_entitled(&self, user_id: &str) -> Result<bool> {
        Ok(self
            .store
            .get_subscription(user_id)
            .await?
            .is_some_and(|s| s.is_active()))
    }

    /// The plan the user is subscribed to, if any.
    pub async fn plan_for(&self, user_id: &str) -> Result<Option<String>> {
        Ok(self
            .store
            .get_subscription(user_id)
            .await?
            .map(|s| s.plan_id))
    }

    /// Get the subscription, erroring if the user has none.
    pub async fn require_subscription(&self, user_id: &str) -> Result<StoredSubscription> {
        self.store
            .get_subscription(user_id)
            .await?
            .ok_or_else(|| {
                BillingError::NoSubscription {
                    user_id: user_id.to_string(),
                }
                .into()
            })
    }

    /// Record a pending subscription on a plan.
    ///
    /// The record starts `Inactive`; the provider's webhook flips it to
    /// `Active` once the first payment succeeds.
    pub async fn start_pending(&self, user_id: &str, plan: &PlanConfig) -> Result<StoredSubscription> {
        let subscription =
            StoredSubscription::new(&plan.id, plan.monthly_tokens, plan.price_cents);
        self.store.save_subscription(user_id, &subscription).await?;

        tracing::info!(
            target: "lernwerk::billing",
            user_id = %user_id,
            plan_id = %plan.id,
            "Created pending subscription"
        );

        Ok(subscription)
    }

    /// Transition the user's subscription to a new status.
    ///
    /// Errors with [`BillingError::NoSubscription`] if there is nothing to
    /// transition.
    pub async fn set_status(
        &self,
        user_id: &str,
        status: SubscriptionStatus,
    ) -> Result<StoredSubscription> {
        let mut subscription = self.require_subscription(user_id).await?;
        let previous = subscription.status;
        subscription.status = status;
        subscription.updated_at = Utc::now();
        self.store.save_subscription(user_id, &subscription).await?;

        tracing::info!(
            target: "lernwerk::billing",
            user_id = %user_id,
            from = %previous,
            to = %status,
            "Subscription status changed"
        );

        Ok(subscription)
    }
}
