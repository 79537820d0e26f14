//! Billing provider webhook handling.
//!
//! Handles webhook signature verification, event routing, subscription
//! state syncing and token grants. Webhooks are the only path through
//! which subscription status changes and renewal credits enter the
//! system.
//!
//! Grants are idempotent twice over: processed event ids are recorded,
//! and every credit carries the event id as its ledger reference, so a
//! replayed delivery can never double-credit even if the processed-event
//! marker was lost.

use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::Result;

use super::error::BillingError;
use super::ledger::{Transaction, TransactionKind};
use super::plans::Plans;
use super::storage::{BillingStore, StoredSubscription, SubscriptionStatus};

/// Default maximum accepted signature age, in seconds.
const DEFAULT_SIGNATURE_TOLERANCE: i64 = 300;

/// Webhook handler for billing provider events.
///
/// Handles signature verification, idempotency, and event processing.
///
/// The webhook secret is stored using [`SecretString`] to prevent
/// accidental exposure in logs or debug output.
pub struct WebhookHandler<S: BillingStore> {
    store: S,
    webhook_secret: SecretString,
    plans: Plans,
    signature_tolerance: i64,
}

impl<S: BillingStore> WebhookHandler<S> {
    /// Create a new webhook handler.
    ///
    /// The webhook secret is stored securely and won't be exposed in
    /// debug output.
    #[must_use]
    pub fn new(store: S, webhook_secret: impl Into<SecretString>, plans: Plans) -> Self {
        Self {
            store,
            webhook_secret: webhook_secret.into(),
            plans,
            signature_tolerance: DEFAULT_SIGNATURE_TOLERANCE,
        }
    }

    /// Override the maximum accepted signature age.
    #[must_use]
    pub fn with_signature_tolerance(mut self, seconds: u64) -> Self {
        self.signature_tolerance = seconds as i64;
        self
    }

    /// Verify the webhook signature and parse the event.
    ///
    /// # Arguments
    /// * `payload` - The raw request body
    /// * `signature` - The signature header value (`t=<unix>,v1=<hex>`)
    ///
    /// # Errors
    /// Returns an error if signature verification fails or the payload is
    /// invalid.
    pub fn verify_signature(&self, payload: &[u8], signature: &str) -> Result<WebhookEvent> {
        let sig_parts = parse_signature_header(signature)?;

        // Reject stale timestamps to limit the replay window
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0) as i64;

        let age = (now - sig_parts.timestamp).abs();
        if age > self.signature_tolerance {
            return Err(BillingError::WebhookTimestampExpired { age_seconds: age }.into());
        }

        let signed_payload = format!(
            "{}.{}",
            sig_parts.timestamp,
            String::from_utf8_lossy(payload)
        );
        let expected_sig = compute_signature(
            self.webhook_secret.expose_secret(),
            signed_payload.as_bytes(),
        )?;

        // Constant-time comparison
        let expected_bytes = hex::decode(&expected_sig)
            .map_err(|_| BillingError::Internal {
                message: "Hex decode error".to_string(),
            })?;
        let provided_bytes = hex::decode(&sig_parts.signature)
            .map_err(|_| BillingError::InvalidWebhookSignature)?;

        if expected_bytes.ct_eq(&provided_bytes).unwrap_u8() != 1 {
            return Err(BillingError::InvalidWebhookSignature.into());
        }

        // Log detailed error internally but return a generic message to
        // prevent information leakage
        let event: WebhookEvent = serde_json::from_slice(payload).map_err(|e| {
            tracing::warn!(
                target: "lernwerk::billing::webhook",
                error = %e,
                "Failed to parse webhook payload"
            );
            BillingError::InvalidWebhookPayload {
                message: "malformed JSON payload".to_string(),
            }
        })?;

        Ok(event)
    }

    /// Process a verified webhook event.
    ///
    /// This method handles idempotency and routes to the appropriate
    /// handler.
    pub async fn handle_event(&self, event: WebhookEvent) -> Result<WebhookOutcome> {
        if self.store.is_event_processed(&event.id).await? {
            return Ok(WebhookOutcome::AlreadyProcessed);
        }

        let outcome = match event.event_type.as_str() {
            "checkout.session.completed" => self.handle_checkout_completed(&event).await?,
            "invoice.payment_succeeded" => self.handle_payment_succeeded(&event).await?,
            "customer.subscription.updated" => self.handle_subscription_updated(&event).await?,
            "customer.subscription.deleted" => self.handle_subscription_deleted(&event).await?,
            "invoice.payment_failed" => self.handle_payment_failed(&event).await?,
            _ => WebhookOutcome::Ignored,
        };

        // Mark as processed (only for non-ignored events)
        if !matches!(outcome, WebhookOutcome::Ignored) {
            self.store.mark_event_processed(&event.id).await?;
        }

        Ok(outcome)
    }

    /// Handle checkout.session.completed: activate the subscription and
    /// grant the first month of tokens (plus welcome bonus, if the plan
    /// has one and this is the user's first subscription).
    async fn handle_checkout_completed(&self, event: &WebhookEvent) -> Result<WebhookOutcome> {
        let object = event.data.object.as_object().ok_or_else(|| {
            BillingError::InvalidWebhookPayload {
                message: "checkout session is not an object".to_string(),
            }
        })?;

        let metadata = object.get("metadata").and_then(|v| v.as_object());
        let user_id = metadata
            .and_then(|m| m.get("user_id"))
            .and_then(|v| v.as_str());
        let plan_id = metadata
            .and_then(|m| m.get("plan_id"))
            .and_then(|v| v.as_str());

        let (Some(user_id), Some(plan_id)) = (user_id, plan_id) else {
            tracing::warn!(
                target: "lernwerk::billing::webhook",
                event_id = %event.id,
                "Checkout session missing user_id/plan_id metadata, ignoring"
            );
            return Ok(WebhookOutcome::Ignored);
        };

        let plan = self.plans.get(plan_id).ok_or_else(|| BillingError::PlanNotFound {
            plan_id: plan_id.to_string(),
        })?;

        // Belt and braces: even if the processed-event marker was lost,
        // the credit itself blocks the replay.
        if self
            .store
            .transaction_exists_for_reference(&event.id)
            .await?
        {
            return Ok(WebhookOutcome::AlreadyProcessed);
        }

        let existing = self.store.get_subscription(user_id).await?;
        let first_subscription = existing.is_none();

        // Create if absent, otherwise update in place so the record keeps
        // its original created_at across re-subscriptions.
        let mut subscription = existing.unwrap_or_else(|| {
            StoredSubscription::new(&plan.id, plan.monthly_tokens, plan.price_cents)
        });
        subscription.plan_id = plan.id.clone();
        subscription.monthly_token_limit = plan.monthly_tokens;
        subscription.price_cents = plan.price_cents;
        subscription.status = SubscriptionStatus::Active;
        subscription.updated_at = Utc::now();
        subscription.provider_subscription_id = object
            .get("subscription")
            .and_then(|v| v.as_str())
            .map(String::from);
        subscription.provider_customer_id = object
            .get("customer")
            .and_then(|v| v.as_str())
            .map(String::from);
        if let Some(period_end) = object.get("current_period_end").and_then(|v| v.as_i64()) {
            subscription.expires_at = unix_to_datetime(period_end);
        }
        self.store.save_subscription(user_id, &subscription).await?;

        self.grant_tokens(
            user_id,
            plan.monthly_tokens,
            format!("Monthly tokens for {}", plan.name()),
            TransactionKind::SubscriptionRenewal,
            event.id.clone(),
        )
        .await?;

        if first_subscription && plan.has_welcome_bonus() {
            self.grant_tokens(
                user_id,
                plan.welcome_bonus,
                format!("Welcome bonus for {}", plan.name()),
                TransactionKind::SubscriptionBonus,
                format!("{}:bonus", event.id),
            )
            .await?;
        }

        tracing::info!(
            target: "lernwerk::billing::webhook",
            user_id = %user_id,
            plan_id = %plan.id,
            tokens = plan.monthly_tokens,
            "Checkout completed, subscription activated"
        );

        Ok(WebhookOutcome::Processed)
    }

    /// Handle invoice.payment_succeeded: grant the monthly token
    /// allowance for the renewed period and clear any past-due state.
    /// Cancelled subscriptions keep their tokens but stay cancelled.
    async fn handle_payment_succeeded(&self, event: &WebhookEvent) -> Result<WebhookOutcome> {
        let Some(subscription_id) = event
            .data
            .object
            .get("subscription")
            .and_then(|v| v.as_str())
        else {
            // Not a subscription invoice (one-off payment)
            return Ok(WebhookOutcome::Ignored);
        };

        let Some((user_id, mut subscription)) = self
            .store
            .get_subscription_by_provider_id(subscription_id)
            .await?
        else {
            tracing::warn!(
                target: "lernwerk::billing::webhook",
                event_id = %event.id,
                subscription_id = %subscription_id,
                "Payment succeeded for unknown subscription, ignoring"
            );
            return Ok(WebhookOutcome::Ignored);
        };

        if self
            .store
            .transaction_exists_for_reference(&event.id)
            .await?
        {
            return Ok(WebhookOutcome::AlreadyProcessed);
        }

        let plan_name = self
            .plans
            .get(&subscription.plan_id)
            .map(|p| p.name().to_string())
            .unwrap_or_else(|| subscription.plan_id.clone());

        self.grant_tokens(
            &user_id,
            subscription.monthly_token_limit,
            format!("Monthly tokens for {plan_name}"),
            TransactionKind::SubscriptionRenewal,
            event.id.clone(),
        )
        .await?;

        // A successful payment restores a past-due subscription. Cancelled
        // is terminal: a final invoice settling after the deletion event
        // still credits its tokens but must not revive the subscription.
        if !subscription.is_cancelled() {
            subscription.status = SubscriptionStatus::Active;
            if let Some(period_end) = event
                .data
                .object
                .get("period_end")
                .and_then(|v| v.as_i64())
            {
                subscription.expires_at = unix_to_datetime(period_end);
            }
        }
        subscription.updated_at = Utc::now();
        self.store.save_subscription(&user_id, &subscription).await?;

        Ok(WebhookOutcome::Processed)
    }

    /// Handle customer.subscription.updated: sync the provider's status
    /// into the local record.
    async fn handle_subscription_updated(&self, event: &WebhookEvent) -> Result<WebhookOutcome> {
        let object = &event.data.object;
        let subscription_id = object
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| BillingError::InvalidWebhookPayload {
                message: "missing subscription ID".to_string(),
            })?;

        let provider_status = object
            .get("status")
            .and_then(|v| v.as_str())
            .ok_or_else(|| BillingError::InvalidWebhookPayload {
                message: "missing subscription status".to_string(),
            })?;
        let status = SubscriptionStatus::from_provider(provider_status)?;

        let Some((user_id, mut subscription)) = self
            .store
            .get_subscription_by_provider_id(subscription_id)
            .await?
        else {
            tracing::warn!(
                target: "lernwerk::billing::webhook",
                event_id = %event.id,
                subscription_id = %subscription_id,
                "Update for unknown subscription, ignoring"
            );
            return Ok(WebhookOutcome::Ignored);
        };

        subscription.status = status;
        if let Some(period_end) = object.get("current_period_end").and_then(|v| v.as_i64()) {
            subscription.expires_at = unix_to_datetime(period_end);
        }
        subscription.updated_at = Utc::now();
        self.store.save_subscription(&user_id, &subscription).await?;

        tracing::info!(
            target: "lernwerk::billing::webhook",
            user_id = %user_id,
            status = %status,
            "Subscription synced from provider"
        );

        Ok(WebhookOutcome::Processed)
    }

    /// Handle customer.subscription.deleted: mark the subscription
    /// cancelled. The user keeps their remaining token balance.
    async fn handle_subscription_deleted(&self, event: &WebhookEvent) -> Result<WebhookOutcome> {
        let subscription_id = event
            .data
            .object
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| BillingError::InvalidWebhookPayload {
                message: "missing subscription ID".to_string(),
            })?;

        self.transition_by_provider_id(
            &event.id,
            subscription_id,
            SubscriptionStatus::Cancelled,
        )
        .await
    }

    /// Handle invoice.payment_failed: flag the subscription past due. No
    /// tokens are granted and none are taken away.
    async fn handle_payment_failed(&self, event: &WebhookEvent) -> Result<WebhookOutcome> {
        let Some(subscription_id) = event
            .data
            .object
            .get("subscription")
            .and_then(|v| v.as_str())
        else {
            return Ok(WebhookOutcome::Ignored);
        };

        self.transition_by_provider_id(&event.id, subscription_id, SubscriptionStatus::PastDue)
            .await
    }

    async fn transition_by_provider_id(
        &self,
        event_id: &str,
        subscription_id: &str,
        status: SubscriptionStatus,
    ) -> Result<WebhookOutcome> {
        let Some((user_id, mut subscription)) = self
            .store
            .get_subscription_by_provider_id(subscription_id)
            .await?
        else {
            tracing::warn!(
                target: "lernwerk::billing::webhook",
                event_id = %event_id,
                subscription_id = %subscription_id,
                "Event for unknown subscription, ignoring"
            );
            return Ok(WebhookOutcome::Ignored);
        };

        subscription.status = status;
        subscription.updated_at = Utc::now();
        self.store.save_subscription(&user_id, &subscription).await?;

        tracing::info!(
            target: "lernwerk::billing::webhook",
            user_id = %user_id,
            status = %status,
            "Subscription status changed via webhook"
        );

        Ok(WebhookOutcome::Processed)
    }

    async fn grant_tokens(
        &self,
        user_id: &str,
        amount: i64,
        description: String,
        kind: TransactionKind,
        reference_id: String,
    ) -> Result<()> {
        let transaction =
            Transaction::new(user_id, amount, description, kind, Some(reference_id));
        self.store.append_transaction(&transaction).await?;

        tracing::info!(
            target: "lernwerk::billing::webhook",
            user_id = %user_id,
            amount = amount,
            kind = %kind,
            "Granted tokens from webhook event"
        );

        Ok(())
    }
}

/// Parsed webhook event.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct WebhookEvent {
    /// Event ID.
    pub id: String,
    /// Event type (e.g., "checkout.session.completed").
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event data.
    pub data: WebhookEventData,
    /// Timestamp when the event was created.
    pub created: u64,
}

/// Webhook event data.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct WebhookEventData {
    /// The object that triggered the event.
    pub object: serde_json::Value,
}

/// Outcome of webhook processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Event was processed successfully.
    Processed,
    /// Event was ignored (not relevant).
    Ignored,
    /// Event was already processed (idempotency).
    AlreadyProcessed,
}

fn unix_to_datetime(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

/// Parsed signature header parts.
struct SignatureParts {
    timestamp: i64,
    signature: String,
}

/// Parse the signature header (`t=<unix>,v1=<hex>`).
fn parse_signature_header(header: &str) -> Result<SignatureParts> {
    let mut timestamp = None;
    let mut signature = None;

    for part in header.split(',') {
        let (key, value) = part.split_once('=').ok_or_else(|| {
            BillingError::InvalidWebhookPayload {
                message: "invalid signature header format".to_string(),
            }
        })?;

        match key.trim() {
            "t" => timestamp = value.parse().ok(),
            "v1" => signature = Some(value.to_string()),
            _ => {} // Ignore other versions
        }
    }

    Ok(SignatureParts {
        timestamp: timestamp.ok_or(BillingError::InvalidWebhookSignature)?,
        signature: signature.ok_or(BillingError::InvalidWebhookSignature)?,
    })
}

/// Compute HMAC-SHA256 signature.
fn compute_signature(secret: &str, payload: &[u8]) -> Result<String> {
    type HmacSha256 = Hmac<Sha256>;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| {
        BillingError::Internal {
            message: "HMAC error".to_string(),
        }
    })?;

    mac.update(payload);
    let result = mac.finalize();

    Ok(hex::encode(result.into_bytes()))
}
