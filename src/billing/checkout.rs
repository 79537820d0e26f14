//! Checkout session management.
//!
//! Creates provider checkout sessions for subscription purchases. The
//! session metadata carries the user and plan ids so the
//! `checkout.session.completed` webhook can attribute the payment.

use async_trait::async_trait;
use url::Url;

use crate::error::Result;

use super::error::BillingError;
use super::plans::Plans;
use super::storage::BillingStore;

/// Client trait for the provider's checkout API.
///
/// Implement this over your Stripe client; a mock is provided for tests.
#[async_trait]
pub trait CheckoutClient: Send + Sync {
    /// Create a checkout session with the provider.
    async fn create_checkout_session(
        &self,
        request: CreateCheckoutSessionRequest,
    ) -> Result<CheckoutSession>;
}

/// Checkout session management.
///
/// Creates provider checkout sessions for subscription purchases. Local
/// subscription state is never touched here; only the completion webhook
/// mutates it.
pub struct CheckoutManager<S: BillingStore, C: CheckoutClient> {
    store: S,
    client: C,
    plans: Plans,
    config: CheckoutConfig,
}

impl<S: BillingStore, C: CheckoutClient> CheckoutManager<S, C> {
    /// Create a new checkout manager.
    #[must_use]
    pub fn new(store: S, client: C, plans: Plans, config: CheckoutConfig) -> Self {
        Self {
            store,
            client,
            plans,
            config,
        }
    }

    /// Create a checkout session for a new subscription.
    ///
    /// Returns a checkout session with a URL to redirect the customer to.
    pub async fn create_checkout_session(
        &self,
        user_id: &str,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession> {
        self.config.validate_redirect_url(&request.success_url)?;
        self.config.validate_redirect_url(&request.cancel_url)?;

        let plan = self
            .plans
            .get(&request.plan_id)
            .ok_or_else(|| BillingError::PlanNotFound {
                plan_id: request.plan_id.clone(),
            })?;

        // Reuse the provider customer from an earlier subscription so the
        // provider does not create duplicates.
        let customer_id = self
            .store
            .get_subscription(user_id)
            .await?
            .and_then(|s| s.provider_customer_id);

        let session = self
            .client
            .create_checkout_session(CreateCheckoutSessionRequest {
                price_id: plan.provider_price_id.clone(),
                customer_id,
                success_url: request.success_url,
                cancel_url: request.cancel_url,
                metadata: CheckoutMetadata {
                    user_id: user_id.to_string(),
                    plan_id: plan.id.clone(),
                },
            })
            .await?;

        tracing::info!(
            target: "lernwerk::billing",
            user_id = %user_id,
            plan_id = %plan.id,
            session_id = %session.id,
            "Created checkout session"
        );

        Ok(session)
    }
}

/// Configuration for checkout sessions.
#[derive(Debug, Clone, Default)]
pub struct CheckoutConfig {
    /// Allowed domains for redirect URLs (empty = allow any HTTPS URL).
    /// This prevents open redirect vulnerabilities.
    pub allowed_redirect_domains: Vec<String>,
}

impl CheckoutConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set allowed redirect domains.
    ///
    /// Only URLs matching these domains will be accepted for
    /// success/cancel URLs. If empty, any HTTPS URL is allowed (not
    /// recommended for production).
    #[must_use]
    pub fn allowed_redirect_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_redirect_domains = domains.into_iter().map(Into::into).collect();
        self
    }

    /// Add a single allowed redirect domain.
    #[must_use]
    pub fn add_allowed_domain(mut self, domain: impl Into<String>) -> Self {
        self.allowed_redirect_domains.push(domain.into());
        self
    }

    /// Validate a redirect URL against the allowed domains.
    ///
    /// Returns an error if:
    /// - The URL is not valid
    /// - The URL is not HTTPS
    /// - The URL's domain is not in the allowed list (if list is non-empty)
    pub fn validate_redirect_url(&self, url: &str) -> Result<()> {
        let parsed = Url::parse(url).map_err(|e| {
            crate::error::LernwerkError::BadRequest(format!("Invalid redirect URL: {e}"))
        })?;

        if parsed.scheme() != "https" {
            return Err(crate::error::LernwerkError::BadRequest(
                "Redirect URL must use HTTPS".to_string(),
            ));
        }

        if !self.allowed_redirect_domains.is_empty() {
            let host = parsed.host_str().ok_or_else(|| {
                crate::error::LernwerkError::BadRequest(
                    "Redirect URL must have a host".to_string(),
                )
            })?;

            let domain_allowed = self.allowed_redirect_domains.iter().any(|allowed| {
                // Exact match or subdomain match
                host == allowed || host.ends_with(&format!(".{allowed}"))
            });

            if !domain_allowed {
                return Err(crate::error::LernwerkError::BadRequest(format!(
                    "Redirect URL domain '{host}' is not allowed"
                )));
            }
        }

        Ok(())
    }
}

/// Request to create a checkout session.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    /// The plan to subscribe to.
    pub plan_id: String,
    /// URL to redirect to on success.
    pub success_url: String,
    /// URL to redirect to on cancel.
    pub cancel_url: String,
}

impl CheckoutRequest {
    /// Create a new checkout request.
    #[must_use]
    pub fn new(
        plan_id: impl Into<String>,
        success_url: impl Into<String>,
        cancel_url: impl Into<String>,
    ) -> Self {
        Self {
            plan_id: plan_id.into(),
            success_url: success_url.into(),
            cancel_url: cancel_url.into(),
        }
    }
}

/// The request sent to the provider's checkout API.
#[derive(Debug, Clone)]
pub struct CreateCheckoutSessionRequest {
    /// Provider price ID for the subscription.
    pub price_id: String,
    /// Existing provider customer to attach the session to, if known.
    pub customer_id: Option<String>,
    /// URL to redirect to on success.
    pub success_url: String,
    /// URL to redirect to on cancel.
    pub cancel_url: String,
    /// Metadata attached to the session, echoed back in webhooks.
    pub metadata: CheckoutMetadata,
}

/// Metadata attached to a checkout session.
#[derive(Debug, Clone)]
pub struct CheckoutMetadata {
    /// The user buying the subscription.
    pub user_id: String,
    /// The plan being purchased.
    pub plan_id: String,
}

/// Checkout session response.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    /// Provider checkout session ID.
    pub id: String,
    /// URL to redirect the customer to.
    pub url: String,
}

/// Mock checkout client for testing.
#[cfg(any(test, feature = "test-billing"))]
pub mod test {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Mock checkout client for testing.
    ///
    /// Records created sessions and returns deterministic URLs.
    #[derive(Clone, Default)]
    pub struct MockCheckoutClient {
        sessions: Arc<Mutex<Vec<CreateCheckoutSessionRequest>>>,
    }

    impl MockCheckoutClient {
        /// Create a new mock client.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// All session requests made so far.
        pub fn created_sessions(&self) -> Vec<CreateCheckoutSessionRequest> {
            self.sessions.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CheckoutClient for MockCheckoutClient {
        async fn create_checkout_session(
            &self,
            request: CreateCheckoutSessionRequest,
        ) -> Result<CheckoutSession> {
            let mut sessions = self.sessions.lock().unwrap();
            let id = format!("cs_test_{}", sessions.len() + 1);
            sessions.push(request);
            Ok(CheckoutSession {
                url: format!("https://checkout.example.com/{id}"),
                id,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test::MockCheckoutClient;
    use super::*;
    use crate::billing::plans::default_plans;
    use crate::billing::storage::test::InMemoryBillingStore;
    use crate::billing::storage::StoredSubscription;

    fn manager(
        store: InMemoryBillingStore,
        client: MockCheckoutClient,
        config: CheckoutConfig,
    ) -> CheckoutManager<InMemoryBillingStore, MockCheckoutClient> {
        CheckoutManager::new(store, client, default_plans(), config)
    }

    fn request(plan_id: &str) -> CheckoutRequest {
        CheckoutRequest::new(
            plan_id,
            "https://app.example.com/success",
            "https://app.example.com/cancel",
        )
    }

    #[tokio::test]
    async fn test_create_checkout_session() {
        let store = InMemoryBillingStore::new();
        let client = MockCheckoutClient::new();
        let manager = manager(store.clone(), client.clone(), CheckoutConfig::default());

        let session = manager
            .create_checkout_session("user-1", request("premium"))
            .await
            .unwrap();
        assert!(session.url.starts_with("https://checkout.example.com/"));

        let created = client.created_sessions();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].price_id, "price_premium_monthly");
        assert_eq!(created[0].metadata.user_id, "user-1");
        assert_eq!(created[0].metadata.plan_id, "premium");
        assert_eq!(created[0].customer_id, None);

        // Initiation never touches local subscription state
        assert!(store.get_subscription("user-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_existing_customer_id_reused() {
        let store = InMemoryBillingStore::new();
        let client = MockCheckoutClient::new();
        let manager = manager(store.clone(), client.clone(), CheckoutConfig::default());

        let mut sub = StoredSubscription::new("basic", 1000, 1000);
        sub.provider_customer_id = Some("cus_abc".to_string());
        store.save_subscription("user-1", &sub).await.unwrap();

        manager
            .create_checkout_session("user-1", request("premium"))
            .await
            .unwrap();

        let created = client.created_sessions();
        assert_eq!(created[0].customer_id.as_deref(), Some("cus_abc"));
        // The stored record is untouched until the webhook lands
        let stored = store.get_subscription("user-1").await.unwrap().unwrap();
        assert_eq!(stored.plan_id, "basic");
    }

    #[tokio::test]
    async fn test_unknown_plan_rejected() {
        let manager = manager(
            InMemoryBillingStore::new(),
            MockCheckoutClient::new(),
            CheckoutConfig::default(),
        );

        let err = manager
            .create_checkout_session("user-1", request("platinum"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Plan not found"));
    }

    #[tokio::test]
    async fn test_http_redirect_rejected() {
        let manager = manager(
            InMemoryBillingStore::new(),
            MockCheckoutClient::new(),
            CheckoutConfig::default(),
        );

        let bad = CheckoutRequest::new(
            "basic",
            "http://app.example.com/success",
            "https://app.example.com/cancel",
        );
        assert!(manager
            .create_checkout_session("user-1", bad)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_redirect_domain_allowlist() {
        let config = CheckoutConfig::new().allowed_redirect_domains(["example.com"]);
        let manager = manager(
            InMemoryBillingStore::new(),
            MockCheckoutClient::new(),
            config,
        );

        // Subdomain of an allowed domain passes
        assert!(manager
            .create_checkout_session("user-1", request("basic"))
            .await
            .is_ok());

        let evil = CheckoutRequest::new(
            "basic",
            "https://evil.test/success",
            "https://app.example.com/cancel",
        );
        let err = manager
            .create_checkout_session("user-1", evil)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not allowed"));
    }
}
