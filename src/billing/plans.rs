//! Plan configuration and definitions.
//!
//! Define your subscription plans with token allowances and pricing using
//! the builder pattern:
//!
//! ```rust,ignore
//! use lernwerk::billing::Plans;
//!
//! let plans = Plans::builder()
//!     .plan("basic")
//!         .provider_price("price_basic_monthly")
//!         .display_name("Basic Plan")
//!         .price_cents(1000)
//!         .monthly_tokens(1000)
//!         .done()
//!     .plan("premium")
//!         .provider_price("price_premium_monthly")
//!         .display_name("Premium Plan")
//!         .price_cents(2500)
//!         .monthly_tokens(3000)
//!         .done()
//!     .build();
//! ```
//!
//! Or start from [`default_plans`] and merge overrides on top.

use std::collections::HashMap;

/// A collection of plan configurations.
#[derive(Clone, Debug, Default)]
pub struct Plans {
    plans: HashMap<String, PlanConfig>,
}

impl Plans {
    /// Create a new empty plans collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder for constructing plans.
    #[must_use]
    pub fn builder() -> PlansBuilder {
        PlansBuilder::new()
    }

    /// Merge plans from another Plans collection.
    ///
    /// Plans from `other` will overwrite plans with the same ID.
    pub fn merge(&mut self, other: Plans) {
        self.plans.extend(other.plans);
    }

    /// Add a single plan config.
    pub fn add(&mut self, config: PlanConfig) {
        self.plans.insert(config.id.clone(), config);
    }

    /// Get a plan by ID.
    #[must_use]
    pub fn get(&self, plan_id: &str) -> Option<&PlanConfig> {
        self.plans.get(plan_id)
    }

    /// Get all plan IDs.
    #[must_use]
    pub fn plan_ids(&self) -> Vec<&str> {
        self.plans.keys().map(|s| s.as_str()).collect()
    }

    /// Check if a plan exists.
    #[must_use]
    pub fn contains(&self, plan_id: &str) -> bool {
        self.plans.contains_key(plan_id)
    }

    /// Get the number of plans.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plans.len()
    }

    /// Check if there are no plans.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    /// Iterate over all plans.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PlanConfig)> {
        self.plans.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Find plan by provider price ID.
    #[must_use]
    pub fn find_by_provider_price(&self, price_id: &str) -> Option<&PlanConfig> {
        self.plans
            .values()
            .find(|p| p.provider_price_id == price_id)
    }

    /// Get all provider price IDs (for validation).
    #[must_use]
    pub fn all_provider_price_ids(&self) -> Vec<&str> {
        self.plans
            .values()
            .map(|p| p.provider_price_id.as_str())
            .collect()
    }
}

/// Configuration for a single plan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlanConfig {
    /// Plan identifier (e.g., "basic", "premium").
    pub id: String,
    /// Provider price ID for the monthly subscription.
    pub provider_price_id: String,
    /// Display name for the plan.
    pub display_name: Option<String>,
    /// Description of the plan.
    pub description: Option<String>,
    /// Monthly price in cents.
    pub price_cents: i64,
    /// Tokens granted on each successful monthly payment.
    pub monthly_tokens: i64,
    /// One-time token bonus granted on first activation.
    pub welcome_bonus: i64,
    /// Currency code (e.g., "usd", "eur", "chf").
    ///
    /// This should match the currency of the provider price. Used for
    /// display purposes and validation.
    pub currency: Option<String>,
}

impl PlanConfig {
    /// Display name, falling back to the plan id.
    #[must_use]
    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }

    /// Check if this plan grants a welcome bonus on first activation.
    #[must_use]
    pub fn has_welcome_bonus(&self) -> bool {
        self.welcome_bonus > 0
    }

    /// Get the price formatted for display (e.g., "$10.00").
    #[must_use]
    pub fn formatted_price(&self) -> String {
        let symbol = match self.currency.as_deref() {
            Some("usd") | None => "$",
            Some("gbp") => "£",
            Some("eur") => "€",
            Some(other) => other,
        };
        let dollars = self.price_cents as f64 / 100.0;
        format!("{symbol}{dollars:.2}")
    }
}

/// The stock plan catalog: basic, premium and enterprise monthly tiers.
///
/// Applications usually start from this and merge their own price IDs on
/// top.
#[must_use]
pub fn default_plans() -> Plans {
    Plans::builder()
        .plan("basic")
        .provider_price("price_basic_monthly")
        .display_name("Basic Plan")
        .description("1,000 tokens per month")
        .price_cents(1000)
        .monthly_tokens(1000)
        .done()
        .plan("premium")
        .provider_price("price_premium_monthly")
        .display_name("Premium Plan")
        .description("3,000 tokens per month")
        .price_cents(2500)
        .monthly_tokens(3000)
        .done()
        .plan("enterprise")
        .provider_price("price_enterprise_monthly")
        .display_name("Enterprise Plan")
        .description("10,000 tokens per month")
        .price_cents(5000)
        .monthly_tokens(10000)
        .done()
        .build()
}

/// Builder for constructing a collection of plans.
#[derive(Debug, Default)]
pub struct PlansBuilder {
    plans: HashMap<String, PlanConfig>,
}

impl PlansBuilder {
    /// Create a new plans builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start defining a new plan.
    #[must_use]
    pub fn plan(self, id: &str) -> PlanBuilder {
        PlanBuilder {
            parent: self,
            id: id.to_string(),
            provider_price_id: None,
            display_name: None,
            description: None,
            price_cents: 0,
            monthly_tokens: 0,
            welcome_bonus: 0,
            currency: None,
        }
    }

    /// Build the plans collection.
    #[must_use]
    pub fn build(self) -> Plans {
        Plans { plans: self.plans }
    }

    fn add_plan(mut self, config: PlanConfig) -> Self {
        self.plans.insert(config.id.clone(), config);
        self
    }
}

/// Builder for a single plan configuration.
#[derive(Debug)]
pub struct PlanBuilder {
    parent: PlansBuilder,
    id: String,
    provider_price_id: Option<String>,
    display_name: Option<String>,
    description: Option<String>,
    price_cents: i64,
    monthly_tokens: i64,
    welcome_bonus: i64,
    currency: Option<String>,
}

impl PlanBuilder {
    /// Set the provider price ID for the monthly subscription.
    #[must_use]
    pub fn provider_price(mut self, price_id: &str) -> Self {
        self.provider_price_id = Some(price_id.to_string());
        self
    }

    /// Set the display name.
    #[must_use]
    pub fn display_name(mut self, name: &str) -> Self {
        self.display_name = Some(name.to_string());
        self
    }

    /// Set the description.
    #[must_use]
    pub fn description(mut self, desc: &str) -> Self {
        self.description = Some(desc.to_string());
        self
    }

    /// Set the monthly price in cents.
    #[must_use]
    pub fn price_cents(mut self, cents: i64) -> Self {
        self.price_cents = cents;
        self
    }

    /// Set the tokens granted on each successful monthly payment.
    #[must_use]
    pub fn monthly_tokens(mut self, tokens: i64) -> Self {
        self.monthly_tokens = tokens;
        self
    }

    /// Set a one-time token bonus granted on first activation.
    #[must_use]
    pub fn welcome_bonus(mut self, tokens: i64) -> Self {
        self.welcome_bonus = tokens;
        self
    }

    /// Set the currency code (e.g., "usd", "eur", "chf").
    ///
    /// This should match the currency of your provider price.
    #[must_use]
    pub fn currency(mut self, currency: &str) -> Self {
        self.currency = Some(currency.to_lowercase());
        self
    }

    /// Finish defining this plan and return to the parent builder.
    ///
    /// # Panics
    ///
    /// Panics if `provider_price` was not set.
    #[must_use]
    pub fn done(self) -> PlansBuilder {
        let config = PlanConfig {
            id: self.id,
            provider_price_id: self
                .provider_price_id
                .expect("provider_price is required for a plan"),
            display_name: self.display_name,
            description: self.description,
            price_cents: self.price_cents,
            monthly_tokens: self.monthly_tokens,
            welcome_bonus: self.welcome_bonus,
            currency: self.currency,
        };
        self.parent.add_plan(config)
    }
}
