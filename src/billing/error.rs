//! Billing-specific error types.
//!
//! Provides granular error types for ledger, spend and webhook operations,
//! enabling better error handling and more informative messages for API
//! consumers.

use std::fmt;

/// Billing-specific errors.
///
/// These errors provide more context than generic errors and can be
/// converted to `LernwerkError` for HTTP responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingError {
    // Spend errors
    /// The user's balance does not cover the requested cost.
    InsufficientTokens { balance: i64, required: i64 },
    /// The generation collaborator failed and no fallback applies.
    GenerationFailed { operation: String, message: String },
    /// The requested operation has no ledger reference type and cannot be
    /// charged through the spend gate.
    OperationNotMetered { operation: String },
    /// The requested spend cost is zero or negative.
    InvalidCost { cost: i64 },

    // Plan errors
    /// The specified plan was not found.
    PlanNotFound { plan_id: String },

    // Subscription errors
    /// No subscription found for the user.
    NoSubscription { user_id: String },
    /// The billing provider reported a status string we do not recognize.
    UnknownSubscriptionStatus { status: String },

    // Webhook errors
    /// Webhook signature is invalid.
    InvalidWebhookSignature,
    /// Webhook timestamp is too old (replay attack protection).
    WebhookTimestampExpired { age_seconds: i64 },
    /// Webhook event data is malformed.
    InvalidWebhookPayload { message: String },

    // Stripe API errors
    /// Stripe API returned an error.
    StripeApiError {
        operation: String,
        message: String,
        http_status: Option<u16>,
    },

    // General errors
    /// An unexpected internal error occurred.
    Internal { message: String },
}

impl fmt::Display for BillingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientTokens { balance, required } => {
                write!(
                    f,
                    "Insufficient tokens: balance {balance}, required {required}"
                )
            }
            Self::GenerationFailed { operation, message } => {
                write!(f, "Generation failed during '{operation}': {message}")
            }
            Self::OperationNotMetered { operation } => {
                write!(f, "Operation '{operation}' is not metered")
            }
            Self::InvalidCost { cost } => {
                write!(f, "Invalid spend cost: {cost} (must be positive)")
            }
            Self::PlanNotFound { plan_id } => {
                write!(f, "Plan not found: {plan_id}")
            }
            Self::NoSubscription { user_id } => {
                write!(f, "No subscription found for '{user_id}'")
            }
            Self::UnknownSubscriptionStatus { status } => {
                write!(f, "Unknown subscription status from provider: '{status}'")
            }
            Self::InvalidWebhookSignature => {
                write!(f, "Invalid webhook signature")
            }
            Self::WebhookTimestampExpired { age_seconds } => {
                write!(f, "Webhook timestamp expired ({age_seconds} seconds old)")
            }
            Self::InvalidWebhookPayload { message } => {
                write!(f, "Invalid webhook payload: {message}")
            }
            Self::StripeApiError {
                operation,
                message,
                http_status,
            } => {
                write!(f, "Stripe API error during '{operation}': {message}")?;
                if let Some(status) = http_status {
                    write!(f, " [HTTP {status}]")?;
                }
                Ok(())
            }
            Self::Internal { message } => {
                write!(f, "Internal billing error: {message}")
            }
        }
    }
}

impl std::error::Error for BillingError {}

impl From<BillingError> for crate::error::LernwerkError {
    fn from(err: BillingError) -> Self {
        match &err {
            // Map to NotFound
            BillingError::PlanNotFound { .. } | BillingError::NoSubscription { .. } => {
                crate::error::LernwerkError::NotFound(err.to_string())
            }

            // Map to BadRequest (client errors; InsufficientTokens carries
            // the current balance so the caller can show it)
            BillingError::InsufficientTokens { .. }
            | BillingError::OperationNotMetered { .. }
            | BillingError::InvalidCost { .. }
            | BillingError::UnknownSubscriptionStatus { .. }
            | BillingError::InvalidWebhookSignature
            | BillingError::WebhookTimestampExpired { .. }
            | BillingError::InvalidWebhookPayload { .. } => {
                crate::error::LernwerkError::BadRequest(err.to_string())
            }

            // Collaborator failures
            BillingError::GenerationFailed { .. } => {
                crate::error::LernwerkError::ServiceUnavailable(err.to_string())
            }

            // Map to Internal (server errors)
            BillingError::Internal { .. } => {
                crate::error::LernwerkError::Internal(err.to_string())
            }

            // Map Stripe API errors based on HTTP status
            BillingError::StripeApiError { http_status, .. } => match http_status {
                Some(400..=499) => crate::error::LernwerkError::BadRequest(err.to_string()),
                _ => crate::error::LernwerkError::Internal(err.to_string()),
            },
        }
    }
}

impl BillingError {
    /// Check if this is a client error (4xx).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::InsufficientTokens { .. }
            | Self::OperationNotMetered { .. }
            | Self::InvalidCost { .. }
            | Self::PlanNotFound { .. }
            | Self::NoSubscription { .. }
            | Self::UnknownSubscriptionStatus { .. }
            | Self::InvalidWebhookSignature
            | Self::WebhookTimestampExpired { .. }
            | Self::InvalidWebhookPayload { .. } => true,
            Self::StripeApiError { http_status, .. } => {
                matches!(http_status, Some(400..=499))
            }
            _ => false,
        }
    }

    /// Check if this is a server error (5xx).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        match self {
            Self::GenerationFailed { .. } | Self::Internal { .. } => true,
            Self::StripeApiError { http_status, .. } => {
                matches!(http_status, Some(500..=599) | None)
            }
            _ => false,
        }
    }
}
