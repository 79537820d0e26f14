//! The spend gate: generate-then-charge with no overspend.
//!
//! All metered generation goes through [`SpendGate::spend`], which
//! enforces the protocol:
//!
//! 1. Reject operations that have no ledger kind (chat is free).
//! 2. Fail fast if the balance cannot cover the cost, before any
//!    provider call is made.
//! 3. Generate. On provider failure, serve a free fallback when one
//!    exists, otherwise surface the failure; either way nothing is
//!    charged.
//! 4. On success, debit conditionally: the store re-checks the balance
//!    atomically, so two concurrent spends cannot both consume the last
//!    tokens.
//!
//! The debit references the artifact id, tying every charge to the
//! content it paid for.

use crate::error::Result;
use crate::generation::{fallback_for, GenerationRequest, GenerationService, GeneratedArtifact};

use super::error::BillingError;
use super::ledger::Transaction;
use super::storage::BillingStore;

/// Result of a successful pass through the spend gate.
#[derive(Debug, Clone)]
pub enum SpendOutcome {
    /// Generation succeeded and the user was charged.
    Charged {
        artifact: GeneratedArtifact,
        transaction: Transaction,
    },
    /// The provider failed; a canned fallback was served free of charge.
    Fallback { artifact: GeneratedArtifact },
}

impl SpendOutcome {
    /// The artifact delivered to the user, charged or not.
    #[must_use]
    pub fn artifact(&self) -> &GeneratedArtifact {
        match self {
            Self::Charged { artifact, .. } | Self::Fallback { artifact } => artifact,
        }
    }

    /// Whether tokens were debited for this artifact.
    #[must_use]
    pub fn was_charged(&self) -> bool {
        matches!(self, Self::Charged { .. })
    }
}

/// Gate that meters generation requests against the token ledger.
pub struct SpendGate<S, G> {
    store: S,
    generator: G,
}

impl<S: BillingStore, G: GenerationService> SpendGate<S, G> {
    /// Create a spend gate over a billing store and a generation service.
    #[must_use]
    pub fn new(store: S, generator: G) -> Self {
        Self { store, generator }
    }

    /// Run a metered generation request, charging `cost` tokens on
    /// success.
    ///
    /// # Errors
    ///
    /// - [`BillingError::OperationNotMetered`] if the request has no
    ///   ledger kind.
    /// - [`BillingError::InvalidCost`] if `cost` is zero or negative.
    /// - [`BillingError::InsufficientTokens`] if the balance cannot cover
    ///   the cost, either up front or at debit time.
    /// - [`BillingError::GenerationFailed`] if the provider fails and no
    ///   fallback exists for the request.
    pub async fn spend(
        &self,
        user_id: &str,
        cost: i64,
        request: &GenerationRequest,
    ) -> Result<SpendOutcome> {
        let kind = request.transaction_kind().ok_or_else(|| {
            BillingError::OperationNotMetered {
                operation: request.kind().to_string(),
            }
        })?;

        if cost <= 0 {
            return Err(BillingError::InvalidCost { cost }.into());
        }

        // Fail fast before spending provider money on a request the user
        // cannot pay for. The authoritative check happens at debit time.
        let balance = self.store.balance(user_id).await?;
        if balance < cost {
            return Err(BillingError::InsufficientTokens {
                balance,
                required: cost,
            }
            .into());
        }

        let artifact = match self.generator.generate(request).await {
            Ok(artifact) => artifact,
            Err(err) => {
                if let Some(fallback) = fallback_for(request) {
                    tracing::warn!(
                        target: "lernwerk::billing",
                        user_id = %user_id,
                        operation = request.kind(),
                        error = %err,
                        "Generation failed, serving fallback without charge"
                    );
                    return Ok(SpendOutcome::Fallback { artifact: fallback });
                }
                return Err(BillingError::GenerationFailed {
                    operation: request.kind().to_string(),
                    message: err.to_string(),
                }
                .into());
            }
        };

        let transaction = Transaction::new(
            user_id,
            -cost,
            debit_description(request),
            kind,
            Some(artifact.id.to_string()),
        );

        if !self.store.append_debit_if_affordable(&transaction).await? {
            // A concurrent spend drained the balance between the
            // pre-check and the debit.
            let balance = self.store.balance(user_id).await?;
            return Err(BillingError::InsufficientTokens {
                balance,
                required: cost,
            }
            .into());
        }

        tracing::info!(
            target: "lernwerk::billing",
            user_id = %user_id,
            operation = request.kind(),
            cost = cost,
            artifact_id = %artifact.id,
            "Charged generation"
        );

        Ok(SpendOutcome::Charged {
            artifact,
            transaction,
        })
    }
}

fn debit_description(request: &GenerationRequest) -> String {
    match request {
        GenerationRequest::ParentLetter { tone, .. } => {
            format!("Parent letter ({tone})")
        }
        GenerationRequest::Quiz { topic, .. } => format!("Quiz generation: {topic}"),
        GenerationRequest::ChatReply { .. } => "Chat reply".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::ledger::{TokenLedger, TransactionKind};
    use crate::billing::storage::test::InMemoryBillingStore;
    use crate::generation::service::test::MockGenerationClient;
    use crate::generation::Language;

    fn letter_request() -> GenerationRequest {
        GenerationRequest::ParentLetter {
            student_context: "Anna, grade 4".to_string(),
            tone: "friendly".to_string(),
            language: Language::En,
        }
    }

    fn quiz_request() -> GenerationRequest {
        GenerationRequest::Quiz {
            topic: "fractions".to_string(),
            level: "grade 5".to_string(),
            language: Language::En,
            num_questions: 10,
        }
    }

    async fn seeded_store(balance: i64) -> InMemoryBillingStore {
        let store = InMemoryBillingStore::new();
        if balance != 0 {
            TokenLedger::new(store.clone())
                .grant_initial("user-1", balance)
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_successful_spend_charges_once() {
        let store = seeded_store(10).await;
        let gate = SpendGate::new(store.clone(), MockGenerationClient::new());

        let outcome = gate.spend("user-1", 1, &quiz_request()).await.unwrap();
        assert!(outcome.was_charged());

        let SpendOutcome::Charged {
            artifact,
            transaction,
        } = outcome
        else {
            panic!("expected charged outcome");
        };
        assert_eq!(transaction.amount, -1);
        assert_eq!(transaction.kind, TransactionKind::QuizGeneration);
        assert_eq!(transaction.reference_id, Some(artifact.id.to_string()));
        assert_eq!(store.balance("user-1").await.unwrap(), 9);
    }

    #[tokio::test]
    async fn test_zero_balance_rejected_before_generation() {
        let store = seeded_store(0).await;
        let client = MockGenerationClient::new();
        let gate = SpendGate::new(store, client.clone());

        let err = gate.spend("user-1", 1, &quiz_request()).await.unwrap_err();
        assert!(err.to_string().contains("Insufficient tokens"));
        // The provider must not have been called at all.
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_generation_failure_with_fallback_not_charged() {
        let store = seeded_store(10).await;
        let gate = SpendGate::new(store.clone(), MockGenerationClient::failing());

        let outcome = gate.spend("user-1", 1, &letter_request()).await.unwrap();
        assert!(!outcome.was_charged());
        assert!(matches!(outcome, SpendOutcome::Fallback { .. }));
        assert_eq!(store.balance("user-1").await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_generation_failure_without_fallback_errors_uncharged() {
        let store = seeded_store(10).await;
        let gate = SpendGate::new(store.clone(), MockGenerationClient::failing());

        let err = gate.spend("user-1", 1, &quiz_request()).await.unwrap_err();
        assert!(err.to_string().contains("Generation failed"));
        assert_eq!(store.balance("user-1").await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_chat_is_not_metered() {
        let store = seeded_store(10).await;
        let gate = SpendGate::new(store.clone(), MockGenerationClient::new());

        let request = GenerationRequest::ChatReply {
            message: "hello".to_string(),
            user_role: "teacher".to_string(),
            language: Language::En,
        };
        let err = gate.spend("user-1", 1, &request).await.unwrap_err();
        assert!(err.to_string().contains("not metered"));
        assert_eq!(store.balance("user-1").await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_nonpositive_cost_rejected() {
        use crate::error::LernwerkError;

        let store = seeded_store(10).await;
        let gate = SpendGate::new(store, MockGenerationClient::new());

        let err = gate.spend("user-1", 0, &quiz_request()).await.unwrap_err();
        // A caller-supplied bad cost is a client error, not a server fault
        assert!(matches!(err, LernwerkError::BadRequest(_)));
        assert!(err.to_string().contains("Invalid spend cost"));

        assert!(gate.spend("user-1", -5, &quiz_request()).await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_spends_never_overspend() {
        use std::sync::Arc;

        let store = seeded_store(5).await;
        let gate = Arc::new(SpendGate::new(store.clone(), MockGenerationClient::new()));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let gate = Arc::clone(&gate);
            handles.push(tokio::spawn(async move {
                gate.spend("user-1", 1, &quiz_request()).await
            }));
        }

        let mut charged = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                charged += 1;
            }
        }

        assert_eq!(charged, 5);
        assert_eq!(store.balance("user-1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_spend_exact_balance() {
        let store = seeded_store(3).await;
        let gate = SpendGate::new(store.clone(), MockGenerationClient::new());

        let outcome = gate.spend("user-1", 3, &quiz_request()).await.unwrap();
        assert!(outcome.was_charged());
        assert_eq!(store.balance("user-1").await.unwrap(), 0);
    }
}
