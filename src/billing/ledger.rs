//! The append-only token ledger.
//!
//! Every credit and debit on a user's token account is a [`Transaction`]
//! row. Rows are immutable once written; the balance is always derived by
//! summing amounts, never stored. Because appends commute under summation,
//! concurrent credits and debits need no account-level locking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

use super::storage::BillingStore;

/// A single ledger entry. Credits are positive, debits negative.
///
/// Immutable once created; the ledger is the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    /// Transaction ID.
    pub id: Uuid,
    /// The user whose balance this entry affects.
    pub user_id: String,
    /// Signed token amount. Zero is permitted but discouraged.
    pub amount: i64,
    /// Human-readable description for history display.
    pub description: String,
    /// What kind of operation produced this entry.
    pub kind: TransactionKind,
    /// Optional reference to the artifact or external event that produced
    /// this entry. Webhook-driven credits store the provider event id here
    /// so replayed deliveries can be detected.
    pub reference_id: Option<String>,
    /// Creation timestamp. Used only for history ordering.
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a new transaction with a fresh id and the current time.
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        amount: i64,
        description: impl Into<String>,
        kind: TransactionKind,
        reference_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            amount,
            description: description.into(),
            kind,
            reference_id,
            created_at: Utc::now(),
        }
    }

    /// Check if this entry is a credit.
    #[must_use]
    pub fn is_credit(&self) -> bool {
        self.amount > 0
    }

    /// Check if this entry is a debit.
    #[must_use]
    pub fn is_debit(&self) -> bool {
        self.amount < 0
    }
}

/// What produced a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Debit for a generated parent letter.
    ParentLetter,
    /// Debit for AI quiz generation.
    QuizGeneration,
    /// Monthly token grant from a subscription payment.
    SubscriptionRenewal,
    /// One-time welcome grant on first activation.
    SubscriptionBonus,
    /// Seeded starting balance.
    InitialAllocation,
}

impl TransactionKind {
    /// Convert to the wire/storage string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParentLetter => "parent_letter",
            Self::QuizGeneration => "quiz_generation",
            Self::SubscriptionRenewal => "subscription_renewal",
            Self::SubscriptionBonus => "subscription_bonus",
            Self::InitialAllocation => "initial_allocation",
        }
    }

    /// Parse from the wire/storage string. Unknown tags are rejected.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "parent_letter" => Some(Self::ParentLetter),
            "quiz_generation" => Some(Self::QuizGeneration),
            "subscription_renewal" => Some(Self::SubscriptionRenewal),
            "subscription_bonus" => Some(Self::SubscriptionBonus),
            "initial_allocation" => Some(Self::InitialAllocation),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Manager for ledger reads and appends.
///
/// Balance-sign enforcement is deliberately not done here; the spend gate
/// owns that precondition for debits.
pub struct TokenLedger<S: BillingStore> {
    store: S,
}

impl<S: BillingStore> TokenLedger<S> {
    /// Create a new ledger over a billing store.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Current balance for a user: the sum of all their transaction
    /// amounts, 0 if none exist.
    pub async fn balance(&self, user_id: &str) -> Result<i64> {
        self.store.balance(user_id).await
    }

    /// Append a transaction. `amount` may be positive or negative.
    pub async fn record(
        &self,
        user_id: &str,
        amount: i64,
        description: impl Into<String>,
        kind: TransactionKind,
        reference_id: Option<String>,
    ) -> Result<Transaction> {
        let transaction = Transaction::new(user_id, amount, description, kind, reference_id);
        self.store.append_transaction(&transaction).await?;

        tracing::debug!(
            target: "lernwerk::billing",
            user_id = %transaction.user_id,
            amount = transaction.amount,
            kind = %transaction.kind,
            "Recorded ledger transaction"
        );

        Ok(transaction)
    }

    /// Seed a starting balance for a new user.
    pub async fn grant_initial(&self, user_id: &str, amount: i64) -> Result<Transaction> {
        self.record(
            user_id,
            amount,
            "Initial token allocation",
            TransactionKind::InitialAllocation,
            None,
        )
        .await
    }

    /// Transaction history for a user, newest first.
    pub async fn history(&self, user_id: &str) -> Result<Vec<Transaction>> {
        let mut transactions = self.store.transactions_for_user(user_id).await?;
        transactions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(transactions)
    }
}
