//! End-to-end billing flow: checkout, webhook activation, metered
//! spending, renewal and cancellation.

use lernwerk::billing::{
    default_plans, CheckoutConfig, CheckoutManager, CheckoutRequest, InMemoryBillingStore,
    MockCheckoutClient, SpendGate, SpendOutcome, SubscriptionManager, SubscriptionStatus,
    TokenLedger, TransactionKind, WebhookEvent, WebhookEventData, WebhookHandler, WebhookOutcome,
};
use lernwerk::generation::{
    CachedGenerationService, GenerationCache, GenerationRequest, Language, MockGenerationClient,
};

const SECRET: &str = "whsec_integration_test";

fn webhook_handler(store: InMemoryBillingStore) -> WebhookHandler<InMemoryBillingStore> {
    WebhookHandler::new(store, SECRET.to_string(), default_plans())
}

fn checkout_completed(event_id: &str, user_id: &str, plan_id: &str) -> WebhookEvent {
    WebhookEvent {
        id: event_id.to_string(),
        event_type: "checkout.session.completed".to_string(),
        data: WebhookEventData {
            object: serde_json::json!({
                "id": "cs_live_1",
                "customer": "cus_42",
                "subscription": "sub_42",
                "metadata": { "user_id": user_id, "plan_id": plan_id }
            }),
        },
        created: 1756339200,
    }
}

fn invoice_paid(event_id: &str, subscription_id: &str) -> WebhookEvent {
    WebhookEvent {
        id: event_id.to_string(),
        event_type: "invoice.payment_succeeded".to_string(),
        data: WebhookEventData {
            object: serde_json::json!({
                "id": "in_live_1",
                "subscription": subscription_id,
                "customer": "cus_42",
                "period_end": 4102444800i64
            }),
        },
        created: 1756339200,
    }
}

fn quiz(topic: &str) -> GenerationRequest {
    GenerationRequest::Quiz {
        topic: topic.to_string(),
        level: "grade 5".to_string(),
        language: Language::De,
        num_questions: 10,
    }
}

#[tokio::test]
async fn test_full_subscription_lifecycle() {
    let store = InMemoryBillingStore::new();
    let plans = default_plans();

    // 1. User starts a checkout for the basic plan
    let checkout = CheckoutManager::new(
        store.clone(),
        MockCheckoutClient::new(),
        plans.clone(),
        CheckoutConfig::default(),
    );
    let session = checkout
        .create_checkout_session(
            "teacher-7",
            CheckoutRequest::new(
                "basic",
                "https://app.example.com/billing/success",
                "https://app.example.com/billing/cancel",
            ),
        )
        .await
        .unwrap();
    assert!(!session.url.is_empty());

    let subscriptions = SubscriptionManager::new(store.clone());
    assert!(!subscriptions.is_entitled("teacher-7").await.unwrap());

    // 2. Provider confirms payment via webhook
    let webhooks = webhook_handler(store.clone());
    let outcome = webhooks
        .handle_event(checkout_completed("evt_1", "teacher-7", "basic"))
        .await
        .unwrap();
    assert_eq!(outcome, WebhookOutcome::Processed);
    assert!(subscriptions.is_entitled("teacher-7").await.unwrap());

    let ledger = TokenLedger::new(store.clone());
    assert_eq!(ledger.balance("teacher-7").await.unwrap(), 1000);

    // 3. User spends tokens on generation
    let gate = SpendGate::new(store.clone(), MockGenerationClient::new());
    let outcome = gate.spend("teacher-7", 1, &quiz("fractions")).await.unwrap();
    assert!(outcome.was_charged());
    assert_eq!(ledger.balance("teacher-7").await.unwrap(), 999);

    // The debit references the artifact it paid for
    let history = ledger.history("teacher-7").await.unwrap();
    let debit = history.iter().find(|t| t.is_debit()).unwrap();
    assert_eq!(debit.kind, TransactionKind::QuizGeneration);
    assert_eq!(
        debit.reference_id.as_deref(),
        Some(outcome.artifact().id.to_string().as_str())
    );

    // 4. A month later, renewal tops the balance up
    webhooks
        .handle_event(invoice_paid("evt_2", "sub_42"))
        .await
        .unwrap();
    assert_eq!(ledger.balance("teacher-7").await.unwrap(), 1999);

    // 5. Cancellation keeps the remaining balance spendable
    webhooks
        .handle_event(WebhookEvent {
            id: "evt_3".to_string(),
            event_type: "customer.subscription.deleted".to_string(),
            data: WebhookEventData {
                object: serde_json::json!({ "id": "sub_42" }),
            },
            created: 1756339200,
        })
        .await
        .unwrap();

    assert_eq!(
        subscriptions.status("teacher-7").await.unwrap(),
        SubscriptionStatus::Cancelled
    );
    assert!(gate
        .spend("teacher-7", 1, &quiz("geometry"))
        .await
        .unwrap()
        .was_charged());
    assert_eq!(ledger.balance("teacher-7").await.unwrap(), 1998);
}

#[tokio::test]
async fn test_replayed_webhooks_credit_once() {
    let store = InMemoryBillingStore::new();
    let webhooks = webhook_handler(store.clone());
    let ledger = TokenLedger::new(store.clone());

    webhooks
        .handle_event(checkout_completed("evt_1", "teacher-7", "premium"))
        .await
        .unwrap();
    webhooks
        .handle_event(invoice_paid("evt_2", "sub_42"))
        .await
        .unwrap();
    assert_eq!(ledger.balance("teacher-7").await.unwrap(), 6000);

    // Provider retries deliveries; balances must not move
    for event in [
        checkout_completed("evt_1", "teacher-7", "premium"),
        invoice_paid("evt_2", "sub_42"),
    ] {
        let outcome = webhooks.handle_event(event).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::AlreadyProcessed);
    }
    assert_eq!(ledger.balance("teacher-7").await.unwrap(), 6000);
}

#[tokio::test]
async fn test_payment_failure_blocks_grants_not_balance() {
    let store = InMemoryBillingStore::new();
    let webhooks = webhook_handler(store.clone());
    let ledger = TokenLedger::new(store.clone());
    let subscriptions = SubscriptionManager::new(store.clone());

    webhooks
        .handle_event(checkout_completed("evt_1", "teacher-7", "basic"))
        .await
        .unwrap();

    webhooks
        .handle_event(WebhookEvent {
            id: "evt_2".to_string(),
            event_type: "invoice.payment_failed".to_string(),
            data: WebhookEventData {
                object: serde_json::json!({ "subscription": "sub_42" }),
            },
            created: 1756339200,
        })
        .await
        .unwrap();

    assert_eq!(
        subscriptions.status("teacher-7").await.unwrap(),
        SubscriptionStatus::PastDue
    );
    assert!(!subscriptions.is_entitled("teacher-7").await.unwrap());
    // Existing tokens are still there and spendable
    assert_eq!(ledger.balance("teacher-7").await.unwrap(), 1000);

    let gate = SpendGate::new(store.clone(), MockGenerationClient::new());
    assert!(gate
        .spend("teacher-7", 1, &quiz("fractions"))
        .await
        .unwrap()
        .was_charged());
}

#[tokio::test]
async fn test_exhausted_balance_stops_spending() {
    let store = InMemoryBillingStore::new();
    let ledger = TokenLedger::new(store.clone());
    ledger.grant_initial("teacher-7", 2).await.unwrap();

    let gate = SpendGate::new(store.clone(), MockGenerationClient::new());
    assert!(gate.spend("teacher-7", 1, &quiz("a")).await.is_ok());
    assert!(gate.spend("teacher-7", 1, &quiz("b")).await.is_ok());

    let err = gate.spend("teacher-7", 1, &quiz("c")).await.unwrap_err();
    assert!(err.to_string().contains("Insufficient tokens"));
    assert_eq!(ledger.balance("teacher-7").await.unwrap(), 0);
}

#[tokio::test]
async fn test_fallback_letter_served_free_when_provider_down() {
    let store = InMemoryBillingStore::new();
    let ledger = TokenLedger::new(store.clone());
    ledger.grant_initial("teacher-7", 5).await.unwrap();

    let client = MockGenerationClient::failing();
    let gate = SpendGate::new(store.clone(), client);

    let request = GenerationRequest::ParentLetter {
        student_context: "Lea zeigt grosse Fortschritte".to_string(),
        tone: "formal".to_string(),
        language: Language::De,
    };
    let outcome = gate.spend("teacher-7", 1, &request).await.unwrap();

    let SpendOutcome::Fallback { artifact } = outcome else {
        panic!("expected fallback outcome");
    };
    assert!(artifact.content.contains("Lea zeigt grosse Fortschritte"));
    assert_eq!(ledger.balance("teacher-7").await.unwrap(), 5);
}

#[tokio::test]
async fn test_cached_generation_spends_per_request() {
    // Caching saves provider calls, not tokens: each spend still debits.
    let store = InMemoryBillingStore::new();
    let ledger = TokenLedger::new(store.clone());
    ledger.grant_initial("teacher-7", 10).await.unwrap();

    let client = MockGenerationClient::new();
    let cached = CachedGenerationService::new(client.clone(), GenerationCache::default());
    let gate = SpendGate::new(store.clone(), cached);

    gate.spend("teacher-7", 1, &quiz("fractions")).await.unwrap();
    gate.spend("teacher-7", 1, &quiz("fractions")).await.unwrap();

    assert_eq!(client.call_count(), 1);
    assert_eq!(ledger.balance("teacher-7").await.unwrap(), 8);
}
