// tests/integration_tests.rs
mod common;

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use common::FailingAdapter;
use serde_json::json;
use uuid::Uuid;
use wallet_ledger::adapters::MemoryAdapter;
use wallet_ledger::{
    Account, EntryKind, Mutation, WalletConfig, WalletError, WalletSystem,
};

fn setup() -> WalletSystem {
    WalletSystem::new(Box::new(MemoryAdapter::new()), WalletConfig::default())
}

async fn open_with_balance(system: &WalletSystem, code: &str, balance: i64) -> Account {
    let account = Account::new(code, balance);
    system.adapter().create_account(account.clone()).await.unwrap();
    account
}

fn wide_span() -> [chrono::DateTime<Utc>; 2] {
    [
        Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0).unwrap(),
    ]
}

#[tokio::test]
async fn test_open_account_starts_at_the_opening_balance() {
    let system = setup();
    let account = system.open_account("YZ123456").await.unwrap();

    assert_eq!(account.balance, 160_000);
    assert_eq!(account.referred_by, None);
    assert_eq!(account.referral_count, 0);

    let stored = system.adapter().get_account(account.account_id).await.unwrap();
    assert_eq!(stored.balance, 160_000);

    // Referral codes are unique; opening a second account on the same code fails.
    let result = system.open_account("YZ123456").await;
    assert!(matches!(result, Err(WalletError::Conflict(_))));
}

#[tokio::test]
async fn test_purchase_debit_updates_balance_and_ledger() {
    let system = setup();
    let account = open_with_balance(&system, "AB123456", 160_000).await;

    let entry = system
        .purchase(account.account_id, 6_700, "PUR-1", json!({ "item": "rpc_code" }))
        .await
        .unwrap();

    assert_eq!(entry.kind, EntryKind::Purchase);
    assert_eq!(entry.amount, -6_700);
    assert_eq!(entry.balance_before, 160_000);
    assert_eq!(entry.balance_after, 153_300);

    let stored = system.adapter().get_account(account.account_id).await.unwrap();
    assert_eq!(stored.balance, 153_300);
}

#[tokio::test]
async fn test_duplicate_correlation_id_is_a_noop() {
    let system = setup();
    let account = open_with_balance(&system, "CD123456", 160_000).await;

    let first = system
        .purchase(account.account_id, 6_700, "PUR-1", json!({}))
        .await
        .unwrap();
    let replay = system
        .purchase(account.account_id, 6_700, "PUR-1", json!({}))
        .await
        .unwrap();

    assert_eq!(replay.id, first.id);
    assert_eq!(replay.balance_after, 153_300);

    let stored = system.adapter().get_account(account.account_id).await.unwrap();
    assert_eq!(stored.balance, 153_300);

    let entries = system
        .adapter()
        .entries_for_account(account.account_id, &wide_span())
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);

    let by_correlation = system
        .adapter()
        .entry_by_correlation(account.account_id, "PUR-1")
        .await
        .unwrap();
    assert_eq!(by_correlation.map(|e| e.id), Some(first.id));
    assert!(
        system
            .adapter()
            .entry_by_correlation(account.account_id, "PUR-2")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_cooldown_gate_reservation() {
    let system = setup();
    let account = open_with_balance(&system, "AA123456", 0).await;
    let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

    let first = system
        .cooldown()
        .check_and_reserve(account.account_id, t0)
        .await
        .unwrap();
    assert!(first.is_allowed());

    let second = system
        .cooldown()
        .check_and_reserve(account.account_id, t0 + Duration::minutes(1))
        .await
        .unwrap();
    assert_eq!(
        second,
        wallet_ledger::ClaimDecision::Denied {
            retry_after: Duration::minutes(14),
        }
    );
}

#[tokio::test]
async fn test_insufficient_balance_performs_no_write() {
    let system = setup();
    let account = open_with_balance(&system, "EF123456", 1_000).await;

    let result = system
        .withdraw(account.account_id, 5_000, "WD-1", json!({}))
        .await;
    assert!(matches!(result, Err(WalletError::InsufficientBalance)));

    let stored = system.adapter().get_account(account.account_id).await.unwrap();
    assert_eq!(stored.balance, 1_000);

    let entries = system
        .adapter()
        .entries_for_account(account.account_id, &wide_span())
        .await
        .unwrap();
    assert!(entries.is_empty());
}

#[tokio::test]
async fn test_zero_amount_rejected() {
    let system = setup();
    let account = open_with_balance(&system, "GH123456", 1_000).await;

    let result = system
        .mutator()
        .mutate(Mutation {
            account_id: account.account_id,
            kind: EntryKind::Other,
            amount: 0,
            correlation_id: "NOOP-1".to_string(),
            metadata: json!({}),
        })
        .await;

    assert!(matches!(result, Err(WalletError::InvalidAmount)));
}

#[tokio::test]
async fn test_mutation_against_missing_account() {
    let system = setup();

    let result = system
        .withdraw(Uuid::now_v7(), 100, "WD-1", json!({}))
        .await;

    assert!(matches!(result, Err(WalletError::AccountNotFound(_))));
}

#[tokio::test]
async fn test_claim_credits_and_stamps_cooldown() {
    let system = setup();
    let account = open_with_balance(&system, "IJ123456", 0).await;
    let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

    let entry = system.claim(account.account_id, "CLAIM-1", t0).await.unwrap();
    assert_eq!(entry.kind, EntryKind::Claim);
    assert_eq!(entry.amount, 30_000);
    assert_eq!(entry.balance_after, 30_000);

    let stored = system.adapter().get_account(account.account_id).await.unwrap();
    assert_eq!(stored.balance, 30_000);
    assert_eq!(stored.last_claim_at, Some(t0));
}

#[tokio::test]
async fn test_claim_denied_within_interval() {
    let system = setup();
    let account = open_with_balance(&system, "KL123456", 0).await;
    let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

    system.claim(account.account_id, "CLAIM-1", t0).await.unwrap();

    let result = system
        .claim(account.account_id, "CLAIM-2", t0 + Duration::minutes(5))
        .await;
    match result {
        Err(WalletError::CooldownActive { retry_after }) => {
            assert_eq!(retry_after, Duration::minutes(10));
        }
        other => panic!("expected CooldownActive, got {:?}", other.map(|e| e.id)),
    }

    // Window elapsed — claim goes through again.
    let entry = system
        .claim(account.account_id, "CLAIM-3", t0 + Duration::minutes(15))
        .await
        .unwrap();
    assert_eq!(entry.balance_after, 60_000);
}

#[tokio::test]
async fn test_concurrent_claims_single_winner() {
    let system = Arc::new(setup());
    let account = open_with_balance(&system, "MN123456", 0).await;
    let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

    let s1 = Arc::clone(&system);
    let s2 = Arc::clone(&system);
    let id = account.account_id;

    let handle1 = tokio::spawn(async move { s1.claim(id, "CLAIM-A", t0).await });
    let handle2 = tokio::spawn(async move { s2.claim(id, "CLAIM-B", t0).await });

    let (result1, result2) = tokio::join!(handle1, handle2);
    let result1 = result1.unwrap();
    let result2 = result2.unwrap();

    let outcomes = [&result1, &result2];
    let succeeded = outcomes.iter().filter(|r| r.is_ok()).count();
    let denied = outcomes
        .iter()
        .filter(|r| matches!(r, Err(WalletError::CooldownActive { .. })))
        .count();

    assert_eq!(succeeded, 1, "exactly one claim should win the window");
    assert_eq!(denied, 1, "exactly one claim should hit the cooldown");

    let stored = system.adapter().get_account(account.account_id).await.unwrap();
    assert_eq!(stored.balance, 30_000, "exactly one bonus should have landed");
}

#[tokio::test]
async fn test_balance_tracks_ledger_over_a_sequence() {
    let system = setup();
    let account = open_with_balance(&system, "OP123456", 160_000).await;
    let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

    system.claim(account.account_id, "CLAIM-1", t0).await.unwrap();
    system
        .purchase(account.account_id, 6_700, "PUR-1", json!({}))
        .await
        .unwrap();
    system
        .withdraw(account.account_id, 40_000, "WD-1", json!({}))
        .await
        .unwrap();

    let applied = 30_000 - 6_700 - 40_000;
    let stored = system.adapter().get_account(account.account_id).await.unwrap();
    assert_eq!(stored.balance, 160_000 + applied);

    let entries = system
        .adapter()
        .entries_for_account(account.account_id, &wide_span())
        .await
        .unwrap();
    assert_eq!(entries.len(), 3);
    // Newest first — the head entry's balance_after is the live balance.
    assert_eq!(entries[0].balance_after, stored.balance);

    let sum: i64 = entries.iter().map(|e| e.amount).sum();
    assert_eq!(sum, applied);
}

#[tokio::test]
async fn test_mutations_on_different_accounts_interleave() {
    let system = Arc::new(setup());
    let a = open_with_balance(&system, "QR123456", 50_000).await;
    let b = open_with_balance(&system, "ST123456", 50_000).await;

    let s1 = Arc::clone(&system);
    let s2 = Arc::clone(&system);
    let (a_id, b_id) = (a.account_id, b.account_id);

    let handle1 =
        tokio::spawn(async move { s1.withdraw(a_id, 20_000, "WD-A", json!({})).await });
    let handle2 =
        tokio::spawn(async move { s2.withdraw(b_id, 30_000, "WD-B", json!({})).await });

    let (result1, result2) = tokio::join!(handle1, handle2);
    assert!(result1.unwrap().is_ok());
    assert!(result2.unwrap().is_ok());

    assert_eq!(system.adapter().get_account(a_id).await.unwrap().balance, 30_000);
    assert_eq!(system.adapter().get_account(b_id).await.unwrap().balance, 20_000);
}

#[tokio::test]
async fn test_failed_claim_still_consumes_the_window() {
    let adapter = FailingAdapter::new();
    let system = WalletSystem::new(Box::new(adapter.clone()), WalletConfig::default());
    let account = Account::new("UV123456", 0);
    system.adapter().create_account(account.clone()).await.unwrap();
    let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

    adapter.fail_next_mutation();
    let result = system.claim(account.account_id, "CLAIM-1", t0).await;
    assert!(matches!(result, Err(WalletError::Storage(_))));

    // Fail-closed: the reservation stands even though no credit landed.
    let retry = system.claim(account.account_id, "CLAIM-2", t0).await;
    assert!(matches!(retry, Err(WalletError::CooldownActive { .. })));

    let stored = system.adapter().get_account(account.account_id).await.unwrap();
    assert_eq!(stored.balance, 0);
}

#[tokio::test]
async fn test_configured_rollback_releases_the_window() {
    let adapter = FailingAdapter::new();
    let config = WalletConfig {
        rollback_cooldown_on_failure: true,
        ..WalletConfig::default()
    };
    let system = WalletSystem::new(Box::new(adapter.clone()), config);
    let account = Account::new("WX123456", 0);
    system.adapter().create_account(account.clone()).await.unwrap();
    let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

    adapter.fail_next_mutation();
    let result = system.claim(account.account_id, "CLAIM-1", t0).await;
    assert!(matches!(result, Err(WalletError::Storage(_))));

    // Reservation was rewound — the retry wins the window.
    let entry = system.claim(account.account_id, "CLAIM-2", t0).await.unwrap();
    assert_eq!(entry.balance_after, 30_000);
}
