//! Integration tests for the call lifecycle and billing engine
//!
//! These tests drive full call flows against a real PostgreSQL instance and
//! verify admission, transitions, billing, ledger entries, and busy-flag
//! release. Set DATABASE_URL and run with:
//!
//! cargo test --test call_lifecycle_test -- --ignored --nocapture

use async_trait::async_trait;
use callora_core::{
    models::{Actor, CallStatus, MediaType},
    traits::{CredentialIssuer, JoinCredential, SessionRepository},
    AppError, AppResult,
};
use callora_db::{create_pool, run_migrations, PgBlockRepository, PgSessionRepository};
use callora_services::CallService;
use chrono::{Duration, Utc};
use sqlx::PgPool;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Issuer double that always succeeds
struct StaticIssuer;

#[async_trait]
impl CredentialIssuer for StaticIssuer {
    async fn issue(&self, channel_id: Uuid) -> AppResult<JoinCredential> {
        Ok(JoinCredential {
            token: format!("test-token-{}", channel_id),
            expires_at: Utc::now() + Duration::hours(1),
        })
    }
}

/// Issuer double simulating a provider outage
struct FailingIssuer;

#[async_trait]
impl CredentialIssuer for FailingIssuer {
    async fn issue(&self, _channel_id: Uuid) -> AppResult<JoinCredential> {
        Err(AppError::BackendUnavailable(
            "Credential issuer timed out".to_string(),
        ))
    }
}

type TestCallService<C> = CallService<PgSessionRepository, PgBlockRepository, C>;

async fn setup() -> PgPool {
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");
    let pool = create_pool(&database_url, Some(5))
        .await
        .expect("Failed to create pool");
    run_migrations(&pool).await.expect("Failed to migrate");
    pool
}

fn service<C: CredentialIssuer>(pool: &PgPool, issuer: C) -> TestCallService<C> {
    CallService::new(
        Arc::new(PgSessionRepository::new(pool.clone())),
        Arc::new(PgBlockRepository::new(pool.clone())),
        Arc::new(issuer),
        pool.clone(),
    )
}

/// Unique account ids per test run, so parallel tests never collide
fn unique_id() -> i64 {
    static COUNTER: AtomicI64 = AtomicI64::new(0);
    let base = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_micros() as i64;
    base * 1000 + COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Seed an account ready to call or be called
async fn seed_account(pool: &PgPool, id: i64, balance: i64, audio_rate: i64, online: bool) {
    sqlx::query(
        r#"
        INSERT INTO accounts (
            id, coin_balance, is_busy, is_online, status,
            audio_rate_coins, video_rate_coins, audio_enabled, video_enabled
        )
        VALUES ($1, $2, FALSE, $3, 'active', $4, $5, TRUE, TRUE)
        "#,
    )
    .bind(id)
    .bind(balance)
    .bind(online)
    .bind(audio_rate)
    .bind(audio_rate * 2)
    .execute(pool)
    .await
    .expect("Failed to seed account");
}

async fn balance_of(pool: &PgPool, id: i64) -> i64 {
    let row: (i64,) = sqlx::query_as("SELECT coin_balance FROM accounts WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
        .expect("Failed to read balance");
    row.0
}

async fn is_busy(pool: &PgPool, id: i64) -> bool {
    let row: (bool,) = sqlx::query_as("SELECT is_busy FROM accounts WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
        .expect("Failed to read busy flag");
    row.0
}

async fn ledger_amounts(pool: &PgPool, session_id: Uuid) -> Vec<i64> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT amount FROM ledger_entries WHERE session_id = $1 ORDER BY amount",
    )
    .bind(session_id)
    .fetch_all(pool)
    .await
    .expect("Failed to read ledger");
    rows.into_iter().map(|(a,)| a).collect()
}

/// Backdate the conversation start so billing spans a known duration
async fn backdate_joined(pool: &PgPool, session_id: Uuid, secs: i64) {
    sqlx::query(
        r#"
        UPDATE call_sessions
        SET joined_at = NOW() - make_interval(secs => $2::DOUBLE PRECISION),
            started_at = NOW() - make_interval(secs => $2::DOUBLE PRECISION)
        WHERE id = $1
        "#,
    )
    .bind(session_id)
    .bind(secs as f64)
    .execute(pool)
    .await
    .expect("Failed to backdate session");
}

#[tokio::test]
#[ignore] // Requires database
async fn test_full_lifecycle_bills_conversation_time() {
    let pool = setup().await;
    let svc = service(&pool, StaticIssuer);

    let caller = unique_id();
    let receiver = unique_id();
    seed_account(&pool, caller, 100, 0, true).await;
    seed_account(&pool, receiver, 0, 10, true).await;

    let session = svc
        .initiate(caller, receiver, MediaType::Audio)
        .await
        .expect("admission should pass");
    assert_eq!(session.status, CallStatus::Ringing);
    assert!(is_busy(&pool, caller).await);
    assert!(is_busy(&pool, receiver).await);

    let (accepted, credential) = svc
        .accept(session.id, Actor::Account(receiver))
        .await
        .expect("accept should pass");
    assert_eq!(accepted.status, CallStatus::Ongoing);
    assert!(credential.token.starts_with("test-token-"));

    // 125 s of conversation at 10 coins/min bills as 3 minutes = 30 coins.
    backdate_joined(&pool, session.id, 125).await;

    let ended = svc
        .end(session.id, Actor::Account(caller), Some(125))
        .await
        .expect("end should pass");

    assert_eq!(ended.status, CallStatus::Ended);
    assert_eq!(ended.coins_charged, 30);
    assert_eq!(ended.coins_credited, 30);
    assert!(ended.duration_secs >= 125);

    assert_eq!(balance_of(&pool, caller).await, 70);
    assert_eq!(balance_of(&pool, receiver).await, 30);
    assert_eq!(ledger_amounts(&pool, session.id).await, vec![-30, 30]);

    assert!(!is_busy(&pool, caller).await);
    assert!(!is_busy(&pool, receiver).await);
}

#[tokio::test]
#[ignore] // Requires database
async fn test_end_while_ringing_is_free() {
    let pool = setup().await;
    let svc = service(&pool, StaticIssuer);

    let caller = unique_id();
    let receiver = unique_id();
    seed_account(&pool, caller, 50, 0, true).await;
    seed_account(&pool, receiver, 0, 10, true).await;

    let session = svc.initiate(caller, receiver, MediaType::Audio).await.unwrap();
    let ended = svc
        .end(session.id, Actor::Account(caller), None)
        .await
        .unwrap();

    assert_eq!(ended.status, CallStatus::Ended);
    assert_eq!(ended.duration_secs, 0);
    assert_eq!(ended.coins_charged, 0);
    assert!(ledger_amounts(&pool, session.id).await.is_empty());
    assert_eq!(balance_of(&pool, caller).await, 50);
    assert!(!is_busy(&pool, caller).await);
    assert!(!is_busy(&pool, receiver).await);
}

#[tokio::test]
#[ignore] // Requires database
async fn test_end_is_idempotent_and_never_double_bills() {
    let pool = setup().await;
    let svc = service(&pool, StaticIssuer);

    let caller = unique_id();
    let receiver = unique_id();
    seed_account(&pool, caller, 100, 0, true).await;
    seed_account(&pool, receiver, 0, 10, true).await;

    let session = svc.initiate(caller, receiver, MediaType::Audio).await.unwrap();
    svc.accept(session.id, Actor::Account(receiver)).await.unwrap();
    backdate_joined(&pool, session.id, 60).await;

    let first = svc.end(session.id, Actor::Account(caller), None).await.unwrap();
    let second = svc
        .end(session.id, Actor::Account(receiver), None)
        .await
        .expect("re-issued end is a no-op");

    assert_eq!(first.coins_charged, second.coins_charged);
    assert_eq!(ledger_amounts(&pool, session.id).await.len(), 2);
    assert_eq!(
        balance_of(&pool, caller).await,
        100 - first.coins_charged,
        "second end must not bill again"
    );
}

#[tokio::test]
#[ignore] // Requires database
async fn test_second_accept_conflicts() {
    let pool = setup().await;
    let svc = service(&pool, StaticIssuer);

    let caller = unique_id();
    let receiver = unique_id();
    seed_account(&pool, caller, 100, 0, true).await;
    seed_account(&pool, receiver, 0, 10, true).await;

    let session = svc.initiate(caller, receiver, MediaType::Audio).await.unwrap();
    svc.accept(session.id, Actor::Account(receiver)).await.unwrap();

    let result = svc.accept(session.id, Actor::Account(receiver)).await;
    assert!(matches!(result, Err(AppError::Conflict(_))));
    assert_eq!(balance_of(&pool, caller).await, 100);
}

#[tokio::test]
#[ignore] // Requires database
async fn test_insufficient_balance_is_rejected() {
    let pool = setup().await;
    let svc = service(&pool, StaticIssuer);

    let caller = unique_id();
    let receiver = unique_id();
    seed_account(&pool, caller, 5, 0, true).await;
    seed_account(&pool, receiver, 0, 10, true).await;

    let result = svc.initiate(caller, receiver, MediaType::Audio).await;
    assert!(matches!(
        result,
        Err(AppError::InsufficientBalance {
            required: 10,
            available: 5
        })
    ));
    assert!(!is_busy(&pool, caller).await);
    assert!(!is_busy(&pool, receiver).await);
}

#[tokio::test]
#[ignore] // Requires database
async fn test_concurrent_initiations_have_single_winner() {
    let pool = setup().await;
    let svc = Arc::new(service(&pool, StaticIssuer));

    let caller_a = unique_id();
    let caller_b = unique_id();
    let receiver = unique_id();
    seed_account(&pool, caller_a, 100, 0, true).await;
    seed_account(&pool, caller_b, 100, 0, true).await;
    seed_account(&pool, receiver, 0, 10, true).await;

    let (ra, rb) = tokio::join!(
        svc.initiate(caller_a, receiver, MediaType::Audio),
        svc.initiate(caller_b, receiver, MediaType::Audio),
    );

    let winners = [&ra, &rb].iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one initiation must win the receiver");

    let loser = if ra.is_ok() { rb } else { ra };
    assert!(matches!(loser, Err(AppError::UserBusy)));

    assert!(is_busy(&pool, receiver).await);
}

#[tokio::test]
#[ignore] // Requires database
async fn test_blocked_pair_surfaces_as_unavailable() {
    let pool = setup().await;
    let svc = service(&pool, StaticIssuer);

    let caller = unique_id();
    let receiver = unique_id();
    seed_account(&pool, caller, 100, 0, true).await;
    seed_account(&pool, receiver, 0, 10, true).await;

    sqlx::query("INSERT INTO account_blocks (blocker_id, blocked_id) VALUES ($1, $2)")
        .bind(receiver)
        .bind(caller)
        .execute(&pool)
        .await
        .unwrap();

    let result = svc.initiate(caller, receiver, MediaType::Audio).await;
    assert!(matches!(result, Err(AppError::UserUnavailable)));
}

#[tokio::test]
#[ignore] // Requires database
async fn test_issuer_outage_keeps_session_ringing() {
    let pool = setup().await;
    let svc = service(&pool, FailingIssuer);

    let caller = unique_id();
    let receiver = unique_id();
    seed_account(&pool, caller, 100, 0, true).await;
    seed_account(&pool, receiver, 0, 10, true).await;

    let session = svc.initiate(caller, receiver, MediaType::Audio).await.unwrap();

    let result = svc.accept(session.id, Actor::Account(receiver)).await;
    assert!(matches!(result, Err(AppError::BackendUnavailable(_))));

    // The session stays RINGING with busy held; accept is retryable.
    let repo = PgSessionRepository::new(pool.clone());
    let stored = repo.find_by_id(session.id).await.unwrap().unwrap();
    assert_eq!(stored.status, CallStatus::Ringing);
    assert!(is_busy(&pool, caller).await);
    assert!(is_busy(&pool, receiver).await);
}

#[tokio::test]
#[ignore] // Requires database
async fn test_reject_releases_busy_without_billing() {
    let pool = setup().await;
    let svc = service(&pool, StaticIssuer);

    let caller = unique_id();
    let receiver = unique_id();
    seed_account(&pool, caller, 100, 0, true).await;
    seed_account(&pool, receiver, 0, 10, true).await;

    let session = svc.initiate(caller, receiver, MediaType::Audio).await.unwrap();
    let rejected = svc.reject(session.id, Actor::Account(receiver)).await.unwrap();

    assert_eq!(rejected.status, CallStatus::Rejected);
    assert!(ledger_amounts(&pool, session.id).await.is_empty());
    assert!(!is_busy(&pool, caller).await);
    assert!(!is_busy(&pool, receiver).await);

    // And a fresh call to the same receiver is admissible again.
    let again = svc.initiate(caller, receiver, MediaType::Audio).await;
    assert!(again.is_ok());
}

#[tokio::test]
#[ignore] // Requires database
async fn test_rating_is_write_once_caller_only() {
    let pool = setup().await;
    let svc = service(&pool, StaticIssuer);

    let caller = unique_id();
    let receiver = unique_id();
    seed_account(&pool, caller, 100, 0, true).await;
    seed_account(&pool, receiver, 0, 10, true).await;

    let session = svc.initiate(caller, receiver, MediaType::Audio).await.unwrap();
    svc.accept(session.id, Actor::Account(receiver)).await.unwrap();
    svc.end(session.id, Actor::Account(caller), None).await.unwrap();

    let rated = svc
        .rate(session.id, Actor::Account(caller), 5, Some("great call".into()))
        .await
        .unwrap();
    assert_eq!(rated.rating, Some(5));

    let again = svc.rate(session.id, Actor::Account(caller), 1, None).await;
    assert!(matches!(again, Err(AppError::Conflict(_))));

    let by_receiver = svc.rate(session.id, Actor::Account(receiver), 3, None).await;
    assert!(matches!(by_receiver, Err(AppError::UnauthorizedActor)));
}
