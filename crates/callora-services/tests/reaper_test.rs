//! Integration tests for the stale-session reaper
//!
//! Verifies that abandoned sessions are forced through the same transitions
//! a client would have driven: ring timeouts cancel unbilled, over-ceiling
//! conversations bill from receiver-joined to the forced end, and busy
//! flags are released either way. Set DATABASE_URL and run with:
//!
//! cargo test --test reaper_test -- --ignored --nocapture

use async_trait::async_trait;
use callora_core::{
    config::CallConfig,
    models::{Actor, CallStatus, EndReason, MediaType},
    traits::{CacheService, CredentialIssuer, JoinCredential},
    AppResult,
};
use callora_db::{
    create_pool, run_migrations, PgAccountRepository, PgBlockRepository, PgSessionRepository,
};
use callora_services::{CallService, PresenceService, SessionReaper};
use chrono::{Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::PgPool;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

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

/// In-memory stand-in for the Redis heartbeat store
#[derive(Default)]
struct TestCache {
    keys: std::sync::Mutex<std::collections::HashSet<String>>,
}

#[async_trait]
impl CacheService for TestCache {
    async fn get<T: DeserializeOwned>(&self, _key: &str) -> AppResult<Option<T>> {
        Ok(None)
    }

    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        _value: &T,
        _ttl_secs: u64,
    ) -> AppResult<()> {
        self.keys.lock().unwrap().insert(key.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<bool> {
        Ok(self.keys.lock().unwrap().remove(key))
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        Ok(self.keys.lock().unwrap().contains(key))
    }
}

type TestReaper = SessionReaper<
    PgSessionRepository,
    PgBlockRepository,
    StaticIssuer,
    PgAccountRepository,
    TestCache,
>;

async fn setup() -> PgPool {
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");
    let pool = create_pool(&database_url, Some(5))
        .await
        .expect("Failed to create pool");
    run_migrations(&pool).await.expect("Failed to migrate");
    pool
}

fn build(
    pool: &PgPool,
    config: CallConfig,
) -> (
    Arc<CallService<PgSessionRepository, PgBlockRepository, StaticIssuer>>,
    TestReaper,
) {
    let session_repo = Arc::new(PgSessionRepository::new(pool.clone()));
    let call_service = Arc::new(CallService::new(
        session_repo.clone(),
        Arc::new(PgBlockRepository::new(pool.clone())),
        Arc::new(StaticIssuer),
        pool.clone(),
    ));
    let presence = Arc::new(PresenceService::new(
        Arc::new(PgAccountRepository::new(pool.clone())),
        Arc::new(TestCache::default()),
        90,
    ));
    let reaper = SessionReaper::new(call_service.clone(), presence, session_repo, config);
    (call_service, reaper)
}

fn unique_id() -> i64 {
    static COUNTER: AtomicI64 = AtomicI64::new(0);
    let base = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_micros() as i64;
    base * 1000 + COUNTER.fetch_add(1, Ordering::SeqCst)
}

async fn seed_account(pool: &PgPool, id: i64, balance: i64, audio_rate: i64) {
    sqlx::query(
        r#"
        INSERT INTO accounts (
            id, coin_balance, is_busy, is_online, status,
            audio_rate_coins, video_rate_coins, audio_enabled, video_enabled
        )
        VALUES ($1, $2, FALSE, TRUE, 'active', $3, $3, TRUE, TRUE)
        "#,
    )
    .bind(id)
    .bind(balance)
    .bind(audio_rate)
    .execute(pool)
    .await
    .expect("Failed to seed account");
}

async fn is_busy(pool: &PgPool, id: i64) -> bool {
    let row: (bool,) = sqlx::query_as("SELECT is_busy FROM accounts WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
        .expect("Failed to read busy flag");
    row.0
}

async fn backdate_created(pool: &PgPool, session_id: Uuid, secs: i64) {
    sqlx::query(
        r#"
        UPDATE call_sessions
        SET created_at = NOW() - make_interval(secs => $2::DOUBLE PRECISION)
        WHERE id = $1
        "#,
    )
    .bind(session_id)
    .bind(secs as f64)
    .execute(pool)
    .await
    .expect("Failed to backdate session");
}

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
async fn test_ring_timeout_is_cancelled_unbilled() {
    let pool = setup().await;
    let (svc, reaper) = build(&pool, CallConfig::default());

    let caller = unique_id();
    let receiver = unique_id();
    seed_account(&pool, caller, 100, 0).await;
    seed_account(&pool, receiver, 0, 10).await;

    let session = svc.initiate(caller, receiver, MediaType::Audio).await.unwrap();
    backdate_created(&pool, session.id, 120).await;

    let report = reaper.sweep().await.unwrap();
    assert!(report.ring_timeouts >= 1);

    let stored = svc.get(session.id).await.unwrap();
    assert_eq!(stored.status, CallStatus::Cancelled);
    assert_eq!(stored.end_reason, Some(EndReason::RingTimeout));
    assert_eq!(stored.coins_charged, 0);
    assert!(!is_busy(&pool, caller).await);
    assert!(!is_busy(&pool, receiver).await);
}

#[tokio::test]
#[ignore] // Requires database
async fn test_stale_ongoing_is_force_ended_with_billing() {
    let pool = setup().await;
    let config = CallConfig {
        max_ongoing_secs: 3600,
        ..Default::default()
    };
    let (svc, reaper) = build(&pool, config);

    let caller = unique_id();
    let receiver = unique_id();
    seed_account(&pool, caller, 1000, 0).await;
    seed_account(&pool, receiver, 0, 10).await;

    let session = svc.initiate(caller, receiver, MediaType::Audio).await.unwrap();
    svc.accept(session.id, Actor::Account(receiver)).await.unwrap();

    // Two hours past join, one hour past the ceiling.
    backdate_joined(&pool, session.id, 7200).await;

    let report = reaper.sweep().await.unwrap();
    assert!(report.force_ended >= 1);

    let stored = svc.get(session.id).await.unwrap();
    assert_eq!(stored.status, CallStatus::Ended);
    assert_eq!(stored.end_reason, Some(EndReason::StaleReaped));
    // Billed from receiver-joined to the forced end: ~120 minutes at 10/min.
    assert!(stored.coins_charged >= 1200);
    assert!(!is_busy(&pool, caller).await);
    assert!(!is_busy(&pool, receiver).await);
}

#[tokio::test]
#[ignore] // Requires database
async fn test_fresh_sessions_survive_the_sweep() {
    let pool = setup().await;
    let (svc, reaper) = build(&pool, CallConfig::default());

    let caller = unique_id();
    let receiver = unique_id();
    seed_account(&pool, caller, 100, 0).await;
    seed_account(&pool, receiver, 0, 10).await;

    let session = svc.initiate(caller, receiver, MediaType::Audio).await.unwrap();

    reaper.sweep().await.unwrap();

    let stored = svc.get(session.id).await.unwrap();
    assert_eq!(stored.status, CallStatus::Ringing);
    assert!(is_busy(&pool, caller).await);
}
