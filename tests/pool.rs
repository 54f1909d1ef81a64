// Pool acquisition and rotation tests — scripted login and search backends
// over an in-memory database.
//
// These exercise the pool manager's contract end to end: partial login
// failure, the reactivation sweep, bounded retry, and capacity-exhaustion
// rotation during ingestion.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::Connection;

use brushfire::db::models::{Account, AccountStatus, SessionTokens};
use brushfire::db::schema::create_tables;
use brushfire::db::{Database, SqliteDatabase};
use brushfire::ingest::{self, IngestOptions};
use brushfire::pool::backoff::RetrySchedule;
use brushfire::pool::{AccountPool, RunContext};
use brushfire::twitter::auth::{AuthError, Authenticator, Session};
use brushfire::twitter::client::{SearchBackend, SearchError, TweetRecord};

async fn test_db() -> Arc<dyn Database> {
    let conn = Connection::open_in_memory().unwrap();
    create_tables(&conn).unwrap();
    Arc::new(SqliteDatabase::new(conn))
}

fn tokens_for(username: &str) -> SessionTokens {
    SessionTokens {
        auth_token: format!("auth-{username}"),
        csrf_token: format!("csrf-{username}"),
    }
}

/// What the scripted authenticator should do for one login attempt.
#[derive(Clone, Copy)]
enum LoginOutcome {
    Succeed,
    Reject,
    Timeout,
}

/// Authenticator that plays back a per-account script of outcomes, then
/// succeeds once the script is exhausted.
struct ScriptedAuthenticator {
    scripts: Mutex<HashMap<String, Vec<LoginOutcome>>>,
}

impl ScriptedAuthenticator {
    fn new(scripts: &[(&str, &[LoginOutcome])]) -> Self {
        let map = scripts
            .iter()
            .map(|(username, outcomes)| (username.to_string(), outcomes.to_vec()))
            .collect();
        Self {
            scripts: Mutex::new(map),
        }
    }

    fn always_succeed() -> Self {
        Self::new(&[])
    }
}

#[async_trait]
impl Authenticator for ScriptedAuthenticator {
    async fn login(&self, account: &Account) -> Result<SessionTokens, AuthError> {
        let outcome = {
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(&account.username) {
                Some(queue) if !queue.is_empty() => queue.remove(0),
                _ => LoginOutcome::Succeed,
            }
        };
        match outcome {
            LoginOutcome::Succeed => Ok(tokens_for(&account.username)),
            LoginOutcome::Reject => Err(AuthError::CredentialRejected(account.username.clone())),
            LoginOutcome::Timeout => Err(AuthError::Timeout("scripted timeout".to_string())),
        }
    }
}

/// Search backend that exhausts capacity for a fixed set of usernames and
/// returns one synthetic record per query for everyone else.
struct ScriptedBackend {
    exhausted: HashSet<String>,
}

impl ScriptedBackend {
    fn new(exhausted: &[&str]) -> Self {
        Self {
            exhausted: exhausted.iter().map(|u| u.to_string()).collect(),
        }
    }
}

fn record_for(query: &str, session: &Session) -> TweetRecord {
    let slug: String = query
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    TweetRecord {
        url: format!("https://x.com/poster/status/{slug}"),
        username: "poster".to_string(),
        hashtags: vec![],
        text: format!("served by {}", session.username),
        created_at: Utc::now(),
        like_count: 0,
        reply_count: 0,
        retweet_count: 0,
    }
}

#[async_trait]
impl SearchBackend for ScriptedBackend {
    async fn search(
        &self,
        session: &Session,
        query: &str,
        _limit: u32,
    ) -> Result<Vec<TweetRecord>, SearchError> {
        if self.exhausted.contains(&session.username) {
            return Err(SearchError::CapacityExhausted {
                username: session.username.clone(),
            });
        }
        Ok(vec![record_for(query, session)])
    }
}

fn instant_pool(
    db: &Arc<dyn Database>,
    authenticator: ScriptedAuthenticator,
    backend: ScriptedBackend,
) -> AccountPool {
    AccountPool::new(Arc::clone(db), Arc::new(authenticator), Arc::new(backend))
        .with_timing(RetrySchedule::immediate(3), Duration::ZERO)
}

fn zero_delay_options() -> IngestOptions {
    IngestOptions {
        page_size: 100,
        rotate_delay: Duration::ZERO,
        skip_delay: Duration::ZERO,
    }
}

async fn enroll(db: &Arc<dyn Database>, usernames: &[&str]) {
    for username in usernames {
        db.upsert_account(username, "pw", "", None, None)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn partial_login_failure_keeps_pool_usable() {
    let db = test_db().await;
    enroll(&db, &["scout1", "scout2", "scout3"]).await;

    // scout2's credentials are dead; scout3 times out through every attempt
    let auth = ScriptedAuthenticator::new(&[
        ("scout2", &[LoginOutcome::Reject]),
        (
            "scout3",
            &[
                LoginOutcome::Timeout,
                LoginOutcome::Timeout,
                LoginOutcome::Timeout,
            ],
        ),
    ]);
    let pool = instant_pool(&db, auth, ScriptedBackend::new(&[]));

    let mut ctx = RunContext::new();
    let client = pool.acquire(&mut ctx, &HashSet::new()).await.unwrap();

    assert_eq!(client.session_count(), 1);
    assert_eq!(client.usernames(), vec!["scout1".to_string()]);

    // Failures are tracked, not silently dropped
    assert!(ctx.failed.contains("scout2"));
    assert!(ctx.failed.contains("scout3"));
    assert_eq!(ctx.failed.len(), 2);

    // Both failed accounts were disabled in the store
    for username in ["scout2", "scout3"] {
        let account = db.get_account(username).await.unwrap().unwrap();
        assert_eq!(account.status, AccountStatus::Inactive);
        assert!(account.disabled_at.is_some());
    }

    // The survivor has fresh session material
    let survivor = db.get_account("scout1").await.unwrap().unwrap();
    assert_eq!(survivor.session, Some(tokens_for("scout1")));
    assert!(survivor.last_used.is_some());
}

#[tokio::test]
async fn login_retries_through_transient_timeouts() {
    let db = test_db().await;
    enroll(&db, &["scout1"]).await;

    // Two timeouts, then success — inside the 3-attempt budget
    let auth = ScriptedAuthenticator::new(&[(
        "scout1",
        &[LoginOutcome::Timeout, LoginOutcome::Timeout],
    )]);
    let pool = instant_pool(&db, auth, ScriptedBackend::new(&[]));

    let mut ctx = RunContext::new();
    let client = pool.acquire(&mut ctx, &HashSet::new()).await.unwrap();

    assert_eq!(client.session_count(), 1);
    assert!(ctx.failed.is_empty());
}

#[tokio::test]
async fn reactivation_sweep_recovers_from_fleet_lockout() {
    let db = test_db().await;
    enroll(&db, &["scout1", "scout2"]).await;
    db.set_account_status("scout1", AccountStatus::Inactive)
        .await
        .unwrap();
    db.set_account_status("scout2", AccountStatus::Inactive)
        .await
        .unwrap();

    let pool = instant_pool(&db, ScriptedAuthenticator::always_succeed(), ScriptedBackend::new(&[]));

    let mut ctx = RunContext::new();
    let client = pool.acquire(&mut ctx, &HashSet::new()).await.unwrap();

    // The sweep flipped both accounts back and the retry logged them in
    assert_eq!(client.session_count(), 2);
    for username in ["scout1", "scout2"] {
        let account = db.get_account(username).await.unwrap().unwrap();
        assert_eq!(account.status, AccountStatus::Active);
        assert!(account.disabled_at.is_none());
    }
}

#[tokio::test]
async fn empty_capacity_only_after_sweep_retry_fails() {
    let db = test_db().await;
    enroll(&db, &["scout1"]).await;
    db.set_account_status("scout1", AccountStatus::Inactive)
        .await
        .unwrap();

    // Even after the sweep revives it, the login keeps getting rejected
    let auth = ScriptedAuthenticator::new(&[("scout1", &[LoginOutcome::Reject])]);
    let pool = instant_pool(&db, auth, ScriptedBackend::new(&[]));

    let mut ctx = RunContext::new();
    let client = pool.acquire(&mut ctx, &HashSet::new()).await.unwrap();

    assert!(client.is_empty());
    assert!(ctx.failed.contains("scout1"));
}

#[tokio::test]
async fn capacity_exhaustion_rotates_to_next_account() {
    let db = test_db().await;
    enroll(&db, &["scout1", "scout2"]).await;

    // scout1's session can't serve the queue; scout2's can
    let pool = instant_pool(
        &db,
        ScriptedAuthenticator::always_succeed(),
        ScriptedBackend::new(&["scout1"]),
    );

    let mut ctx = RunContext::new();
    let mut client = pool.acquire(&mut ctx, &HashSet::new()).await.unwrap();
    assert_eq!(client.session_count(), 2);

    let groups = vec![vec!["alpha".to_string(), "beta".to_string()]];
    let tweets =
        ingest::search_hashtag_groups(&pool, &mut ctx, &mut client, &groups, &zero_delay_options())
            .await
            .unwrap();

    // The group was served after rotation, and the exhausted account is
    // tracked in both per-run sets
    assert_eq!(tweets.len(), 1);
    assert!(ctx.used.contains("scout1"));
    assert!(ctx.failed.contains("scout1"));
    assert_eq!(client.usernames(), vec!["scout2".to_string()]);
}

#[tokio::test]
async fn group_is_abandoned_when_capacity_runs_dry() {
    let db = test_db().await;
    enroll(&db, &["scout1"]).await;

    // The only account is exhausted — rotation leaves an empty pool
    let pool = instant_pool(
        &db,
        ScriptedAuthenticator::always_succeed(),
        ScriptedBackend::new(&["scout1"]),
    );

    let mut ctx = RunContext::new();
    let mut client = pool.acquire(&mut ctx, &HashSet::new()).await.unwrap();

    let groups = vec![vec!["alpha".to_string(), "beta".to_string()]];
    let tweets =
        ingest::search_hashtag_groups(&pool, &mut ctx, &mut client, &groups, &zero_delay_options())
            .await
            .unwrap();

    assert!(tweets.is_empty());
    assert!(client.is_empty());
    assert!(ctx.used.contains("scout1"));
}

#[tokio::test]
async fn preferred_accounts_are_tried_first() {
    let db = test_db().await;
    enroll(&db, &["scout1", "scout2", "scout3"]).await;

    let pool = instant_pool(&db, ScriptedAuthenticator::always_succeed(), ScriptedBackend::new(&[]));

    let mut ctx = RunContext::new();
    let preferred: HashSet<String> = ["scout3".to_string()].into_iter().collect();
    let client = pool.acquire(&mut ctx, &preferred).await.unwrap();

    // Preferred first, nobody dropped
    assert_eq!(client.session_count(), 3);
    assert_eq!(client.usernames()[0], "scout3");
}
