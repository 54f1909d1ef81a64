// Account pool manager — builds a search client bound to working sessions.
//
// The pool is rebuilt in full on every acquisition rather than patched
// incrementally; sessions are cheap to re-establish relative to the races a
// partially-updated pool invites. Per-run failure and usage bookkeeping
// lives in an explicit RunContext owned by the caller, so the pool itself
// stays stateless and testable with injected account lists.

pub mod backoff;

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::db::models::{Account, AccountStatus, SessionTokens};
use crate::db::Database;
use crate::twitter::auth::{Authenticator, Session};
use crate::twitter::client::{SearchBackend, SearchError, TweetRecord};

use backoff::RetrySchedule;

/// Process-local state spanning one monitoring run.
///
/// `failed` collects accounts whose login was exhausted this run (retried
/// preferentially at the end of each cycle); `used` collects accounts
/// rotated out after capacity exhaustion. Both reset when the pool is
/// reinitialized from scratch.
#[derive(Debug)]
pub struct RunContext {
    pub failed: HashSet<String>,
    pub used: HashSet<String>,
    /// High-water mark for noticing accounts enrolled mid-run.
    pub last_account_check: DateTime<Utc>,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            failed: HashSet::new(),
            used: HashSet::new(),
            last_account_check: Utc::now(),
        }
    }

    /// Clear the per-run sets (pool reinitialization).
    pub fn reset(&mut self) {
        self.failed.clear();
        self.used.clear();
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

/// The API handle produced by an acquisition: a search client bound to
/// however many sessions logged in successfully. Possibly zero — callers
/// treat an empty client as "no capacity this cycle".
pub struct PoolClient {
    sessions: Vec<Session>,
    backend: Arc<dyn SearchBackend>,
    next: AtomicUsize,
}

impl PoolClient {
    pub fn new(sessions: Vec<Session>, backend: Arc<dyn SearchBackend>) -> Self {
        Self {
            sessions,
            backend,
            next: AtomicUsize::new(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Usernames of the bound sessions, in rotation order.
    pub fn usernames(&self) -> Vec<String> {
        self.sessions.iter().map(|s| s.username.clone()).collect()
    }

    /// Issue one search through the next session in round-robin order.
    ///
    /// CapacityExhausted carries the username of the session that hit the
    /// wall so the ingestion engine can rotate it out of the pool.
    pub async fn search(&self, query: &str, limit: u32) -> Result<Vec<TweetRecord>, SearchError> {
        if self.sessions.is_empty() {
            return Err(SearchError::Transient("no sessions bound".to_string()));
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        self.backend.search(&self.sessions[idx], query, limit).await
    }
}

/// Delay between the reactivation sweep and the retried account read.
const REACTIVATION_DELAY: Duration = Duration::from_secs(5);

/// Acquires, caches, and rotates authenticated sessions.
pub struct AccountPool {
    db: Arc<dyn Database>,
    authenticator: Arc<dyn Authenticator>,
    backend: Arc<dyn SearchBackend>,
    retry: RetrySchedule,
    reactivation_delay: Duration,
}

impl AccountPool {
    pub fn new(
        db: Arc<dyn Database>,
        authenticator: Arc<dyn Authenticator>,
        backend: Arc<dyn SearchBackend>,
    ) -> Self {
        Self {
            db,
            authenticator,
            backend,
            retry: RetrySchedule::default(),
            reactivation_delay: REACTIVATION_DELAY,
        }
    }

    /// Override the retry schedule and reactivation delay (tests run with
    /// instant schedules).
    pub fn with_timing(mut self, retry: RetrySchedule, reactivation_delay: Duration) -> Self {
        self.retry = retry;
        self.reactivation_delay = reactivation_delay;
        self
    }

    /// Build a fresh pool client.
    ///
    /// Accounts in `ctx.used` are excluded; accounts in `preferring` are
    /// tried first but nothing is dropped for not being preferred. Each
    /// remaining account gets a bounded login-retry loop; one account's
    /// exhaustion never aborts the acquisition.
    pub async fn acquire(
        &self,
        ctx: &mut RunContext,
        preferring: &HashSet<String>,
    ) -> Result<PoolClient> {
        let mut accounts = self.db.get_active_accounts().await?;

        if accounts.is_empty() {
            // Fleet-wide lockout: sweep everything back to active and
            // retry the read once after a fixed delay.
            let revived = self.db.reactivate_all_accounts().await?;
            warn!(revived, "No active accounts — ran reactivation sweep");
            tokio::time::sleep(self.reactivation_delay).await;
            accounts = self.db.get_active_accounts().await?;
        }

        accounts.retain(|a| !ctx.used.contains(&a.username));
        if !preferring.is_empty() {
            // Stable partition: preferred first, enrollment order within each half
            accounts.sort_by_key(|a| !preferring.contains(&a.username));
        }

        let mut sessions = Vec::new();
        for account in &accounts {
            match self.login_with_retry(account).await {
                Some(tokens) => {
                    self.db
                        .update_account_session(&account.username, &tokens)
                        .await?;
                    sessions.push(Session {
                        username: account.username.clone(),
                        tokens,
                    });
                }
                None => {
                    self.db
                        .set_account_status(&account.username, AccountStatus::Inactive)
                        .await?;
                    ctx.failed.insert(account.username.clone());
                }
            }
        }

        info!(
            sessions = sessions.len(),
            failed_this_run = ctx.failed.len(),
            "Account pool acquired"
        );

        Ok(PoolClient::new(sessions, Arc::clone(&self.backend)))
    }

    /// Bounded login-retry state machine for one account.
    ///
    /// Retryable failures (automation timeouts and the like) sleep out the
    /// schedule's delay and try again; credential rejection and schedule
    /// exhaustion both return None.
    async fn login_with_retry(&self, account: &Account) -> Option<SessionTokens> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.authenticator.login(account).await {
                Ok(tokens) => {
                    info!(username = account.username, attempt, "Login succeeded");
                    return Some(tokens);
                }
                Err(e) if !e.is_retryable() => {
                    warn!(username = account.username, error = %e, "Login rejected — disabling account");
                    return None;
                }
                Err(e) => match self.retry.delay_for(attempt) {
                    Some(delay) => {
                        warn!(
                            username = account.username,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Login failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        warn!(
                            username = account.username,
                            attempts = attempt,
                            error = %e,
                            "Login attempts exhausted — disabling account"
                        );
                        return None;
                    }
                },
            }
        }
    }
}
