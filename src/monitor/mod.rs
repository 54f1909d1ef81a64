// Campaign monitor — the top-level polling scheduler.
//
// A single logical worker: campaigns and hashtag groups are processed
// strictly in order, never in parallel, because platform sessions are a
// scarce one-at-a-time resource. The loop runs forever; errors are
// contained at the narrowest scope that can absorb them (group < campaign
// < cycle), and anything unclassified at the top level costs a cooldown
// and a full pool reinitialization, never the process.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use tracing::{error, info, warn};

use crate::db::models::{AccountStatus, Campaign};
use crate::db::Database;
use crate::detect;
use crate::ingest::{self, IngestOptions};
use crate::pool::{AccountPool, PoolClient, RunContext};

/// Scheduler states. Initializing has no pool yet; Polling is the steady
/// state; Recovering is the post-error cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initializing,
    Polling,
    Recovering,
}

pub struct Monitor {
    db: Arc<dyn Database>,
    pool: AccountPool,
    poll_interval: Duration,
    cooldown: Duration,
    ingest: IngestOptions,
}

impl Monitor {
    pub fn new(
        db: Arc<dyn Database>,
        pool: AccountPool,
        poll_interval: Duration,
        cooldown: Duration,
    ) -> Self {
        Self {
            db,
            pool,
            poll_interval,
            cooldown,
            ingest: IngestOptions::default(),
        }
    }

    /// Override ingestion pacing (tests zero the delays).
    pub fn with_ingest_options(mut self, options: IngestOptions) -> Self {
        self.ingest = options;
        self
    }

    /// Run the polling loop until the process is stopped externally.
    ///
    /// Never returns under normal operation: every error path leads back to
    /// Polling through Recovering.
    pub async fn run(&self, ctx: &mut RunContext) -> Result<()> {
        info!("Starting hashtag campaign monitor");
        let mut state = State::Initializing;
        let mut client: Option<PoolClient> = None;

        loop {
            match state {
                State::Initializing => {
                    ctx.reset();
                    match self.pool.acquire(ctx, &HashSet::new()).await {
                        Ok(acquired) => {
                            if acquired.is_empty() {
                                // Still a valid pool — cycles just won't ingest
                                warn!("Pool acquired with zero usable accounts");
                            }
                            client = Some(acquired);
                            state = State::Polling;
                        }
                        Err(e) => {
                            error!(error = %e, "Pool acquisition failed");
                            state = State::Recovering;
                        }
                    }
                }
                State::Polling => {
                    let Some(active_client) = client.as_mut() else {
                        state = State::Initializing;
                        continue;
                    };
                    let started = Instant::now();
                    match self.run_cycle(ctx, active_client).await {
                        Ok(()) => {
                            // Interval-paced, not interval-plus-processing
                            let sleep = self.poll_interval.saturating_sub(started.elapsed());
                            tokio::time::sleep(sleep).await;
                        }
                        Err(e) => {
                            error!(error = %e, "Unclassified error in polling cycle");
                            state = State::Recovering;
                        }
                    }
                }
                State::Recovering => {
                    warn!(
                        cooldown_secs = self.cooldown.as_secs(),
                        "Cooling down before pool reinitialization"
                    );
                    tokio::time::sleep(self.cooldown).await;
                    client = None;
                    state = State::Initializing;
                }
            }
        }
    }

    /// One polling sweep: enrollment check, every active campaign in order,
    /// then the failed-account retry pass and run-state bookkeeping.
    pub async fn run_cycle(&self, ctx: &mut RunContext, client: &mut PoolClient) -> Result<()> {
        self.check_for_new_accounts(ctx, client).await?;

        let campaigns = self.db.get_active_campaigns().await?;
        info!(campaigns = campaigns.len(), "Polling cycle starting");

        let mut cycle_inserted = 0usize;
        for campaign in &campaigns {
            match self.monitor_campaign(ctx, client, campaign).await {
                Ok(inserted) => cycle_inserted += inserted,
                Err(e) => {
                    // One campaign's failure never blocks its siblings
                    error!(campaign = campaign.name, error = %e, "Campaign monitoring failed");
                }
            }
        }

        self.retry_failed_accounts(ctx, client).await?;

        self.db
            .set_run_state("last_cycle_at", &Utc::now().to_rfc3339())
            .await?;
        self.db
            .set_run_state("last_cycle_posts", &cycle_inserted.to_string())
            .await?;
        Ok(())
    }

    /// Ingest one campaign, then run both detectors over it.
    async fn monitor_campaign(
        &self,
        ctx: &mut RunContext,
        client: &mut PoolClient,
        campaign: &Campaign,
    ) -> Result<usize> {
        info!(campaign = campaign.name, "Monitoring campaign");

        let tweets = ingest::search_hashtag_groups(
            &self.pool,
            ctx,
            client,
            &campaign.hashtag_groups,
            &self.ingest,
        )
        .await?;

        let mut inserted = 0;
        if !tweets.is_empty() {
            inserted = ingest::store_posts(&self.db, campaign.id, &tweets).await?;
        }

        let now = Utc::now();
        detect::flagged::detect(&self.db, campaign.id, now).await?;
        detect::surge::detect(&self.db, campaign, now).await?;

        Ok(inserted)
    }

    /// Notice accounts enrolled since the last check. New capacity resets
    /// the run context and rebuilds the pool so it's usable immediately.
    async fn check_for_new_accounts(
        &self,
        ctx: &mut RunContext,
        client: &mut PoolClient,
    ) -> Result<()> {
        let since = ctx.last_account_check.to_rfc3339();
        let new_accounts = self.db.count_accounts_added_since(&since).await?;
        ctx.last_account_check = Utc::now();

        if new_accounts > 0 {
            info!(new_accounts, "New accounts enrolled — rebuilding pool");
            ctx.reset();
            *client = self.pool.acquire(ctx, &HashSet::new()).await?;
        }
        Ok(())
    }

    /// End-of-cycle retry for accounts whose login was exhausted earlier in
    /// the run: flip them back to active, reacquire preferring them, and
    /// clear the failed set.
    async fn retry_failed_accounts(
        &self,
        ctx: &mut RunContext,
        client: &mut PoolClient,
    ) -> Result<()> {
        if ctx.failed.is_empty() {
            return Ok(());
        }

        info!(
            count = ctx.failed.len(),
            "Retrying accounts that failed earlier this run"
        );
        let preferred: HashSet<String> = ctx.failed.drain().collect();
        for username in &preferred {
            self.db
                .set_account_status(username, AccountStatus::Active)
                .await?;
        }
        ctx.used.clear();
        *client = self.pool.acquire(ctx, &preferred).await?;
        Ok(())
    }
}
