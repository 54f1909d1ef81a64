// Database trait — backend-agnostic async interface for all DB operations.
//
// Implementor: SqliteDatabase (wraps rusqlite behind a tokio Mutex).
// All methods are async so a native-async backend could sit behind the same
// interface; the store is the system of record and every method is a single
// independently-atomic document operation.
//
// The trait mirrors the queries.rs function signatures, so callers hold an
// `Arc<dyn Database>` and never see SQL.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::models::{
    Account, AccountStatus, Campaign, FlaggedAccount, HashtagActivity, NewPost, Post,
    SessionTokens,
};

#[async_trait]
pub trait Database: Send + Sync {
    // --- Lifecycle ---

    /// Count the number of user-created tables in the database.
    async fn table_count(&self) -> Result<i64>;

    // --- Run state ---

    /// Get a run state value by key (e.g., "last_cycle_at").
    async fn get_run_state(&self, key: &str) -> Result<Option<String>>;

    /// Set a run state value (upsert).
    async fn set_run_state(&self, key: &str, value: &str) -> Result<()>;

    // --- Accounts ---

    /// Enroll an account, upserting by username.
    async fn upsert_account(
        &self,
        username: &str,
        password: &str,
        email: &str,
        email_password: Option<&str>,
        proxy: Option<&str>,
    ) -> Result<()>;

    /// Look up one account by username.
    async fn get_account(&self, username: &str) -> Result<Option<Account>>;

    /// Every active account, oldest-enrolled first.
    async fn get_active_accounts(&self) -> Result<Vec<Account>>;

    /// Set an account's lifecycle status (stamps/clears disabled_at).
    async fn set_account_status(&self, username: &str, status: AccountStatus) -> Result<()>;

    /// Store fresh session tokens after a login and stamp last_used.
    async fn update_account_session(&self, username: &str, tokens: &SessionTokens) -> Result<()>;

    /// Flip every inactive account back to active; returns how many flipped.
    async fn reactivate_all_accounts(&self) -> Result<usize>;

    /// Count accounts enrolled after the given instant.
    async fn count_accounts_added_since(&self, since: &str) -> Result<i64>;

    /// (active, inactive) account counts.
    async fn account_counts(&self) -> Result<(i64, i64)>;

    // --- Campaigns ---

    /// Create a campaign from validated hashtag groups; returns its id.
    async fn insert_campaign(
        &self,
        name: &str,
        hashtag_groups: &[Vec<String>],
        tracked_accounts: &[String],
    ) -> Result<i64>;

    /// Look up a campaign by name.
    async fn get_campaign_by_name(&self, name: &str) -> Result<Option<Campaign>>;

    /// All active campaigns in sweep order.
    async fn get_active_campaigns(&self) -> Result<Vec<Campaign>>;

    /// Toggle a campaign's active flag; false if no such campaign.
    async fn set_campaign_active(&self, name: &str, active: bool) -> Result<bool>;

    /// (active, total) campaign counts.
    async fn campaign_counts(&self) -> Result<(i64, i64)>;

    // --- Posts ---

    /// Insert a post keyed by URL. False means the URL already existed
    /// (swallowed duplicate); true means a new row.
    async fn insert_post(&self, post: &NewPost) -> Result<bool>;

    /// Unprocessed posts for a campaign at or after the cutoff.
    async fn unprocessed_posts_in_window(
        &self,
        campaign_id: i64,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Post>>;

    /// Mark the window query's matches processed; returns rows flipped.
    async fn mark_window_processed(
        &self,
        campaign_id: i64,
        cutoff: DateTime<Utc>,
    ) -> Result<usize>;

    /// All posts for a campaign since the given instant, oldest first.
    async fn posts_for_campaign_since(
        &self,
        campaign_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<Post>>;

    /// Total stored posts.
    async fn count_posts(&self) -> Result<i64>;

    // --- Flagged accounts ---

    /// Upsert one author's flag for a detection cycle (see queries.rs for
    /// the first-sight/repeat-sight semantics).
    async fn upsert_flagged_account(
        &self,
        username: &str,
        campaign_id: i64,
        first_detected: DateTime<Utc>,
        last_detected: DateTime<Utc>,
        window_post_count: i64,
        window_post_ids: &[i64],
    ) -> Result<()>;

    /// Look up one flagged account by (username, campaign).
    async fn get_flagged_account(
        &self,
        username: &str,
        campaign_id: i64,
    ) -> Result<Option<FlaggedAccount>>;

    /// Total flagged accounts.
    async fn count_flagged_accounts(&self) -> Result<i64>;

    // --- Hashtag activity ---

    /// Upsert a surge record for (campaign, hashtag group, day).
    async fn upsert_hashtag_activity(&self, activity: &HashtagActivity) -> Result<()>;

    /// Look up a surge record by its composite key.
    async fn get_hashtag_activity(
        &self,
        campaign_id: i64,
        hashtag_group: &[String],
        date: &str,
    ) -> Result<Option<HashtagActivity>>;

    /// Total surge alerts.
    async fn count_surges(&self) -> Result<i64>;
}
