// SqliteDatabase — rusqlite backend implementing the Database trait.
//
// The Connection is wrapped in tokio::sync::Mutex because Connection is !Send.
// Trait methods lock the mutex, do synchronous rusqlite work, and return.
// The lock is never held across .await points — Rust enforces this because
// MutexGuard is !Send.
//
// The free functions in queries.rs remain unchanged so tests can exercise
// them against a Connection directly.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tokio::sync::Mutex;

use super::models::{
    Account, AccountStatus, Campaign, FlaggedAccount, HashtagActivity, NewPost, Post,
    SessionTokens,
};
use super::traits::Database;

pub struct SqliteDatabase {
    conn: Mutex<Connection>,
}

impl SqliteDatabase {
    /// Wrap an already-opened rusqlite Connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn table_count(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::schema::table_count(&conn)
    }

    async fn get_run_state(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().await;
        super::queries::get_run_state(&conn, key)
    }

    async fn set_run_state(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        super::queries::set_run_state(&conn, key, value)
    }

    async fn upsert_account(
        &self,
        username: &str,
        password: &str,
        email: &str,
        email_password: Option<&str>,
        proxy: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        super::queries::upsert_account(&conn, username, password, email, email_password, proxy)
    }

    async fn get_account(&self, username: &str) -> Result<Option<Account>> {
        let conn = self.conn.lock().await;
        super::queries::get_account(&conn, username)
    }

    async fn get_active_accounts(&self) -> Result<Vec<Account>> {
        let conn = self.conn.lock().await;
        super::queries::get_active_accounts(&conn)
    }

    async fn set_account_status(&self, username: &str, status: AccountStatus) -> Result<()> {
        let conn = self.conn.lock().await;
        super::queries::set_account_status(&conn, username, status)
    }

    async fn update_account_session(&self, username: &str, tokens: &SessionTokens) -> Result<()> {
        let conn = self.conn.lock().await;
        super::queries::update_account_session(&conn, username, tokens)
    }

    async fn reactivate_all_accounts(&self) -> Result<usize> {
        let conn = self.conn.lock().await;
        super::queries::reactivate_all_accounts(&conn)
    }

    async fn count_accounts_added_since(&self, since: &str) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::queries::count_accounts_added_since(&conn, since)
    }

    async fn account_counts(&self) -> Result<(i64, i64)> {
        let conn = self.conn.lock().await;
        super::queries::account_counts(&conn)
    }

    async fn insert_campaign(
        &self,
        name: &str,
        hashtag_groups: &[Vec<String>],
        tracked_accounts: &[String],
    ) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::queries::insert_campaign(&conn, name, hashtag_groups, tracked_accounts)
    }

    async fn get_campaign_by_name(&self, name: &str) -> Result<Option<Campaign>> {
        let conn = self.conn.lock().await;
        super::queries::get_campaign_by_name(&conn, name)
    }

    async fn get_active_campaigns(&self) -> Result<Vec<Campaign>> {
        let conn = self.conn.lock().await;
        super::queries::get_active_campaigns(&conn)
    }

    async fn set_campaign_active(&self, name: &str, active: bool) -> Result<bool> {
        let conn = self.conn.lock().await;
        super::queries::set_campaign_active(&conn, name, active)
    }

    async fn campaign_counts(&self) -> Result<(i64, i64)> {
        let conn = self.conn.lock().await;
        super::queries::campaign_counts(&conn)
    }

    async fn insert_post(&self, post: &NewPost) -> Result<bool> {
        let conn = self.conn.lock().await;
        super::queries::insert_post(&conn, post)
    }

    async fn unprocessed_posts_in_window(
        &self,
        campaign_id: i64,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Post>> {
        let conn = self.conn.lock().await;
        super::queries::unprocessed_posts_in_window(&conn, campaign_id, cutoff)
    }

    async fn mark_window_processed(
        &self,
        campaign_id: i64,
        cutoff: DateTime<Utc>,
    ) -> Result<usize> {
        let conn = self.conn.lock().await;
        super::queries::mark_window_processed(&conn, campaign_id, cutoff)
    }

    async fn posts_for_campaign_since(
        &self,
        campaign_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<Post>> {
        let conn = self.conn.lock().await;
        super::queries::posts_for_campaign_since(&conn, campaign_id, since)
    }

    async fn count_posts(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::queries::count_posts(&conn)
    }

    async fn upsert_flagged_account(
        &self,
        username: &str,
        campaign_id: i64,
        first_detected: DateTime<Utc>,
        last_detected: DateTime<Utc>,
        window_post_count: i64,
        window_post_ids: &[i64],
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        super::queries::upsert_flagged_account(
            &conn,
            username,
            campaign_id,
            first_detected,
            last_detected,
            window_post_count,
            window_post_ids,
        )
    }

    async fn get_flagged_account(
        &self,
        username: &str,
        campaign_id: i64,
    ) -> Result<Option<FlaggedAccount>> {
        let conn = self.conn.lock().await;
        super::queries::get_flagged_account(&conn, username, campaign_id)
    }

    async fn count_flagged_accounts(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::queries::count_flagged_accounts(&conn)
    }

    async fn upsert_hashtag_activity(&self, activity: &HashtagActivity) -> Result<()> {
        let conn = self.conn.lock().await;
        super::queries::upsert_hashtag_activity(&conn, activity)
    }

    async fn get_hashtag_activity(
        &self,
        campaign_id: i64,
        hashtag_group: &[String],
        date: &str,
    ) -> Result<Option<HashtagActivity>> {
        let conn = self.conn.lock().await;
        super::queries::get_hashtag_activity(&conn, campaign_id, hashtag_group, date)
    }

    async fn count_surges(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::queries::count_surges(&conn)
    }
}
