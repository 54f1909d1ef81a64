// Database queries — CRUD operations for all tables.
//
// Every database interaction goes through this module. This keeps SQL
// contained in one place and gives the rest of the app clean Rust interfaces.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use super::models::{
    Account, AccountStatus, Campaign, FlaggedAccount, HashtagActivity, NewPost, Post,
    SessionTokens,
};

// --- Run state ---

/// Get a run state value by key (e.g., "last_cycle_at").
pub fn get_run_state(conn: &Connection, key: &str) -> Result<Option<String>> {
    let mut stmt = conn.prepare("SELECT value FROM run_state WHERE key = ?1")?;
    let result = stmt.query_row(params![key], |row| row.get(0)).optional()?;
    Ok(result)
}

/// Set a run state value (upsert).
pub fn set_run_state(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO run_state (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
        params![key, value],
    )?;
    Ok(())
}

// --- Accounts ---

fn map_account_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    let session_json: Option<String> = row.get(5)?;
    let session: Option<SessionTokens> =
        session_json.and_then(|json| serde_json::from_str(&json).ok());
    let status: String = row.get(6)?;
    Ok(Account {
        username: row.get(0)?,
        password: row.get(1)?,
        email: row.get(2)?,
        email_password: row.get(3)?,
        proxy: row.get(4)?,
        session,
        status: AccountStatus::from_str(&status),
        added_at: row.get(7)?,
        last_used: row.get(8)?,
        disabled_at: row.get(9)?,
    })
}

const ACCOUNT_COLUMNS: &str = "username, password, email, email_password, proxy, \
     session_tokens, status, added_at, last_used, disabled_at";

/// Enroll an account (upsert by username).
///
/// Re-enrolling refreshes the credential material without duplicating the
/// row or resetting its lifecycle state.
pub fn upsert_account(
    conn: &Connection,
    username: &str,
    password: &str,
    email: &str,
    email_password: Option<&str>,
    proxy: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO accounts (username, password, email, email_password, proxy)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(username) DO UPDATE SET
            password = ?2,
            email = ?3,
            email_password = ?4,
            proxy = ?5",
        params![username, password, email, email_password, proxy],
    )?;
    Ok(())
}

/// Look up a single account by username.
pub fn get_account(conn: &Connection, username: &str) -> Result<Option<Account>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE username = ?1"
    ))?;
    let result = stmt.query_row(params![username], map_account_row).optional()?;
    Ok(result)
}

/// Get every active account, oldest-enrolled first.
pub fn get_active_accounts(conn: &Connection) -> Result<Vec<Account>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE status = 'active'
         ORDER BY added_at, username"
    ))?;
    let rows = stmt.query_map([], map_account_row)?;

    let mut accounts = Vec::new();
    for row in rows {
        accounts.push(row?);
    }
    Ok(accounts)
}

/// Set an account's lifecycle status. Disabling stamps disabled_at;
/// re-activating clears it.
pub fn set_account_status(conn: &Connection, username: &str, status: AccountStatus) -> Result<()> {
    match status {
        AccountStatus::Active => {
            conn.execute(
                "UPDATE accounts SET status = 'active', disabled_at = NULL WHERE username = ?1",
                params![username],
            )?;
        }
        AccountStatus::Inactive => {
            conn.execute(
                "UPDATE accounts SET status = 'inactive', disabled_at = datetime('now')
                 WHERE username = ?1",
                params![username],
            )?;
        }
    }
    Ok(())
}

/// Store fresh session tokens after a successful login and stamp last_used.
pub fn update_account_session(
    conn: &Connection,
    username: &str,
    tokens: &SessionTokens,
) -> Result<()> {
    let json = serde_json::to_string(tokens)?;
    conn.execute(
        "UPDATE accounts SET session_tokens = ?2, last_used = datetime('now'),
                status = 'active', disabled_at = NULL
         WHERE username = ?1",
        params![username, json],
    )?;
    Ok(())
}

/// Reactivation sweep: flip every inactive account back to active.
/// Returns how many accounts were reactivated.
pub fn reactivate_all_accounts(conn: &Connection) -> Result<usize> {
    let count = conn.execute(
        "UPDATE accounts SET status = 'active', disabled_at = NULL WHERE status = 'inactive'",
        [],
    )?;
    Ok(count)
}

/// Count accounts enrolled after the given instant (RFC 3339 or SQLite
/// datetime text). Used by the scheduler to notice new enrollments mid-run.
pub fn count_accounts_added_since(conn: &Connection, since: &str) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM accounts WHERE datetime(added_at) > datetime(?1)",
        params![since],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// (active, inactive) account counts for the status display.
pub fn account_counts(conn: &Connection) -> Result<(i64, i64)> {
    let active: i64 = conn.query_row(
        "SELECT COUNT(*) FROM accounts WHERE status = 'active'",
        [],
        |row| row.get(0),
    )?;
    let inactive: i64 = conn.query_row(
        "SELECT COUNT(*) FROM accounts WHERE status = 'inactive'",
        [],
        |row| row.get(0),
    )?;
    Ok((active, inactive))
}

// --- Campaigns ---

fn map_campaign_row(row: &Row<'_>) -> rusqlite::Result<Campaign> {
    let groups_json: String = row.get(2)?;
    let tracked_json: String = row.get(3)?;
    let active: i64 = row.get(4)?;
    Ok(Campaign {
        id: row.get(0)?,
        name: row.get(1)?,
        hashtag_groups: serde_json::from_str(&groups_json).unwrap_or_default(),
        tracked_accounts: serde_json::from_str(&tracked_json).unwrap_or_default(),
        active: active != 0,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

const CAMPAIGN_COLUMNS: &str =
    "id, name, hashtag_groups, tracked_accounts, active, created_at, updated_at";

/// Create a campaign. The caller is responsible for normalizing and
/// validating the hashtag groups first (see models::normalize_groups).
pub fn insert_campaign(
    conn: &Connection,
    name: &str,
    hashtag_groups: &[Vec<String>],
    tracked_accounts: &[String],
) -> Result<i64> {
    let groups_json = serde_json::to_string(hashtag_groups)?;
    let tracked_json = serde_json::to_string(tracked_accounts)?;
    conn.execute(
        "INSERT INTO campaigns (name, hashtag_groups, tracked_accounts)
         VALUES (?1, ?2, ?3)",
        params![name, groups_json, tracked_json],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Look up a campaign by its unique name.
pub fn get_campaign_by_name(conn: &Connection, name: &str) -> Result<Option<Campaign>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE name = ?1"
    ))?;
    let result = stmt.query_row(params![name], map_campaign_row).optional()?;
    Ok(result)
}

/// Get all active campaigns in creation order — the per-cycle sweep order.
pub fn get_active_campaigns(conn: &Connection) -> Result<Vec<Campaign>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE active = 1 ORDER BY id"
    ))?;
    let rows = stmt.query_map([], map_campaign_row)?;

    let mut campaigns = Vec::new();
    for row in rows {
        campaigns.push(row?);
    }
    Ok(campaigns)
}

/// Toggle a campaign's active flag. Returns false if no such campaign.
pub fn set_campaign_active(conn: &Connection, name: &str, active: bool) -> Result<bool> {
    let count = conn.execute(
        "UPDATE campaigns SET active = ?2, updated_at = datetime('now') WHERE name = ?1",
        params![name, active as i64],
    )?;
    Ok(count > 0)
}

/// (active, total) campaign counts for the status display.
pub fn campaign_counts(conn: &Connection) -> Result<(i64, i64)> {
    let active: i64 = conn.query_row(
        "SELECT COUNT(*) FROM campaigns WHERE active = 1",
        [],
        |row| row.get(0),
    )?;
    let total: i64 = conn.query_row("SELECT COUNT(*) FROM campaigns", [], |row| row.get(0))?;
    Ok((active, total))
}

// --- Posts ---

fn parse_timestamp(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn map_post_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    let hashtags_json: String = row.get(4)?;
    let timestamp: String = row.get(6)?;
    let processed: i64 = row.get(10)?;
    Ok(Post {
        id: row.get(0)?,
        url: row.get(1)?,
        campaign_id: row.get(2)?,
        username: row.get(3)?,
        hashtags: serde_json::from_str(&hashtags_json).unwrap_or_default(),
        caption: row.get(5)?,
        timestamp: parse_timestamp(6, timestamp)?,
        likes: row.get(7)?,
        comments: row.get(8)?,
        reshares: row.get(9)?,
        processed: processed != 0,
    })
}

const POST_COLUMNS: &str = "id, url, campaign_id, username, hashtags, caption, \
     timestamp, likes, comments, reshares, processed";

/// Insert a post keyed by URL.
///
/// Returns true if the row was inserted, false if the URL already existed —
/// the duplicate-key rejection is the swallowed storage conflict that makes
/// re-ingestion idempotent. Any other error propagates.
pub fn insert_post(conn: &Connection, post: &NewPost) -> Result<bool> {
    let hashtags_json = serde_json::to_string(&post.hashtags)?;
    let result = conn.execute(
        "INSERT INTO posts (url, campaign_id, username, hashtags, caption,
                            timestamp, likes, comments, reshares, processed)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0)",
        params![
            post.url,
            post.campaign_id,
            post.username,
            hashtags_json,
            post.caption,
            post.timestamp.to_rfc3339(),
            post.likes,
            post.comments,
            post.reshares,
        ],
    );

    match result {
        Ok(_) => Ok(true),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

/// Unprocessed posts for a campaign with timestamps at or after the cutoff —
/// the flagged-account detector's window query.
pub fn unprocessed_posts_in_window(
    conn: &Connection,
    campaign_id: i64,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Post>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {POST_COLUMNS} FROM posts
         WHERE campaign_id = ?1 AND processed = 0
           AND datetime(timestamp) >= datetime(?2)
         ORDER BY timestamp"
    ))?;
    let rows = stmt.query_map(params![campaign_id, cutoff.to_rfc3339()], map_post_row)?;

    let mut posts = Vec::new();
    for row in rows {
        posts.push(row?);
    }
    Ok(posts)
}

/// Mark every post matched by the detector's window query as processed.
/// Returns how many rows flipped. Idempotent: already-processed posts are
/// excluded by the WHERE clause.
pub fn mark_window_processed(
    conn: &Connection,
    campaign_id: i64,
    cutoff: DateTime<Utc>,
) -> Result<usize> {
    let count = conn.execute(
        "UPDATE posts SET processed = 1
         WHERE campaign_id = ?1 AND processed = 0
           AND datetime(timestamp) >= datetime(?2)",
        params![campaign_id, cutoff.to_rfc3339()],
    )?;
    Ok(count)
}

/// All posts for a campaign since the given instant, oldest first —
/// the surge detector's scan input.
pub fn posts_for_campaign_since(
    conn: &Connection,
    campaign_id: i64,
    since: DateTime<Utc>,
) -> Result<Vec<Post>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {POST_COLUMNS} FROM posts
         WHERE campaign_id = ?1 AND datetime(timestamp) >= datetime(?2)
         ORDER BY timestamp"
    ))?;
    let rows = stmt.query_map(params![campaign_id, since.to_rfc3339()], map_post_row)?;

    let mut posts = Vec::new();
    for row in rows {
        posts.push(row?);
    }
    Ok(posts)
}

/// Total stored posts, for the status display.
pub fn count_posts(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))?;
    Ok(count)
}

// --- Flagged accounts ---

fn map_flagged_row(row: &Row<'_>) -> rusqlite::Result<FlaggedAccount> {
    let posts_json: String = row.get(5)?;
    Ok(FlaggedAccount {
        username: row.get(0)?,
        campaign_id: row.get(1)?,
        first_detected: row.get(2)?,
        last_detected: row.get(3)?,
        post_count: row.get(4)?,
        posts: serde_json::from_str(&posts_json).unwrap_or_default(),
    })
}

/// Upsert a flagged account for one detection cycle.
///
/// First sight records the window extremes as first/last detected. A repeat
/// sight only bumps last_detected, adds the window's post count, and unions
/// the contributing post ids — the set never holds an id twice.
pub fn upsert_flagged_account(
    conn: &Connection,
    username: &str,
    campaign_id: i64,
    first_detected: DateTime<Utc>,
    last_detected: DateTime<Utc>,
    window_post_count: i64,
    window_post_ids: &[i64],
) -> Result<()> {
    let existing = get_flagged_account(conn, username, campaign_id)?;

    match existing {
        None => {
            let posts_json = serde_json::to_string(window_post_ids)?;
            conn.execute(
                "INSERT INTO flagged_accounts
                    (username, campaign_id, first_detected, last_detected, post_count, posts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    username,
                    campaign_id,
                    first_detected.to_rfc3339(),
                    last_detected.to_rfc3339(),
                    window_post_count,
                    posts_json,
                ],
            )?;
        }
        Some(flagged) => {
            let mut posts = flagged.posts;
            for id in window_post_ids {
                if !posts.contains(id) {
                    posts.push(*id);
                }
            }
            let posts_json = serde_json::to_string(&posts)?;
            conn.execute(
                "UPDATE flagged_accounts
                 SET last_detected = ?3, post_count = post_count + ?4, posts = ?5
                 WHERE username = ?1 AND campaign_id = ?2",
                params![
                    username,
                    campaign_id,
                    last_detected.to_rfc3339(),
                    window_post_count,
                    posts_json,
                ],
            )?;
        }
    }
    Ok(())
}

/// Look up one flagged account by its composite key.
pub fn get_flagged_account(
    conn: &Connection,
    username: &str,
    campaign_id: i64,
) -> Result<Option<FlaggedAccount>> {
    let mut stmt = conn.prepare(
        "SELECT username, campaign_id, first_detected, last_detected, post_count, posts
         FROM flagged_accounts
         WHERE username = ?1 AND campaign_id = ?2",
    )?;
    let result = stmt
        .query_row(params![username, campaign_id], map_flagged_row)
        .optional()?;
    Ok(result)
}

/// Total flagged accounts, for the status display.
pub fn count_flagged_accounts(conn: &Connection) -> Result<i64> {
    let count: i64 =
        conn.query_row("SELECT COUNT(*) FROM flagged_accounts", [], |row| row.get(0))?;
    Ok(count)
}

// --- Hashtag activity ---

/// Upsert a surge record for (campaign, hashtag group, day).
pub fn upsert_hashtag_activity(conn: &Connection, activity: &HashtagActivity) -> Result<()> {
    let group_json = serde_json::to_string(&activity.hashtag_group)?;
    conn.execute(
        "INSERT INTO hashtag_activity
            (campaign_id, hashtag_group, date, post_count, unique_accounts, is_surge)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(campaign_id, hashtag_group, date) DO UPDATE SET
            post_count = ?4,
            unique_accounts = ?5,
            is_surge = ?6",
        params![
            activity.campaign_id,
            group_json,
            activity.date,
            activity.post_count,
            activity.unique_accounts,
            activity.is_surge as i64,
        ],
    )?;
    Ok(())
}

/// Look up a surge record by its composite key.
pub fn get_hashtag_activity(
    conn: &Connection,
    campaign_id: i64,
    hashtag_group: &[String],
    date: &str,
) -> Result<Option<HashtagActivity>> {
    let group_json = serde_json::to_string(hashtag_group)?;
    let mut stmt = conn.prepare(
        "SELECT campaign_id, hashtag_group, date, post_count, unique_accounts, is_surge
         FROM hashtag_activity
         WHERE campaign_id = ?1 AND hashtag_group = ?2 AND date = ?3",
    )?;
    let result = stmt
        .query_row(params![campaign_id, group_json, date], |row| {
            let group_json: String = row.get(1)?;
            let is_surge: i64 = row.get(5)?;
            Ok(HashtagActivity {
                campaign_id: row.get(0)?,
                hashtag_group: serde_json::from_str(&group_json).unwrap_or_default(),
                date: row.get(2)?,
                post_count: row.get(3)?,
                unique_accounts: row.get(4)?,
                is_surge: is_surge != 0,
            })
        })
        .optional()?;
    Ok(result)
}

/// Total surge alerts, for the status display.
pub fn count_surges(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM hashtag_activity WHERE is_surge = 1",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

// rusqlite's optional() helper — converts "no rows" into None
use rusqlite::OptionalExtension;
