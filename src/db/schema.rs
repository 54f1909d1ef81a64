// Database schema — table creation.
//
// A `schema_version` table records the installed version so later releases
// can key migrations off it. Table creation itself is idempotent.

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Create all tables if they don't exist yet.
///
/// This is idempotent — safe to call on every startup.
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- Tracks schema version for future migrations
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Enrolled scraping accounts and their session lifecycle
        CREATE TABLE IF NOT EXISTS accounts (
            username TEXT PRIMARY KEY,
            password TEXT NOT NULL,
            email TEXT NOT NULL DEFAULT '',
            email_password TEXT,
            proxy TEXT,
            session_tokens TEXT,               -- JSON, cached from the last login
            status TEXT NOT NULL DEFAULT 'active',  -- 'active' or 'inactive'
            added_at TEXT NOT NULL DEFAULT (datetime('now')),
            last_used TEXT,
            disabled_at TEXT
        );

        -- Monitoring campaigns: named sets of hashtag groups
        CREATE TABLE IF NOT EXISTS campaigns (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            hashtag_groups TEXT NOT NULL,      -- JSON array of 2-3 tag arrays
            tracked_accounts TEXT NOT NULL DEFAULT '[]',  -- JSON array
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Ingested posts. The URL UNIQUE constraint is the dedup boundary.
        CREATE TABLE IF NOT EXISTS posts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT NOT NULL UNIQUE,
            campaign_id INTEGER NOT NULL,
            username TEXT NOT NULL,
            hashtags TEXT NOT NULL,            -- JSON array of normalized tags
            caption TEXT NOT NULL DEFAULT '',
            timestamp TEXT NOT NULL,           -- RFC 3339, UTC
            likes INTEGER NOT NULL DEFAULT 0,
            comments INTEGER NOT NULL DEFAULT 0,
            reshares INTEGER NOT NULL DEFAULT 0,
            processed INTEGER NOT NULL DEFAULT 0
        );

        -- Authors flagged for over-posting, one row per (author, campaign)
        CREATE TABLE IF NOT EXISTS flagged_accounts (
            username TEXT NOT NULL,
            campaign_id INTEGER NOT NULL,
            first_detected TEXT NOT NULL,
            last_detected TEXT NOT NULL,
            post_count INTEGER NOT NULL DEFAULT 0,
            posts TEXT NOT NULL DEFAULT '[]',  -- JSON array of post row ids
            PRIMARY KEY (username, campaign_id)
        );

        -- Surge alerts, one row per (campaign, hashtag group, day) that fired
        CREATE TABLE IF NOT EXISTS hashtag_activity (
            campaign_id INTEGER NOT NULL,
            hashtag_group TEXT NOT NULL,       -- JSON array of normalized tags
            date TEXT NOT NULL,                -- YYYY-MM-DD, UTC
            post_count INTEGER NOT NULL,
            unique_accounts INTEGER NOT NULL,
            is_surge INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (campaign_id, hashtag_group, date)
        );

        -- Run state — last cycle time, per-cycle counters for `status`
        CREATE TABLE IF NOT EXISTS run_state (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Index for reading the active account fleet
        CREATE INDEX IF NOT EXISTS idx_accounts_status
            ON accounts(status);

        -- Index for the active-campaign poll query
        CREATE INDEX IF NOT EXISTS idx_campaigns_active
            ON campaigns(active);

        -- Index for the detector window query
        CREATE INDEX IF NOT EXISTS idx_posts_campaign_processed
            ON posts(campaign_id, processed);

        -- Index for time-bounded post scans
        CREATE INDEX IF NOT EXISTS idx_posts_timestamp
            ON posts(timestamp);

        -- Index for the dashboard's most-recent-flags view
        CREATE INDEX IF NOT EXISTS idx_flagged_last_detected
            ON flagged_accounts(last_detected);

        -- Index for listing surge alerts
        CREATE INDEX IF NOT EXISTS idx_activity_surge
            ON hashtag_activity(is_surge);
        ",
    )
    .context("Failed to create database tables")?;

    // Record initial schema version if not already set
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [1],
    )?;

    Ok(())
}

/// Count the number of tables in the database (useful for init confirmation).
pub fn table_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_tables_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        // Running create_tables twice should not error
        create_tables(&conn).unwrap();
        create_tables(&conn).unwrap();
    }

    #[test]
    fn test_table_count() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        let count = table_count(&conn).unwrap();
        // schema_version, accounts, campaigns, posts, flagged_accounts,
        // hashtag_activity, run_state = 7 tables
        assert_eq!(count, 7i64);
    }

    #[test]
    fn test_post_url_is_unique() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();

        conn.execute(
            "INSERT INTO posts (url, campaign_id, username, hashtags, timestamp)
             VALUES ('https://x.com/u/status/1', 1, 'u', '[]', '2026-01-01T00:00:00+00:00')",
            [],
        )
        .unwrap();

        let dup = conn.execute(
            "INSERT INTO posts (url, campaign_id, username, hashtags, timestamp)
             VALUES ('https://x.com/u/status/1', 1, 'u', '[]', '2026-01-01T00:00:00+00:00')",
            [],
        );
        assert!(dup.is_err());
    }

    #[test]
    fn test_flagged_account_key_is_composite() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();

        // Same username under two campaigns is two rows
        for campaign_id in [1, 2] {
            conn.execute(
                "INSERT INTO flagged_accounts (username, campaign_id, first_detected, last_detected, post_count)
                 VALUES ('author', ?1, datetime('now'), datetime('now'), 2)",
                [campaign_id],
            )
            .unwrap();
        }

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM flagged_accounts WHERE username = 'author'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 2);
    }
}
