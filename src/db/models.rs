// Data models — Rust structs that map to database rows.
//
// These are the types that flow through the application. They're separate
// from the database queries so other modules can use them without depending
// on rusqlite directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a scraping account.
///
/// Failed logins flip an account to Inactive; a reactivation sweep flips
/// everything back to Active. Per-run failure tracking lives in the in-memory
/// run context, never in this column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    Active,
    Inactive,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Inactive => "inactive",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "active" => AccountStatus::Active,
            _ => AccountStatus::Inactive,
        }
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Session token material extracted by a successful login.
///
/// Cached on the account row (JSON-encoded) so a restart can reuse sessions
/// that are still valid instead of re-running the login flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTokens {
    /// The long-lived auth cookie
    pub auth_token: String,
    /// CSRF token paired with the auth cookie on every request
    pub csrf_token: String,
}

/// An enrolled scraping account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    pub password: String,
    pub email: String,
    pub email_password: Option<String>,
    pub proxy: Option<String>,
    /// Cached session material from the last successful login
    pub session: Option<SessionTokens>,
    pub status: AccountStatus,
    pub added_at: String,
    pub last_used: Option<String>,
    pub disabled_at: Option<String>,
}

/// A monitoring campaign: a named set of hashtag groups to poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: i64,
    pub name: String,
    /// Ordered hashtag groups; every group has 2 or 3 normalized tags
    pub hashtag_groups: Vec<Vec<String>>,
    /// Optional allowlist of accounts the dashboard tracks for this campaign
    pub tracked_accounts: Vec<String>,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// A stored post. URL is the unique key — the dedup boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub url: String,
    pub campaign_id: i64,
    pub username: String,
    pub hashtags: Vec<String>,
    pub caption: String,
    pub timestamp: DateTime<Utc>,
    pub likes: i64,
    pub comments: i64,
    pub reshares: i64,
    /// One-way consumed marker set by the flagged-account detector
    pub processed: bool,
}

/// A post about to be inserted — everything except the row id.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub url: String,
    pub campaign_id: i64,
    pub username: String,
    pub hashtags: Vec<String>,
    pub caption: String,
    pub timestamp: DateTime<Utc>,
    pub likes: i64,
    pub comments: i64,
    pub reshares: i64,
}

/// An author flagged for posting too often inside a campaign.
/// Keyed by (username, campaign_id); never deleted by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlaggedAccount {
    pub username: String,
    pub campaign_id: i64,
    pub first_detected: String,
    pub last_detected: String,
    /// Cumulative count across detection cycles
    pub post_count: i64,
    /// Row ids of every contributing post — a true set, unioned on update
    pub posts: Vec<i64>,
}

/// A surge alert for one hashtag group on one calendar day.
/// Sparse: a row exists only for days where the surge rule fired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashtagActivity {
    pub campaign_id: i64,
    pub hashtag_group: Vec<String>,
    /// UTC calendar day, formatted YYYY-MM-DD
    pub date: String,
    pub post_count: i64,
    pub unique_accounts: i64,
    pub is_surge: bool,
}

/// Normalize a hashtag for storage and comparison: trim, strip a leading '#',
/// and lowercase. Matching is always done on normalized tags.
pub fn normalize_tag(tag: &str) -> String {
    tag.trim().trim_start_matches('#').to_lowercase()
}

/// Validate and normalize a set of hashtag groups for a campaign.
///
/// Every group must have 2 or 3 non-empty members after normalization.
pub fn normalize_groups(groups: &[Vec<String>]) -> anyhow::Result<Vec<Vec<String>>> {
    let mut normalized = Vec::with_capacity(groups.len());
    for group in groups {
        let tags: Vec<String> = group
            .iter()
            .map(|t| normalize_tag(t))
            .filter(|t| !t.is_empty())
            .collect();
        if tags.len() < 2 || tags.len() > 3 {
            anyhow::bail!(
                "Hashtag group must have 2 or 3 non-empty tags, got {}: {:?}",
                tags.len(),
                group
            );
        }
        normalized.push(tags);
    }
    if normalized.is_empty() {
        anyhow::bail!("A campaign needs at least one hashtag group");
    }
    Ok(normalized)
}
