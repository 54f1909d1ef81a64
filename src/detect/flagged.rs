// Flagged-account detector — windowed frequency analysis per author.
//
// A post is evaluated exactly once: the window query only sees unprocessed
// posts, and every matched post is flipped to processed at the end of the
// cycle whether or not its author qualified.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::db::models::Post;
use crate::db::Database;

/// Trailing window the detector evaluates, in seconds (one hour).
const WINDOW_SECS: i64 = 60 * 60;

/// Minimum posts inside the window before an author is flagged.
const MIN_POSTS_PER_WINDOW: usize = 2;

/// One author's aggregated activity inside a detection window.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorWindow {
    pub username: String,
    pub post_count: i64,
    pub post_ids: Vec<i64>,
    pub first_post: DateTime<Utc>,
    pub last_post: DateTime<Utc>,
}

/// Group window posts by author and keep the authors at or above the
/// threshold, sorted by username for deterministic processing order.
pub fn qualifying_authors(posts: &[Post], threshold: usize) -> Vec<AuthorWindow> {
    let mut by_author: HashMap<&str, Vec<&Post>> = HashMap::new();
    for post in posts {
        by_author.entry(&post.username).or_default().push(post);
    }

    let mut qualifying = Vec::new();
    for (username, author_posts) in by_author {
        if author_posts.len() < threshold {
            continue;
        }
        let Some(first_post) = author_posts.iter().map(|p| p.timestamp).min() else {
            continue;
        };
        let Some(last_post) = author_posts.iter().map(|p| p.timestamp).max() else {
            continue;
        };
        qualifying.push(AuthorWindow {
            username: username.to_string(),
            post_count: author_posts.len() as i64,
            post_ids: author_posts.iter().map(|p| p.id).collect(),
            first_post,
            last_post,
        });
    }

    qualifying.sort_by(|a, b| a.username.cmp(&b.username));
    qualifying
}

/// Run one detection cycle for a campaign at the given instant.
/// Returns how many authors were newly or further flagged.
pub async fn detect(
    db: &Arc<dyn Database>,
    campaign_id: i64,
    now: DateTime<Utc>,
) -> Result<usize> {
    let cutoff = now - Duration::seconds(WINDOW_SECS);
    let posts = db.unprocessed_posts_in_window(campaign_id, cutoff).await?;

    let flagged = qualifying_authors(&posts, MIN_POSTS_PER_WINDOW);
    for author in &flagged {
        db.upsert_flagged_account(
            &author.username,
            campaign_id,
            author.first_post,
            author.last_post,
            author.post_count,
            &author.post_ids,
        )
        .await?;
    }

    // The consumed barrier: everything the window query matched is done,
    // qualifying or not.
    let consumed = db.mark_window_processed(campaign_id, cutoff).await?;

    info!(
        campaign_id,
        flagged = flagged.len(),
        consumed,
        "Flagged-account detection completed"
    );
    Ok(flagged.len())
}
