// Ingestion engine — runs hashtag-group searches through the pool and
// persists matching posts.
//
// Error containment is per hashtag group: capacity exhaustion rotates the
// pool and retries the same group until the pool runs dry; anything else
// skips the group for this cycle. Storage swallows duplicate URLs so
// re-ingesting an overlapping window is idempotent.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use crate::db::models::{normalize_tag, NewPost};
use crate::db::Database;
use crate::pool::{AccountPool, PoolClient, RunContext};
use crate::twitter::client::{SearchError, TweetRecord};

/// Tuning knobs for one ingestion sweep. Defaults match production pacing;
/// tests zero the delays.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Records requested per hashtag group.
    pub page_size: u32,
    /// Pause before retrying a group on a fresh pool.
    pub rotate_delay: Duration,
    /// Pause after a transient search failure before moving on.
    pub skip_delay: Duration,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            page_size: 100,
            rotate_delay: Duration::from_secs(5),
            skip_delay: Duration::from_secs(10),
        }
    }
}

/// Build the search query for one hashtag group: every tag AND'ed,
/// restricted to English.
pub fn build_query(group: &[String]) -> String {
    let tags: Vec<String> = group.iter().map(|t| format!("#{t}")).collect();
    format!("{} lang:en", tags.join(" "))
}

/// Search every hashtag group of a campaign, rotating the pool on capacity
/// exhaustion. Returns all matching records across groups; a group that
/// can't be served this cycle contributes nothing.
pub async fn search_hashtag_groups(
    pool: &AccountPool,
    ctx: &mut RunContext,
    client: &mut PoolClient,
    groups: &[Vec<String>],
    options: &IngestOptions,
) -> Result<Vec<TweetRecord>> {
    let mut all_tweets = Vec::new();

    for group in groups {
        let query = build_query(group);

        loop {
            if client.is_empty() {
                warn!(query = query, "No usable sessions — abandoning group this cycle");
                break;
            }

            match client.search(&query, options.page_size).await {
                Ok(tweets) => {
                    info!(query = query, count = tweets.len(), "Search completed");
                    all_tweets.extend(tweets);
                    break;
                }
                Err(SearchError::CapacityExhausted { username }) => {
                    warn!(
                        username = username,
                        query = query,
                        "Session capacity exhausted — rotating pool"
                    );
                    ctx.used.insert(username.clone());
                    ctx.failed.insert(username);
                    tokio::time::sleep(options.rotate_delay).await;
                    *client = pool.acquire(ctx, &HashSet::new()).await?;
                    // Retry the same group on the rotated pool
                }
                Err(e) => {
                    warn!(query = query, error = %e, "Search failed — skipping group this cycle");
                    tokio::time::sleep(options.skip_delay).await;
                    break;
                }
            }
        }
    }

    Ok(all_tweets)
}

/// Normalize a wire record into a storable post for the given campaign.
pub fn normalize_record(campaign_id: i64, tweet: &TweetRecord) -> NewPost {
    NewPost {
        url: tweet.url.clone(),
        campaign_id,
        username: tweet.username.clone(),
        hashtags: tweet.hashtags.iter().map(|t| normalize_tag(t)).collect(),
        caption: tweet.text.clone(),
        timestamp: tweet.created_at,
        likes: tweet.like_count,
        comments: tweet.reply_count,
        reshares: tweet.retweet_count,
    }
}

/// Store a batch of records for a campaign. Duplicate URLs are swallowed;
/// other storage errors are logged without aborting the batch. Returns the
/// number of newly inserted posts.
pub async fn store_posts(
    db: &Arc<dyn Database>,
    campaign_id: i64,
    tweets: &[TweetRecord],
) -> Result<usize> {
    let mut inserted = 0;
    for tweet in tweets {
        let post = normalize_record(campaign_id, tweet);
        match db.insert_post(&post).await {
            Ok(true) => inserted += 1,
            Ok(false) => {
                // Already ingested in an earlier cycle — idempotent re-ingestion
            }
            Err(e) => {
                warn!(url = post.url, error = %e, "Failed to store post");
            }
        }
    }
    info!(campaign_id, inserted, total = tweets.len(), "Stored posts");
    Ok(inserted)
}
