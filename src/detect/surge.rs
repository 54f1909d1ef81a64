// Surge detector — day-over-day volume spikes per hashtag group.
//
// The rule is deliberately strict: the newest day must clear the volume
// floor while the immediately preceding day had no posts at all for the
// group. The daily series is materialized densely over the scan window so
// a zero day is representable; a group with steady moderate volume that
// merely doubles never fires.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::info;

use crate::db::models::{Campaign, HashtagActivity, Post};
use crate::db::Database;

/// Trailing scan window in calendar days.
const SCAN_DAYS: i64 = 7;

/// Minimum posts on the newest day to qualify as a surge.
const SURGE_MIN_POSTS: i64 = 20;

/// One UTC calendar day's activity for a hashtag group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayActivity {
    pub date: NaiveDate,
    pub post_count: i64,
    pub unique_accounts: i64,
}

/// Build the dense daily series for one hashtag group: one entry per day in
/// the trailing window ending at `today`, oldest first, counting only posts
/// whose hashtag list contains every tag of the group. Days without posts
/// carry a zero count.
pub fn daily_series(
    posts: &[Post],
    group: &[String],
    today: NaiveDate,
    days: i64,
) -> Vec<DayActivity> {
    let mut per_day: HashMap<NaiveDate, (i64, HashSet<&str>)> = HashMap::new();
    for post in posts {
        if !group
            .iter()
            .all(|tag| post.hashtags.iter().any(|h| h == tag))
        {
            continue;
        }
        let day = post.timestamp.date_naive();
        let entry = per_day.entry(day).or_default();
        entry.0 += 1;
        entry.1.insert(post.username.as_str());
    }

    (0..days)
        .rev()
        .map(|offset| {
            let date = today - Duration::days(offset);
            match per_day.get(&date) {
                Some((count, accounts)) => DayActivity {
                    date,
                    post_count: *count,
                    unique_accounts: accounts.len() as i64,
                },
                None => DayActivity {
                    date,
                    post_count: 0,
                    unique_accounts: 0,
                },
            }
        })
        .collect()
}

/// Apply the surge rule to a daily series: the newest day qualifies when it
/// has at least SURGE_MIN_POSTS posts and the day before it had exactly
/// zero. Series shorter than two days are never evaluated.
pub fn surge_day(series: &[DayActivity]) -> Option<&DayActivity> {
    if series.len() < 2 {
        return None;
    }
    let current = series.last()?;
    let previous = &series[series.len() - 2];
    if previous.post_count == 0 && current.post_count >= SURGE_MIN_POSTS {
        Some(current)
    } else {
        None
    }
}

/// Run surge detection for every hashtag group of a campaign at the given
/// instant. Returns the number of surge alerts raised.
pub async fn detect(
    db: &Arc<dyn Database>,
    campaign: &Campaign,
    now: DateTime<Utc>,
) -> Result<usize> {
    let since = now - Duration::days(SCAN_DAYS);
    let posts = db.posts_for_campaign_since(campaign.id, since).await?;
    let today = now.date_naive();

    let mut alerts = 0;
    for group in &campaign.hashtag_groups {
        let series = daily_series(&posts, group, today, SCAN_DAYS);
        if let Some(day) = surge_day(&series) {
            db.upsert_hashtag_activity(&HashtagActivity {
                campaign_id: campaign.id,
                hashtag_group: group.clone(),
                date: day.date.format("%Y-%m-%d").to_string(),
                post_count: day.post_count,
                unique_accounts: day.unique_accounts,
                is_surge: true,
            })
            .await?;
            info!(
                campaign = campaign.name,
                group = ?group,
                date = %day.date,
                posts = day.post_count,
                "Surge detected"
            );
            alerts += 1;
        }
    }
    Ok(alerts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn post_on(day: NaiveDate, username: &str, hashtags: &[&str], n: u32) -> Post {
        let ts = Utc
            .from_utc_datetime(&day.and_hms_opt(12, 0, n).unwrap());
        Post {
            id: n as i64,
            url: format!("https://x.com/{username}/status/{day}{n}"),
            campaign_id: 1,
            username: username.to_string(),
            hashtags: hashtags.iter().map(|t| t.to_string()).collect(),
            caption: String::new(),
            timestamp: ts,
            likes: 0,
            comments: 0,
            reshares: 0,
            processed: false,
        }
    }

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_series_is_dense_and_ordered() {
        let today = day("2026-08-07");
        let posts = vec![post_on(day("2026-08-05"), "a", &["x", "y"], 1)];

        let series = daily_series(&posts, &["x".to_string(), "y".to_string()], today, 7);
        assert_eq!(series.len(), 7);
        assert_eq!(series[0].date, day("2026-08-01"));
        assert_eq!(series[6].date, today);
        // Only the one day with a post is non-zero
        assert_eq!(series[4].post_count, 1);
        assert_eq!(series[4].unique_accounts, 1);
        assert_eq!(series[6].post_count, 0);
    }

    #[test]
    fn test_series_requires_all_group_tags() {
        let today = day("2026-08-07");
        let posts = vec![
            post_on(today, "a", &["x", "y"], 1),
            post_on(today, "b", &["x"], 2), // missing y — not counted
            post_on(today, "c", &["y", "x", "z"], 3), // superset — counted
        ];

        let series = daily_series(&posts, &["x".to_string(), "y".to_string()], today, 7);
        assert_eq!(series[6].post_count, 2);
        assert_eq!(series[6].unique_accounts, 2);
    }

    #[test]
    fn test_surge_fires_on_zero_then_spike() {
        let today = day("2026-08-07");
        let group = vec!["x".to_string(), "y".to_string()];
        let posts: Vec<Post> = (0..25)
            .map(|n| post_on(today, &format!("acct{}", n % 9), &["x", "y"], n))
            .collect();

        let series = daily_series(&posts, &group, today, 7);
        let surge = surge_day(&series).unwrap();
        assert_eq!(surge.date, today);
        assert_eq!(surge.post_count, 25);
        assert_eq!(surge.unique_accounts, 9);
    }

    #[test]
    fn test_no_surge_when_previous_day_nonzero() {
        let today = day("2026-08-07");
        let yesterday = day("2026-08-06");
        let group = vec!["x".to_string(), "y".to_string()];

        let mut posts: Vec<Post> = (0..25)
            .map(|n| post_on(today, "acct", &["x", "y"], n))
            .collect();
        for n in 25..28 {
            posts.push(post_on(yesterday, "acct", &["x", "y"], n));
        }

        let series = daily_series(&posts, &group, today, 7);
        assert!(surge_day(&series).is_none());
    }

    #[test]
    fn test_no_surge_below_volume_floor() {
        let today = day("2026-08-07");
        let group = vec!["x".to_string(), "y".to_string()];
        let posts: Vec<Post> = (0..19)
            .map(|n| post_on(today, "acct", &["x", "y"], n))
            .collect();

        let series = daily_series(&posts, &group, today, 7);
        assert!(surge_day(&series).is_none());
    }

    #[test]
    fn test_short_series_is_not_evaluated() {
        let today = day("2026-08-07");
        let series = daily_series(&[], &["x".to_string()], today, 1);
        assert_eq!(series.len(), 1);
        assert!(surge_day(&series).is_none());
    }
}
