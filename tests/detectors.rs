// Detector tests — flagging threshold, the processed barrier, and the
// surge rule, all against an in-memory database.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use rusqlite::Connection;

use brushfire::db::models::NewPost;
use brushfire::db::schema::create_tables;
use brushfire::db::{Database, SqliteDatabase};
use brushfire::detect::{flagged, surge};

async fn test_db() -> Arc<dyn Database> {
    let conn = Connection::open_in_memory().unwrap();
    create_tables(&conn).unwrap();
    Arc::new(SqliteDatabase::new(conn))
}

fn post(
    url: &str,
    campaign_id: i64,
    username: &str,
    hashtags: &[&str],
    timestamp: chrono::DateTime<Utc>,
) -> NewPost {
    NewPost {
        url: url.to_string(),
        campaign_id,
        username: username.to_string(),
        hashtags: hashtags.iter().map(|t| t.to_string()).collect(),
        caption: String::new(),
        timestamp,
        likes: 0,
        comments: 0,
        reshares: 0,
    }
}

#[tokio::test]
async fn flagging_threshold_requires_two_posts() {
    let db = test_db().await;
    let now = Utc::now();

    // 1 post from A, 2 posts from B inside the trailing hour
    db.insert_post(&post("a1", 1, "alice", &[], now - Duration::minutes(10)))
        .await
        .unwrap();
    db.insert_post(&post("b1", 1, "bob", &[], now - Duration::minutes(20)))
        .await
        .unwrap();
    db.insert_post(&post("b2", 1, "bob", &[], now - Duration::minutes(5)))
        .await
        .unwrap();

    let count = flagged::detect(&db, 1, now).await.unwrap();
    assert_eq!(count, 1);

    assert!(db.get_flagged_account("alice", 1).await.unwrap().is_none());
    let bob = db.get_flagged_account("bob", 1).await.unwrap().unwrap();
    assert_eq!(bob.post_count, 2);
    assert_eq!(bob.posts.len(), 2);
}

#[tokio::test]
async fn flagging_is_idempotent_across_runs() {
    let db = test_db().await;
    let now = Utc::now();

    db.insert_post(&post("b1", 1, "bob", &[], now - Duration::minutes(20)))
        .await
        .unwrap();
    db.insert_post(&post("b2", 1, "bob", &[], now - Duration::minutes(5)))
        .await
        .unwrap();

    assert_eq!(flagged::detect(&db, 1, now).await.unwrap(), 1);
    let first = db.get_flagged_account("bob", 1).await.unwrap().unwrap();

    // The second run sees zero unprocessed posts — nothing double-counts
    assert_eq!(flagged::detect(&db, 1, now).await.unwrap(), 0);
    let second = db.get_flagged_account("bob", 1).await.unwrap().unwrap();
    assert_eq!(second.post_count, first.post_count);
    assert_eq!(second.posts, first.posts);
    assert_eq!(second.last_detected, first.last_detected);
}

#[tokio::test]
async fn repeat_detection_accumulates_without_double_counting() {
    let db = test_db().await;
    let earlier = Utc::now() - Duration::minutes(40);

    db.insert_post(&post("b1", 1, "bob", &[], earlier - Duration::minutes(5)))
        .await
        .unwrap();
    db.insert_post(&post("b2", 1, "bob", &[], earlier))
        .await
        .unwrap();
    assert_eq!(flagged::detect(&db, 1, earlier).await.unwrap(), 1);
    let first = db.get_flagged_account("bob", 1).await.unwrap().unwrap();

    // A later cycle sees two fresh posts from the same author
    let now = Utc::now();
    db.insert_post(&post("b3", 1, "bob", &[], now - Duration::minutes(6)))
        .await
        .unwrap();
    db.insert_post(&post("b4", 1, "bob", &[], now - Duration::minutes(2)))
        .await
        .unwrap();
    assert_eq!(flagged::detect(&db, 1, now).await.unwrap(), 1);

    let second = db.get_flagged_account("bob", 1).await.unwrap().unwrap();
    assert_eq!(second.post_count, 4);
    assert_eq!(second.posts.len(), 4);
    // First sight timestamp is sticky; last sight moved forward
    assert_eq!(second.first_detected, first.first_detected);
    assert!(second.last_detected > first.last_detected);
}

#[tokio::test]
async fn stale_posts_are_outside_the_window() {
    let db = test_db().await;
    let now = Utc::now();

    // Two posts from the same author, but both older than an hour
    db.insert_post(&post("b1", 1, "bob", &[], now - Duration::hours(2)))
        .await
        .unwrap();
    db.insert_post(&post("b2", 1, "bob", &[], now - Duration::hours(3)))
        .await
        .unwrap();

    assert_eq!(flagged::detect(&db, 1, now).await.unwrap(), 0);
    assert!(db.get_flagged_account("bob", 1).await.unwrap().is_none());
}

/// Fixed midday instant so day-bucketing never straddles a UTC midnight.
fn midday() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, 7, 12, 0, 0).unwrap()
}

async fn surge_campaign(db: &Arc<dyn Database>) -> brushfire::db::models::Campaign {
    let groups = vec![vec!["x".to_string(), "y".to_string()]];
    db.insert_campaign("surge-watch", &groups, &[]).await.unwrap();
    db.get_campaign_by_name("surge-watch").await.unwrap().unwrap()
}

#[tokio::test]
async fn surge_fires_after_a_zero_day() {
    let db = test_db().await;
    let campaign = surge_campaign(&db).await;
    let now = midday();

    // 25 posts today, nothing yesterday
    for n in 0..25 {
        db.insert_post(&post(
            &format!("s{n}"),
            campaign.id,
            &format!("acct{}", n % 9),
            &["x", "y"],
            now - Duration::minutes(n),
        ))
        .await
        .unwrap();
    }

    let alerts = surge::detect(&db, &campaign, now).await.unwrap();
    assert_eq!(alerts, 1);

    let date = now.date_naive().format("%Y-%m-%d").to_string();
    let activity = db
        .get_hashtag_activity(campaign.id, &campaign.hashtag_groups[0], &date)
        .await
        .unwrap()
        .unwrap();
    assert!(activity.is_surge);
    assert_eq!(activity.post_count, 25);
    assert_eq!(activity.unique_accounts, 9);
}

#[tokio::test]
async fn no_surge_when_previous_day_had_posts() {
    let db = test_db().await;
    let campaign = surge_campaign(&db).await;
    let now = midday();

    for n in 0..25 {
        db.insert_post(&post(
            &format!("s{n}"),
            campaign.id,
            "acct",
            &["x", "y"],
            now - Duration::minutes(n),
        ))
        .await
        .unwrap();
    }
    // 3 posts the day before spoil the zero-day requirement
    for n in 0..3 {
        db.insert_post(&post(
            &format!("y{n}"),
            campaign.id,
            "acct",
            &["x", "y"],
            now - Duration::days(1) - Duration::minutes(n),
        ))
        .await
        .unwrap();
    }

    let alerts = surge::detect(&db, &campaign, now).await.unwrap();
    assert_eq!(alerts, 0);

    let date = now.date_naive().format("%Y-%m-%d").to_string();
    assert!(db
        .get_hashtag_activity(campaign.id, &campaign.hashtag_groups[0], &date)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn surge_ignores_posts_missing_a_group_tag() {
    let db = test_db().await;
    let campaign = surge_campaign(&db).await;
    let now = midday();

    // 25 posts today, but only tagged with half the group
    for n in 0..25 {
        db.insert_post(&post(
            &format!("s{n}"),
            campaign.id,
            "acct",
            &["x"],
            now - Duration::minutes(n),
        ))
        .await
        .unwrap();
    }

    assert_eq!(surge::detect(&db, &campaign, now).await.unwrap(), 0);
}
