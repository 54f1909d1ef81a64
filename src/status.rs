// System status display — account fleet, campaigns, store counts, last cycle.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use crate::db::Database;

/// Display system status to the terminal.
pub async fn show(db: &Arc<dyn Database>, db_display_path: &str) -> Result<()> {
    if !Path::new(db_display_path).exists() {
        println!("Database: not initialized");
        println!("\nRun `brushfire init` to set up the database.");
        return Ok(());
    }

    // Database file size
    let file_size = std::fs::metadata(db_display_path)
        .map(|m| format_bytes(m.len()))
        .unwrap_or_else(|_| "unknown".to_string());
    println!("Database: {} ({})", db_display_path, file_size);

    // Account fleet
    let (active, inactive) = db.account_counts().await?;
    if active + inactive == 0 {
        println!("Accounts: none enrolled");
        println!("  Run `brushfire add-account` to enroll scraping accounts");
    } else {
        println!("Accounts: {} active, {} inactive", active, inactive);
    }

    // Campaigns
    let (active_campaigns, total_campaigns) = db.campaign_counts().await?;
    if total_campaigns == 0 {
        println!("Campaigns: none configured");
        println!("  Run `brushfire add-campaign` to create one");
    } else {
        println!(
            "Campaigns: {} active of {} total",
            active_campaigns, total_campaigns
        );
    }

    // Store counts
    println!("Posts ingested: {}", db.count_posts().await?);
    println!("Flagged accounts: {}", db.count_flagged_accounts().await?);
    println!("Surge alerts: {}", db.count_surges().await?);

    // Last completed cycle
    match db.get_run_state("last_cycle_at").await? {
        Some(last_cycle) => {
            println!("Last cycle: {}", last_cycle);
            if let Some(posts) = db.get_run_state("last_cycle_posts").await? {
                println!("  New posts that cycle: {}", posts);
            }
        }
        None => {
            println!("Last cycle: never");
            println!("  Run `brushfire monitor` to start polling");
        }
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
