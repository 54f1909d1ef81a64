use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

mod config;

use brushfire::db::models::{normalize_groups, AccountStatus};
use brushfire::db::{Database, SqliteDatabase};
use brushfire::monitor::Monitor;
use brushfire::pool::{AccountPool, RunContext};
use brushfire::twitter::auth::{Authenticator, BrowserAuthenticator, PasswordAuthenticator};
use brushfire::twitter::client::HttpSearchBackend;

/// Brushfire: coordinated hashtag campaign monitoring for X/Twitter.
///
/// Polls configured hashtag-group campaigns through a pool of scraping
/// accounts and flags behavioral anomalies: accounts posting unusually
/// often, and sudden day-over-day volume surges.
#[derive(Parser)]
#[command(name = "brushfire", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Enroll a scraping account (upserts by username)
    AddAccount {
        /// Platform username
        username: String,

        /// Platform password
        #[arg(long)]
        password: String,

        /// Recovery email shown during login challenges
        #[arg(long, default_value = "")]
        email: String,

        /// Password for the recovery email account
        #[arg(long)]
        email_password: Option<String>,

        /// Proxy URL to route this account's sessions through
        #[arg(long)]
        proxy: Option<String>,
    },

    /// Mark an account inactive so the pool stops using it
    DisableAccount {
        username: String,
    },

    /// Flip every inactive account back to active
    ReactivateAccounts,

    /// Create a monitoring campaign
    AddCampaign {
        /// Campaign name (unique)
        name: String,

        /// A hashtag group as comma-separated tags, 2-3 per group.
        /// Repeat the flag for multiple groups.
        #[arg(long = "group", required = true)]
        groups: Vec<String>,

        /// Account usernames to track alongside the hashtags
        #[arg(long = "track")]
        tracked: Vec<String>,
    },

    /// Activate or deactivate a campaign
    SetCampaign {
        name: String,

        #[arg(long)]
        active: bool,
    },

    /// Run the polling monitor in the foreground until killed
    Monitor {
        /// Override the poll interval in seconds
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Show system status (accounts, campaigns, store counts, last cycle)
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("brushfire=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            info!("Initializing Brushfire database...");
            let config = config::Config::load()?;
            let db = init_database(&config)?;
            let table_count = db.table_count().await?;
            println!("Database initialized at: {}", config.db_path);
            println!("Tables created: {table_count}");
            println!("\nBrushfire is ready. Next steps:");
            println!("  brushfire add-account <username> --password <pw>");
            println!("  brushfire add-campaign <name> --group tag1,tag2");
            println!("  brushfire monitor");
        }

        Commands::AddAccount {
            username,
            password,
            email,
            email_password,
            proxy,
        } => {
            let config = config::Config::load()?;
            let db = open_database(&config)?;
            db.upsert_account(
                &username,
                &password,
                &email,
                email_password.as_deref(),
                proxy.as_deref(),
            )
            .await?;
            println!("{}", format!("Enrolled account @{username}").bold());
            println!("The monitor picks up new accounts on its next cycle.");
        }

        Commands::DisableAccount { username } => {
            let config = config::Config::load()?;
            let db = open_database(&config)?;
            if db.get_account(&username).await?.is_none() {
                anyhow::bail!("No enrolled account named @{username}");
            }
            db.set_account_status(&username, AccountStatus::Inactive)
                .await?;
            println!("Disabled @{username}");
        }

        Commands::ReactivateAccounts => {
            let config = config::Config::load()?;
            let db = open_database(&config)?;
            let count = db.reactivate_all_accounts().await?;
            println!("Reactivated {count} account(s)");
        }

        Commands::AddCampaign {
            name,
            groups,
            tracked,
        } => {
            let config = config::Config::load()?;
            let db = open_database(&config)?;

            // Each --group flag carries one comma-separated tag list
            let parsed: Vec<Vec<String>> = groups
                .iter()
                .map(|g| g.split(',').map(|t| t.to_string()).collect())
                .collect();
            let hashtag_groups = normalize_groups(&parsed)?;
            let tracked: Vec<String> = tracked
                .iter()
                .map(|t| t.trim().trim_start_matches('@').to_lowercase())
                .filter(|t| !t.is_empty())
                .collect();

            let id = db
                .insert_campaign(&name, &hashtag_groups, &tracked)
                .await?;
            println!("{}", format!("Created campaign '{name}' (id {id})").bold());
            for group in &hashtag_groups {
                println!("  group: #{}", group.join(" #"));
            }
        }

        Commands::SetCampaign { name, active } => {
            let config = config::Config::load()?;
            let db = open_database(&config)?;
            if !db.set_campaign_active(&name, active).await? {
                anyhow::bail!("No campaign named '{name}'");
            }
            let state = if active { "active" } else { "inactive" };
            println!("Campaign '{name}' is now {state}");
        }

        Commands::Monitor { interval } => {
            let config = config::Config::load()?;
            let db = open_database(&config)?;

            let authenticator = create_authenticator(&config)?;
            let backend = Arc::new(HttpSearchBackend::new(&config.api_url)?);
            let pool = AccountPool::new(Arc::clone(&db), authenticator, backend);

            let poll_interval = Duration::from_secs(interval.unwrap_or(config.poll_interval_secs));
            let cooldown = Duration::from_secs(config.cooldown_secs);

            let monitor = Monitor::new(Arc::clone(&db), pool, poll_interval, cooldown);
            let mut ctx = RunContext::new();

            println!(
                "Monitoring every {}s — stop with Ctrl-C",
                poll_interval.as_secs()
            );
            monitor.run(&mut ctx).await?;
        }

        Commands::Status => {
            let config = config::Config::load()?;
            let db = open_database(&config)?;
            brushfire::status::show(&db, &config.db_path).await?;
        }
    }

    Ok(())
}

/// Initialize the database (create if needed).
fn init_database(config: &config::Config) -> Result<Arc<dyn Database>> {
    let conn = brushfire::db::initialize(&config.db_path)?;
    Ok(Arc::new(SqliteDatabase::new(conn)))
}

/// Open the existing database.
fn open_database(config: &config::Config) -> Result<Arc<dyn Database>> {
    let conn = brushfire::db::open(&config.db_path)?;
    Ok(Arc::new(SqliteDatabase::new(conn)))
}

/// Create the login strategy based on the configured backend.
fn create_authenticator(config: &config::Config) -> Result<Arc<dyn Authenticator>> {
    match config.auth_backend {
        config::AuthBackend::Browser => {
            config.require_browserless()?;
            info!("Using headless-browser login flow");
            let auth = BrowserAuthenticator::new(
                &config.browserless_url,
                config.browserless_token.as_deref(),
            )?;
            Ok(Arc::new(auth))
        }
        config::AuthBackend::Password => {
            info!("Using direct credential login");
            let auth = PasswordAuthenticator::new(&config.api_url)?;
            Ok(Arc::new(auth))
        }
    }
}
