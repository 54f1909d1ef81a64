use std::env;

use anyhow::Result;

/// Which login strategy the account pool uses to obtain sessions.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthBackend {
    /// Scripted headless-browser login via a browserless-style service (default).
    /// Survives the login challenges the plain credential flow gets stopped by.
    Browser,
    /// Direct credential login against the platform session endpoint — the
    /// older strategy, kept for accounts that don't trip challenges.
    Password,
}

/// Central configuration loaded from environment variables.
///
/// All secrets come from env vars (never hardcoded). The .env file
/// is loaded automatically at startup via dotenvy.
pub struct Config {
    pub db_path: String,
    /// Which login strategy to use (default: Browser)
    pub auth_backend: AuthBackend,
    /// Base URL of the headless-browser automation service
    pub browserless_url: String,
    /// API token for the browser automation service, if it requires one
    pub browserless_token: Option<String>,
    /// Base URL for platform search and session endpoints
    pub api_url: String,
    /// Seconds between polling cycles
    pub poll_interval_secs: u64,
    /// Seconds to sleep after an unclassified top-level error
    pub cooldown_secs: u64,
}

/// Default platform API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.x.com";

/// Default browser-automation service endpoint (a local browserless container).
pub const DEFAULT_BROWSERLESS_URL: &str = "http://localhost:3000";

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Everything has a default except the browserless token, which stays
    /// optional — self-hosted automation services usually run tokenless.
    pub fn load() -> Result<Self> {
        let auth_backend = match env::var("BRUSHFIRE_AUTH").as_deref() {
            Ok("password") => AuthBackend::Password,
            // "browser" or unset both default to the browser flow
            _ => AuthBackend::Browser,
        };

        let poll_interval_secs = env::var("BRUSHFIRE_POLL_INTERVAL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(120);

        let cooldown_secs = env::var("BRUSHFIRE_COOLDOWN")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        Ok(Self {
            db_path: env::var("BRUSHFIRE_DB_PATH").unwrap_or_else(|_| "./brushfire.db".to_string()),
            auth_backend,
            browserless_url: env::var("BROWSERLESS_URL")
                .unwrap_or_else(|_| DEFAULT_BROWSERLESS_URL.to_string()),
            browserless_token: env::var("BROWSERLESS_TOKEN").ok(),
            api_url: env::var("BRUSHFIRE_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            poll_interval_secs,
            cooldown_secs,
        })
    }

    /// Check that the browser-automation service is configured.
    /// Call this before starting the monitor with the Browser auth backend.
    pub fn require_browserless(&self) -> Result<()> {
        if self.browserless_url.is_empty() {
            anyhow::bail!(
                "BROWSERLESS_URL not set. Add it to your .env file, or set\n\
                 BRUSHFIRE_AUTH=password to use the direct credential login."
            );
        }
        Ok(())
    }
}
