use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://codeforces.com/api";

/// Tunables shared by the remote client and the orchestrator.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub base_url: String,
    pub cache_ttl: Duration,
    pub pacing_delay: Duration,
    pub inactivity_days: i64,
    pub request_timeout: Duration,
    /// First submission index requested per student (the service counts from 1).
    pub submissions_from: u32,
    pub submissions_count: u32,
    pub history_limit: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            cache_ttl: Duration::from_secs(5 * 60),
            pacing_delay: Duration::from_millis(500),
            inactivity_days: 30,
            request_timeout: Duration::from_secs(30),
            submissions_from: 1,
            submissions_count: 1000,
            history_limit: 20,
        }
    }
}
