//! Preflight reachability probe for the remote console

use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::error::{E2eError, E2eResult};

/// How to probe the base URL before launching browsers
#[derive(Debug, Clone)]
pub struct PreflightConfig {
    /// Overall deadline
    pub timeout: Duration,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Delay between attempts
    pub interval: Duration,
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(5),
            interval: Duration::from_millis(500),
        }
    }
}

/// Wait until `base_url` answers at all.
///
/// Any HTTP status counts: the console redirects and rejects unauthenticated
/// requests, and that still proves it is up. Returns the number of attempts.
pub async fn wait_until_reachable(base_url: &str, config: &PreflightConfig) -> E2eResult<usize> {
    let client = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .redirect(reqwest::redirect::Policy::none())
        .build()?;

    let start = Instant::now();
    let mut attempts = 0;

    while start.elapsed() < config.timeout {
        attempts += 1;

        match client.get(base_url).send().await {
            Ok(resp) => {
                info!("{} reachable (HTTP {})", base_url, resp.status());
                return Ok(attempts);
            }
            Err(e) => {
                if attempts == 1 {
                    info!("Waiting for {} to become reachable...", base_url);
                }
                if !e.is_connect() && !e.is_timeout() {
                    warn!("Preflight error: {}", e);
                }
            }
        }

        sleep(config.interval).await;
    }

    Err(E2eError::Unreachable(attempts))
}
