//! 泄露密码检查 (k-anonymity range lookup)
//!
//! Only the first five hex characters of the SHA-1 digest leave the process.
//! Any transport failure or timeout counts as "not breached".

use crate::error::AppError;
use sha1::{Digest, Sha1};
use std::time::Duration;

/// Hard upper bound on one lookup
pub const MAX_BREACH_TIMEOUT: Duration = Duration::from_secs(5);
const PREFIX_LEN: usize = 5;

/// Lookup digest of a candidate password; never a storage hash
#[derive(Clone, PartialEq, Eq)]
pub struct BreachDigest(String);

impl BreachDigest {
    pub fn of(password: &str) -> Self {
        Self(hex::encode_upper(Sha1::digest(password.as_bytes())))
    }

    /// Sent to the range endpoint
    pub fn prefix(&self) -> &str {
        &self.0[..PREFIX_LEN]
    }

    /// Kept local and matched against the response
    pub fn suffix(&self) -> &str {
        &self.0[PREFIX_LEN..]
    }
}

impl std::fmt::Debug for BreachDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BreachDigest({}..)", self.prefix())
    }
}

/// Whether `suffix` appears with a non-zero count in a `SUFFIX:COUNT` body
pub fn range_contains(body: &str, suffix: &str) -> bool {
    body.lines().any(|line| {
        let mut parts = line.trim().splitn(2, ':');
        let candidate = parts.next().unwrap_or_default();
        let count = parts
            .next()
            .and_then(|c| c.trim().parse::<u64>().ok())
            .unwrap_or(0);
        count > 0 && candidate.eq_ignore_ascii_case(suffix)
    })
}

pub struct BreachChecker {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl BreachChecker {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        let timeout = timeout.min(MAX_BREACH_TIMEOUT);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("trust-core/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build breach lookup client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    /// Fail-open: errors and timeouts return false
    pub async fn is_breached(&self, password: &str) -> bool {
        let digest = BreachDigest::of(password);

        match tokio::time::timeout(self.timeout, self.lookup(&digest)).await {
            Ok(Ok(found)) => found,
            Ok(Err(e)) => {
                metrics::counter!("trust_core_breach_lookup_failures_total", "reason" => "error")
                    .increment(1);
                tracing::warn!(prefix = %digest.prefix(), error = %e, "Breach lookup failed; treating as not breached");
                false
            }
            Err(_) => {
                metrics::counter!("trust_core_breach_lookup_failures_total", "reason" => "timeout")
                    .increment(1);
                tracing::warn!(
                    prefix = %digest.prefix(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Breach lookup timed out; treating as not breached"
                );
                false
            }
        }
    }

    async fn lookup(&self, digest: &BreachDigest) -> Result<bool, reqwest::Error> {
        let url = format!("{}/{}", self.base_url, digest.prefix());

        let body = self
            .client
            .get(url)
            .header("Add-Padding", "true")
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        Ok(range_contains(&body, digest.suffix()))
    }
}
