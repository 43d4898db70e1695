//! Per-domain politeness gate.
//!
//! Each rule pairs a domain glob with a parallelism cap and a delay. A
//! worker calls [`RateLimiter::admit`] before its fetch; the returned
//! permit is held for the duration of the request so that at any instant
//! at most `parallelism` requests run against hosts matching the rule.

use anyhow::{Result, anyhow};
use log::debug;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// One politeness rule. Globs use `*` as the only wildcard
/// (`*.example.com`, `*shop*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateRule {
    pub domain_glob: String,
    /// Maximum concurrent requests to hosts matching this rule.
    pub parallelism: usize,
    /// Fixed wait applied before every admitted request.
    #[serde(default)]
    pub delay: Duration,
    /// Upper bound of an additional uniformly random wait.
    #[serde(default)]
    pub random_delay: Duration,
}

impl RateRule {
    #[must_use]
    pub fn new(domain_glob: impl Into<String>, parallelism: usize) -> Self {
        Self {
            domain_glob: domain_glob.into(),
            parallelism: parallelism.max(1),
            delay: Duration::ZERO,
            random_delay: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn with_random_delay(mut self, random_delay: Duration) -> Self {
        self.random_delay = random_delay;
        self
    }

    /// Literal (non-wildcard) character count; more literals means a more
    /// specific glob.
    fn specificity(&self) -> usize {
        self.domain_glob.chars().filter(|c| *c != '*').count()
    }
}

/// Convert a domain glob into an anchored regex.
///
/// Compiled once at limiter construction so matching never pays regex
/// compilation in the hot path.
fn compile_glob_pattern(pattern: &str) -> Result<Regex> {
    let escaped = regex::escape(pattern).replace("\\*", ".*");
    let anchored = format!("^{escaped}$");
    Regex::new(&anchored).map_err(|e| anyhow!("Invalid domain glob '{pattern}': {e}"))
}

struct CompiledRule {
    glob: String,
    pattern: Regex,
    semaphore: Arc<Semaphore>,
    delay: Duration,
    random_delay: Duration,
}

/// RAII admission token. Dropping it releases the per-rule slot.
pub struct RatePermit {
    _permit: Option<OwnedSemaphorePermit>,
}

impl RatePermit {
    /// Permit for a host no rule matched: no gating.
    fn unlimited() -> Self {
        Self { _permit: None }
    }
}

/// Shared politeness limiter. One instance serves every worker of a crawl;
/// rules are matched most-specific-first and the first match applies.
pub struct RateLimiter {
    rules: Vec<CompiledRule>,
}

impl RateLimiter {
    /// Compile and order the rule set. Rules with more literal characters
    /// in their glob win over broader ones; ties keep definition order.
    pub fn new(mut rules: Vec<RateRule>) -> Result<Self> {
        rules.sort_by(|a, b| b.specificity().cmp(&a.specificity()));
        let compiled = rules
            .into_iter()
            .map(|rule| {
                Ok(CompiledRule {
                    pattern: compile_glob_pattern(&rule.domain_glob)?,
                    semaphore: Arc::new(Semaphore::new(rule.parallelism)),
                    delay: rule.delay,
                    random_delay: rule.random_delay,
                    glob: rule.domain_glob,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules: compiled })
    }

    /// Wait for a slot against `host`, then apply the rule's delay.
    ///
    /// Returns a permit the caller holds for the duration of the request.
    /// Hosts matching no rule are admitted immediately.
    pub async fn admit(&self, host: &str) -> RatePermit {
        let Some(rule) = self.rules.iter().find(|r| r.pattern.is_match(host)) else {
            return RatePermit::unlimited();
        };

        // acquire_owned only fails when the semaphore is closed, which we
        // never do.
        let permit = match rule.semaphore.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => return RatePermit::unlimited(),
        };

        let jitter_ms = if rule.random_delay.is_zero() {
            0
        } else {
            rand::rng().random_range(0..=rule.random_delay.as_millis() as u64)
        };
        let wait = rule.delay + Duration::from_millis(jitter_ms);
        if !wait.is_zero() {
            debug!(
                target: "sitehound::limiter",
                "Rule '{}' delaying {host} for {wait:?}",
                rule.glob
            );
            tokio::time::sleep(wait).await;
        }

        RatePermit {
            _permit: Some(permit),
        }
    }

    /// Number of free slots for the first rule matching `host`, if any.
    /// Used by tests and progress diagnostics.
    #[must_use]
    pub fn available_slots(&self, host: &str) -> Option<usize> {
        self.rules
            .iter()
            .find(|r| r.pattern.is_match(host))
            .map(|r| r.semaphore.available_permits())
    }
}
