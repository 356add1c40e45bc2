//! Attempt throttling ports and application service.
//!
//! Implements a sliding-log rate limiter over per-key attempt timestamps.
//! Follows OWASP Credential Stuffing Prevention cheat sheet recommendations
//! for throttling login, registration, and password-reset attempts per
//! identifying key.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use attemptguard_core::{AppError, AppResult, ThrottleKey};

mod format;

use self::format::format_retry_delay;

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Storage port for per-key attempt histories.
///
/// Implementations keep one ascending sequence of timestamps per storage key
/// and never reorder entries. Stale timestamps are pruned opportunistically
/// on `append`; reads return whatever is stored, filtering is the service's
/// concern.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Returns every stored timestamp for the key, oldest first.
    ///
    /// An unknown key yields an empty history.
    async fn load(&self, key: &str) -> AppResult<Vec<DateTime<Utc>>>;

    /// Appends `at` to the key's history, first discarding stored timestamps
    /// that had already aged out of `window` at that moment.
    async fn append(&self, key: &str, at: DateTime<Utc>, window: Duration) -> AppResult<()>;

    /// Removes the key's history entirely.
    async fn remove(&self, key: &str) -> AppResult<()>;

    /// Wipes every tracked key.
    async fn clear(&self) -> AppResult<()>;

    /// Drops all timestamps at or before `before` across every key, removing
    /// keys whose history becomes empty. Returns the number of keys removed.
    async fn prune(&self, before: DateTime<Utc>) -> AppResult<u64>;
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Throttle policy for one guarded operation category.
#[derive(Debug, Clone)]
pub struct ThrottlePolicy {
    /// Operation category name (e.g., "login", "password_reset"). Becomes
    /// part of the storage key, so the same actor is tracked independently
    /// per category.
    pub category: String,
    /// Maximum number of attempts allowed in the window.
    pub max_attempts: u32,
    /// Window duration in milliseconds.
    pub window_ms: i64,
}

impl ThrottlePolicy {
    /// Creates a throttle policy.
    #[must_use]
    pub fn new(category: impl Into<String>, max_attempts: u32, window_ms: i64) -> Self {
        Self {
            category: category.into(),
            max_attempts,
            window_ms,
        }
    }

    /// Default login policy: 5 attempts per 15 minutes.
    #[must_use]
    pub fn login() -> Self {
        Self::new("login", 5, 15 * 60 * 1000)
    }

    /// Default registration policy: 3 attempts per 60 minutes.
    #[must_use]
    pub fn registration() -> Self {
        Self::new("registration", 3, 60 * 60 * 1000)
    }

    /// Default password-reset policy: 3 attempts per 60 minutes.
    #[must_use]
    pub fn password_reset() -> Self {
        Self::new("password_reset", 3, 60 * 60 * 1000)
    }

    /// Returns the window as a duration.
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::milliseconds(self.window_ms)
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Outcome of checking a key against a throttle policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptDecision {
    /// Whether a new attempt is currently permitted.
    pub allowed: bool,
    /// Attempts left after the one about to be recorded. Zero when throttled.
    pub remaining_attempts: u32,
    /// When the oldest counted attempt ages out of the window. Only set on a
    /// throttled decision.
    pub resets_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Application service for attempt throttling.
///
/// The service is advisory: callers bracket the guarded operation with
/// [`check`](Self::check) before dispatching,
/// [`record_attempt`](Self::record_attempt) after a failure, and
/// [`reset`](Self::reset) after a success. Nothing is recorded implicitly.
#[derive(Clone)]
pub struct AttemptLimitService {
    store: Arc<dyn AttemptStore>,
}

impl AttemptLimitService {
    /// Creates an attempt limit service over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn AttemptStore>) -> Self {
        Self { store }
    }

    /// Checks whether a new attempt is permitted for the key.
    ///
    /// A pure read: the attempt being checked is not recorded. A throttled
    /// decision carries `resets_at`, the instant the oldest counted attempt
    /// falls out of the window.
    pub async fn check(
        &self,
        policy: &ThrottlePolicy,
        key: &ThrottleKey,
    ) -> AppResult<AttemptDecision> {
        validate_policy(policy)?;

        let history = self.store.load(&storage_key(policy, key)).await?;
        Ok(evaluate(policy, &history, Utc::now()))
    }

    /// Checks the key and maps a throttled decision to an error.
    ///
    /// Returns `Err(AppError::RateLimited)` carrying a human-readable retry
    /// delay when the limit has been exceeded.
    pub async fn enforce(
        &self,
        policy: &ThrottlePolicy,
        key: &ThrottleKey,
    ) -> AppResult<AttemptDecision> {
        let decision = self.check(policy, key).await?;

        if let Some(resets_at) = decision.resets_at
            && !decision.allowed
        {
            let delay = format_retry_delay(resets_at - Utc::now());
            return Err(AppError::RateLimited(format!(
                "too many {} attempts, please try again in {delay}",
                policy.category
            )));
        }

        Ok(decision)
    }

    /// Records an attempt for the key at the current instant.
    ///
    /// Stored timestamps already older than the window are discarded as a
    /// side effect of the write.
    pub async fn record_attempt(&self, policy: &ThrottlePolicy, key: &ThrottleKey) -> AppResult<()> {
        validate_policy(policy)?;

        self.store
            .append(&storage_key(policy, key), Utc::now(), policy.window())
            .await
    }

    /// Returns how long until the oldest recorded attempt ages out of the
    /// window, or zero when the key has no history.
    ///
    /// Uses the oldest timestamp of the entire stored history, not only
    /// those still within the window; the value self-corrects once a later
    /// [`record_attempt`](Self::record_attempt) prunes stale entries.
    pub async fn remaining_time(
        &self,
        policy: &ThrottlePolicy,
        key: &ThrottleKey,
    ) -> AppResult<Duration> {
        validate_policy(policy)?;

        let history = self.store.load(&storage_key(policy, key)).await?;
        let Some(oldest) = history.first().copied() else {
            return Ok(Duration::zero());
        };

        let remaining = policy.window() - (Utc::now() - oldest);
        Ok(remaining.max(Duration::zero()))
    }

    /// Formats [`remaining_time`](Self::remaining_time) as human-readable
    /// text, e.g. `"2 minutes 5 seconds"`. Empty when nothing remains.
    pub async fn remaining_time_text(
        &self,
        policy: &ThrottlePolicy,
        key: &ThrottleKey,
    ) -> AppResult<String> {
        let remaining = self.remaining_time(policy, key).await?;
        Ok(format_retry_delay(remaining))
    }

    /// Deletes the key's history, clearing any accumulated penalty. Called
    /// after a successful attempt.
    pub async fn reset(&self, policy: &ThrottlePolicy, key: &ThrottleKey) -> AppResult<()> {
        self.store.remove(&storage_key(policy, key)).await
    }

    /// Wipes every tracked key. Test/teardown utility.
    pub async fn clear_all(&self) -> AppResult<()> {
        self.store.clear().await
    }

    /// Removes stale timestamps across all keys of the store. Intended for
    /// periodic cleanup in long-lived processes; returns the number of keys
    /// dropped entirely.
    pub async fn prune_stale(&self, policy: &ThrottlePolicy) -> AppResult<u64> {
        validate_policy(policy)?;

        self.store.prune(Utc::now() - policy.window()).await
    }
}

fn storage_key(policy: &ThrottlePolicy, key: &ThrottleKey) -> String {
    format!("{}:{key}", policy.category)
}

fn validate_policy(policy: &ThrottlePolicy) -> AppResult<()> {
    if policy.max_attempts == 0 {
        return Err(AppError::Validation(
            "max_attempts must be greater than zero".to_owned(),
        ));
    }

    if policy.window_ms <= 0 {
        return Err(AppError::Validation(
            "window_ms must be greater than zero".to_owned(),
        ));
    }

    Ok(())
}

/// Evaluates a key's history against a policy at the given instant.
///
/// The throttled state is never stored; it is derived fresh from the
/// timestamps and the clock reading on every call.
fn evaluate(
    policy: &ThrottlePolicy,
    history: &[DateTime<Utc>],
    now: DateTime<Utc>,
) -> AttemptDecision {
    let window = policy.window();
    let recent: Vec<DateTime<Utc>> = history
        .iter()
        .copied()
        .filter(|recorded| now - *recorded < window)
        .collect();
    let recent_count = u32::try_from(recent.len()).unwrap_or(u32::MAX);

    if recent_count >= policy.max_attempts {
        let oldest = recent.first().copied().unwrap_or(now);
        return AttemptDecision {
            allowed: false,
            remaining_attempts: 0,
            resets_at: Some(oldest + window),
        };
    }

    AttemptDecision {
        allowed: true,
        remaining_attempts: policy.max_attempts - recent_count - 1,
        resets_at: None,
    }
}
