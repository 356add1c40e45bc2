//! Redis-backed attempt store.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use redis::{AsyncCommands, Script};
use tracing::debug;
use uuid::Uuid;

use attemptguard_application::AttemptStore;
use attemptguard_core::{AppError, AppResult};

const APPEND_SCRIPT: &str = r#"
local key = KEYS[1]
local window_ms = tonumber(ARGV[1])
local at_ms = tonumber(ARGV[2])
local member = ARGV[3]

redis.call('ZREMRANGEBYSCORE', key, '-inf', at_ms - window_ms)
redis.call('ZADD', key, at_ms, member)
redis.call('PEXPIRE', key, window_ms * 2)
return redis.call('ZCARD', key)
"#;

/// Redis adapter for the attempt store port.
///
/// Each history is a sorted set scored by the attempt timestamp in
/// milliseconds; members are suffixed with a UUID so same-millisecond
/// attempts do not collide. Keys carry a TTL of twice the window, so idle
/// histories expire server-side without a sweep.
#[derive(Clone)]
pub struct RedisAttemptStore {
    client: redis::Client,
    key_prefix: String,
}

impl RedisAttemptStore {
    /// Creates a store with a configured Redis client and key prefix.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn key_for(&self, key: &str) -> String {
        format!("{}:{key}", self.key_prefix)
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))
    }

    async fn prefixed_keys(
        &self,
        connection: &mut redis::aio::MultiplexedConnection,
    ) -> AppResult<Vec<String>> {
        let pattern = format!("{}:*", self.key_prefix);
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(connection)
                .await
                .map_err(|error| {
                    AppError::Internal(format!("failed to scan redis attempt keys: {error}"))
                })?;

            keys.extend(batch);
            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        Ok(keys)
    }
}

#[async_trait]
impl AttemptStore for RedisAttemptStore {
    async fn load(&self, key: &str) -> AppResult<Vec<DateTime<Utc>>> {
        let mut connection = self.connection().await?;

        let entries: Vec<(String, i64)> = connection
            .zrange_withscores(self.key_for(key), 0, -1)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to read redis attempt history: {error}"))
            })?;

        entries
            .into_iter()
            .map(|(_, score_ms)| {
                Utc.timestamp_millis_opt(score_ms).single().ok_or_else(|| {
                    AppError::Internal(format!("invalid redis attempt timestamp: {score_ms}"))
                })
            })
            .collect()
    }

    async fn append(&self, key: &str, at: DateTime<Utc>, window: Duration) -> AppResult<()> {
        let window_ms = window.num_milliseconds();
        if window_ms <= 0 {
            return Err(AppError::Validation(
                "window must be greater than zero".to_owned(),
            ));
        }

        let at_ms = at.timestamp_millis();
        let member = format!("{at_ms}-{}", Uuid::new_v4());
        let mut connection = self.connection().await?;

        let script = Script::new(APPEND_SCRIPT);
        let _: i64 = script
            .key(self.key_for(key))
            .arg(window_ms)
            .arg(at_ms)
            .arg(member)
            .invoke_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to record redis attempt: {error}"))
            })?;

        Ok(())
    }

    async fn remove(&self, key: &str) -> AppResult<()> {
        let mut connection = self.connection().await?;

        let _: u64 = connection.del(self.key_for(key)).await.map_err(|error| {
            AppError::Internal(format!("failed to remove redis attempt history: {error}"))
        })?;

        Ok(())
    }

    async fn clear(&self) -> AppResult<()> {
        let mut connection = self.connection().await?;

        let keys = self.prefixed_keys(&mut connection).await?;
        if keys.is_empty() {
            return Ok(());
        }

        let _: u64 = connection.del(keys).await.map_err(|error| {
            AppError::Internal(format!("failed to clear redis attempt histories: {error}"))
        })?;

        Ok(())
    }

    async fn prune(&self, before: DateTime<Utc>) -> AppResult<u64> {
        let mut connection = self.connection().await?;
        let before_ms = before.timestamp_millis();
        let mut removed = 0u64;

        for key in self.prefixed_keys(&mut connection).await? {
            let dropped: u64 = connection
                .zrembyscore(&key, "-inf", before_ms)
                .await
                .map_err(|error| {
                    AppError::Internal(format!("failed to prune redis attempt history: {error}"))
                })?;

            if dropped == 0 {
                continue;
            }

            // Redis deletes a sorted set once its last member is removed.
            let exists: bool = connection.exists(&key).await.map_err(|error| {
                AppError::Internal(format!("failed to check redis attempt key: {error}"))
            })?;
            if !exists {
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(removed, "pruned stale attempt keys");
        }

        Ok(removed)
    }
}
