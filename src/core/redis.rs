use std::sync::Arc;

use redis::aio::ConnectionManager;
use redis::{cmd, AsyncCommands, Client, RedisError};
use tokio::sync::RwLock;

#[derive(Clone)]
pub(crate) struct RedisHandle {
    url: String,
    manager: Arc<RwLock<Option<ConnectionManager>>>,
}

#[derive(Debug, Clone)]
pub(crate) enum RedisHealth {
    Healthy,
    Disconnected,
    Unhealthy(String),
}

impl RedisHandle {
    pub(crate) fn new(url: String) -> Self {
        Self { url, manager: Arc::new(RwLock::new(None)) }
    }

    pub(crate) async fn connect(&self) -> Result<(), RedisError> {
        let client = Client::open(self.url.clone())?;
        let manager = ConnectionManager::new(client).await?;
        *self.manager.write().await = Some(manager);
        Ok(())
    }

    pub(crate) async fn disconnect(&self) {
        *self.manager.write().await = None;
    }

    async fn manager(&self) -> Option<ConnectionManager> {
        self.manager.read().await.clone()
    }

    pub(crate) async fn health(&self) -> RedisHealth {
        let Some(mut manager) = self.manager().await else {
            return RedisHealth::Disconnected;
        };

        match cmd("PING").query_async::<_, String>(&mut manager).await {
            Ok(_) => RedisHealth::Healthy,
            Err(err) => RedisHealth::Unhealthy(err.to_string()),
        }
    }

    /// Fixed-window counter. Allows everything while Redis is unavailable.
    pub(crate) async fn rate_limit(
        &self,
        key: &str,
        limit: u64,
        window_seconds: u64,
    ) -> Result<bool, RedisError> {
        let Some(mut manager) = self.manager().await else {
            return Ok(true);
        };

        let script = redis::Script::new(
            r#"
            local current = redis.call("INCR", KEYS[1])
            if current == 1 then
                redis.call("EXPIRE", KEYS[1], ARGV[1])
            end
            return current
        "#,
        );

        let current: i64 =
            script.key(key).arg(window_seconds as i64).invoke_async(&mut manager).await?;

        Ok(current <= limit as i64)
    }

    pub(crate) async fn get_string(&self, key: &str) -> Result<Option<String>, RedisError> {
        let mut manager = self.require_manager().await?;
        manager.get(key).await
    }

    pub(crate) async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: u64,
    ) -> Result<(), RedisError> {
        let mut manager = self.require_manager().await?;
        manager.set_ex(key, value, ttl_seconds).await
    }

    async fn require_manager(&self) -> Result<ConnectionManager, RedisError> {
        self.manager().await.ok_or_else(|| {
            RedisError::from((redis::ErrorKind::IoError, "redis connection is not established"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::RedisHandle;
    use crate::core::config::Settings;
    use crate::test_support;
    use uuid::Uuid;

    async fn connected() -> Option<RedisHandle> {
        let settings = Settings::load().expect("settings");
        let redis = RedisHandle::new(settings.redis().redis_url());
        match redis.connect().await {
            Ok(()) => Some(redis),
            Err(err) => {
                eprintln!("skipping redis test: {err}");
                None
            }
        }
    }

    #[tokio::test]
    async fn rate_limit_enforces_limit() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();
        let Some(redis) = connected().await else {
            return;
        };

        let key = format!("rate-limit:{}", Uuid::new_v4());
        assert!(redis.rate_limit(&key, 1, 5).await.expect("rate limit"));
        assert!(!redis.rate_limit(&key, 1, 5).await.expect("rate limit"));
    }

    #[tokio::test]
    async fn rate_limit_allows_when_disconnected() {
        let redis = RedisHandle::new("redis://127.0.0.1:1/0".to_string());
        assert!(redis.rate_limit("any", 0, 5).await.expect("rate limit"));
        assert!(redis.get_string("any").await.is_err());
    }

    #[tokio::test]
    async fn set_with_ttl_then_get() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();
        let Some(redis) = connected().await else {
            return;
        };

        let key = format!("test:{}", Uuid::new_v4());
        redis.set_with_ttl(&key, "payload", 30).await.expect("set");
        assert_eq!(redis.get_string(&key).await.expect("get").as_deref(), Some("payload"));
        assert_eq!(redis.get_string(&format!("{key}:missing")).await.expect("get"), None);
    }
}
