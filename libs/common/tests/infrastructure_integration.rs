//! Integration tests for the infrastructure components
//!
//! These tests verify that the key-value store behaves the same way the
//! timer service expects, whichever backend is configured.

use anyhow::Result;
use common::{
    cache::{KvStore, RedisConfig},
    timer::{Timer, TimerStatus, timer_key, user_prefix},
};

fn sample_timer(user_id: &str, id: &str) -> Timer {
    Timer {
        id: id.to_string(),
        user_id: user_id.to_string(),
        creation_id: "recipe-1".to_string(),
        duration: 300,
        label: "Simmer".to_string(),
        start_time: 1_700_000_000_000,
        remaining: 300,
        status: TimerStatus::Running,
        step_index: Some(3),
        version: 0,
    }
}

async fn exercise_store(store: &KvStore) -> Result<()> {
    assert!(store.health_check().await?, "Store health check failed");

    let timer = sample_timer("integration-user", "integration-timer");
    let key = timer.key();
    let value = serde_json::to_string(&timer)?;

    store.set(&key, &value, Some(10)).await?;

    let raw = store.get(&key).await?.expect("timer should be stored");
    let decoded: Timer = serde_json::from_str(&raw)?;
    assert_eq!(decoded, timer, "Stored timer did not round-trip");

    let keys = store.keys(&user_prefix("integration-user")).await?;
    assert_eq!(keys, vec![timer_key("integration-user", "integration-timer")]);

    store.delete(&key).await?;
    assert_eq!(store.get(&key).await?, None, "Delete operation failed");

    Ok(())
}

#[tokio::test]
async fn test_memory_store_integration() -> Result<()> {
    exercise_store(&KvStore::memory()).await
}

/// Runs against the Redis server named by `REDIS_URL`
#[tokio::test]
#[ignore = "requires a running Redis server"]
async fn test_redis_store_integration() -> Result<()> {
    let redis_config = RedisConfig::from_env()?;
    let store = KvStore::redis(&redis_config).await?;
    exercise_store(&store).await
}
