use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

/// One receipt of a queued message.
///
/// The message stays invisible to other consumers until it is acknowledged,
/// dead-lettered, or the visibility timeout elapses, after which it is
/// delivered again with a higher `receive_count`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub receipt: String,
    pub body: String,
    pub receive_count: u32,
}

/// A message removed from the active cycle after repeated failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub message_id: String,
    pub body: String,
    pub reason: String,
    pub receive_count: u32,
    pub dead_lettered_at: DateTime<Utc>,
}

/// At-least-once work queue with per-message visibility timeout.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn enqueue(&self, body: &str) -> Result<(), QueueError>;

    /// Take the next visible message, if any. Does not block.
    async fn receive(&self) -> Result<Option<Delivery>, QueueError>;

    /// Remove a delivered message permanently.
    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Move a delivered message to the dead-letter list.
    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<(), QueueError>;

    /// Messages waiting or in flight.
    async fn depth(&self) -> Result<u64, QueueError>;

    async fn health_check(&self) -> Result<(), QueueError>;
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Queue unavailable: {0}")]
    Unavailable(String),
}

// Reclaims expired in-flight ids, then moves the next ready id in flight.
const RECEIVE_SCRIPT: &str = r#"
local expired = redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', ARGV[1])
for _, id in ipairs(expired) do
    redis.call('ZREM', KEYS[2], id)
    redis.call('RPUSH', KEYS[1], id)
end
local id = redis.call('LPOP', KEYS[1])
if not id then
    return false
end
redis.call('ZADD', KEYS[2], tonumber(ARGV[1]) + tonumber(ARGV[2]), id)
local count = redis.call('HINCRBY', KEYS[4], id, 1)
local body = redis.call('HGET', KEYS[3], id) or ''
return {id, body, count}
"#;

/// Redis-backed work queue.
///
/// Layout under the queue name `q`: `q:ready` (list of ids), `q:inflight`
/// (zset of ids scored by visibility deadline in ms), `q:bodies` and
/// `q:receives` (hashes keyed by id), `q:dead` (list of JSON dead letters).
pub struct RedisWorkQueue {
    client: redis::Client,
    name: String,
    visibility_timeout: Duration,
    receive_script: redis::Script,
}

impl RedisWorkQueue {
    pub fn new(
        redis_url: &str,
        name: &str,
        visibility_timeout: Duration,
    ) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self {
            client,
            name: name.to_string(),
            visibility_timeout,
            receive_script: redis::Script::new(RECEIVE_SCRIPT),
        })
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.name, suffix)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, QueueError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)
    }
}

#[async_trait]
impl WorkQueue for RedisWorkQueue {
    async fn enqueue(&self, body: &str) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let id = Uuid::new_v4().to_string();
        redis::pipe()
            .atomic()
            .hset(self.key("bodies"), &id, body)
            .ignore()
            .rpush(self.key("ready"), &id)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn receive(&self) -> Result<Option<Delivery>, QueueError> {
        let mut conn = self.connection().await?;
        let now_ms = Utc::now().timestamp_millis();
        let result: Option<(String, String, u32)> = self
            .receive_script
            .key(self.key("ready"))
            .key(self.key("inflight"))
            .key(self.key("bodies"))
            .key(self.key("receives"))
            .arg(now_ms)
            .arg(self.visibility_timeout.as_millis() as u64)
            .invoke_async(&mut conn)
            .await?;

        Ok(result.map(|(receipt, body, receive_count)| Delivery {
            receipt,
            body,
            receive_count,
        }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        redis::pipe()
            .atomic()
            .zrem(self.key("inflight"), &delivery.receipt)
            .ignore()
            .lrem(self.key("ready"), 0, &delivery.receipt)
            .ignore()
            .hdel(self.key("bodies"), &delivery.receipt)
            .ignore()
            .hdel(self.key("receives"), &delivery.receipt)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let entry = serde_json::to_string(&DeadLetter {
            message_id: delivery.receipt.clone(),
            body: delivery.body.clone(),
            reason: reason.to_string(),
            receive_count: delivery.receive_count,
            dead_lettered_at: Utc::now(),
        })?;
        redis::pipe()
            .atomic()
            .zrem(self.key("inflight"), &delivery.receipt)
            .ignore()
            .lrem(self.key("ready"), 0, &delivery.receipt)
            .ignore()
            .hdel(self.key("bodies"), &delivery.receipt)
            .ignore()
            .hdel(self.key("receives"), &delivery.receipt)
            .ignore()
            .rpush(self.key("dead"), entry)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        let (ready, inflight): (u64, u64) = redis::pipe()
            .llen(self.key("ready"))
            .zcard(self.key("inflight"))
            .query_async(&mut conn)
            .await?;
        Ok(ready + inflight)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

/// In-process work queue with the same delivery semantics as
/// [`RedisWorkQueue`]. Intended for tests and local runs.
pub struct MemoryWorkQueue {
    visibility_timeout: Duration,
    inner: Mutex<MemoryQueueState>,
}

#[derive(Default)]
struct MemoryQueueState {
    ready: VecDeque<String>,
    in_flight: HashMap<String, Instant>,
    bodies: HashMap<String, String>,
    receives: HashMap<String, u32>,
    dead: Vec<DeadLetter>,
}

impl MemoryWorkQueue {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            visibility_timeout,
            inner: Mutex::new(MemoryQueueState::default()),
        }
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.inner.lock().await.dead.clone()
    }

    pub async fn in_flight(&self) -> usize {
        self.inner.lock().await.in_flight.len()
    }

    /// Bodies of messages waiting to be received, in delivery order.
    pub async fn ready_bodies(&self) -> Vec<String> {
        let state = self.inner.lock().await;
        state
            .ready
            .iter()
            .filter_map(|id| state.bodies.get(id).cloned())
            .collect()
    }

    fn forget(state: &mut MemoryQueueState, receipt: &str) {
        state.ready.retain(|id| id != receipt);
        state.in_flight.remove(receipt);
        state.bodies.remove(receipt);
        state.receives.remove(receipt);
    }
}

#[async_trait]
impl WorkQueue for MemoryWorkQueue {
    async fn enqueue(&self, body: &str) -> Result<(), QueueError> {
        let mut state = self.inner.lock().await;
        let id = Uuid::new_v4().to_string();
        state.bodies.insert(id.clone(), body.to_string());
        state.ready.push_back(id);
        Ok(())
    }

    async fn receive(&self) -> Result<Option<Delivery>, QueueError> {
        let mut state = self.inner.lock().await;
        let now = Instant::now();

        let mut expired: Vec<String> = state
            .in_flight
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();
        expired.sort();
        for id in expired {
            state.in_flight.remove(&id);
            state.ready.push_back(id);
        }

        let Some(id) = state.ready.pop_front() else {
            return Ok(None);
        };
        state.in_flight.insert(id.clone(), now + self.visibility_timeout);
        let count = state.receives.entry(id.clone()).or_insert(0);
        *count += 1;
        let receive_count = *count;
        let body = state.bodies.get(&id).cloned().unwrap_or_default();

        Ok(Some(Delivery {
            receipt: id,
            body,
            receive_count,
        }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut state = self.inner.lock().await;
        Self::forget(&mut state, &delivery.receipt);
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<(), QueueError> {
        let mut state = self.inner.lock().await;
        Self::forget(&mut state, &delivery.receipt);
        state.dead.push(DeadLetter {
            message_id: delivery.receipt.clone(),
            body: delivery.body.clone(),
            reason: reason.to_string(),
            receive_count: delivery.receive_count,
            dead_lettered_at: Utc::now(),
        });
        Ok(())
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        let state = self.inner.lock().await;
        Ok((state.ready.len() + state.in_flight.len()) as u64)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_message_invisible_while_in_flight() {
        let queue = MemoryWorkQueue::new(Duration::from_secs(60));
        queue.enqueue("one").await.unwrap();

        let first = queue.receive().await.unwrap().unwrap();
        assert_eq!(first.body, "one");
        assert_eq!(first.receive_count, 1);
        assert!(queue.receive().await.unwrap().is_none());
        assert_eq!(queue.depth().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_redelivery_after_visibility_timeout() {
        let queue = MemoryWorkQueue::new(Duration::ZERO);
        queue.enqueue("one").await.unwrap();

        let first = queue.receive().await.unwrap().unwrap();
        let second = queue.receive().await.unwrap().unwrap();
        assert_eq!(first.receipt, second.receipt);
        assert_eq!(second.receive_count, 2);
    }

    #[tokio::test]
    async fn test_ack_removes_message() {
        let queue = MemoryWorkQueue::new(Duration::ZERO);
        queue.enqueue("one").await.unwrap();

        let delivery = queue.receive().await.unwrap().unwrap();
        queue.ack(&delivery).await.unwrap();

        assert!(queue.receive().await.unwrap().is_none());
        assert_eq!(queue.depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dead_letter_keeps_body_and_reason() {
        let queue = MemoryWorkQueue::new(Duration::ZERO);
        queue.enqueue("not json").await.unwrap();

        let delivery = queue.receive().await.unwrap().unwrap();
        queue.dead_letter(&delivery, "unparseable").await.unwrap();

        assert!(queue.receive().await.unwrap().is_none());
        let dead = queue.dead_letters().await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].body, "not json");
        assert_eq!(dead[0].reason, "unparseable");
        assert_eq!(dead[0].receive_count, 1);
    }

    #[tokio::test]
    async fn test_late_ack_after_reclaim_drops_message() {
        let queue = MemoryWorkQueue::new(Duration::ZERO);
        queue.enqueue("one").await.unwrap();
        queue.enqueue("two").await.unwrap();

        let slow = queue.receive().await.unwrap().unwrap();
        // Reclaims `slow` behind "two".
        let next = queue.receive().await.unwrap().unwrap();
        assert_eq!(next.body, "two");

        queue.ack(&slow).await.unwrap();
        queue.ack(&next).await.unwrap();
        assert!(queue.receive().await.unwrap().is_none());
        assert_eq!(queue.depth().await.unwrap(), 0);
    }
}
