use crate::error::StoreError;
use crate::store::KvStore;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Client;

/// Redis-backed [`KvStore`], shared by every server instance.
///
/// `create_if_absent` maps to `SET key value NX`, which Redis applies
/// atomically; it replies `OK` when the key was written and nil otherwise.
#[derive(Clone)]
pub struct RedisStore {
    connection: MultiplexedConnection,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = Client::open(redis_url)
            .map_err(|e| StoreError::Unavailable(format!("Failed to create Redis client: {}", e)))?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to connect to Redis: {}", e)))?;

        Ok(Self { connection })
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.connection.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async::<_, Option<Vec<u8>>>(&mut conn)
            .await
            .map_err(|e| StoreError::Unavailable(format!("GET failed: {}", e)))
    }

    async fn create_if_absent(&self, key: &str, value: Vec<u8>) -> Result<bool, StoreError> {
        let mut conn = self.connection.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Unavailable(format!("SET NX failed: {}", e)))?;

        Ok(reply.is_some())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| StoreError::Unavailable(format!("SET failed: {}", e)))
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<_, i64>(&mut conn)
            .await
            .map(|deleted_count| deleted_count > 0)
            .map_err(|e| StoreError::Unavailable(format!("DEL failed: {}", e)))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| StoreError::Unavailable(format!("Ping failed: {}", e)))
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
