use crate::streams::error::{StreamError, StreamResult};
use crate::streams::store::{
    EntryFields, GroupCreation, GroupInfo, GroupRead, PendingEntry, StreamEntry, StreamInfo,
    StreamStore,
};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{
    StreamId, StreamInfoGroupsReply, StreamMaxlen, StreamPendingCountReply, StreamRangeReply,
    StreamReadOptions, StreamReadReply,
};
use redis::{AsyncCommands, Client, IntoConnectionInfo};

/// Redis Streams backed log store.
///
/// Short commands share the `writer` connection. Group reads go through a
/// separate `reader` connection: a blocking XREADGROUP occupies its
/// multiplexed pipe until it returns, and publishes must not queue behind it.
#[derive(Clone)]
pub struct RedisStreamStore {
    writer: ConnectionManager,
    reader: ConnectionManager,
}

impl RedisStreamStore {
    /// Connect and verify liveness; fails fast when PING does not succeed
    pub async fn new(redis_url: &str, password: Option<&str>) -> StreamResult<Self> {
        let mut connection_info = redis_url.into_connection_info().map_err(|e| {
            StreamError::ConfigurationError(format!("Invalid Redis URL '{}': {}", redis_url, e))
        })?;
        if let Some(password) = password {
            connection_info.redis.password = Some(password.to_string());
        }

        let client = Client::open(connection_info).map_err(|e| {
            StreamError::ConfigurationError(format!("Failed to create Redis client: {}", e))
        })?;

        let writer = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| StreamError::ConnectionFailed(format!("Failed to connect to Redis: {}", e)))?;
        let reader = ConnectionManager::new(client)
            .await
            .map_err(|e| StreamError::ConnectionFailed(format!("Failed to connect to Redis: {}", e)))?;

        let store = Self { writer, reader };
        store.ping().await?;

        tracing::info!("Initialized Redis stream store");
        Ok(store)
    }
}

fn entry_from_id(stream_id: StreamId) -> StreamEntry {
    let fields: EntryFields = stream_id
        .map
        .iter()
        .filter_map(|(field, value)| match redis::from_redis_value::<String>(value) {
            Ok(value) => Some((field.clone(), value)),
            Err(e) => {
                tracing::warn!(entry_id = %stream_id.id, field = %field, error = %e, "Dropping non-string field");
                None
            }
        })
        .collect();

    StreamEntry {
        id: stream_id.id,
        fields,
    }
}

#[async_trait]
impl StreamStore for RedisStreamStore {
    async fn ping(&self) -> StreamResult<()> {
        let mut conn = self.writer.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| StreamError::ConnectionFailed(format!("Redis connection test failed: {}", e)))?;
        Ok(())
    }

    async fn exists(&self, stream: &str) -> StreamResult<bool> {
        let mut conn = self.writer.clone();
        Ok(conn.exists(stream).await?)
    }

    async fn append(
        &self,
        stream: &str,
        fields: &[(String, String)],
        max_len: Option<usize>,
    ) -> StreamResult<String> {
        let mut conn = self.writer.clone();
        let id: String = match max_len {
            Some(max_len) => {
                conn.xadd_maxlen(stream, StreamMaxlen::Approx(max_len), "*", fields)
                    .await?
            }
            None => conn.xadd(stream, "*", fields).await?,
        };
        Ok(id)
    }

    async fn create_group(
        &self,
        stream: &str,
        group: &str,
        start_id: &str,
        mkstream: bool,
    ) -> StreamResult<GroupCreation> {
        let mut conn = self.writer.clone();
        let result: redis::RedisResult<()> = if mkstream {
            conn.xgroup_create_mkstream(stream, group, start_id).await
        } else {
            conn.xgroup_create(stream, group, start_id).await
        };

        match result {
            Ok(()) => Ok(GroupCreation::Created),
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(GroupCreation::AlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    async fn destroy_group(&self, stream: &str, group: &str) -> StreamResult<bool> {
        if !self.exists(stream).await? {
            return Ok(false);
        }
        let mut conn = self.writer.clone();
        let removed: u64 = conn.xgroup_destroy(stream, group).await?;
        Ok(removed > 0)
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: Option<u64>,
    ) -> StreamResult<GroupRead> {
        let mut options = StreamReadOptions::default().group(group, consumer).count(count);
        if let Some(block_ms) = block_ms {
            options = options.block(block_ms as usize);
        }

        let mut conn = self.reader.clone();
        let reply: redis::RedisResult<Option<StreamReadReply>> =
            conn.xread_options(&[stream], &[">"], &options).await;

        match reply {
            Ok(Some(reply)) => Ok(GroupRead::Entries(
                reply
                    .keys
                    .into_iter()
                    .flat_map(|key| key.ids)
                    .map(entry_from_id)
                    .collect(),
            )),
            Ok(None) => Ok(GroupRead::Entries(Vec::new())),
            Err(e) if e.code() == Some("NOGROUP") => Ok(GroupRead::NoGroup),
            Err(e) => Err(StreamError::ConsumeFailed(e.to_string())),
        }
    }

    async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> StreamResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.writer.clone();
        Ok(conn.xack(stream, group, ids).await?)
    }

    async fn pending(&self, stream: &str, group: &str, count: usize) -> StreamResult<Vec<PendingEntry>> {
        let mut conn = self.writer.clone();
        let reply: redis::RedisResult<StreamPendingCountReply> =
            conn.xpending_count(stream, group, "-", "+", count).await;

        match reply {
            Ok(reply) => Ok(reply
                .ids
                .into_iter()
                .map(|p| PendingEntry {
                    id: p.id,
                    consumer: p.consumer,
                    idle_ms: p.last_delivered_ms as u64,
                    delivery_count: p.times_delivered as u64,
                })
                .collect()),
            Err(e) if e.code() == Some("NOGROUP") => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn info(&self, stream: &str) -> StreamResult<StreamInfo> {
        if !self.exists(stream).await? {
            return Ok(StreamInfo {
                length: 0,
                first_entry_id: None,
                last_entry_id: None,
                groups: Vec::new(),
            });
        }

        let mut conn = self.writer.clone();
        let length: u64 = conn.xlen(stream).await?;
        let first: StreamRangeReply = conn.xrange_count(stream, "-", "+", 1).await?;
        let last: StreamRangeReply = conn.xrevrange_count(stream, "+", "-", 1).await?;
        let groups: StreamInfoGroupsReply = conn.xinfo_groups(stream).await?;

        Ok(StreamInfo {
            length,
            first_entry_id: first.ids.into_iter().next().map(|e| e.id),
            last_entry_id: last.ids.into_iter().next().map(|e| e.id),
            groups: groups
                .groups
                .into_iter()
                .map(|g| GroupInfo {
                    name: g.name,
                    consumers: g.consumers as u64,
                    pending: g.pending as u64,
                    last_delivered_id: g.last_delivered_id,
                })
                .collect(),
        })
    }

    async fn trim_min_id(&self, stream: &str, min_id: &str) -> StreamResult<u64> {
        let mut conn = self.writer.clone();
        let removed: u64 = redis::cmd("XTRIM")
            .arg(stream)
            .arg("MINID")
            .arg(min_id)
            .query_async(&mut conn)
            .await?;
        Ok(removed)
    }

    async fn len(&self, stream: &str) -> StreamResult<u64> {
        let mut conn = self.writer.clone();
        Ok(conn.xlen(stream).await?)
    }

    async fn close(&self) -> StreamResult<()> {
        // ConnectionManager closes its socket once the last clone is dropped
        tracing::debug!("Redis stream store closed");
        Ok(())
    }
}
