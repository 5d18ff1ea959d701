//! Redis Streams broker.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::streams::{StreamPendingReply, StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, ConnectionAddr, ConnectionInfo, RedisConnectionInfo, RedisResult};
use tracing::debug;

use super::broker::{
    Connector, GroupCreation, StartId, StreamBroker, StreamEntry, FAR_FUTURE,
};
use crate::codec::WireRecord;
use crate::config::RedisConfig;
use crate::error::EventError;

/// Broker backed by a Redis server.
///
/// Holds two connections: a managed one for short commands and a
/// multiplexed one reserved for blocking group reads, so a parked
/// `XREADGROUP` never delays an `XADD` or `XACK`.
///
/// Redis serves one socket's commands in order, so blocking reads on the
/// reader queue behind each other. Each running `GroupConsumer` and each
/// correlation wait therefore opens a broker of its own.
#[derive(Clone)]
pub struct RedisBroker {
    commands: ConnectionManager,
    reader: MultiplexedConnection,
    target: String,
}

impl RedisBroker {
    /// Open both connections to the configured server.
    pub async fn open(config: &RedisConfig) -> Result<Self, EventError> {
        let target = config.target();
        let failed = |e: redis::RedisError| EventError::ConnectionFailed {
            target: target.clone(),
            cause: e.to_string(),
        };

        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(config.host.clone(), config.port),
            redis: RedisConnectionInfo {
                db: config.db,
                password: config.password.clone(),
                ..Default::default()
            },
        };
        let client = redis::Client::open(info).map_err(failed)?;
        let commands = client.get_connection_manager().await.map_err(failed)?;
        let reader = client
            .get_multiplexed_async_connection()
            .await
            .map_err(failed)?;

        debug!(broker = %target, "Opened Redis connections");
        Ok(Self {
            commands,
            reader,
            target,
        })
    }

    /// `host:port/db` this broker talks to.
    pub fn target(&self) -> &str {
        &self.target
    }
}

#[async_trait]
impl StreamBroker for RedisBroker {
    async fn ping(&self) -> Result<(), EventError> {
        let mut conn = self.commands.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn append(&self, stream: &str, record: &WireRecord) -> Result<String, EventError> {
        let fields: Vec<(&str, &str)> = record
            .iter()
            .map(|(field, value)| (field.as_str(), value.as_str()))
            .collect();
        let mut conn = self.commands.clone();
        let id: String = conn.xadd(stream, "*", fields.as_slice()).await?;
        Ok(id)
    }

    async fn stream_len(&self, stream: &str) -> Result<u64, EventError> {
        let mut conn = self.commands.clone();
        let len: u64 = conn.xlen(stream).await?;
        Ok(len)
    }

    async fn create_group(
        &self,
        stream: &str,
        group: &str,
        start: &StartId,
    ) -> Result<GroupCreation, EventError> {
        let mut conn = self.commands.clone();
        let created: RedisResult<()> = conn
            .xgroup_create_mkstream(stream, group, start.as_redis_id())
            .await;
        match created {
            Ok(()) => Ok(GroupCreation::Created),
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(GroupCreation::AlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    async fn destroy_group(&self, stream: &str, group: &str) -> Result<bool, EventError> {
        let mut conn = self.commands.clone();
        let destroyed: u64 = conn.xgroup_destroy(stream, group).await?;
        Ok(destroyed > 0)
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>, EventError> {
        let mut options = StreamReadOptions::default()
            .group(group, consumer)
            .count(count.max(1));
        // BLOCK 0 means "forever" to Redis; a zero wait is a plain read.
        if !block.is_zero() {
            let ms = usize::try_from(block.min(FAR_FUTURE).as_millis())
                .unwrap_or(usize::MAX)
                .max(1);
            options = options.block(ms);
        }

        let mut conn = self.reader.clone();
        let reply: Option<StreamReadReply> = conn.xread_options(&[stream], &[">"], &options).await?;

        let mut entries = Vec::new();
        for key in reply.map(|reply| reply.keys).unwrap_or_default() {
            for entry in key.ids {
                let mut record = WireRecord::new();
                for (field, value) in &entry.map {
                    let value: String = redis::from_redis_value(value)?;
                    record.insert(field.clone(), value);
                }
                entries.push(StreamEntry {
                    id: entry.id,
                    record,
                });
            }
        }
        Ok(entries)
    }

    async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> Result<u64, EventError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.commands.clone();
        let acked: u64 = conn.xack(stream, group, ids).await?;
        Ok(acked)
    }

    async fn pending_count(&self, stream: &str, group: &str) -> Result<u64, EventError> {
        let mut conn = self.commands.clone();
        let reply: StreamPendingReply = conn.xpending(stream, group).await?;
        Ok(reply.count() as u64)
    }
}

#[async_trait]
impl Connector for RedisConfig {
    type Broker = RedisBroker;

    async fn connect(&self) -> Result<Self::Broker, EventError> {
        RedisBroker::open(self).await
    }

    fn target(&self) -> String {
        RedisConfig::target(self)
    }
}
