//! Links over Redis lists, for coordinator and workers in separate processes.
//!
//! Each worker pops its dispatches from `{prefix}:worker:{id}`. All replies go
//! to `{prefix}:replies`, each entry prefixed with the sender's id as a
//! little-endian u32. Producers `LPUSH` and consumers pop from the right, so
//! every list is FIFO.

use ::redis::AsyncCommands;
use ::redis::aio::MultiplexedConnection;
use async_trait::async_trait;
use tracing::debug;

use crate::runtime::registry::WorkerId;
use crate::transport::{
    CoordinatorTransport, Endpoint, Envelope, LinkError, Phase, WorkerTransport,
};

/// Seconds a blocking pop waits before the loop re-issues it.
const POP_TIMEOUT_SECS: f64 = 1.0;

#[derive(Debug, Clone)]
struct Keys {
    prefix: String,
}

impl Keys {
    fn worker(&self, id: WorkerId) -> String {
        format!("{}:worker:{}", self.prefix, id)
    }

    fn replies(&self) -> String {
        format!("{}:replies", self.prefix)
    }
}

async fn connect(url: &str) -> Result<MultiplexedConnection, LinkError> {
    let redis_error = |source| LinkError::Redis {
        endpoint: Endpoint::Broker,
        phase: Phase::Connect,
        source,
    };
    let client = ::redis::Client::open(url).map_err(redis_error)?;
    client
        .get_multiplexed_async_connection()
        .await
        .map_err(redis_error)
}

async fn blocking_pop(
    conn: &mut MultiplexedConnection,
    key: &str,
    endpoint: Endpoint,
    phase: Phase,
) -> Result<Vec<u8>, LinkError> {
    loop {
        let popped: Option<(String, Vec<u8>)> = conn
            .brpop(key, POP_TIMEOUT_SECS)
            .await
            .map_err(|source| LinkError::Redis {
                endpoint,
                phase,
                source,
            })?;
        if let Some((_, payload)) = popped {
            return Ok(payload);
        }
    }
}

fn open_envelope(mut entry: Vec<u8>, phase: Phase) -> Result<Envelope, LinkError> {
    if entry.len() < 4 {
        return Err(LinkError::Envelope {
            phase,
            reason: format!("reply entry of {} bytes has no sender header", entry.len()),
        });
    }
    let payload = entry.split_off(4);
    let mut header = [0u8; 4];
    header.copy_from_slice(&entry);
    Ok(Envelope {
        from: WorkerId(u32::from_le_bytes(header)),
        payload,
    })
}

pub struct RedisCoordinator {
    conn: MultiplexedConnection,
    keys: Keys,
    workers: usize,
}

impl RedisCoordinator {
    pub async fn connect(url: &str, prefix: &str, workers: usize) -> Result<Self, LinkError> {
        Ok(Self {
            conn: connect(url).await?,
            keys: Keys {
                prefix: prefix.to_string(),
            },
            workers,
        })
    }

    /// Drops frames left over from an earlier run under the same prefix.
    pub async fn clear(&mut self) -> Result<(), LinkError> {
        let mut keys = vec![self.keys.replies()];
        keys.extend((1..=self.workers as u32).map(|id| self.keys.worker(WorkerId(id))));
        let _: () = self
            .conn
            .del(&keys)
            .await
            .map_err(|source| LinkError::Redis {
                endpoint: Endpoint::Broker,
                phase: Phase::Connect,
                source,
            })?;
        debug!(prefix = %self.keys.prefix, "Cleared stale queues");
        Ok(())
    }
}

#[async_trait]
impl CoordinatorTransport for RedisCoordinator {
    fn worker_count(&self) -> usize {
        self.workers
    }

    async fn send(
        &mut self,
        to: WorkerId,
        payload: Vec<u8>,
        phase: Phase,
    ) -> Result<(), LinkError> {
        if to.0 == 0 || to.0 as usize > self.workers {
            return Err(LinkError::UnknownWorker { worker: to, phase });
        }
        let _: () = self
            .conn
            .lpush(self.keys.worker(to), payload)
            .await
            .map_err(|source| LinkError::Redis {
                endpoint: Endpoint::Worker(to),
                phase,
                source,
            })?;
        Ok(())
    }

    async fn recv(&mut self, phase: Phase) -> Result<Envelope, LinkError> {
        let key = self.keys.replies();
        let entry = blocking_pop(&mut self.conn, &key, Endpoint::Replies, phase).await?;
        open_envelope(entry, phase)
    }

    async fn try_recv(&mut self, phase: Phase) -> Result<Option<Envelope>, LinkError> {
        let entry: Option<Vec<u8>> = self
            .conn
            .rpop(self.keys.replies(), None)
            .await
            .map_err(|source| LinkError::Redis {
                endpoint: Endpoint::Replies,
                phase,
                source,
            })?;
        entry.map(|entry| open_envelope(entry, phase)).transpose()
    }
}

pub struct RedisWorker {
    conn: MultiplexedConnection,
    keys: Keys,
    id: WorkerId,
}

impl RedisWorker {
    pub async fn connect(url: &str, prefix: &str, id: WorkerId) -> Result<Self, LinkError> {
        Ok(Self {
            conn: connect(url).await?,
            keys: Keys {
                prefix: prefix.to_string(),
            },
            id,
        })
    }
}

#[async_trait]
impl WorkerTransport for RedisWorker {
    fn worker_id(&self) -> WorkerId {
        self.id
    }

    async fn recv(&mut self) -> Result<Vec<u8>, LinkError> {
        let key = self.keys.worker(self.id);
        blocking_pop(
            &mut self.conn,
            &key,
            Endpoint::Worker(self.id),
            Phase::ReceiveTask,
        )
        .await
    }

    async fn send(&mut self, payload: Vec<u8>, phase: Phase) -> Result<(), LinkError> {
        let mut entry = Vec::with_capacity(4 + payload.len());
        entry.extend_from_slice(&self.id.0.to_le_bytes());
        entry.extend_from_slice(&payload);
        let _: () = self
            .conn
            .lpush(self.keys.replies(), entry)
            .await
            .map_err(|source| LinkError::Redis {
                endpoint: Endpoint::Replies,
                phase,
                source,
            })?;
        Ok(())
    }
}
