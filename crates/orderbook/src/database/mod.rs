//! The Postgres implementations of the engine's storage traits, backed by
//! the `database` crate.

pub mod best_orders;
pub mod events;
pub mod orders;

use {
    anyhow::{Context, Result},
    model::kinds::CanonicalizeContext,
    sqlx::PgPool,
};

#[derive(Clone)]
pub struct Postgres {
    pub pool: PgPool,
    context: CanonicalizeContext,
}

impl Postgres {
    pub async fn new(url: &str, context: CanonicalizeContext) -> Result<Self> {
        Ok(Self {
            pool: PgPool::connect(url).await.context("connect database")?,
            context,
        })
    }

    pub fn with_pool(pool: PgPool, context: CanonicalizeContext) -> Self {
        Self { pool, context }
    }

    /// The highest block any recorded event was observed in. The event
    /// indexer resumes from here after a restart.
    pub async fn last_event_block(&self) -> Result<u64> {
        let mut ex = self.pool.acquire().await?;
        let block = database::events::last_block(&mut ex).await?;
        Ok(u64::try_from(block).unwrap_or_default())
    }
}

fn order_id(id: model::order::OrderId) -> database::OrderId {
    database::byte_array::ByteArray(id.0)
}

fn event_index(id: &crate::reconciler::EventId) -> Result<database::events::EventIndex> {
    Ok(database::events::EventIndex {
        block_number: i64::try_from(id.block_number).context("block number out of range")?,
        tx_hash: database::byte_array::ByteArray(id.tx_hash.0),
        log_index: i64::try_from(id.log_index).context("log index out of range")?,
        batch_index: i64::try_from(id.batch_index).context("batch index out of range")?,
    })
}
