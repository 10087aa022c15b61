use {
    crate::{Address, OrderId, PgTransaction, TransactionHash},
    sqlx::{types::BigDecimal, PgConnection},
};

/// Position of an on-chain event. `batch_index` disambiguates logs that
/// settle several fills at once; plain events use 0.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct EventIndex {
    pub block_number: i64,
    pub tx_hash: TransactionHash,
    pub log_index: i64,
    pub batch_index: i64,
}

#[derive(Clone, Debug, Default)]
pub struct Fill {
    pub order_id: OrderId,
    pub taker: Address,
    pub filled_quantity: BigDecimal,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Cancel {
    pub order_id: OrderId,
}

#[derive(Clone, Debug, Default)]
pub struct NonceBump {
    pub maker: Address,
    pub kind: crate::orders::OrderKind,
    pub new_nonce: BigDecimal,
}

/// Inserts a fill event, returning whether it is new. Replayed events are
/// swallowed by the (tx_hash, log_index, batch_index) key so that delivery
/// retries and concurrent ingestion never double count.
pub async fn insert_fill(
    ex: &mut PgConnection,
    index: &EventIndex,
    event: &Fill,
) -> Result<bool, sqlx::Error> {
    const QUERY: &str = "\
        INSERT INTO fill_events (\
            block_number, tx_hash, log_index, batch_index, order_id, taker, \
            filled_quantity\
        ) \
        VALUES ($1, $2, $3, $4, $5, $6, $7) \
        ON CONFLICT DO NOTHING;";
    let result = sqlx::query(QUERY)
        .bind(index.block_number)
        .bind(index.tx_hash)
        .bind(index.log_index)
        .bind(index.batch_index)
        .bind(event.order_id)
        .bind(event.taker)
        .bind(&event.filled_quantity)
        .execute(ex)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn insert_cancel(
    ex: &mut PgConnection,
    index: &EventIndex,
    event: &Cancel,
) -> Result<bool, sqlx::Error> {
    const QUERY: &str = "\
        INSERT INTO cancel_events (\
            block_number, tx_hash, log_index, batch_index, order_id\
        ) \
        VALUES ($1, $2, $3, $4, $5) \
        ON CONFLICT DO NOTHING;";
    let result = sqlx::query(QUERY)
        .bind(index.block_number)
        .bind(index.tx_hash)
        .bind(index.log_index)
        .bind(index.batch_index)
        .bind(event.order_id)
        .execute(ex)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn insert_nonce_bump(
    ex: &mut PgConnection,
    index: &EventIndex,
    event: &NonceBump,
) -> Result<bool, sqlx::Error> {
    const QUERY: &str = "\
        INSERT INTO nonce_bump_events (\
            block_number, tx_hash, log_index, batch_index, maker, kind, \
            new_nonce\
        ) \
        VALUES ($1, $2, $3, $4, $5, $6, $7) \
        ON CONFLICT DO NOTHING;";
    let result = sqlx::query(QUERY)
        .bind(index.block_number)
        .bind(index.tx_hash)
        .bind(index.log_index)
        .bind(index.batch_index)
        .bind(event.maker)
        .bind(event.kind)
        .bind(&event.new_nonce)
        .execute(ex)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// The absolute filled quantity of an order: the sum over all distinct fill
/// events ever observed for it.
pub async fn total_filled(
    ex: &mut PgConnection,
    order_id: &OrderId,
) -> Result<BigDecimal, sqlx::Error> {
    const QUERY: &str = "\
        SELECT COALESCE(SUM(filled_quantity), 0) FROM fill_events \
        WHERE order_id = $1;";
    sqlx::query_scalar(QUERY).bind(order_id).fetch_one(ex).await
}

pub async fn last_block(ex: &mut PgConnection) -> Result<i64, sqlx::Error> {
    const QUERY: &str = "\
        SELECT GREATEST( \
            (SELECT COALESCE(MAX(block_number), 0) FROM fill_events), \
            (SELECT COALESCE(MAX(block_number), 0) FROM cancel_events), \
            (SELECT COALESCE(MAX(block_number), 0) FROM nonce_bump_events));";
    sqlx::query_scalar(QUERY).fetch_one(ex).await
}

/// Drops all events at or above the given block. Used when handling reorgs;
/// fill totals are recomputed from what remains.
pub async fn delete(
    ex: &mut PgTransaction<'_>,
    delete_from_block_number: i64,
) -> Result<Vec<OrderId>, sqlx::Error> {
    const QUERY_CANCELS: &str = "DELETE FROM cancel_events WHERE block_number >= $1;";
    sqlx::query(QUERY_CANCELS)
        .bind(delete_from_block_number)
        .execute(&mut **ex)
        .await?;

    const QUERY_NONCE_BUMPS: &str = "DELETE FROM nonce_bump_events WHERE block_number >= $1;";
    sqlx::query(QUERY_NONCE_BUMPS)
        .bind(delete_from_block_number)
        .execute(&mut **ex)
        .await?;

    const QUERY_FILLS: &str =
        "DELETE FROM fill_events WHERE block_number >= $1 RETURNING order_id;";
    sqlx::query_scalar(QUERY_FILLS)
        .bind(delete_from_block_number)
        .fetch_all(&mut **ex)
        .await
}
