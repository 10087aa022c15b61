use {
    crate::{Address, OrderId, PgTransaction},
    chrono::{DateTime, Utc},
    sqlx::{types::JsonValue, PgConnection},
};

pub type BigDecimal = sqlx::types::BigDecimal;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "order_kind")]
pub enum OrderKind {
    #[default]
    #[sqlx(rename = "seaport-v1.4")]
    SeaportV1_4,
    #[sqlx(rename = "looks-rare")]
    LooksRare,
    #[sqlx(rename = "zeroex-v4")]
    ZeroExV4,
    #[sqlx(rename = "blur")]
    Blur,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "order_side", rename_all = "lowercase")]
pub enum Side {
    Sell,
    Buy,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "fillability_status", rename_all = "kebab-case")]
pub enum FillabilityStatus {
    #[default]
    Fillable,
    NoBalance,
    Cancelled,
    Filled,
    Expired,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "approval_status", rename_all = "kebab-case")]
pub enum ApprovalStatus {
    #[default]
    Approved,
    NoApproval,
    Disabled,
}

/// One row of the `orders` table. `quantity_remaining` is not stored, it is
/// always `amount - quantity_filled`.
#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct Order {
    pub id: OrderId,
    pub kind: OrderKind,
    pub side: Side,
    pub maker: Address,
    pub taker: Option<Address>,
    pub contract: Address,
    pub token_set_id: String,
    pub currency: Address,
    pub price: BigDecimal,
    pub value: BigDecimal,
    pub fee_breakdown: JsonValue,
    pub amount: BigDecimal,
    pub quantity_filled: BigDecimal,
    pub valid_from: i64,
    pub valid_until: i64,
    pub nonce: BigDecimal,
    pub requires_oracle: bool,
    pub kind_data: JsonValue,
    pub signature: JsonValue,
    pub fillability_status: FillabilityStatus,
    pub approval_status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Inserts the order, returning whether a new row was created. Resubmissions
/// of an existing id are not an error, they leave the stored order untouched.
pub async fn insert(ex: &mut PgConnection, order: &Order) -> Result<bool, sqlx::Error> {
    const QUERY: &str = "\
        INSERT INTO orders (\
            id, kind, side, maker, taker, contract, token_set_id, currency, \
            price, value, fee_breakdown, amount, quantity_filled, valid_from, \
            valid_until, nonce, requires_oracle, kind_data, signature, \
            fillability_status, approval_status, created_at, updated_at\
        ) \
        VALUES (\
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, \
            $15, $16, $17, $18, $19, $20, $21, $22, $23\
        ) \
        ON CONFLICT (id) DO NOTHING;";
    let result = sqlx::query(QUERY)
        .bind(order.id)
        .bind(order.kind)
        .bind(order.side)
        .bind(order.maker)
        .bind(order.taker)
        .bind(order.contract)
        .bind(&order.token_set_id)
        .bind(order.currency)
        .bind(&order.price)
        .bind(&order.value)
        .bind(&order.fee_breakdown)
        .bind(&order.amount)
        .bind(&order.quantity_filled)
        .bind(order.valid_from)
        .bind(order.valid_until)
        .bind(&order.nonce)
        .bind(order.requires_oracle)
        .bind(&order.kind_data)
        .bind(&order.signature)
        .bind(order.fillability_status)
        .bind(order.approval_status)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(ex)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn single_order(
    ex: &mut PgConnection,
    id: &OrderId,
) -> Result<Option<Order>, sqlx::Error> {
    const QUERY: &str = "SELECT * FROM orders WHERE id = $1;";
    sqlx::query_as(QUERY).bind(id).fetch_optional(ex).await
}

/// Refreshes the last touched timestamp of an existing order.
pub async fn touch(
    ex: &mut PgConnection,
    id: &OrderId,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    const QUERY: &str = "UPDATE orders SET updated_at = $2 WHERE id = $1;";
    sqlx::query(QUERY).bind(id).bind(now).execute(ex).await?;
    Ok(())
}

/// Conditionally moves an order to the given statuses. Terminal states are
/// never left again and no-op transitions do not bump `updated_at`. Returns
/// whether the row changed.
pub async fn update_status(
    ex: &mut PgConnection,
    id: &OrderId,
    fillability: FillabilityStatus,
    approval: ApprovalStatus,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    const QUERY: &str = "\
        UPDATE orders \
        SET fillability_status = $2, approval_status = $3, updated_at = $4 \
        WHERE id = $1 \
            AND fillability_status NOT IN ('cancelled', 'filled', 'expired') \
            AND (fillability_status IS DISTINCT FROM $2 \
                OR approval_status IS DISTINCT FROM $3);";
    let result = sqlx::query(QUERY)
        .bind(id)
        .bind(fillability)
        .bind(approval)
        .bind(now)
        .execute(ex)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Sets the absolute filled quantity of an order, flipping the fillability
/// status to `filled` when the full amount is reached and back to `fillable`
/// when a reorg reduced the total again. Cancelled and expired orders keep
/// their status; only the accounting moves.
pub async fn set_quantity_filled(
    ex: &mut PgConnection,
    id: &OrderId,
    quantity_filled: &BigDecimal,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    const QUERY: &str = "\
        UPDATE orders \
        SET quantity_filled = $2, \
            fillability_status = CASE \
                WHEN fillability_status IN ('cancelled', 'expired') \
                    THEN fillability_status \
                WHEN $2 >= amount THEN 'filled'::fillability_status \
                WHEN fillability_status = 'filled' THEN 'fillable'::fillability_status \
                ELSE fillability_status \
            END, \
            updated_at = $3 \
        WHERE id = $1 AND quantity_filled IS DISTINCT FROM $2;";
    let result = sqlx::query(QUERY)
        .bind(id)
        .bind(quantity_filled)
        .bind(now)
        .execute(ex)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Ids of live orders that have not been checked since the cutoff, stalest
/// first. Feeds the periodic revalidation sweep.
pub async fn stale_order_ids(
    ex: &mut PgConnection,
    updated_before: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<OrderId>, sqlx::Error> {
    const QUERY: &str = "\
        SELECT id FROM orders \
        WHERE fillability_status NOT IN ('cancelled', 'filled', 'expired') \
            AND updated_at < $1 \
        ORDER BY updated_at ASC \
        LIMIT $2;";
    sqlx::query_scalar(QUERY)
        .bind(updated_before)
        .bind(limit)
        .fetch_all(ex)
        .await
}

/// An order invalidated by a nonce bump; carries what the best order
/// resolver needs to recompute.
#[derive(Clone, Debug, Eq, PartialEq, sqlx::FromRow)]
pub struct InvalidatedOrder {
    pub id: OrderId,
    pub contract: Address,
    pub token_set_id: String,
    pub side: Side,
}

/// Cancels every live order of the maker and kind whose nonce is below the
/// new one.
pub async fn invalidate_stale_nonces(
    ex: &mut PgTransaction<'_>,
    maker: &Address,
    kind: OrderKind,
    new_nonce: &BigDecimal,
    now: DateTime<Utc>,
) -> Result<Vec<InvalidatedOrder>, sqlx::Error> {
    const QUERY: &str = "\
        UPDATE orders \
        SET fillability_status = 'cancelled', updated_at = $4 \
        WHERE maker = $1 AND kind = $2 AND nonce < $3 \
            AND fillability_status NOT IN ('cancelled', 'filled', 'expired') \
        RETURNING id, contract, token_set_id, side;";
    sqlx::query_as(QUERY)
        .bind(maker)
        .bind(kind)
        .bind(new_nonce)
        .bind(now)
        .fetch_all(&mut **ex)
        .await
}

/// All orders of one side that could match the given token right now: live
/// validity window, fillable, approved, and a token set containing the
/// token. `token_set_ids` carries the ids computable without the
/// materialization table (single token and contract wide).
pub async fn rankable_orders(
    ex: &mut PgConnection,
    contract: &Address,
    token_id: &BigDecimal,
    side: Side,
    now: i64,
    token_set_ids: &[String],
) -> Result<Vec<Order>, sqlx::Error> {
    const QUERY: &str = "\
        SELECT * FROM orders o \
        WHERE o.side = $3 \
            AND o.fillability_status = 'fillable' \
            AND o.approval_status = 'approved' \
            AND o.valid_from <= $4 \
            AND (o.valid_until = 0 OR o.valid_until > $4) \
            AND (\
                o.token_set_id = ANY($5) \
                OR o.token_set_id IN (\
                    SELECT token_set_id FROM token_sets_tokens \
                    WHERE contract = $1 AND token_id = $2\
                )\
            );";
    sqlx::query_as(QUERY)
        .bind(contract)
        .bind(token_id)
        .bind(side)
        .bind(now)
        .bind(token_set_ids)
        .fetch_all(ex)
        .await
}
