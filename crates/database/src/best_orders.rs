use {
    crate::{Address, OrderId},
    sqlx::{types::BigDecimal, PgConnection},
};

/// The cached winner for one (contract, token, side) cell. A row with no
/// order means the last recompute found no rankable candidate.
#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct BestOrder {
    pub contract: Address,
    pub token_id: BigDecimal,
    pub side: crate::orders::Side,
    pub order_id: Option<OrderId>,
    pub value: Option<BigDecimal>,
    pub maker: Option<Address>,
}

/// The transition a cache write caused, when it caused one.
#[derive(Clone, Debug, Eq, PartialEq, sqlx::FromRow)]
pub struct Change {
    pub previous_order_id: Option<OrderId>,
    pub new_order_id: Option<OrderId>,
}

pub async fn get(
    ex: &mut PgConnection,
    contract: &Address,
    token_id: &BigDecimal,
    side: crate::orders::Side,
) -> Result<Option<BestOrder>, sqlx::Error> {
    const QUERY: &str = "\
        SELECT * FROM best_orders \
        WHERE contract = $1 AND token_id = $2 AND side = $3;";
    sqlx::query_as(QUERY)
        .bind(contract)
        .bind(token_id)
        .bind(side)
        .fetch_optional(ex)
        .await
}

/// Writes the recomputed winner, updating the row only when it actually
/// changes so that concurrent recomputes of the same result do not generate
/// spurious notifications. Returns the transition if the cache changed.
pub async fn upsert(
    ex: &mut PgConnection,
    contract: &Address,
    token_id: &BigDecimal,
    side: crate::orders::Side,
    winner: Option<(OrderId, BigDecimal, Address)>,
) -> Result<Option<Change>, sqlx::Error> {
    const QUERY: &str = "\
        WITH previous AS (\
            SELECT order_id FROM best_orders \
            WHERE contract = $1 AND token_id = $2 AND side = $3\
        ) \
        INSERT INTO best_orders (contract, token_id, side, order_id, value, maker) \
        VALUES ($1, $2, $3, $4, $5, $6) \
        ON CONFLICT (contract, token_id, side) DO UPDATE \
        SET order_id = EXCLUDED.order_id, \
            value = EXCLUDED.value, \
            maker = EXCLUDED.maker \
        WHERE best_orders.order_id IS DISTINCT FROM EXCLUDED.order_id \
            OR best_orders.value IS DISTINCT FROM EXCLUDED.value \
        RETURNING \
            (SELECT order_id FROM previous) AS previous_order_id, \
            best_orders.order_id AS new_order_id;";
    let (order_id, value, maker) = match winner {
        Some((order_id, value, maker)) => (Some(order_id), Some(value), Some(maker)),
        None => (None, None, None),
    };
    let change: Option<Change> = sqlx::query_as(QUERY)
        .bind(contract)
        .bind(token_id)
        .bind(side)
        .bind(order_id)
        .bind(value)
        .bind(maker)
        .fetch_optional(ex)
        .await?;
    // The first write of a cell with no winner creates the row but is not a
    // transition.
    Ok(change
        .filter(|change| change.previous_order_id.is_some() || change.new_order_id.is_some()))
}

#[cfg(test)]
mod tests {
    use {super::*, crate::orders::Side, sqlx::Connection};

    #[tokio::test]
    #[ignore]
    async fn postgres_upsert_reports_transitions() {
        let mut db = PgConnection::connect("postgresql://").await.unwrap();
        let mut db = db.begin().await.unwrap();
        crate::clear_DANGER_(&mut db).await.unwrap();

        let contract = Address::from([1; 20]);
        let maker = Address::from([2; 20]);
        assert_eq!(
            get(&mut db, &contract, &1.into(), Side::Sell).await.unwrap(),
            None
        );

        // Recomputing an empty cell for the first time stores the row but is
        // not a transition.
        assert_eq!(
            upsert(&mut db, &contract, &1.into(), Side::Sell, None)
                .await
                .unwrap(),
            None
        );
        let row = get(&mut db, &contract, &1.into(), Side::Sell)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.order_id, None);

        // First winner.
        let change = upsert(
            &mut db,
            &contract,
            &1.into(),
            Side::Sell,
            Some((OrderId::from([1; 32]), 100.into(), maker)),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(change.previous_order_id, None);
        assert_eq!(change.new_order_id, Some(OrderId::from([1; 32])));

        // Same winner again does not count as a transition.
        assert_eq!(
            upsert(
                &mut db,
                &contract,
                &1.into(),
                Side::Sell,
                Some((OrderId::from([1; 32]), 100.into(), maker)),
            )
            .await
            .unwrap(),
            None
        );

        // A cheaper ask takes over.
        let change = upsert(
            &mut db,
            &contract,
            &1.into(),
            Side::Sell,
            Some((OrderId::from([2; 32]), 90.into(), maker)),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(change.previous_order_id, Some(OrderId::from([1; 32])));
        assert_eq!(change.new_order_id, Some(OrderId::from([2; 32])));

        // The last candidate disappearing clears the cell.
        let change = upsert(&mut db, &contract, &1.into(), Side::Sell, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(change.previous_order_id, Some(OrderId::from([2; 32])));
        assert_eq!(change.new_order_id, None);

        let row = get(&mut db, &contract, &1.into(), Side::Sell)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.order_id, None);

        // The two sides are independent cells.
        assert_eq!(
            get(&mut db, &contract, &1.into(), Side::Buy).await.unwrap(),
            None
        );
    }
}
