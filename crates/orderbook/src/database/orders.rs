use {
    super::{order_id, Postgres},
    crate::{
        conversions,
        fillability::Verdict,
        orderbook::OrderStoring,
    },
    anyhow::{Context, Result},
    chrono::Utc,
    model::order::{Order, OrderId},
};

#[async_trait::async_trait]
impl OrderStoring for Postgres {
    async fn insert_order(&self, order: &Order) -> Result<bool> {
        let row = conversions::order_to_database(order)?;
        // The set row is written even for unbounded sets; only the membership
        // materialization is bounded.
        let token_ids: Vec<_> = order
            .data
            .token_set
            .members(self.context.max_token_list_len)
            .unwrap_or_default()
            .iter()
            .map(conversions::u256_to_big_decimal)
            .collect();
        let schema =
            serde_json::to_value(&order.data.token_set).context("serialize token set")?;

        let mut tx = self.pool.begin().await?;
        database::token_sets::insert(
            &mut tx,
            &row.token_set_id,
            &row.contract,
            &schema,
            &token_ids,
        )
        .await?;
        let inserted = database::orders::insert(&mut tx, &row).await?;
        if !inserted {
            database::orders::touch(&mut tx, &row.id, Utc::now()).await?;
        }
        tx.commit().await?;
        Ok(inserted)
    }

    async fn order_by_id(&self, id: OrderId) -> Result<Option<Order>> {
        let mut ex = self.pool.acquire().await?;
        let Some(row) = database::orders::single_order(&mut ex, &order_id(id)).await? else {
            return Ok(None);
        };
        Ok(Some(conversions::order_from_database(row, &self.context)?))
    }

    async fn stale_orders(
        &self,
        updated_before: chrono::DateTime<chrono::Utc>,
        limit: i64,
    ) -> Result<Vec<OrderId>> {
        let mut ex = self.pool.acquire().await?;
        let ids = database::orders::stale_order_ids(&mut ex, updated_before, limit).await?;
        Ok(ids.into_iter().map(|id| OrderId(id.0)).collect())
    }

    async fn apply_verdict(&self, id: OrderId, verdict: Verdict) -> Result<bool> {
        let mut ex = self.pool.acquire().await?;
        Ok(database::orders::update_status(
            &mut ex,
            &order_id(id),
            conversions::fillability_to_database(verdict.fillability),
            conversions::approval_to_database(verdict.approval),
            Utc::now(),
        )
        .await?)
    }
}
