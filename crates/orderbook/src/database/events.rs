use {
    super::{event_index, order_id, Postgres},
    crate::{
        conversions,
        reconciler::{
            BalanceChangeEvent, CancelEvent, EventId, EventStoring, FillEvent, NonceBumpEvent,
        },
    },
    anyhow::{Context, Result},
    chrono::Utc,
    model::order::{Order, OrderId, OrderKind},
    primitive_types::{H160, U256},
};

#[async_trait::async_trait]
impl EventStoring for Postgres {
    async fn record_fill(&self, id: &EventId, event: &FillEvent) -> Result<bool> {
        let mut ex = self.pool.acquire().await?;
        Ok(database::events::insert_fill(
            &mut ex,
            &event_index(id)?,
            &database::events::Fill {
                order_id: order_id(event.order_id),
                taker: conversions::address_to_database(event.taker),
                filled_quantity: conversions::u256_to_big_decimal(&event.filled_quantity),
            },
        )
        .await?)
    }

    async fn record_cancel(&self, id: &EventId, event: &CancelEvent) -> Result<bool> {
        let mut ex = self.pool.acquire().await?;
        Ok(database::events::insert_cancel(
            &mut ex,
            &event_index(id)?,
            &database::events::Cancel {
                order_id: order_id(event.order_id),
            },
        )
        .await?)
    }

    async fn record_nonce_bump(&self, id: &EventId, event: &NonceBumpEvent) -> Result<bool> {
        let mut ex = self.pool.acquire().await?;
        Ok(database::events::insert_nonce_bump(
            &mut ex,
            &event_index(id)?,
            &database::events::NonceBump {
                maker: conversions::address_to_database(event.maker),
                kind: conversions::kind_to_database(event.kind),
                new_nonce: conversions::u256_to_big_decimal(&event.new_nonce),
            },
        )
        .await?)
    }

    async fn total_filled(&self, order: OrderId) -> Result<U256> {
        let mut ex = self.pool.acquire().await?;
        let total = database::events::total_filled(&mut ex, &order_id(order)).await?;
        conversions::big_decimal_to_u256(&total).context("fill total out of range")
    }

    async fn set_quantity_filled(&self, order: OrderId, quantity: U256) -> Result<bool> {
        let mut ex = self.pool.acquire().await?;
        Ok(database::orders::set_quantity_filled(
            &mut ex,
            &order_id(order),
            &conversions::u256_to_big_decimal(&quantity),
            Utc::now(),
        )
        .await?)
    }

    async fn cancel_order(&self, order: OrderId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        // The approval axis is left as is; cancellation only concerns
        // fillability.
        let Some(row) = database::orders::single_order(&mut tx, &order_id(order)).await? else {
            return Ok(false);
        };
        let changed = database::orders::update_status(
            &mut tx,
            &order_id(order),
            database::orders::FillabilityStatus::Cancelled,
            row.approval_status,
            Utc::now(),
        )
        .await?;
        tx.commit().await?;
        Ok(changed)
    }

    async fn invalidate_stale_nonces(
        &self,
        maker: H160,
        kind: OrderKind,
        new_nonce: U256,
    ) -> Result<Vec<Order>> {
        let mut tx = self.pool.begin().await?;
        let invalidated = database::orders::invalidate_stale_nonces(
            &mut tx,
            &conversions::address_to_database(maker),
            conversions::kind_to_database(kind),
            &conversions::u256_to_big_decimal(&new_nonce),
            Utc::now(),
        )
        .await?;
        let mut orders = Vec::with_capacity(invalidated.len());
        for invalidated in &invalidated {
            if let Some(row) =
                database::orders::single_order(&mut tx, &invalidated.id).await?
            {
                orders.push(conversions::order_from_database(row, &self.context)?);
            }
        }
        tx.commit().await?;
        Ok(orders)
    }

    async fn order_by_id(&self, order: OrderId) -> Result<Option<Order>> {
        let mut ex = self.pool.acquire().await?;
        let Some(row) = database::orders::single_order(&mut ex, &order_id(order)).await? else {
            return Ok(None);
        };
        Ok(Some(conversions::order_from_database(row, &self.context)?))
    }

    async fn set_nft_balance(&self, event: &BalanceChangeEvent) -> Result<()> {
        let mut ex = self.pool.acquire().await?;
        Ok(database::nft_balances::upsert(
            &mut ex,
            &conversions::address_to_database(event.contract),
            &conversions::u256_to_big_decimal(&event.token_id),
            &conversions::address_to_database(event.owner),
            &conversions::u256_to_big_decimal(&event.amount),
        )
        .await?)
    }

    async fn delete_events_from(&self, block_number: u64) -> Result<Vec<OrderId>> {
        let mut tx = self.pool.begin().await?;
        let touched = database::events::delete(
            &mut tx,
            i64::try_from(block_number).context("block number out of range")?,
        )
        .await?;
        tx.commit().await?;
        Ok(touched.into_iter().map(|id| OrderId(id.0)).collect())
    }
}
