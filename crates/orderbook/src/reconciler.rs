//! Applies on-chain fill, cancel and nonce bump events to stored orders.
//!
//! Every event is recorded before any order state is derived from it, and
//! fill totals are always recomputed as the sum over all distinct recorded
//! events. Derivation runs on replays too: recording and derivation are
//! separate writes, so the first delivery may have died in between and the
//! redelivery has to finish the job. Since deriving is idempotent, replays
//! and out of order delivery converge on the same state, and a reorg only
//! needs to drop events and re-sum.

use {
    crate::best_orders::RecomputesBestOrders,
    anyhow::Result,
    itertools::Itertools,
    model::order::{Order, OrderId, OrderKind},
    primitive_types::{H160, H256, U256},
    std::sync::Arc,
};

/// Position of an event in the chain. `batch_index` disambiguates logs that
/// settle several fills at once; plain events use 0.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct EventId {
    pub block_number: u64,
    pub tx_hash: H256,
    pub log_index: u64,
    pub batch_index: u64,
}

/// A fill observed on chain. Carries the token that changed hands so the
/// best order recompute can target exactly that token.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FillEvent {
    pub order_id: OrderId,
    pub taker: H160,
    pub contract: H160,
    pub token_id: U256,
    pub filled_quantity: U256,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CancelEvent {
    pub order_id: OrderId,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NonceBumpEvent {
    pub maker: H160,
    pub kind: OrderKind,
    pub new_nonce: U256,
}

/// An ownership change observed on chain. The indexer reports the owner's
/// resulting absolute balance, not a delta.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BalanceChangeEvent {
    pub contract: H160,
    pub token_id: U256,
    pub owner: H160,
    pub amount: U256,
}

/// Storage the reconciler records events in and derives order state from.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait EventStoring: Send + Sync {
    /// Records the event, returning whether it is new. Replays return false.
    async fn record_fill(&self, id: &EventId, event: &FillEvent) -> Result<bool>;
    async fn record_cancel(&self, id: &EventId, event: &CancelEvent) -> Result<bool>;
    async fn record_nonce_bump(&self, id: &EventId, event: &NonceBumpEvent) -> Result<bool>;

    /// The sum of all distinct recorded fills for the order.
    async fn total_filled(&self, order_id: OrderId) -> Result<U256>;

    /// Writes the absolute filled quantity, returning whether it changed.
    async fn set_quantity_filled(&self, order_id: OrderId, quantity: U256) -> Result<bool>;

    /// Moves the order to cancelled, returning whether the row changed.
    /// Already terminal orders are left alone.
    async fn cancel_order(&self, order_id: OrderId) -> Result<bool>;

    /// Cancels every live order of the maker and kind with a nonce below the
    /// new one, returning the affected orders.
    async fn invalidate_stale_nonces(
        &self,
        maker: H160,
        kind: OrderKind,
        new_nonce: U256,
    ) -> Result<Vec<Order>>;

    async fn order_by_id(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Writes the owner's absolute balance of one token.
    async fn set_nft_balance(&self, event: &BalanceChangeEvent) -> Result<()>;

    /// Drops all recorded events at or above the block, returning the orders
    /// whose fills were affected.
    async fn delete_events_from(&self, block_number: u64) -> Result<Vec<OrderId>>;
}

pub struct Reconciler {
    storage: Arc<dyn EventStoring>,
    resolver: Arc<dyn RecomputesBestOrders>,
    /// Bound on how many tokens get their cache recomputed eagerly when a
    /// multi-token order changes.
    max_token_list_len: usize,
}

impl Reconciler {
    pub fn new(
        storage: Arc<dyn EventStoring>,
        resolver: Arc<dyn RecomputesBestOrders>,
        max_token_list_len: usize,
    ) -> Self {
        Self {
            storage,
            resolver,
            max_token_list_len,
        }
    }

    pub async fn apply_fill(&self, id: &EventId, event: &FillEvent) -> Result<()> {
        if !self.storage.record_fill(id, event).await? {
            tracing::debug!(?id, "fill event already recorded");
        }
        self.resync_filled_quantity(event.order_id).await?;
        // The token changed hands, so both cells are stale even if the order
        // itself is foreign to us.
        self.resolver
            .recompute(event.contract, event.token_id)
            .await
    }

    pub async fn apply_cancel(&self, id: &EventId, event: &CancelEvent) -> Result<()> {
        if !self.storage.record_cancel(id, event).await? {
            tracing::debug!(?id, "cancel event already recorded");
        }
        let Some(order) = self.storage.order_by_id(event.order_id).await? else {
            // A cancellation of an order we never stored.
            tracing::debug!(order_id = %event.order_id, "cancel for unknown order");
            return Ok(());
        };
        if self.storage.cancel_order(event.order_id).await? {
            self.recompute_order_tokens(&order).await?;
        }
        Ok(())
    }

    pub async fn apply_nonce_bump(&self, id: &EventId, event: &NonceBumpEvent) -> Result<()> {
        if !self.storage.record_nonce_bump(id, event).await? {
            tracing::debug!(?id, "nonce bump event already recorded");
        }
        let invalidated = self
            .storage
            .invalidate_stale_nonces(event.maker, event.kind, event.new_nonce)
            .await?;
        for order in &invalidated {
            self.recompute_order_tokens(order).await?;
        }
        Ok(())
    }

    /// Applies an ownership change. The balance write is an absolute upsert
    /// and therefore idempotent. The token's cells are recomputed because
    /// the new holder's bid no longer ranks and the previous holder's bid
    /// may now rank.
    pub async fn apply_balance_change(&self, event: &BalanceChangeEvent) -> Result<()> {
        self.storage.set_nft_balance(event).await?;
        self.resolver
            .recompute(event.contract, event.token_id)
            .await
    }

    /// Handles a reorg: drops every event at or above the block and re-sums
    /// the fills of every affected order from what remains.
    pub async fn handle_reorg(&self, from_block: u64) -> Result<()> {
        let touched = self.storage.delete_events_from(from_block).await?;
        for order_id in touched.into_iter().unique() {
            if self.resync_filled_quantity(order_id).await? {
                if let Some(order) = self.storage.order_by_id(order_id).await? {
                    self.recompute_order_tokens(&order).await?;
                }
            }
        }
        Ok(())
    }

    /// Re-derives the order's absolute filled quantity from the event log.
    /// Returns whether the stored value changed.
    async fn resync_filled_quantity(&self, order_id: OrderId) -> Result<bool> {
        let total = self.storage.total_filled(order_id).await?;
        self.storage.set_quantity_filled(order_id, total).await
    }

    /// Recomputes the best order cache for every token the order covers.
    /// Unbounded sets (contract wide, attributes) are skipped; their cells
    /// heal on the next targeted recompute.
    async fn recompute_order_tokens(&self, order: &Order) -> Result<()> {
        let contract = order.data.token_set.contract();
        let Some(token_ids) = order.data.token_set.members(self.max_token_list_len) else {
            tracing::debug!(
                order_id = %order.id,
                token_set = %order.data.token_set_id(),
                "skipping eager recompute for unbounded token set"
            );
            return Ok(());
        };
        for token_id in token_ids {
            self.resolver.recompute(contract, token_id).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::best_orders::MockRecomputesBestOrders,
        chrono::Utc,
        model::kinds::test_util,
        mockall::predicate::eq,
        std::sync::Mutex,
    };

    fn fill(order_id: OrderId, quantity: u64) -> FillEvent {
        FillEvent {
            order_id,
            taker: H160::from_low_u64_be(7),
            contract: test_util::COLLECTION,
            token_id: U256::one(),
            filled_quantity: quantity.into(),
        }
    }

    fn event_id(block: u64, log: u64) -> EventId {
        EventId {
            block_number: block,
            tx_hash: H256::from_low_u64_be(block),
            log_index: log,
            batch_index: 0,
        }
    }

    fn reconciler(
        storage: MockEventStoring,
        resolver: MockRecomputesBestOrders,
    ) -> Reconciler {
        Reconciler::new(Arc::new(storage), Arc::new(resolver), 10_000)
    }

    #[tokio::test]
    async fn replayed_fill_re_derives_without_double_counting() {
        // The event row swallows the duplicate, so the re-derived total is
        // unchanged and the status write is a no-op.
        let order_id = OrderId::from_integer(1);
        let mut storage = MockEventStoring::new();
        storage.expect_record_fill().returning(|_, _| Ok(false));
        storage
            .expect_total_filled()
            .with(eq(order_id))
            .returning(|_| Ok(U256::from(4)));
        storage
            .expect_set_quantity_filled()
            .with(eq(order_id), eq(U256::from(4)))
            .returning(|_, _| Ok(false));
        let mut resolver = MockRecomputesBestOrders::new();
        resolver.expect_recompute().returning(|_, _| Ok(()));

        let reconciler = reconciler(storage, resolver);
        reconciler
            .apply_fill(&event_id(1, 0), &fill(order_id, 4))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn fill_redelivery_finishes_an_interrupted_application() {
        // The first delivery records the event but dies before the derived
        // state is written. The redelivery sees an already recorded event
        // and still resyncs and recomputes.
        let order_id = OrderId::from_integer(1);
        let mut storage = MockEventStoring::new();
        storage
            .expect_record_fill()
            .times(1)
            .returning(|_, _| Ok(true));
        storage
            .expect_record_fill()
            .times(1)
            .returning(|_, _| Ok(false));
        storage
            .expect_total_filled()
            .returning(|_| Ok(U256::from(4)));
        storage
            .expect_set_quantity_filled()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("connection lost")));
        storage
            .expect_set_quantity_filled()
            .with(eq(order_id), eq(U256::from(4)))
            .times(1)
            .returning(|_, _| Ok(true));
        let mut resolver = MockRecomputesBestOrders::new();
        resolver.expect_recompute().times(1).returning(|_, _| Ok(()));

        let reconciler = reconciler(storage, resolver);
        let event = fill(order_id, 4);
        assert!(reconciler
            .apply_fill(&event_id(1, 0), &event)
            .await
            .is_err());
        reconciler.apply_fill(&event_id(1, 0), &event).await.unwrap();
    }

    #[tokio::test]
    async fn balance_change_updates_holders_and_recomputes() {
        let event = BalanceChangeEvent {
            contract: test_util::COLLECTION,
            token_id: U256::one(),
            owner: H160::from_low_u64_be(9),
            amount: U256::one(),
        };
        let mut storage = MockEventStoring::new();
        storage
            .expect_set_nft_balance()
            .with(eq(event))
            .times(1)
            .returning(|_| Ok(()));
        let mut resolver = MockRecomputesBestOrders::new();
        resolver
            .expect_recompute()
            .with(eq(test_util::COLLECTION), eq(U256::one()))
            .times(1)
            .returning(|_, _| Ok(()));

        let reconciler = reconciler(storage, resolver);
        reconciler.apply_balance_change(&event).await.unwrap();
    }

    #[tokio::test]
    async fn new_fill_resyncs_and_recomputes() {
        let order_id = OrderId::from_integer(1);
        let mut storage = MockEventStoring::new();
        storage.expect_record_fill().returning(|_, _| Ok(true));
        storage
            .expect_total_filled()
            .with(eq(order_id))
            .returning(|_| Ok(U256::from(4)));
        storage
            .expect_set_quantity_filled()
            .with(eq(order_id), eq(U256::from(4)))
            .returning(|_, _| Ok(true));
        let mut resolver = MockRecomputesBestOrders::new();
        resolver
            .expect_recompute()
            .with(eq(test_util::COLLECTION), eq(U256::one()))
            .times(1)
            .returning(|_, _| Ok(()));

        let reconciler = reconciler(storage, resolver);
        reconciler
            .apply_fill(&event_id(1, 0), &fill(order_id, 4))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn out_of_order_fills_converge_on_the_sum() {
        // Events arrive 6 then 4; the stored quantity is always the total of
        // everything recorded so far, never the latest event.
        let order_id = OrderId::from_integer(1);
        let recorded = Arc::new(Mutex::new(Vec::<U256>::new()));
        let written = Arc::new(Mutex::new(Vec::<U256>::new()));

        let mut storage = MockEventStoring::new();
        {
            let recorded = recorded.clone();
            storage.expect_record_fill().returning(move |_, event| {
                recorded.lock().unwrap().push(event.filled_quantity);
                Ok(true)
            });
        }
        {
            let recorded = recorded.clone();
            storage.expect_total_filled().returning(move |_| {
                Ok(recorded
                    .lock()
                    .unwrap()
                    .iter()
                    .copied()
                    .fold(U256::zero(), |sum, q| sum + q))
            });
        }
        {
            let written = written.clone();
            storage
                .expect_set_quantity_filled()
                .returning(move |_, quantity| {
                    written.lock().unwrap().push(quantity);
                    Ok(true)
                });
        }
        let mut resolver = MockRecomputesBestOrders::new();
        resolver.expect_recompute().returning(|_, _| Ok(()));

        let reconciler = reconciler(storage, resolver);
        reconciler
            .apply_fill(&event_id(2, 0), &fill(order_id, 6))
            .await
            .unwrap();
        reconciler
            .apply_fill(&event_id(1, 0), &fill(order_id, 4))
            .await
            .unwrap();
        assert_eq!(
            *written.lock().unwrap(),
            vec![U256::from(6), U256::from(10)]
        );
    }

    #[tokio::test]
    async fn cancel_recomputes_the_orders_token() {
        let order = Order::new(
            test_util::canonical_sell_order(),
            Default::default(),
            Utc::now(),
        );
        let order_id = order.id;
        let contract = order.data.contract;

        let mut storage = MockEventStoring::new();
        storage.expect_record_cancel().returning(|_, _| Ok(true));
        {
            let order = order.clone();
            storage
                .expect_order_by_id()
                .with(eq(order_id))
                .returning(move |_| Ok(Some(order.clone())));
        }
        storage
            .expect_cancel_order()
            .with(eq(order_id))
            .returning(|_| Ok(true));
        let mut resolver = MockRecomputesBestOrders::new();
        resolver
            .expect_recompute()
            .with(eq(contract), eq(U256::one()))
            .times(1)
            .returning(|_, _| Ok(()));

        let reconciler = reconciler(storage, resolver);
        reconciler
            .apply_cancel(&event_id(1, 0), &CancelEvent { order_id })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cancel_of_terminal_order_skips_recompute() {
        let order = Order::new(
            test_util::canonical_sell_order(),
            Default::default(),
            Utc::now(),
        );
        let order_id = order.id;

        let mut storage = MockEventStoring::new();
        storage.expect_record_cancel().returning(|_, _| Ok(true));
        storage
            .expect_order_by_id()
            .returning(move |_| Ok(Some(order.clone())));
        // Already cancelled or filled: the status write reports no change.
        storage.expect_cancel_order().returning(|_| Ok(false));
        let resolver = MockRecomputesBestOrders::new();

        let reconciler = reconciler(storage, resolver);
        reconciler
            .apply_cancel(&event_id(1, 0), &CancelEvent { order_id })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn nonce_bump_recomputes_every_invalidated_order() {
        let maker = test_util::MAKER;
        let sell = Order::new(
            test_util::canonical_sell_order(),
            Default::default(),
            Utc::now(),
        );
        let buy = Order::new(
            test_util::canonical_buy_order(),
            Default::default(),
            Utc::now(),
        );

        let mut storage = MockEventStoring::new();
        storage.expect_record_nonce_bump().returning(|_, _| Ok(true));
        {
            let invalidated = vec![sell.clone(), buy.clone()];
            storage
                .expect_invalidate_stale_nonces()
                .with(
                    eq(maker),
                    eq(OrderKind::SeaportV1_4),
                    eq(U256::from(5)),
                )
                .returning(move |_, _, _| Ok(invalidated.clone()));
        }
        let mut resolver = MockRecomputesBestOrders::new();
        // Both orders target the same single token.
        resolver
            .expect_recompute()
            .with(eq(test_util::COLLECTION), eq(U256::one()))
            .times(2)
            .returning(|_, _| Ok(()));

        let reconciler = reconciler(storage, resolver);
        reconciler
            .apply_nonce_bump(
                &event_id(1, 0),
                &NonceBumpEvent {
                    maker,
                    kind: OrderKind::SeaportV1_4,
                    new_nonce: 5.into(),
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn reorg_resyncs_touched_orders_once() {
        let order = Order::new(
            test_util::canonical_partial_order(),
            Default::default(),
            Utc::now(),
        );
        let order_id = order.id;

        let mut storage = MockEventStoring::new();
        // The same order shows up for two dropped events but is resynced
        // once.
        storage
            .expect_delete_events_from()
            .with(eq(5u64))
            .returning(move |_| Ok(vec![order_id, order_id]));
        storage
            .expect_total_filled()
            .times(1)
            .returning(|_| Ok(U256::from(3)));
        storage
            .expect_set_quantity_filled()
            .with(eq(order_id), eq(U256::from(3)))
            .times(1)
            .returning(|_, _| Ok(true));
        storage
            .expect_order_by_id()
            .returning(move |_| Ok(Some(order.clone())));
        let mut resolver = MockRecomputesBestOrders::new();
        resolver
            .expect_recompute()
            .times(1)
            .returning(|_, _| Ok(()));

        let reconciler = reconciler(storage, resolver);
        reconciler.handle_reorg(5).await.unwrap();
    }
}
