//! Maintains the per-token best order cache: the cheapest live ask and the
//! highest live bid for every (contract, token) pair.

use {
    crate::unix_now,
    anyhow::Result,
    model::order::{Order, OrderId, Side},
    primitive_types::{H160, U256},
    std::{collections::HashSet, sync::Arc},
};

/// A change of the cached winner for one (contract, token, side) cell.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BestOrderChange {
    pub contract: H160,
    pub token_id: U256,
    pub side: Side,
    pub previous: Option<OrderId>,
    pub new: Option<OrderId>,
}

/// Storage the resolver recomputes from and writes to.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait BestOrderStoring: Send + Sync {
    /// All orders of the side that could match the token right now.
    async fn rankable_orders(
        &self,
        contract: H160,
        token_id: U256,
        side: Side,
        now: u64,
    ) -> Result<Vec<Order>>;

    /// Current holders of the token, for bid self-fill exclusion.
    async fn token_owners(&self, contract: H160, token_id: U256) -> Result<Vec<H160>>;

    /// Writes the recomputed winner, returning the transition if the cached
    /// value actually changed.
    async fn write_best(
        &self,
        contract: H160,
        token_id: U256,
        side: Side,
        winner: Option<Winner>,
    ) -> Result<Option<BestOrderChange>>;
}

/// What the cache stores about the winning order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Winner {
    pub order_id: OrderId,
    pub value: U256,
    pub maker: H160,
}

impl From<&Order> for Winner {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            value: order.data.value,
            maker: order.data.maker,
        }
    }
}

/// Downstream consumer of best order transitions (websocket feeds, webhook
/// dispatch).
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, change: &BestOrderChange);
}

/// A notifier that only logs the transition.
#[derive(Default)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, change: &BestOrderChange) {
        tracing::info!(
            contract = ?change.contract,
            token_id = %change.token_id,
            side = ?change.side,
            previous = ?change.previous,
            new = ?change.new,
            "best order changed"
        );
    }
}

/// Picks the winner among the candidates.
///
/// Asks rank by lowest net value, bids by highest. Ties break on the earlier
/// validity start, then on the lower order id so the result is deterministic.
/// Taker-designated orders never win: a private order is not the public
/// floor. On the buy side, bids from a current holder of the token are
/// excluded because the maker cannot buy from themselves.
pub fn select_best<'a>(
    candidates: &'a [Order],
    side: Side,
    now: u64,
    owners: &HashSet<H160>,
) -> Option<&'a Order> {
    candidates
        .iter()
        .filter(|order| {
            order.data.side == side
                && order.data.taker.is_none()
                && order.is_rankable_at(now)
                && (side == Side::Sell || !owners.contains(&order.data.maker))
        })
        .min_by_key(|order| {
            let value = match side {
                Side::Sell => order.data.value,
                // Invert so that min_by_key picks the highest bid.
                Side::Buy => U256::MAX - order.data.value,
            };
            (value, order.data.valid_from, order.id)
        })
}

/// What the rest of the engine sees of the resolver: "this token's winners
/// may have changed, recompute them".
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RecomputesBestOrders: Send + Sync {
    async fn recompute(&self, contract: H160, token_id: U256) -> Result<()>;
}

pub struct BestOrderResolver {
    storage: Arc<dyn BestOrderStoring>,
    notifier: Arc<dyn Notifier>,
}

#[async_trait::async_trait]
impl RecomputesBestOrders for BestOrderResolver {
    async fn recompute(&self, contract: H160, token_id: U256) -> Result<()> {
        BestOrderResolver::recompute(self, contract, token_id).await
    }
}

impl BestOrderResolver {
    pub fn new(storage: Arc<dyn BestOrderStoring>, notifier: Arc<dyn Notifier>) -> Self {
        Self { storage, notifier }
    }

    /// Recomputes both sides of one token's cache cell and notifies for every
    /// transition. Writing the same winner again is a no-op.
    pub async fn recompute(&self, contract: H160, token_id: U256) -> Result<()> {
        for side in [Side::Sell, Side::Buy] {
            self.recompute_side(contract, token_id, side).await?;
        }
        Ok(())
    }

    pub async fn recompute_side(
        &self,
        contract: H160,
        token_id: U256,
        side: Side,
    ) -> Result<()> {
        let now = unix_now();
        let candidates = self
            .storage
            .rankable_orders(contract, token_id, side, now)
            .await?;
        let owners = match side {
            Side::Buy => self
                .storage
                .token_owners(contract, token_id)
                .await?
                .into_iter()
                .collect(),
            Side::Sell => HashSet::new(),
        };
        let winner = select_best(&candidates, side, now, &owners).map(Winner::from);
        if let Some(change) = self
            .storage
            .write_best(contract, token_id, side, winner)
            .await?
        {
            self.notifier.notify(&change).await;
        }
        Ok(())
    }
}
