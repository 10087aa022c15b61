use {
    super::{order_id, Postgres},
    crate::{
        best_orders::{BestOrderChange, BestOrderStoring, Winner},
        conversions,
    },
    anyhow::{Context, Result},
    model::{
        order::{Order, OrderId, Side},
        tokenset::TokenSet,
    },
    primitive_types::{H160, U256},
};

#[async_trait::async_trait]
impl BestOrderStoring for Postgres {
    async fn rankable_orders(
        &self,
        contract: H160,
        token_id: U256,
        side: Side,
        now: u64,
    ) -> Result<Vec<Order>> {
        // Single token and contract wide sets have ids computable without
        // the materialization table; everything else resolves through it.
        let direct_set_ids = [
            TokenSet::SingleToken { contract, token_id }.id(),
            TokenSet::ContractWide { contract }.id(),
        ];
        let mut ex = self.pool.acquire().await?;
        let rows = database::orders::rankable_orders(
            &mut ex,
            &database::byte_array::ByteArray(contract.0),
            &conversions::u256_to_big_decimal(&token_id),
            conversions::side_to_database(side),
            i64::try_from(now).context("timestamp out of range")?,
            &direct_set_ids,
        )
        .await?;
        rows.into_iter()
            .map(|row| conversions::order_from_database(row, &self.context))
            .collect()
    }

    async fn token_owners(&self, contract: H160, token_id: U256) -> Result<Vec<H160>> {
        let mut ex = self.pool.acquire().await?;
        let owners = database::nft_balances::owners_of(
            &mut ex,
            &database::byte_array::ByteArray(contract.0),
            &conversions::u256_to_big_decimal(&token_id),
        )
        .await?;
        Ok(owners
            .into_iter()
            .map(conversions::address_from_database)
            .collect())
    }

    async fn write_best(
        &self,
        contract: H160,
        token_id: U256,
        side: Side,
        winner: Option<Winner>,
    ) -> Result<Option<BestOrderChange>> {
        let mut ex = self.pool.acquire().await?;
        let change = database::best_orders::upsert(
            &mut ex,
            &database::byte_array::ByteArray(contract.0),
            &conversions::u256_to_big_decimal(&token_id),
            conversions::side_to_database(side),
            winner.map(|winner| {
                (
                    order_id(winner.order_id),
                    conversions::u256_to_big_decimal(&winner.value),
                    conversions::address_to_database(winner.maker),
                )
            }),
        )
        .await?;
        Ok(change.map(|change| BestOrderChange {
            contract,
            token_id,
            side,
            previous: change.previous_order_id.map(|id| OrderId(id.0)),
            new: change.new_order_id.map(|id| OrderId(id.0)),
        }))
    }
}
