//! Checks stored orders against current chain state: maker nonce, balances
//! and transfer approvals.

use {
    anyhow::anyhow,
    model::{
        kinds,
        order::{ApprovalStatus, FillabilityStatus, Order, OrderKind, Side},
        tokenset::TokenSet,
        NATIVE_ETH,
    },
    primitive_types::{H160, U256},
    std::sync::Arc,
    thiserror::Error,
};

/// Read access to the chain state the checks depend on. Implemented over an
/// ethereum node; mocked in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ChainData: Send + Sync {
    /// The maker's current exchange-side nonce for the given kind.
    async fn nonce_of(&self, kind: OrderKind, maker: H160) -> anyhow::Result<U256>;

    /// ERC-20 (or native) balance of the owner.
    async fn ft_balance(&self, token: H160, owner: H160) -> anyhow::Result<U256>;

    /// ERC-20 allowance granted by the owner to the spender.
    async fn ft_allowance(&self, token: H160, owner: H160, spender: H160)
        -> anyhow::Result<U256>;

    /// How many units of the token the owner holds. 0 or 1 for ERC-721.
    async fn nft_balance(&self, contract: H160, token_id: U256, owner: H160)
        -> anyhow::Result<U256>;

    /// Whether the owner has approved the operator for the whole collection.
    async fn nft_approval(
        &self,
        contract: H160,
        owner: H160,
        operator: H160,
    ) -> anyhow::Result<bool>;
}

/// The check could not be performed. Distinct from a negative verdict: the
/// order's stored status must not change on an indeterminate check.
#[derive(Debug, Error)]
#[error("fillability check inconclusive")]
pub struct Indeterminate(#[source] pub anyhow::Error);

/// Result of a fillability check, one value per status axis.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Verdict {
    pub fillability: FillabilityStatus,
    pub approval: ApprovalStatus,
}

impl Verdict {
    pub fn ok(&self) -> bool {
        self.fillability == FillabilityStatus::Fillable
            && self.approval == ApprovalStatus::Approved
    }
}

pub struct FillabilityChecker {
    chain: Arc<dyn ChainData>,
    chain_id: u64,
}

impl FillabilityChecker {
    pub fn new(chain: Arc<dyn ChainData>, chain_id: u64) -> Self {
        Self { chain, chain_id }
    }

    /// The spender the maker must have approved for this kind. Stored orders
    /// were admitted for this chain, so a missing operator is a chain
    /// misconfiguration, not a property of the order.
    fn transfer_operator(&self, kind: OrderKind) -> Result<H160, Indeterminate> {
        (kinds::handler(kind).transfer_operator)(self.chain_id).ok_or_else(|| {
            Indeterminate(anyhow!(
                "order kind not deployed on chain {}",
                self.chain_id
            ))
        })
    }

    /// Checks one order against chain state at `now` (unix seconds).
    ///
    /// Terminal stored statuses are returned unchanged without touching the
    /// chain. Orders whose window has not opened yet are checked like live
    /// ones; the ranking layer is what keeps them out of best-order results.
    pub async fn check(&self, order: &Order, now: u64) -> Result<Verdict, Indeterminate> {
        if order.metadata.fillability_status.is_terminal() {
            return Ok(Verdict {
                fillability: order.metadata.fillability_status,
                approval: order.metadata.approval_status,
            });
        }
        if order.data.is_expired_at(now) {
            return Ok(Verdict {
                fillability: FillabilityStatus::Expired,
                approval: order.metadata.approval_status,
            });
        }

        let chain_nonce = self
            .chain
            .nonce_of(order.data.kind, order.data.maker)
            .await
            .map_err(Indeterminate)?;
        if order.data.nonce < chain_nonce {
            return Ok(Verdict {
                fillability: FillabilityStatus::Cancelled,
                approval: order.metadata.approval_status,
            });
        }

        match order.data.side {
            Side::Sell => self.check_sell(order).await,
            Side::Buy => self.check_buy(order).await,
        }
    }

    async fn check_sell(&self, order: &Order) -> Result<Verdict, Indeterminate> {
        // A criteria ask does not commit to a single token, so there is no
        // specific balance to probe. Only the approval check applies.
        let fillability = match &order.data.token_set {
            TokenSet::SingleToken { contract, token_id } => {
                let held = self
                    .chain
                    .nft_balance(*contract, *token_id, order.data.maker)
                    .await
                    .map_err(Indeterminate)?;
                if held >= order.metadata.quantity_remaining {
                    FillabilityStatus::Fillable
                } else {
                    FillabilityStatus::NoBalance
                }
            }
            _ => FillabilityStatus::Fillable,
        };

        let approval = self.nft_approval(order).await?;
        Ok(Verdict {
            fillability,
            approval,
        })
    }

    async fn check_buy(&self, order: &Order) -> Result<Verdict, Indeterminate> {
        // A bid escrows nothing; the maker must hold and have approved the
        // payment for the still unfilled part of the order.
        let required = remaining_payment(order);
        let balance = self
            .chain
            .ft_balance(order.data.currency, order.data.maker)
            .await
            .map_err(Indeterminate)?;
        let fillability = if balance >= required {
            FillabilityStatus::Fillable
        } else {
            FillabilityStatus::NoBalance
        };

        // Native currency needs no allowance.
        let approval = if order.data.currency == NATIVE_ETH {
            ApprovalStatus::Approved
        } else {
            let operator = self.transfer_operator(order.data.kind)?;
            let allowance = self
                .chain
                .ft_allowance(order.data.currency, order.data.maker, operator)
                .await
                .map_err(Indeterminate)?;
            if allowance >= required {
                ApprovalStatus::Approved
            } else {
                ApprovalStatus::NoApproval
            }
        };
        Ok(Verdict {
            fillability,
            approval,
        })
    }

    async fn nft_approval(&self, order: &Order) -> Result<ApprovalStatus, Indeterminate> {
        let operator = self.transfer_operator(order.data.kind)?;
        let approved = self
            .chain
            .nft_approval(order.data.contract, order.data.maker, operator)
            .await
            .map_err(Indeterminate)?;
        Ok(if approved {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::NoApproval
        })
    }
}

/// The payment a bid's maker still owes if the rest of the order gets filled:
/// `price * quantity_remaining / amount`, rounded up.
fn remaining_payment(order: &Order) -> U256 {
    let price = order.data.price;
    let remaining = order.metadata.quantity_remaining;
    let amount = order.data.amount;
    if amount.is_zero() || remaining == amount {
        return price;
    }
    let scaled = price.full_mul(remaining);
    let (quotient, residue) = scaled.div_mod(amount.into());
    let quotient = U256::try_from(quotient).unwrap_or(U256::MAX);
    if residue.is_zero() {
        quotient
    } else {
        quotient.saturating_add(U256::one())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        chrono::Utc,
        mockall::predicate::eq,
        model::kinds::test_util,
    };

    fn order(data: model::order::CanonicalOrder) -> Order {
        Order::new(data, Default::default(), Utc::now())
    }

    fn chain_with_nonce(nonce: u64) -> MockChainData {
        let mut chain = MockChainData::new();
        chain
            .expect_nonce_of()
            .returning(move |_, _| Ok(U256::from(nonce)));
        chain
    }

    #[tokio::test]
    async fn fillable_ask() {
        let order = order(test_util::canonical_sell_order());
        let mut chain = chain_with_nonce(0);
        chain
            .expect_nft_balance()
            .with(
                eq(order.data.contract),
                eq(U256::one()),
                eq(order.data.maker),
            )
            .returning(|_, _, _| Ok(U256::one()));
        chain.expect_nft_approval().returning(|_, _, _| Ok(true));

        let checker = FillabilityChecker::new(Arc::new(chain), 1);
        let verdict = checker.check(&order, 0).await.unwrap();
        assert!(verdict.ok());
    }

    #[tokio::test]
    async fn ask_without_token_or_approval() {
        let order = order(test_util::canonical_sell_order());
        let mut chain = chain_with_nonce(0);
        chain
            .expect_nft_balance()
            .returning(|_, _, _| Ok(U256::zero()));
        chain.expect_nft_approval().returning(|_, _, _| Ok(false));

        let checker = FillabilityChecker::new(Arc::new(chain), 1);
        let verdict = checker.check(&order, 0).await.unwrap();
        // Both axes report independently.
        assert_eq!(verdict.fillability, FillabilityStatus::NoBalance);
        assert_eq!(verdict.approval, ApprovalStatus::NoApproval);
    }

    #[tokio::test]
    async fn bid_needs_balance_and_allowance() {
        let order = order(test_util::canonical_buy_order());
        let price = order.data.price;
        let operator = (kinds::handler(order.data.kind).transfer_operator)(1).unwrap();

        let mut chain = chain_with_nonce(0);
        chain
            .expect_ft_balance()
            .with(eq(order.data.currency), eq(order.data.maker))
            .returning(move |_, _| Ok(price));
        chain
            .expect_ft_allowance()
            .with(eq(order.data.currency), eq(order.data.maker), eq(operator))
            .returning(move |_, _, _| Ok(price - U256::one()));

        let checker = FillabilityChecker::new(Arc::new(chain), 1);
        let verdict = checker.check(&order, 0).await.unwrap();
        assert_eq!(verdict.fillability, FillabilityStatus::Fillable);
        assert_eq!(verdict.approval, ApprovalStatus::NoApproval);
    }

    #[tokio::test]
    async fn native_bid_skips_allowance() {
        let mut data = test_util::canonical_buy_order();
        data.currency = model::NATIVE_ETH;
        let order = order(data);
        let price = order.data.price;

        let mut chain = chain_with_nonce(0);
        chain
            .expect_ft_balance()
            .returning(move |_, _| Ok(price));
        // No ft_allowance expectation: calling it would panic the mock.

        let checker = FillabilityChecker::new(Arc::new(chain), 1);
        let verdict = checker.check(&order, 0).await.unwrap();
        assert!(verdict.ok());
    }

    #[tokio::test]
    async fn stale_nonce_cancels() {
        let order = order(test_util::canonical_sell_order());
        let chain = chain_with_nonce(100);
        let checker = FillabilityChecker::new(Arc::new(chain), 1);
        let verdict = checker.check(&order, 0).await.unwrap();
        assert_eq!(verdict.fillability, FillabilityStatus::Cancelled);
    }

    #[tokio::test]
    async fn expiry_beats_chain_calls() {
        let mut data = test_util::canonical_sell_order();
        data.valid_until = 10;
        let order = order(data);
        // No expectations at all: the check must not reach the chain.
        let chain = MockChainData::new();
        let checker = FillabilityChecker::new(Arc::new(chain), 1);
        let verdict = checker.check(&order, 10).await.unwrap();
        assert_eq!(verdict.fillability, FillabilityStatus::Expired);
    }

    #[tokio::test]
    async fn terminal_status_short_circuits() {
        let mut order = order(test_util::canonical_sell_order());
        order.metadata.fillability_status = FillabilityStatus::Cancelled;
        let chain = MockChainData::new();
        let checker = FillabilityChecker::new(Arc::new(chain), 1);
        let verdict = checker.check(&order, 0).await.unwrap();
        assert_eq!(verdict.fillability, FillabilityStatus::Cancelled);
    }

    fn canonical_partial_bid() -> model::order::CanonicalOrder {
        let bid = model::kinds::zeroex_v4::Erc1155Order {
            direction: 1,
            ..test_util::zeroex_ask()
        };
        model::kinds::zeroex_v4::canonical(bid, &Default::default()).unwrap()
    }

    #[tokio::test]
    async fn partial_bid_checks_remaining_payment() {
        let mut order = order(canonical_partial_bid());
        assert_eq!(order.data.side, model::order::Side::Buy);
        // 6 of 10 units already filled: only 40% of the price is still owed.
        order.metadata.quantity_filled = U256::from(6);
        order.metadata.quantity_remaining = U256::from(4);
        let required = remaining_payment(&order);
        assert!(required < order.data.price);

        let mut chain = chain_with_nonce(0);
        chain
            .expect_ft_balance()
            .returning(move |_, _| Ok(required));
        chain
            .expect_ft_allowance()
            .returning(move |_, _, _| Ok(required));

        let checker = FillabilityChecker::new(Arc::new(chain), 1);
        let verdict = checker.check(&order, 0).await.unwrap();
        assert!(verdict.ok());
    }

    #[tokio::test]
    async fn chain_error_is_indeterminate() {
        let order = order(test_util::canonical_sell_order());
        let mut chain = MockChainData::new();
        chain
            .expect_nonce_of()
            .returning(|_, _| Err(anyhow::anyhow!("node down")));
        let checker = FillabilityChecker::new(Arc::new(chain), 1);
        assert!(checker.check(&order, 0).await.is_err());
    }

    #[test]
    fn remaining_payment_rounds_up() {
        let mut order = order(test_util::canonical_partial_order());
        order.data.price = U256::from(10);
        order.data.amount = U256::from(3);
        order.metadata.quantity_remaining = U256::from(1);
        // 10 / 3 rounds up to 4.
        assert_eq!(remaining_payment(&order), U256::from(4));
    }
}
