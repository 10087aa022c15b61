//! Order ingestion and revalidation.

use {
    crate::{
        best_orders::RecomputesBestOrders,
        fillability::{FillabilityChecker, Indeterminate, Verdict},
        unix_now,
    },
    anyhow::Result,
    chrono::Utc,
    model::{
        kinds::{self, CanonicalizeContext, FormatError},
        order::{Order, OrderId, OrderKind},
        signature::{SignatureData, VerificationError},
    },
    primitive_types::H160,
    std::{collections::HashSet, sync::Arc},
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum AddOrderError {
    #[error("malformed order: {0}")]
    InvalidFormat(#[from] FormatError),
    #[error("invalid maker signature: {0:?}")]
    InvalidSignature(VerificationError),
    #[error("invalid oracle co-signature: {0:?}")]
    InvalidOracleSignature(VerificationError),
    /// The order is dead on arrival (already cancelled, filled or expired).
    #[error("order is not fillable: {0:?}")]
    Unfillable(Verdict),
    /// The chain state needed to admit the order could not be read. The
    /// submission can be retried.
    #[error(transparent)]
    Unavailable(#[from] Indeterminate),
    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

impl From<VerificationError> for AddOrderError {
    fn from(err: VerificationError) -> Self {
        match err {
            VerificationError::InvalidOracleSignature(_)
            | VerificationError::UnknownOracle(_)
            | VerificationError::MissingOracleSignature => Self::InvalidOracleSignature(err),
            VerificationError::UnableToRecover(_) | VerificationError::UnexpectedSigner(_) => {
                Self::InvalidSignature(err)
            }
        }
    }
}

/// Order persistence as the ingestion path sees it.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait OrderStoring: Send + Sync {
    /// Inserts the order and materializes its token set. Returns false when
    /// the id already exists; resubmission refreshes the stored order's
    /// `updated_at` and is otherwise a no-op.
    async fn insert_order(&self, order: &Order) -> Result<bool>;

    async fn order_by_id(&self, id: OrderId) -> Result<Option<Order>>;

    /// Conditionally applies the verdict's statuses, returning whether the
    /// row changed. Terminal stored states are never overwritten.
    async fn apply_verdict(&self, id: OrderId, verdict: Verdict) -> Result<bool>;

    /// Ids of live orders not checked since the cutoff, stalest first.
    async fn stale_orders(
        &self,
        updated_before: chrono::DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OrderId>>;
}

pub struct Orderbook {
    storage: Arc<dyn OrderStoring>,
    checker: FillabilityChecker,
    resolver: Arc<dyn RecomputesBestOrders>,
    context: CanonicalizeContext,
    allowed_oracles: HashSet<H160>,
}

impl Orderbook {
    pub fn new(
        storage: Arc<dyn OrderStoring>,
        checker: FillabilityChecker,
        resolver: Arc<dyn RecomputesBestOrders>,
        context: CanonicalizeContext,
        allowed_oracles: HashSet<H160>,
    ) -> Self {
        Self {
            storage,
            checker,
            resolver,
            context,
            allowed_oracles,
        }
    }

    /// Admits a kind-native order payload into the orderbook.
    ///
    /// The payload is canonicalized, its signature verified against the
    /// kind's EIP-712 domain and its fillability checked against chain
    /// state. Orders that are merely blocked (missing balance or approval)
    /// are stored with those statuses and can heal on revalidation; orders
    /// that are dead on arrival are rejected. Submitting the same order
    /// twice returns the same id without touching the stored order.
    pub async fn add_order(
        &self,
        kind: OrderKind,
        payload: &serde_json::Value,
        signature: SignatureData,
    ) -> Result<OrderId, AddOrderError> {
        let data = kinds::canonicalize(kind, payload, &self.context)?;
        let domain = (kinds::handler(kind).domain)(self.context.chain_id)
            .ok_or(FormatError::UnsupportedChain(self.context.chain_id))?;
        signature.verify(
            &domain,
            &data.hash_struct(),
            data.maker,
            data.requires_oracle,
            &self.allowed_oracles,
        )?;

        let mut order = Order::new(data, signature, Utc::now());
        let verdict = self.checker.check(&order, unix_now()).await?;
        if verdict.fillability.is_terminal() {
            return Err(AddOrderError::Unfillable(verdict));
        }
        order.metadata.fillability_status = verdict.fillability;
        order.metadata.approval_status = verdict.approval;

        if self.storage.insert_order(&order).await? {
            self.recompute_order_tokens(&order).await?;
        } else {
            tracing::debug!(order_id = %order.id, "order resubmitted");
        }
        Ok(order.id)
    }

    /// Re-checks a stored order against current chain state and applies the
    /// result. Called periodically and on demand.
    pub async fn revalidate_order(&self, id: OrderId) -> Result<Option<Verdict>> {
        let Some(order) = self.storage.order_by_id(id).await? else {
            return Ok(None);
        };
        let verdict = self
            .checker
            .check(&order, unix_now())
            .await
            .map_err(|err| anyhow::Error::from(err).context("revalidation"))?;
        if self.storage.apply_verdict(id, verdict).await? {
            self.recompute_order_tokens(&order).await?;
        }
        Ok(Some(verdict))
    }

    pub async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        self.storage.order_by_id(id).await
    }

    /// One revalidation sweep: re-checks the live orders that have gone the
    /// longest without a check. Returns how many orders were looked at.
    pub async fn revalidate_stale(
        &self,
        updated_before: chrono::DateTime<Utc>,
        limit: i64,
    ) -> Result<usize> {
        let stale = self.storage.stale_orders(updated_before, limit).await?;
        let count = stale.len();
        for id in stale {
            if let Err(err) = self.revalidate_order(id).await {
                tracing::warn!(order_id = %id, ?err, "revalidation failed");
            }
        }
        Ok(count)
    }

    /// Runs revalidation sweeps forever. An order is due once it has gone a
    /// full interval without being touched.
    pub async fn run_revalidation_loop(self: Arc<Self>, interval: std::time::Duration) -> ! {
        // Unwrap because configured intervals are far below the chrono range.
        let staleness = chrono::Duration::from_std(interval).unwrap();
        loop {
            tokio::time::sleep(interval).await;
            match self.revalidate_stale(Utc::now() - staleness, 1_000).await {
                Ok(count) => tracing::debug!(count, "revalidation sweep"),
                Err(err) => tracing::warn!(?err, "revalidation sweep failed"),
            }
        }
    }

    async fn recompute_order_tokens(&self, order: &Order) -> Result<()> {
        let contract = order.data.token_set.contract();
        let Some(token_ids) = order
            .data
            .token_set
            .members(self.context.max_token_list_len)
        else {
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
        crate::{
            best_orders::MockRecomputesBestOrders,
            fillability::MockChainData,
        },
        model::{
            kinds::test_util,
            order::{ApprovalStatus, FillabilityStatus},
            signature::{EcdsaSignature, OracleSignature, Signature},
            DomainSeparator,
        },
        mockall::predicate::eq,
        primitive_types::U256,
        secp256k1::SecretKey,
        web3::signing::{Key, SecretKeyRef},
    };

    fn maker_key() -> SecretKey {
        SecretKey::from_slice(&[0x11; 32]).unwrap()
    }

    fn oracle_key() -> SecretKey {
        SecretKey::from_slice(&[0x22; 32]).unwrap()
    }

    fn key_address(key: &SecretKey) -> H160 {
        web3::signing::SecretKeyRef::new(key).address()
    }

    /// A seaport ask whose offerer is the test key's address, with a valid
    /// EIP-712 signature over it.
    fn signed_payload() -> (serde_json::Value, SignatureData, H160) {
        let key = maker_key();
        let maker = key_address(&key);
        let order = model::kinds::seaport_v1_4::Order {
            offerer: maker,
            consideration: test_util::seaport_ask()
                .consideration
                .into_iter()
                .map(|mut item| {
                    if item.recipient == test_util::MAKER {
                        item.recipient = maker;
                    }
                    item
                })
                .collect(),
            ..test_util::seaport_ask()
        };
        let domain = model::kinds::seaport_v1_4::domain(1).unwrap();
        let signature = EcdsaSignature::sign_typed(
            &domain,
            &order.hash_struct(),
            SecretKeyRef::new(&key),
        );
        let signature = SignatureData {
            signature: Signature::Eip712(signature),
            oracle: None,
        };
        (serde_json::to_value(&order).unwrap(), signature, maker)
    }

    fn fillable_chain() -> MockChainData {
        let mut chain = MockChainData::new();
        chain.expect_nonce_of().returning(|_, _| Ok(U256::zero()));
        chain
            .expect_nft_balance()
            .returning(|_, _, _| Ok(U256::one()));
        chain.expect_nft_approval().returning(|_, _, _| Ok(true));
        chain
    }

    fn orderbook(
        storage: MockOrderStoring,
        chain: MockChainData,
        resolver: MockRecomputesBestOrders,
        allowed_oracles: HashSet<H160>,
    ) -> Orderbook {
        Orderbook::new(
            Arc::new(storage),
            FillabilityChecker::new(Arc::new(chain), 1),
            Arc::new(resolver),
            Default::default(),
            allowed_oracles,
        )
    }

    #[tokio::test]
    async fn accepts_and_stores_a_valid_order() {
        let (payload, signature, _) = signed_payload();
        let mut storage = MockOrderStoring::new();
        storage
            .expect_insert_order()
            .withf(|order| {
                order.metadata.fillability_status == FillabilityStatus::Fillable
                    && order.metadata.approval_status == ApprovalStatus::Approved
            })
            .times(1)
            .returning(|_| Ok(true));
        let mut resolver = MockRecomputesBestOrders::new();
        resolver
            .expect_recompute()
            .with(eq(test_util::COLLECTION), eq(U256::one()))
            .times(1)
            .returning(|_, _| Ok(()));

        let orderbook = orderbook(storage, fillable_chain(), resolver, HashSet::new());
        let id = orderbook
            .add_order(OrderKind::SeaportV1_4, &payload, signature)
            .await
            .unwrap();
        assert_ne!(id, OrderId::default());
    }

    #[tokio::test]
    async fn resubmission_returns_the_same_id_without_recompute() {
        let (payload, signature, _) = signed_payload();
        let mut storage = MockOrderStoring::new();
        storage.expect_insert_order().returning(|_| Ok(false));
        // No recompute expectation: a duplicate must not trigger one.
        let resolver = MockRecomputesBestOrders::new();

        let orderbook = orderbook(storage, fillable_chain(), resolver, HashSet::new());
        orderbook
            .add_order(OrderKind::SeaportV1_4, &payload, signature)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rejects_wrong_signer() {
        let (payload, _, _) = signed_payload();
        // Signed by a different key than the offerer.
        let key = oracle_key();
        let order: model::kinds::seaport_v1_4::Order =
            serde_json::from_value(payload.clone()).unwrap();
        let domain = model::kinds::seaport_v1_4::domain(1).unwrap();
        let signature = SignatureData {
            signature: Signature::Eip712(EcdsaSignature::sign_typed(
                &domain,
                &order.hash_struct(),
                SecretKeyRef::new(&key),
            )),
            oracle: None,
        };

        let orderbook = orderbook(
            MockOrderStoring::new(),
            MockChainData::new(),
            MockRecomputesBestOrders::new(),
            HashSet::new(),
        );
        let result = orderbook
            .add_order(OrderKind::SeaportV1_4, &payload, signature)
            .await;
        assert!(matches!(result, Err(AddOrderError::InvalidSignature(_))));
    }

    #[tokio::test]
    async fn oracle_requirement_is_enforced() {
        // A blur order with the oracle flag set, signed by the maker.
        let key = maker_key();
        let maker = key_address(&key);
        let order = model::kinds::blur::Order {
            trader: maker,
            extra_params: vec![1],
            ..test_util::blur_ask()
        };
        let domain = model::kinds::blur::domain(1).unwrap();
        let maker_signature = Signature::Eip712(EcdsaSignature::sign_typed(
            &domain,
            &order.hash_struct(),
            SecretKeyRef::new(&key),
        ));
        let payload = serde_json::to_value(&order).unwrap();

        let orderbook = |oracles: HashSet<H160>| {
            let mut storage = MockOrderStoring::new();
            storage.expect_insert_order().returning(|_| Ok(true));
            let mut resolver = MockRecomputesBestOrders::new();
            resolver.expect_recompute().returning(|_, _| Ok(()));
            let mut chain = fillable_chain();
            chain
                .expect_ft_balance()
                .returning(|_, _| Ok(U256::MAX));
            super::tests::orderbook(storage, chain, resolver, oracles)
        };

        // Missing co-signature.
        let result = orderbook(HashSet::new())
            .add_order(
                OrderKind::Blur,
                &payload,
                SignatureData {
                    signature: maker_signature.clone(),
                    oracle: None,
                },
            )
            .await;
        assert!(matches!(
            result,
            Err(AddOrderError::InvalidOracleSignature(
                VerificationError::MissingOracleSignature
            ))
        ));

        // Co-signed by an oracle that is not allow-listed.
        let oracle = oracle_key();
        let co_signed = SignatureData {
            signature: maker_signature.clone(),
            oracle: Some(OracleSignature::sign(
                &order.hash_struct(),
                100,
                SecretKeyRef::new(&oracle),
            )),
        };
        let result = orderbook(HashSet::new())
            .add_order(OrderKind::Blur, &payload, co_signed.clone())
            .await;
        assert!(matches!(
            result,
            Err(AddOrderError::InvalidOracleSignature(
                VerificationError::UnknownOracle(_)
            ))
        ));

        // Allow-listed oracle passes.
        let mut allowed = HashSet::new();
        allowed.insert(key_address(&oracle));
        orderbook(allowed)
            .add_order(OrderKind::Blur, &payload, co_signed)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn dead_on_arrival_orders_are_rejected() {
        let (payload, signature, _) = signed_payload();
        // The maker's on-chain nonce has moved past the order's.
        let mut chain = MockChainData::new();
        chain
            .expect_nonce_of()
            .returning(|_, _| Ok(U256::from(100)));

        let orderbook = orderbook(
            MockOrderStoring::new(),
            chain,
            MockRecomputesBestOrders::new(),
            HashSet::new(),
        );
        let result = orderbook
            .add_order(OrderKind::SeaportV1_4, &payload, signature)
            .await;
        assert!(matches!(result, Err(AddOrderError::Unfillable(_))));
    }

    #[tokio::test]
    async fn blocked_orders_are_stored_with_their_statuses() {
        let (payload, signature, _) = signed_payload();
        let mut chain = MockChainData::new();
        chain.expect_nonce_of().returning(|_, _| Ok(U256::zero()));
        chain
            .expect_nft_balance()
            .returning(|_, _, _| Ok(U256::zero()));
        chain.expect_nft_approval().returning(|_, _, _| Ok(true));

        let mut storage = MockOrderStoring::new();
        storage
            .expect_insert_order()
            .withf(|order| {
                order.metadata.fillability_status == FillabilityStatus::NoBalance
            })
            .returning(|_| Ok(true));
        let mut resolver = MockRecomputesBestOrders::new();
        resolver.expect_recompute().returning(|_, _| Ok(()));

        let orderbook = orderbook(storage, chain, resolver, HashSet::new());
        orderbook
            .add_order(OrderKind::SeaportV1_4, &payload, signature)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn chain_outage_is_retryable() {
        let (payload, signature, _) = signed_payload();
        let mut chain = MockChainData::new();
        chain
            .expect_nonce_of()
            .returning(|_, _| Err(anyhow::anyhow!("node down")));

        let orderbook = orderbook(
            MockOrderStoring::new(),
            chain,
            MockRecomputesBestOrders::new(),
            HashSet::new(),
        );
        let result = orderbook
            .add_order(OrderKind::SeaportV1_4, &payload, signature)
            .await;
        assert!(matches!(result, Err(AddOrderError::Unavailable(_))));
    }

    #[tokio::test]
    async fn revalidation_applies_the_verdict_and_recomputes() {
        let order = Order::new(
            test_util::canonical_sell_order(),
            Default::default(),
            Utc::now(),
        );
        let id = order.id;

        let mut storage = MockOrderStoring::new();
        {
            let order = order.clone();
            storage
                .expect_order_by_id()
                .with(eq(id))
                .returning(move |_| Ok(Some(order.clone())));
        }
        storage
            .expect_apply_verdict()
            .withf(|_, verdict| verdict.fillability == FillabilityStatus::NoBalance)
            .returning(|_, _| Ok(true));
        let mut chain = MockChainData::new();
        chain.expect_nonce_of().returning(|_, _| Ok(U256::zero()));
        chain
            .expect_nft_balance()
            .returning(|_, _, _| Ok(U256::zero()));
        chain.expect_nft_approval().returning(|_, _, _| Ok(true));
        let mut resolver = MockRecomputesBestOrders::new();
        resolver
            .expect_recompute()
            .times(1)
            .returning(|_, _| Ok(()));

        let orderbook = orderbook(storage, chain, resolver, HashSet::new());
        let verdict = orderbook.revalidate_order(id).await.unwrap().unwrap();
        assert_eq!(verdict.fillability, FillabilityStatus::NoBalance);
    }

    #[tokio::test]
    async fn revalidation_sweep_covers_all_stale_orders() {
        let order = Order::new(
            test_util::canonical_sell_order(),
            Default::default(),
            Utc::now(),
        );
        let id = order.id;

        let mut storage = MockOrderStoring::new();
        storage
            .expect_stale_orders()
            .returning(move |_, _| Ok(vec![id]));
        storage
            .expect_order_by_id()
            .returning(move |_| Ok(Some(order.clone())));
        // Unchanged verdict: no recompute happens.
        storage.expect_apply_verdict().returning(|_, _| Ok(false));

        let orderbook = orderbook(
            storage,
            fillable_chain(),
            MockRecomputesBestOrders::new(),
            HashSet::new(),
        );
        let count = orderbook
            .revalidate_stale(Utc::now(), 10)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn signed_payload_round_trips_through_canonicalizer() {
        // Sanity check on the fixture itself: the canonicalized order's
        // domain and struct hash are what the signature was made over.
        let (payload, signature, maker) = signed_payload();
        let data = kinds::canonicalize(
            OrderKind::SeaportV1_4,
            &payload,
            &CanonicalizeContext::default(),
        )
        .unwrap();
        assert_eq!(data.maker, maker);
        let domain = DomainSeparator::new(
            "Seaport",
            "1.4",
            1,
            model::kinds::seaport_v1_4::exchange(1).unwrap(),
        );
        signature
            .verify(&domain, &data.hash_struct(), maker, false, &HashSet::new())
            .unwrap();
    }
}
