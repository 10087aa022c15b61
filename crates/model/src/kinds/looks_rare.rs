//! LooksRare v1 maker orders.
//!
//! The strategy contract determines the matching semantics: fixed-price
//! single-token sales and collection-wide bids are supported, anything else
//! is rejected.

use {
    super::{hash_encoded, CanonicalizeContext, FormatError, KindData},
    crate::{
        bytes_hex,
        fee::{self, FeeEntry, FeeKind, BPS_DENOMINATOR},
        order::{CanonicalOrder, OrderKind, Side},
        tokenset::TokenSet,
        u256_decimal,
        DomainSeparator,
    },
    hex_literal::hex,
    lazy_static::lazy_static,
    primitive_types::{H160, U256},
    serde::{Deserialize, Serialize},
    web3::{ethabi::Token, signing},
};

const EXCHANGE: H160 = H160(hex!("59728544b08ab483533076417fbbb2fd0b17ce3a"));
const TRANSFER_MANAGER_ERC721: H160 = H160(hex!("f42aa99f011a1fa7cda90e5e98b277e306bca83e"));
pub const STRATEGY_FIXED_PRICE: H160 = H160(hex!("56244bb70cbd3ea9dc8007399f61dfc065190031"));
pub const STRATEGY_COLLECTION_BID: H160 = H160(hex!("86f909f70813cdb1bc733f4d97dc6b03b8e7e8f3"));
pub const FEE_RECIPIENT: H160 = H160(hex!("5924a28caaf1cc016617874a2f0c3710d881f3c1"));

pub fn exchange(chain_id: u64) -> Option<H160> {
    (chain_id == 1).then_some(EXCHANGE)
}

pub fn domain(chain_id: u64) -> Option<DomainSeparator> {
    Some(DomainSeparator::new(
        "LooksRareExchange",
        "1",
        chain_id,
        exchange(chain_id)?,
    ))
}

pub fn transfer_operator(chain_id: u64) -> Option<H160> {
    exchange(chain_id).map(|_| TRANSFER_MANAGER_ERC721)
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MakerOrder {
    pub is_order_ask: bool,
    pub signer: H160,
    pub collection: H160,
    #[serde(with = "u256_decimal")]
    pub price: U256,
    #[serde(with = "u256_decimal")]
    pub token_id: U256,
    #[serde(with = "u256_decimal")]
    pub amount: U256,
    pub strategy: H160,
    pub currency: H160,
    #[serde(with = "u256_decimal")]
    pub nonce: U256,
    #[serde(default)]
    pub start_time: u64,
    #[serde(default)]
    pub end_time: u64,
    /// `10_000 - total fee bps`; the floor of what the maker accepts.
    #[serde(with = "u256_decimal")]
    pub min_percentage_to_ask: U256,
    #[serde(default, with = "bytes_hex")]
    pub params: Vec<u8>,
}

lazy_static! {
    static ref ORDER_TYPE_HASH: [u8; 32] = signing::keccak256(
        b"MakerOrder(\
            bool isOrderAsk,address signer,address collection,uint256 price,\
            uint256 tokenId,uint256 amount,address strategy,address currency,\
            uint256 nonce,uint256 startTime,uint256 endTime,\
            uint256 minPercentageToAsk,bytes params\
        )"
    );
}

impl MakerOrder {
    pub fn hash_struct(&self) -> [u8; 32] {
        hash_encoded(&[
            Token::FixedBytes(ORDER_TYPE_HASH.to_vec()),
            Token::Bool(self.is_order_ask),
            Token::Address(self.signer),
            Token::Address(self.collection),
            Token::Uint(self.price),
            Token::Uint(self.token_id),
            Token::Uint(self.amount),
            Token::Address(self.strategy),
            Token::Address(self.currency),
            Token::Uint(self.nonce),
            Token::Uint(self.start_time.into()),
            Token::Uint(self.end_time.into()),
            Token::Uint(self.min_percentage_to_ask),
            Token::FixedBytes(signing::keccak256(&self.params).to_vec()),
        ])
    }
}

pub(super) fn canonicalize_json(
    value: &serde_json::Value,
    context: &CanonicalizeContext,
) -> Result<CanonicalOrder, FormatError> {
    let order: MakerOrder = serde_json::from_value(value.clone())?;
    canonical(order, context)
}

pub fn canonical(
    order: MakerOrder,
    context: &CanonicalizeContext,
) -> Result<CanonicalOrder, FormatError> {
    exchange(context.chain_id).ok_or(FormatError::UnsupportedChain(context.chain_id))?;
    if order.amount.is_zero() {
        return Err(FormatError::ZeroAmount);
    }

    let side = if order.is_order_ask {
        Side::Sell
    } else {
        Side::Buy
    };
    let token_set = if order.strategy == STRATEGY_FIXED_PRICE {
        TokenSet::SingleToken {
            contract: order.collection,
            token_id: order.token_id,
        }
    } else if order.strategy == STRATEGY_COLLECTION_BID {
        if order.is_order_ask {
            return Err(FormatError::InconsistentOrder(
                "collection strategy is bid only",
            ));
        }
        TokenSet::ContractWide {
            contract: order.collection,
        }
    } else {
        return Err(FormatError::UnsupportedStructure(
            "unknown execution strategy",
        ));
    };

    if order.min_percentage_to_ask > U256::from(BPS_DENOMINATOR) {
        return Err(FormatError::InconsistentOrder(
            "minPercentageToAsk above 100%",
        ));
    }
    // Fees are taken out of the ask proceeds; for bids the maker pays the
    // gross price and fees come out of the counterparty's side.
    let fee_bps = BPS_DENOMINATOR - order.min_percentage_to_ask.as_u32();
    let fees = match (side, fee_bps) {
        (Side::Buy, _) | (_, 0) => vec![],
        (Side::Sell, bps) => vec![FeeEntry {
            recipient: FEE_RECIPIENT,
            // Unwrap is fine: bps <= BPS_DENOMINATOR < u16::MAX.
            bps: u16::try_from(bps).unwrap_or(u16::MAX),
            kind: FeeKind::Marketplace,
        }],
    };
    let value = fee::net_value(side, order.price, &fees)?;

    Ok(CanonicalOrder {
        kind: OrderKind::LooksRare,
        side,
        maker: order.signer,
        taker: None,
        contract: order.collection,
        token_set,
        currency: order.currency,
        price: order.price,
        value,
        fee_breakdown: fees,
        amount: order.amount,
        valid_from: order.start_time,
        valid_until: order.end_time,
        nonce: order.nonce,
        requires_oracle: false,
        kind_data: KindData::LooksRare(order),
    })
}
