//! Blur exchange orders.
//!
//! Blur orders are always single-token. Orders whose extra params carry the
//! oracle authorization flag are only fillable with a fresh oracle
//! co-signature.

use {
    super::{hash_concat, hash_encoded, CanonicalizeContext, FormatError, KindData},
    crate::{
        bytes_hex,
        fee::{self, FeeEntry, FeeKind},
        order::{CanonicalOrder, OrderKind, Side},
        tokenset::TokenSet,
        u256_decimal,
        DomainSeparator, NATIVE_ETH,
    },
    hex_literal::hex,
    lazy_static::lazy_static,
    primitive_types::{H160, U256},
    serde::{Deserialize, Serialize},
    web3::{ethabi::Token, signing},
};

const EXCHANGE: H160 = H160(hex!("000000000000ad05ccc4f10045630fb830b95127"));
/// The execution delegate holding transfer approvals.
const DELEGATE: H160 = H160(hex!("00000000000111abe46ff893f3b2fdf1f759a8a8"));

pub fn exchange(chain_id: u64) -> Option<H160> {
    (chain_id == 1).then_some(EXCHANGE)
}

pub fn domain(chain_id: u64) -> Option<DomainSeparator> {
    Some(DomainSeparator::new(
        "Blur Exchange",
        "1.0",
        chain_id,
        exchange(chain_id)?,
    ))
}

pub fn transfer_operator(chain_id: u64) -> Option<H160> {
    exchange(chain_id).map(|_| DELEGATE)
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Fee {
    /// Bps of the order price.
    pub rate: u16,
    pub recipient: H160,
}

impl Fee {
    fn hash(&self) -> [u8; 32] {
        hash_encoded(&[
            Token::FixedBytes(FEE_TYPE_HASH.to_vec()),
            Token::Uint(self.rate.into()),
            Token::Address(self.recipient),
        ])
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub trader: H160,
    /// 0 buys, 1 sells.
    pub side: u8,
    pub matching_policy: H160,
    pub collection: H160,
    #[serde(with = "u256_decimal")]
    pub token_id: U256,
    #[serde(with = "u256_decimal")]
    pub amount: U256,
    pub payment_token: H160,
    #[serde(with = "u256_decimal")]
    pub price: U256,
    #[serde(default)]
    pub listing_time: u64,
    #[serde(default)]
    pub expiration_time: u64,
    #[serde(default)]
    pub fees: Vec<Fee>,
    #[serde(default = "super::random_salt", with = "u256_decimal")]
    pub salt: U256,
    #[serde(default, with = "bytes_hex")]
    pub extra_params: Vec<u8>,
    #[serde(default, with = "u256_decimal")]
    pub nonce: U256,
}

lazy_static! {
    static ref FEE_TYPE_HASH: [u8; 32] =
        signing::keccak256(b"Fee(uint16 rate,address recipient)");
    static ref ORDER_TYPE_HASH: [u8; 32] = signing::keccak256(
        b"Order(\
            address trader,uint8 side,address matchingPolicy,\
            address collection,uint256 tokenId,uint256 amount,\
            address paymentToken,uint256 price,uint256 listingTime,\
            uint256 expirationTime,Fee[] fees,uint256 salt,bytes extraParams,\
            uint256 nonce\
        )Fee(uint16 rate,address recipient)"
    );
}

impl Order {
    pub fn hash_struct(&self) -> [u8; 32] {
        let fees_hash = hash_concat(self.fees.iter().map(Fee::hash));
        hash_encoded(&[
            Token::FixedBytes(ORDER_TYPE_HASH.to_vec()),
            Token::Address(self.trader),
            Token::Uint(self.side.into()),
            Token::Address(self.matching_policy),
            Token::Address(self.collection),
            Token::Uint(self.token_id),
            Token::Uint(self.amount),
            Token::Address(self.payment_token),
            Token::Uint(self.price),
            Token::Uint(self.listing_time.into()),
            Token::Uint(self.expiration_time.into()),
            Token::FixedBytes(fees_hash.to_vec()),
            Token::Uint(self.salt),
            Token::FixedBytes(signing::keccak256(&self.extra_params).to_vec()),
            Token::Uint(self.nonce),
        ])
    }

    /// The first extra params byte flags oracle authorized orders.
    pub fn requires_oracle(&self) -> bool {
        self.extra_params.first() == Some(&1)
    }
}

pub(super) fn canonicalize_json(
    value: &serde_json::Value,
    context: &CanonicalizeContext,
) -> Result<CanonicalOrder, FormatError> {
    let order: Order = serde_json::from_value(value.clone())?;
    canonical(order, context)
}

pub fn canonical(
    order: Order,
    context: &CanonicalizeContext,
) -> Result<CanonicalOrder, FormatError> {
    exchange(context.chain_id).ok_or(FormatError::UnsupportedChain(context.chain_id))?;
    let side = match order.side {
        0 => Side::Buy,
        1 => Side::Sell,
        _ => return Err(FormatError::InconsistentOrder("invalid order side")),
    };
    if order.amount.is_zero() {
        return Err(FormatError::ZeroAmount);
    }
    // Blur encodes native payments as the zero address.
    let currency = if order.payment_token.is_zero() {
        NATIVE_ETH
    } else {
        order.payment_token
    };
    let fees = fee::normalize(
        order
            .fees
            .iter()
            .filter(|fee| fee.rate != 0)
            .map(|fee| FeeEntry {
                recipient: fee.recipient,
                bps: fee.rate,
                kind: FeeKind::Royalty,
            })
            .collect(),
    );
    let value = fee::net_value(side, order.price, &fees)?;

    Ok(CanonicalOrder {
        kind: OrderKind::Blur,
        side,
        maker: order.trader,
        taker: None,
        contract: order.collection,
        token_set: TokenSet::SingleToken {
            contract: order.collection,
            token_id: order.token_id,
        },
        currency,
        price: order.price,
        value,
        fee_breakdown: fees,
        amount: order.amount,
        valid_from: order.listing_time,
        valid_until: order.expiration_time,
        nonce: order.nonce,
        requires_oracle: order.requires_oracle(),
        kind_data: KindData::Blur(order),
    })
}
