//! Seaport v1.4 orders.
//!
//! Seaport expresses an order as a set of offered items against a set of
//! consideration items. We only support the shapes that map cleanly onto the
//! canonical model: exactly one offered item, fixed (non-dutch) amounts, and
//! a single payment currency.

use {
    super::{hash_concat, hash_encoded, CanonicalizeContext, FormatError, KindData},
    crate::{
        fee::{self, FeeEntry, FeeKind},
        order::{CanonicalOrder, OrderKind, Side},
        tokenset::TokenSet,
        u256_decimal::{self, DecimalU256},
        DomainSeparator, NATIVE_ETH,
    },
    hex_literal::hex,
    lazy_static::lazy_static,
    primitive_types::{H160, H256, U256},
    serde::{Deserialize, Serialize},
    serde_with::serde_as,
    web3::{ethabi::Token, signing},
};

const EXCHANGE: H160 = H160(hex!("00000000000001ad428e4906ae43d8f9852d0dd6"));
/// The shared OpenSea conduit through which approvals flow.
const CONDUIT: H160 = H160(hex!("1e0049783f008a0085193e00003d00cd54003c71"));
pub const FEE_RECIPIENT: H160 = H160(hex!("0000a26b00c1f0df003000390027140000faa719"));

pub fn exchange(chain_id: u64) -> Option<H160> {
    matches!(chain_id, 1 | 5 | 137).then_some(EXCHANGE)
}

pub fn domain(chain_id: u64) -> Option<DomainSeparator> {
    Some(DomainSeparator::new(
        "Seaport",
        "1.4",
        chain_id,
        exchange(chain_id)?,
    ))
}

pub fn transfer_operator(chain_id: u64) -> Option<H160> {
    exchange(chain_id).map(|_| CONDUIT)
}

pub mod item_type {
    pub const NATIVE: u8 = 0;
    pub const ERC20: u8 = 1;
    pub const ERC721: u8 = 2;
    pub const ERC1155: u8 = 3;
    pub const ERC721_WITH_CRITERIA: u8 = 4;
    pub const ERC1155_WITH_CRITERIA: u8 = 5;
}

fn is_nft(item_type: u8) -> bool {
    matches!(
        item_type,
        item_type::ERC721
            | item_type::ERC1155
            | item_type::ERC721_WITH_CRITERIA
            | item_type::ERC1155_WITH_CRITERIA
    )
}

fn is_erc721(item_type: u8) -> bool {
    matches!(
        item_type,
        item_type::ERC721 | item_type::ERC721_WITH_CRITERIA
    )
}

fn is_criteria(item_type: u8) -> bool {
    matches!(
        item_type,
        item_type::ERC721_WITH_CRITERIA | item_type::ERC1155_WITH_CRITERIA
    )
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferItem {
    pub item_type: u8,
    pub token: H160,
    #[serde(with = "u256_decimal")]
    pub identifier_or_criteria: U256,
    #[serde(with = "u256_decimal")]
    pub start_amount: U256,
    #[serde(with = "u256_decimal")]
    pub end_amount: U256,
}

impl OfferItem {
    fn hash(&self) -> [u8; 32] {
        hash_encoded(&[
            Token::FixedBytes(OFFER_ITEM_TYPE_HASH.to_vec()),
            Token::Uint(self.item_type.into()),
            Token::Address(self.token),
            Token::Uint(self.identifier_or_criteria),
            Token::Uint(self.start_amount),
            Token::Uint(self.end_amount),
        ])
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsiderationItem {
    pub item_type: u8,
    pub token: H160,
    #[serde(with = "u256_decimal")]
    pub identifier_or_criteria: U256,
    #[serde(with = "u256_decimal")]
    pub start_amount: U256,
    #[serde(with = "u256_decimal")]
    pub end_amount: U256,
    pub recipient: H160,
}

impl ConsiderationItem {
    fn hash(&self) -> [u8; 32] {
        hash_encoded(&[
            Token::FixedBytes(CONSIDERATION_ITEM_TYPE_HASH.to_vec()),
            Token::Uint(self.item_type.into()),
            Token::Address(self.token),
            Token::Uint(self.identifier_or_criteria),
            Token::Uint(self.start_amount),
            Token::Uint(self.end_amount),
            Token::Address(self.recipient),
        ])
    }
}

lazy_static! {
    static ref OFFER_ITEM_TYPE_HASH: [u8; 32] = signing::keccak256(
        b"OfferItem(\
            uint8 itemType,address token,uint256 identifierOrCriteria,\
            uint256 startAmount,uint256 endAmount\
        )"
    );
    static ref CONSIDERATION_ITEM_TYPE_HASH: [u8; 32] = signing::keccak256(
        b"ConsiderationItem(\
            uint8 itemType,address token,uint256 identifierOrCriteria,\
            uint256 startAmount,uint256 endAmount,address recipient\
        )"
    );
    // Referenced types are appended in alphabetical order as EIP-712
    // requires.
    static ref ORDER_TYPE_HASH: [u8; 32] = signing::keccak256(
        b"OrderComponents(\
            address offerer,address zone,OfferItem[] offer,\
            ConsiderationItem[] consideration,uint8 orderType,\
            uint256 startTime,uint256 endTime,bytes32 zoneHash,uint256 salt,\
            bytes32 conduitKey,uint256 counter\
        )ConsiderationItem(\
            uint8 itemType,address token,uint256 identifierOrCriteria,\
            uint256 startAmount,uint256 endAmount,address recipient\
        )OfferItem(\
            uint8 itemType,address token,uint256 identifierOrCriteria,\
            uint256 startAmount,uint256 endAmount\
        )"
    );
}

#[serde_as]
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub offerer: H160,
    #[serde(default)]
    pub zone: H160,
    pub offer: Vec<OfferItem>,
    pub consideration: Vec<ConsiderationItem>,
    pub order_type: u8,
    #[serde(default)]
    pub start_time: u64,
    #[serde(default)]
    pub end_time: u64,
    #[serde(default)]
    pub zone_hash: H256,
    #[serde(default = "super::random_salt", with = "u256_decimal")]
    pub salt: U256,
    #[serde(default)]
    pub conduit_key: H256,
    #[serde(default, with = "u256_decimal")]
    pub counter: U256,
    /// Plaintext expansion of a criteria-based item. Not part of the signed
    /// struct; validated against the committed criteria root instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde_as(as = "Option<Vec<DecimalU256>>")]
    pub criteria_token_ids: Option<Vec<U256>>,
}

impl Order {
    pub fn hash_struct(&self) -> [u8; 32] {
        let offer_hash = hash_concat(self.offer.iter().map(OfferItem::hash));
        let consideration_hash = hash_concat(self.consideration.iter().map(ConsiderationItem::hash));
        hash_encoded(&[
            Token::FixedBytes(ORDER_TYPE_HASH.to_vec()),
            Token::Address(self.offerer),
            Token::Address(self.zone),
            Token::FixedBytes(offer_hash.to_vec()),
            Token::FixedBytes(consideration_hash.to_vec()),
            Token::Uint(self.order_type.into()),
            Token::Uint(self.start_time.into()),
            Token::Uint(self.end_time.into()),
            Token::FixedBytes(self.zone_hash.as_bytes().to_vec()),
            Token::Uint(self.salt),
            Token::FixedBytes(self.conduit_key.as_bytes().to_vec()),
            Token::Uint(self.counter),
        ])
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
    // Order types 0..=3 are the full/partial open/restricted combinations.
    // Type 4 is a contract order which has no off-chain signature.
    if order.order_type > 3 {
        return Err(FormatError::UnsupportedStructure(
            "contract orders are not supported",
        ));
    }
    let dutch = order
        .offer
        .iter()
        .any(|item| item.start_amount != item.end_amount)
        || order
            .consideration
            .iter()
            .any(|item| item.start_amount != item.end_amount);
    if dutch {
        return Err(FormatError::UnsupportedStructure(
            "dutch auction amounts are not supported",
        ));
    }
    let [offered] = order.offer.as_slice() else {
        return Err(FormatError::UnsupportedStructure(
            "orders must have exactly one offer item",
        ));
    };

    let (side, nft, currency, price, fees) = if is_nft(offered.item_type) {
        // Ask: the maker offers the NFT; the consideration is who gets paid.
        let first = order
            .consideration
            .first()
            .ok_or(FormatError::UnsupportedStructure("empty consideration"))?;
        if !matches!(first.item_type, item_type::NATIVE | item_type::ERC20) {
            return Err(FormatError::UnsupportedStructure(
                "ask consideration must be a payment",
            ));
        }
        let mut price = U256::zero();
        for item in &order.consideration {
            if item.item_type != first.item_type || item.token != first.token {
                return Err(FormatError::UnsupportedStructure(
                    "mixed consideration currencies",
                ));
            }
            price = price
                .checked_add(item.start_amount)
                .ok_or(FormatError::InconsistentOrder("price overflows"))?;
        }
        let fees = fee_entries(
            price,
            order
                .consideration
                .iter()
                .filter(|item| item.recipient != order.offerer)
                .map(|item| (item.recipient, item.start_amount)),
        )?;
        let currency = match first.item_type {
            item_type::NATIVE => NATIVE_ETH,
            _ => first.token,
        };
        (
            Side::Sell,
            (offered.item_type, offered.token, offered.identifier_or_criteria, offered.start_amount),
            currency,
            price,
            fees,
        )
    } else if offered.item_type == item_type::ERC20 {
        // Bid: the maker offers the currency and asks for the NFT back.
        let (nft, rest) = order
            .consideration
            .split_first()
            .ok_or(FormatError::UnsupportedStructure("empty consideration"))?;
        if !is_nft(nft.item_type) {
            return Err(FormatError::UnsupportedStructure(
                "bid consideration must start with the wanted token",
            ));
        }
        if nft.recipient != order.offerer {
            return Err(FormatError::InconsistentOrder(
                "bid token must be sent to the offerer",
            ));
        }
        let price = offered.start_amount;
        for item in rest {
            if item.item_type != item_type::ERC20 || item.token != offered.token {
                return Err(FormatError::UnsupportedStructure(
                    "bid fees must be paid in the offered currency",
                ));
            }
        }
        let fees = fee_entries(
            price,
            rest.iter().map(|item| (item.recipient, item.start_amount)),
        )?;
        (
            Side::Buy,
            (nft.item_type, nft.token, nft.identifier_or_criteria, nft.start_amount),
            offered.token,
            price,
            fees,
        )
    } else {
        return Err(FormatError::UnsupportedStructure(
            "native token offers are not supported",
        ));
    };

    let (nft_type, contract, identifier, amount) = nft;
    if amount.is_zero() {
        return Err(FormatError::ZeroAmount);
    }
    if is_erc721(nft_type) && amount != U256::one() {
        return Err(FormatError::InconsistentOrder("erc721 amount must be 1"));
    }
    let token_set = token_set(
        nft_type,
        contract,
        identifier,
        order.criteria_token_ids.as_deref(),
        context,
    )?;
    let value = fee::net_value(side, price, &fees)?;

    Ok(CanonicalOrder {
        kind: OrderKind::SeaportV1_4,
        side,
        maker: order.offerer,
        taker: None,
        contract,
        token_set,
        currency,
        price,
        value,
        fee_breakdown: fees,
        amount,
        valid_from: order.start_time,
        valid_until: order.end_time,
        nonce: order.counter,
        requires_oracle: false,
        kind_data: KindData::SeaportV1_4(order),
    })
}

fn fee_entries(
    price: U256,
    payouts: impl Iterator<Item = (H160, U256)>,
) -> Result<Vec<FeeEntry>, FormatError> {
    let mut fees = Vec::new();
    for (recipient, amount) in payouts {
        if amount.is_zero() {
            continue;
        }
        let bps = fee::bps_of(price, amount).ok_or(FormatError::InconsistentOrder(
            "fee is not a whole bps fraction of the price",
        ))?;
        let kind = if recipient == FEE_RECIPIENT {
            FeeKind::Marketplace
        } else {
            FeeKind::Royalty
        };
        fees.push(FeeEntry {
            recipient,
            bps,
            kind,
        });
    }
    Ok(fee::normalize(fees))
}

fn token_set(
    nft_type: u8,
    contract: H160,
    identifier: U256,
    criteria_token_ids: Option<&[U256]>,
    context: &CanonicalizeContext,
) -> Result<TokenSet, FormatError> {
    if !is_criteria(nft_type) {
        return Ok(TokenSet::SingleToken {
            contract,
            token_id: identifier,
        });
    }
    // A zero criteria root means "any token of the collection".
    if identifier.is_zero() {
        return Ok(TokenSet::ContractWide { contract });
    }
    let ids = criteria_token_ids.ok_or(FormatError::InvalidCriteria)?;
    if ids.is_empty() || ids.len() > context.max_token_list_len {
        return Err(FormatError::InvalidCriteria);
    }
    let set = TokenSet::token_list(contract, ids.to_vec());
    let root = set.merkle_root().unwrap_or_default();
    if U256::from(root) != identifier {
        return Err(FormatError::InvalidCriteria);
    }
    Ok(set)
}
