//! 0x protocol v4 ERC-1155 orders.
//!
//! The only kind in the registry that is partially fillable: the signed
//! struct carries an `erc1155TokenAmount` and fills consume units of it.

use {
    super::{hash_concat, hash_encoded, CanonicalizeContext, FormatError, KindData},
    crate::{
        bytes_hex,
        fee::{self, FeeEntry, FeeKind},
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

const EXCHANGE: H160 = H160(hex!("def1c0ded9bec7f1a1670819833240f027b25eff"));

pub fn exchange(chain_id: u64) -> Option<H160> {
    matches!(chain_id, 1 | 5 | 137).then_some(EXCHANGE)
}

pub fn domain(chain_id: u64) -> Option<DomainSeparator> {
    Some(DomainSeparator::new(
        "ZeroEx",
        "1.0.0",
        chain_id,
        exchange(chain_id)?,
    ))
}

/// The exchange proxy moves the assets itself.
pub fn transfer_operator(chain_id: u64) -> Option<H160> {
    exchange(chain_id)
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Fee {
    pub recipient: H160,
    #[serde(with = "u256_decimal")]
    pub amount: U256,
    #[serde(default, with = "bytes_hex")]
    pub fee_data: Vec<u8>,
}

impl Fee {
    fn hash(&self) -> [u8; 32] {
        hash_encoded(&[
            Token::FixedBytes(FEE_TYPE_HASH.to_vec()),
            Token::Address(self.recipient),
            Token::Uint(self.amount),
            Token::FixedBytes(signing::keccak256(&self.fee_data).to_vec()),
        ])
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub property_validator: H160,
    #[serde(default, with = "bytes_hex")]
    pub property_data: Vec<u8>,
}

impl Property {
    fn hash(&self) -> [u8; 32] {
        hash_encoded(&[
            Token::FixedBytes(PROPERTY_TYPE_HASH.to_vec()),
            Token::Address(self.property_validator),
            Token::FixedBytes(signing::keccak256(&self.property_data).to_vec()),
        ])
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Erc1155Order {
    /// 0 sells the NFT, 1 buys it.
    pub direction: u8,
    pub maker: H160,
    #[serde(default)]
    pub taker: H160,
    #[serde(with = "u256_decimal")]
    pub expiry: U256,
    #[serde(with = "u256_decimal")]
    pub nonce: U256,
    pub erc20_token: H160,
    #[serde(with = "u256_decimal")]
    pub erc20_token_amount: U256,
    #[serde(default)]
    pub fees: Vec<Fee>,
    pub erc1155_token: H160,
    #[serde(with = "u256_decimal")]
    pub erc1155_token_id: U256,
    #[serde(default)]
    pub erc1155_token_properties: Vec<Property>,
    #[serde(with = "u256_decimal")]
    pub erc1155_token_amount: U256,
}

lazy_static! {
    static ref FEE_TYPE_HASH: [u8; 32] =
        signing::keccak256(b"Fee(address recipient,uint256 amount,bytes feeData)");
    static ref PROPERTY_TYPE_HASH: [u8; 32] =
        signing::keccak256(b"Property(address propertyValidator,bytes propertyData)");
    static ref ORDER_TYPE_HASH: [u8; 32] = signing::keccak256(
        b"ERC1155Order(\
            uint8 direction,address maker,address taker,uint256 expiry,\
            uint256 nonce,address erc20Token,uint256 erc20TokenAmount,\
            Fee[] fees,address erc1155Token,uint256 erc1155TokenId,\
            Property[] erc1155TokenProperties,uint128 erc1155TokenAmount\
        )Fee(address recipient,uint256 amount,bytes feeData)\
        Property(address propertyValidator,bytes propertyData)"
    );
}

impl Erc1155Order {
    pub fn hash_struct(&self) -> [u8; 32] {
        let fees_hash = hash_concat(self.fees.iter().map(Fee::hash));
        let properties_hash = hash_concat(self.erc1155_token_properties.iter().map(Property::hash));
        hash_encoded(&[
            Token::FixedBytes(ORDER_TYPE_HASH.to_vec()),
            Token::Uint(self.direction.into()),
            Token::Address(self.maker),
            Token::Address(self.taker),
            Token::Uint(self.expiry),
            Token::Uint(self.nonce),
            Token::Address(self.erc20_token),
            Token::Uint(self.erc20_token_amount),
            Token::FixedBytes(fees_hash.to_vec()),
            Token::Address(self.erc1155_token),
            Token::Uint(self.erc1155_token_id),
            Token::FixedBytes(properties_hash.to_vec()),
            Token::Uint(self.erc1155_token_amount),
        ])
    }
}

pub(super) fn canonicalize_json(
    value: &serde_json::Value,
    context: &CanonicalizeContext,
) -> Result<CanonicalOrder, FormatError> {
    let order: Erc1155Order = serde_json::from_value(value.clone())?;
    canonical(order, context)
}

pub fn canonical(
    order: Erc1155Order,
    context: &CanonicalizeContext,
) -> Result<CanonicalOrder, FormatError> {
    exchange(context.chain_id).ok_or(FormatError::UnsupportedChain(context.chain_id))?;
    let side = match order.direction {
        0 => Side::Sell,
        1 => Side::Buy,
        _ => return Err(FormatError::InconsistentOrder("invalid trade direction")),
    };
    if order.erc1155_token_amount.is_zero() {
        return Err(FormatError::ZeroAmount);
    }
    // The contract requires a live expiry; a zero expiry order could never
    // be filled.
    if order.expiry.is_zero() {
        return Err(FormatError::InconsistentOrder("zero expiry"));
    }
    let valid_until = u64::try_from(order.expiry)
        .map_err(|_| FormatError::InconsistentOrder("expiry out of range"))?;

    // Fee amounts are paid on top of the token amount, so the gross price
    // the counterparty moves is their sum.
    let mut price = order.erc20_token_amount;
    for fee in &order.fees {
        price = price
            .checked_add(fee.amount)
            .ok_or(FormatError::InconsistentOrder("price overflows"))?;
    }
    let mut fees = Vec::new();
    for fee in &order.fees {
        if fee.amount.is_zero() {
            continue;
        }
        let bps = fee::bps_of(price, fee.amount).ok_or(FormatError::InconsistentOrder(
            "fee is not a whole bps fraction of the price",
        ))?;
        fees.push(FeeEntry {
            recipient: fee.recipient,
            bps,
            kind: FeeKind::Custom,
        });
    }
    let fees = fee::normalize(fees);
    let value = fee::net_value(side, price, &fees)?;

    let token_set = match order.erc1155_token_properties.as_slice() {
        [] => TokenSet::SingleToken {
            contract: order.erc1155_token,
            token_id: order.erc1155_token_id,
        },
        // A single null property validator accepts any token id.
        [property] if property.property_validator.is_zero() && property.property_data.is_empty() => {
            TokenSet::ContractWide {
                contract: order.erc1155_token,
            }
        }
        _ => {
            return Err(FormatError::UnsupportedStructure(
                "custom property validators are not supported",
            ))
        }
    };

    Ok(CanonicalOrder {
        kind: OrderKind::ZeroExV4,
        side,
        maker: order.maker,
        taker: (!order.taker.is_zero()).then_some(order.taker),
        contract: order.erc1155_token,
        token_set,
        currency: order.erc20_token,
        price,
        value,
        fee_breakdown: fees,
        amount: order.erc1155_token_amount,
        valid_from: 0,
        valid_until,
        nonce: order.nonce,
        requires_oracle: false,
        kind_data: KindData::ZeroExV4(order),
    })
}

#[cfg(test)]
mod tests {
    use {super::*, crate::kinds::test_util};

    #[test]
    fn canonicalizes_partially_fillable_ask() {
        let order = test_util::zeroex_ask();
        let canonical = canonical(order.clone(), &Default::default()).unwrap();
        assert_eq!(canonical.side, Side::Sell);
        assert_eq!(canonical.amount, U256::from(10));
        // Gross price includes the fee on top; net value is what the maker
        // receives.
        assert_eq!(canonical.price, U256::from(1_000_000u64));
        assert_eq!(canonical.value, order.erc20_token_amount);
        assert_eq!(canonical.fee_breakdown[0].bps, 500);
    }

    #[test]
    fn null_property_is_contract_wide() {
        let mut order = test_util::zeroex_ask();
        order.direction = 1;
        order.erc1155_token_properties = vec![Property {
            property_validator: H160::zero(),
            property_data: vec![],
        }];
        let canonical = canonical(order.clone(), &Default::default()).unwrap();
        assert_eq!(
            canonical.token_set,
            TokenSet::ContractWide {
                contract: order.erc1155_token
            }
        );
    }

    #[test]
    fn custom_property_validator_rejected() {
        let mut order = test_util::zeroex_ask();
        order.erc1155_token_properties = vec![Property {
            property_validator: H160::from_low_u64_be(7),
            property_data: vec![1, 2, 3],
        }];
        assert!(matches!(
            canonical(order, &Default::default()),
            Err(FormatError::UnsupportedStructure(_))
        ));
    }

    #[test]
    fn unrepresentable_fee_rejected() {
        let mut order = test_util::zeroex_ask();
        order.fees[0].amount = U256::from(1);
        assert!(matches!(
            canonical(order, &Default::default()),
            Err(FormatError::InconsistentOrder(_))
        ));
    }

    #[test]
    fn zero_expiry_rejected() {
        let mut order = test_util::zeroex_ask();
        order.expiry = U256::zero();
        assert!(matches!(
            canonical(order, &Default::default()),
            Err(FormatError::InconsistentOrder(_))
        ));
    }

    #[test]
    fn designated_taker_is_kept() {
        let mut order = test_util::zeroex_ask();
        order.taker = H160::from_low_u64_be(0xbeef);
        let canonical = canonical(order.clone(), &Default::default()).unwrap();
        assert_eq!(canonical.taker, Some(order.taker));
    }
}
