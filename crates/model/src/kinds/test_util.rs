//! Ready-made order fixtures. Used by this crate's tests and by downstream
//! crates that need realistic orders without going through a marketplace
//! payload.

use {
    super::{blur, looks_rare, seaport_v1_4, zeroex_v4},
    crate::order::CanonicalOrder,
    hex_literal::hex,
    primitive_types::{H160, U256},
};

pub const COLLECTION: H160 = H160(hex!("00000000000000000000000000000000c0ffee00"));
pub const MAKER: H160 = H160(hex!("00000000000000000000000000000000000a11ce"));
pub const WETH: H160 = H160(hex!("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"));

pub fn seaport_ask() -> seaport_v1_4::Order {
    seaport_v1_4::Order {
        offerer: MAKER,
        zone: H160::zero(),
        offer: vec![seaport_v1_4::OfferItem {
            item_type: seaport_v1_4::item_type::ERC721,
            token: COLLECTION,
            identifier_or_criteria: U256::one(),
            start_amount: U256::one(),
            end_amount: U256::one(),
        }],
        consideration: vec![
            seaport_v1_4::ConsiderationItem {
                item_type: seaport_v1_4::item_type::ERC20,
                token: WETH,
                identifier_or_criteria: U256::zero(),
                start_amount: 950_000.into(),
                end_amount: 950_000.into(),
                recipient: MAKER,
            },
            seaport_v1_4::ConsiderationItem {
                item_type: seaport_v1_4::item_type::ERC20,
                token: WETH,
                identifier_or_criteria: U256::zero(),
                start_amount: 50_000.into(),
                end_amount: 50_000.into(),
                recipient: seaport_v1_4::FEE_RECIPIENT,
            },
        ],
        order_type: 0,
        start_time: 0,
        end_time: 0,
        zone_hash: Default::default(),
        salt: 42.into(),
        conduit_key: Default::default(),
        counter: U256::zero(),
        criteria_token_ids: None,
    }
}

pub fn seaport_bid() -> seaport_v1_4::Order {
    seaport_v1_4::Order {
        offer: vec![seaport_v1_4::OfferItem {
            item_type: seaport_v1_4::item_type::ERC20,
            token: WETH,
            identifier_or_criteria: U256::zero(),
            start_amount: 1_000_000.into(),
            end_amount: 1_000_000.into(),
        }],
        consideration: vec![
            seaport_v1_4::ConsiderationItem {
                item_type: seaport_v1_4::item_type::ERC721,
                token: COLLECTION,
                identifier_or_criteria: U256::one(),
                start_amount: U256::one(),
                end_amount: U256::one(),
                recipient: MAKER,
            },
            seaport_v1_4::ConsiderationItem {
                item_type: seaport_v1_4::item_type::ERC20,
                token: WETH,
                identifier_or_criteria: U256::zero(),
                start_amount: 50_000.into(),
                end_amount: 50_000.into(),
                recipient: seaport_v1_4::FEE_RECIPIENT,
            },
        ],
        ..seaport_ask()
    }
}

pub fn looks_rare_ask() -> looks_rare::MakerOrder {
    looks_rare::MakerOrder {
        is_order_ask: true,
        signer: MAKER,
        collection: COLLECTION,
        price: 1_000_000.into(),
        token_id: U256::one(),
        amount: U256::one(),
        strategy: looks_rare::STRATEGY_FIXED_PRICE,
        currency: WETH,
        nonce: 7.into(),
        start_time: 0,
        end_time: 0,
        min_percentage_to_ask: 9_800.into(),
        params: vec![],
    }
}

pub fn zeroex_ask() -> zeroex_v4::Erc1155Order {
    zeroex_v4::Erc1155Order {
        direction: 0,
        maker: MAKER,
        taker: H160::zero(),
        expiry: 4_000_000_000u64.into(),
        nonce: 1.into(),
        erc20_token: WETH,
        erc20_token_amount: 950_000.into(),
        fees: vec![zeroex_v4::Fee {
            recipient: H160::from_low_u64_be(0xfee),
            amount: 50_000.into(),
            fee_data: vec![],
        }],
        erc1155_token: COLLECTION,
        erc1155_token_id: U256::one(),
        erc1155_token_properties: vec![],
        erc1155_token_amount: 10.into(),
    }
}

pub fn blur_ask() -> blur::Order {
    blur::Order {
        trader: MAKER,
        side: 1,
        matching_policy: H160::from_low_u64_be(0x70110c),
        collection: COLLECTION,
        token_id: U256::one(),
        amount: U256::one(),
        payment_token: H160::zero(),
        price: 1_000_000.into(),
        listing_time: 0,
        expiration_time: 0,
        fees: vec![blur::Fee {
            rate: 250,
            recipient: H160::from_low_u64_be(0xfee),
        }],
        salt: 7.into(),
        extra_params: vec![],
        nonce: U256::zero(),
    }
}

/// A canonical single-token ask. Unwraps are fine, the fixture is valid by
/// construction.
pub fn canonical_sell_order() -> CanonicalOrder {
    seaport_v1_4::canonical(seaport_ask(), &Default::default()).unwrap()
}

/// A canonical single-token bid from the same maker and collection.
pub fn canonical_buy_order() -> CanonicalOrder {
    seaport_v1_4::canonical(seaport_bid(), &Default::default()).unwrap()
}

/// A canonical partially fillable ask with an amount of 10 units.
pub fn canonical_partial_order() -> CanonicalOrder {
    zeroex_v4::canonical(zeroex_ask(), &Default::default()).unwrap()
}

/// A canonical ask that requires an oracle co-signature.
pub fn canonical_oracle_order() -> CanonicalOrder {
    let order = blur::Order {
        extra_params: vec![1],
        ..blur_ask()
    };
    blur::canonical(order, &Default::default()).unwrap()
}
