//! Conversions between the in-memory model types and the database row types.

use {
    anyhow::{anyhow, ensure, Context, Result},
    bigdecimal::BigDecimal,
    model::{
        kinds::{CanonicalizeContext, KindData},
        order::{
            ApprovalStatus, FillabilityStatus, Order, OrderId, OrderKind, OrderMetadata, Side,
        },
        signature::SignatureData,
    },
    num::{bigint::ToBigInt, BigInt, BigUint, Zero},
    primitive_types::{H160, U256},
};

pub fn u256_to_big_uint(value: &U256) -> BigUint {
    let mut bytes = [0; 32];
    value.to_big_endian(&mut bytes);
    BigUint::from_bytes_be(&bytes)
}

pub fn u256_to_big_decimal(value: &U256) -> BigDecimal {
    BigDecimal::from(BigInt::from(u256_to_big_uint(value)))
}

pub fn big_decimal_to_u256(value: &BigDecimal) -> Option<U256> {
    if !value.is_integer() {
        return None;
    }
    let big_int = value.to_bigint()?;
    if big_int.sign() == num::bigint::Sign::Minus {
        return None;
    }
    let bytes = big_int.to_biguint()?.to_bytes_be();
    if bytes.len() > 32 {
        return None;
    }
    Some(U256::from_big_endian(&bytes))
}

pub fn kind_to_database(kind: OrderKind) -> database::orders::OrderKind {
    match kind {
        OrderKind::SeaportV1_4 => database::orders::OrderKind::SeaportV1_4,
        OrderKind::LooksRare => database::orders::OrderKind::LooksRare,
        OrderKind::ZeroExV4 => database::orders::OrderKind::ZeroExV4,
        OrderKind::Blur => database::orders::OrderKind::Blur,
    }
}

pub fn side_to_database(side: Side) -> database::orders::Side {
    match side {
        Side::Sell => database::orders::Side::Sell,
        Side::Buy => database::orders::Side::Buy,
    }
}

pub fn fillability_to_database(status: FillabilityStatus) -> database::orders::FillabilityStatus {
    match status {
        FillabilityStatus::Fillable => database::orders::FillabilityStatus::Fillable,
        FillabilityStatus::NoBalance => database::orders::FillabilityStatus::NoBalance,
        FillabilityStatus::Cancelled => database::orders::FillabilityStatus::Cancelled,
        FillabilityStatus::Filled => database::orders::FillabilityStatus::Filled,
        FillabilityStatus::Expired => database::orders::FillabilityStatus::Expired,
    }
}

fn fillability_from_database(status: database::orders::FillabilityStatus) -> FillabilityStatus {
    match status {
        database::orders::FillabilityStatus::Fillable => FillabilityStatus::Fillable,
        database::orders::FillabilityStatus::NoBalance => FillabilityStatus::NoBalance,
        database::orders::FillabilityStatus::Cancelled => FillabilityStatus::Cancelled,
        database::orders::FillabilityStatus::Filled => FillabilityStatus::Filled,
        database::orders::FillabilityStatus::Expired => FillabilityStatus::Expired,
    }
}

pub fn approval_to_database(status: ApprovalStatus) -> database::orders::ApprovalStatus {
    match status {
        ApprovalStatus::Approved => database::orders::ApprovalStatus::Approved,
        ApprovalStatus::NoApproval => database::orders::ApprovalStatus::NoApproval,
        ApprovalStatus::Disabled => database::orders::ApprovalStatus::Disabled,
    }
}

fn approval_from_database(status: database::orders::ApprovalStatus) -> ApprovalStatus {
    match status {
        database::orders::ApprovalStatus::Approved => ApprovalStatus::Approved,
        database::orders::ApprovalStatus::NoApproval => ApprovalStatus::NoApproval,
        database::orders::ApprovalStatus::Disabled => ApprovalStatus::Disabled,
    }
}

pub fn address_to_database(address: H160) -> database::Address {
    database::byte_array::ByteArray(address.0)
}

pub fn address_from_database(address: database::Address) -> H160 {
    H160(address.0)
}

pub fn order_to_database(order: &Order) -> Result<database::orders::Order> {
    Ok(database::orders::Order {
        id: database::byte_array::ByteArray(order.id.0),
        kind: kind_to_database(order.data.kind),
        side: side_to_database(order.data.side),
        maker: address_to_database(order.data.maker),
        taker: order.data.taker.map(address_to_database),
        contract: address_to_database(order.data.contract),
        token_set_id: order.data.token_set_id(),
        currency: address_to_database(order.data.currency),
        price: u256_to_big_decimal(&order.data.price),
        value: u256_to_big_decimal(&order.data.value),
        fee_breakdown: serde_json::to_value(&order.data.fee_breakdown)
            .context("serialize fee breakdown")?,
        amount: u256_to_big_decimal(&order.data.amount),
        quantity_filled: u256_to_big_decimal(&order.metadata.quantity_filled),
        valid_from: i64::try_from(order.data.valid_from).context("valid_from out of range")?,
        valid_until: i64::try_from(order.data.valid_until).context("valid_until out of range")?,
        nonce: u256_to_big_decimal(&order.data.nonce),
        requires_oracle: order.data.requires_oracle,
        kind_data: serde_json::to_value(&order.data.kind_data).context("serialize kind data")?,
        signature: serde_json::to_value(&order.signature).context("serialize signature")?,
        fillability_status: fillability_to_database(order.metadata.fillability_status),
        approval_status: approval_to_database(order.metadata.approval_status),
        created_at: order.metadata.created_at,
        updated_at: order.metadata.updated_at,
    })
}

/// Rebuilds the full in-memory order from a database row. The canonical
/// fields are re-derived from the stored kind data, which also re-validates
/// that the row belongs to its id.
pub fn order_from_database(
    row: database::orders::Order,
    context: &CanonicalizeContext,
) -> Result<Order> {
    let kind_data: KindData =
        serde_json::from_value(row.kind_data).context("deserialize kind data")?;
    let data = kind_data
        .canonicalize(context)
        .map_err(|err| anyhow!("stored order no longer canonicalizes: {err}"))?;
    ensure!(
        data.hash_struct() == row.id.0,
        "stored order does not hash to its id"
    );
    let signature: SignatureData =
        serde_json::from_value(row.signature).context("deserialize signature")?;

    let quantity_filled =
        big_decimal_to_u256(&row.quantity_filled).context("quantity_filled out of range")?;
    let quantity_remaining = data
        .amount
        .checked_sub(quantity_filled)
        .context("quantity_filled exceeds the order amount")?;
    let metadata = OrderMetadata {
        created_at: row.created_at,
        updated_at: row.updated_at,
        fillability_status: fillability_from_database(row.fillability_status),
        approval_status: approval_from_database(row.approval_status),
        quantity_filled,
        quantity_remaining,
    };
    Ok(Order {
        id: OrderId(row.id.0),
        metadata,
        data,
        signature,
    })
}
