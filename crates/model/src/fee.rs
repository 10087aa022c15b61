//! Fee breakdown normalization and the fee netting rule.
//!
//! Every marketplace expresses fees differently (absolute amounts, bps rates,
//! "minimum percentage to ask"). They are all normalized into bps entries of
//! the gross order price and netted with a single rule so that `value` is
//! comparable across order kinds:
//!
//! * ask: `value = price - sum(fee amounts)` (what the maker receives)
//! * bid: `value = price` (the gross cost the maker pays)
//!
//! Fee amounts are `floor(price * bps / 10_000)`.

use {
    crate::order::Side,
    primitive_types::{H160, U256},
    serde::{Deserialize, Serialize},
};

pub const BPS_DENOMINATOR: u32 = 10_000;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeKind {
    Marketplace,
    Royalty,
    Custom,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeEntry {
    pub recipient: H160,
    pub bps: u16,
    pub kind: FeeKind,
}

/// Sorts a fee breakdown into its canonical stable order.
pub fn normalize(mut fees: Vec<FeeEntry>) -> Vec<FeeEntry> {
    fees.sort_by_key(|fee| (fee.kind, fee.recipient, fee.bps));
    fees
}

pub fn fee_amount(price: U256, bps: u16) -> U256 {
    let amount = price.full_mul(U256::from(bps)) / primitive_types::U512::from(BPS_DENOMINATOR);
    // Saturating: an unrepresentable fee always fails the `checked_sub` in
    // `net_value` below instead of panicking here.
    U256::try_from(amount).unwrap_or(U256::MAX)
}

pub fn total_fee_amount(price: U256, fees: &[FeeEntry]) -> U256 {
    fees.iter().fold(U256::zero(), |acc, fee| {
        acc.saturating_add(fee_amount(price, fee.bps))
    })
}

#[derive(Debug, Eq, PartialEq)]
pub struct FeesExceedPrice;

/// Applies the netting rule, yielding the order's ranking `value`.
pub fn net_value(side: Side, price: U256, fees: &[FeeEntry]) -> Result<U256, FeesExceedPrice> {
    match side {
        Side::Sell => {
            let total = total_fee_amount(price, fees);
            price.checked_sub(total).ok_or(FeesExceedPrice)
        }
        Side::Buy => Ok(price),
    }
}

/// Converts an absolute fee amount into bps of the gross price, failing when
/// the amount is not representable as a whole bps rate. Zero price with a
/// non-zero fee is never representable.
pub fn bps_of(price: U256, amount: U256) -> Option<u16> {
    if amount.is_zero() {
        return Some(0);
    }
    if price.is_zero() {
        return None;
    }
    let scaled = amount.checked_mul(U256::from(BPS_DENOMINATOR))?;
    let (bps, remainder) = scaled.div_mod(price);
    if !remainder.is_zero() || bps > U256::from(u16::MAX) {
        return None;
    }
    Some(bps.as_u32() as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fee(recipient: u64, bps: u16, kind: FeeKind) -> FeeEntry {
        FeeEntry {
            recipient: H160::from_low_u64_be(recipient),
            bps,
            kind,
        }
    }

    #[test]
    fn normalize_is_stable_and_deterministic() {
        let a = vec![
            fee(2, 50, FeeKind::Royalty),
            fee(1, 250, FeeKind::Marketplace),
            fee(3, 50, FeeKind::Royalty),
        ];
        let b = vec![
            fee(3, 50, FeeKind::Royalty),
            fee(2, 50, FeeKind::Royalty),
            fee(1, 250, FeeKind::Marketplace),
        ];
        assert_eq!(normalize(a), normalize(b));
    }

    #[test]
    fn ask_value_is_net_of_fees() {
        let price = U256::from(1_050_000u64);
        let fees = [fee(1, 500, FeeKind::Marketplace)];
        // floor(1_050_000 * 500 / 10_000) = 52_500
        assert_eq!(
            net_value(Side::Sell, price, &fees),
            Ok(U256::from(997_500u64))
        );
    }

    #[test]
    fn bid_value_is_gross() {
        let price = U256::from(1_000_000u64);
        let fees = [fee(1, 500, FeeKind::Marketplace)];
        assert_eq!(net_value(Side::Buy, price, &fees), Ok(price));
    }

    #[test]
    fn zero_fee_orders_net_to_price() {
        let price = U256::from(123u64);
        assert_eq!(net_value(Side::Sell, price, &[]), Ok(price));
        assert_eq!(net_value(Side::Buy, price, &[]), Ok(price));
    }

    #[test]
    fn fees_above_price_rejected() {
        let fees = [fee(1, 9_000, FeeKind::Custom), fee(2, 2_000, FeeKind::Custom)];
        assert_eq!(
            net_value(Side::Sell, U256::from(100u64), &fees),
            Err(FeesExceedPrice)
        );
    }

    #[test]
    fn bps_of_round_trips_fee_amounts() {
        let price = U256::from(1_000_000u64);
        let bps = bps_of(price, fee_amount(price, 250)).unwrap();
        assert_eq!(bps, 250);
        // 3 is not a whole bps of 1_000_000.
        assert_eq!(bps_of(price, U256::from(3u64)), None);
        assert_eq!(bps_of(U256::zero(), U256::from(1u64)), None);
        assert_eq!(bps_of(U256::zero(), U256::zero()), Some(0));
    }
}
