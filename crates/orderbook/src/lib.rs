//! The orderbook engine: order ingestion, fillability checking, best order
//! resolution and on-chain event reconciliation.

pub mod arguments;
pub mod best_orders;
pub mod conversions;
pub mod database;
pub mod fillability;
pub mod orderbook;
pub mod reconciler;

/// The current unix timestamp. Event and validity timestamps never predate
/// the epoch, so the clamp is theoretical.
pub fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}
