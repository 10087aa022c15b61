//! Contains the canonical order type produced by the per-kind canonicalizers
//! and persisted by the orderbook.

use {
    crate::{
        fee::FeeEntry,
        kinds::{self, KindData},
        signature::SignatureData,
        tokenset::TokenSet,
        u256_decimal,
    },
    chrono::{DateTime, Utc},
    primitive_types::{H160, U256},
    serde::{de, Deserialize, Deserializer, Serialize, Serializer},
    std::{
        fmt::{self, Debug, Display},
        str::FromStr,
    },
    strum::{AsRefStr, EnumString, VariantNames},
};

/// The deterministic identity of an order: the EIP-712 struct hash of its
/// canonical content. Signature-scheme independent, so two submissions of the
/// same order always collide to the same id.
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct OrderId(pub [u8; 32]);

impl OrderId {
    /// Intended for easier id creation in tests.
    pub fn from_integer(i: u32) -> Self {
        let mut id = OrderId::default();
        id.0[0..4].copy_from_slice(&i.to_be_bytes());
        id
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut bytes = [0u8; 2 + 64];
        bytes[..2].copy_from_slice(b"0x");
        // Unwrap because the length is correct.
        hex::encode_to_slice(self.0, &mut bytes[2..]).unwrap();
        // Unwrap because hex encoding is always valid utf8.
        f.write_str(std::str::from_utf8(&bytes).unwrap())
    }
}

impl Debug for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl FromStr for OrderId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let mut value = [0u8; 32];
        hex::decode_to_slice(s, &mut value)?;
        Ok(Self(value))
    }
}

impl Serialize for OrderId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for OrderId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s)
            .map_err(|err| de::Error::custom(format!("invalid order id {s:?}: {err}")))
    }
}

/// The closed set of supported marketplace schema variants.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
    Deserialize,
    Serialize,
    AsRefStr,
    EnumString,
    VariantNames,
)]
pub enum OrderKind {
    #[serde(rename = "seaport-v1.4")]
    #[strum(serialize = "seaport-v1.4")]
    SeaportV1_4,
    #[serde(rename = "looks-rare")]
    #[strum(serialize = "looks-rare")]
    LooksRare,
    #[serde(rename = "zeroex-v4")]
    #[strum(serialize = "zeroex-v4")]
    ZeroExV4,
    #[serde(rename = "blur")]
    #[strum(serialize = "blur")]
    Blur,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// An ask.
    Sell,
    /// A bid.
    Buy,
}

/// Off-chain validity of an order's preconditions.
///
/// `Cancelled`, `Filled` and `Expired` are terminal. `NoBalance` and
/// `NoApproval` are recoverable: a revalidation can move the order back to
/// `Fillable` once the underlying condition is fixed.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FillabilityStatus {
    #[default]
    Fillable,
    NoBalance,
    Cancelled,
    Filled,
    Expired,
}

impl FillabilityStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Filled | Self::Expired)
    }
}

/// Whether the required spender approval is in place. A separate axis from
/// fillability: an order can be fillable in principle but blocked by a
/// revoked approval.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalStatus {
    #[default]
    Approved,
    NoApproval,
    Disabled,
}

/// The canonical, normalized order content. This is what gets hashed into
/// the order id and what all ranking and validity checks operate on.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalOrder {
    pub kind: OrderKind,
    pub side: Side,
    pub maker: H160,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taker: Option<H160>,
    pub contract: H160,
    pub token_set: TokenSet,
    pub currency: H160,
    /// Gross price in the smallest currency unit.
    #[serde(with = "u256_decimal")]
    pub price: U256,
    /// Fee-netted ranking value; see [`crate::fee::net_value`].
    #[serde(with = "u256_decimal")]
    pub value: U256,
    pub fee_breakdown: Vec<FeeEntry>,
    /// Number of units for partially fillable (ERC-1155) orders, 1 otherwise.
    #[serde(with = "u256_decimal")]
    pub amount: U256,
    pub valid_from: u64,
    /// Unix seconds; `0` means unbounded.
    pub valid_until: u64,
    /// Maker-scoped counter captured at canonicalization time.
    #[serde(with = "u256_decimal")]
    pub nonce: U256,
    /// Whether the kind requires an oracle co-signature to be fillable.
    #[serde(default)]
    pub requires_oracle: bool,
    /// The kind-specific signed struct the canonical fields were derived
    /// from. Hashing dispatches on this.
    pub kind_data: KindData,
}

impl CanonicalOrder {
    /// The EIP-712 struct hash over the kind's type tree. Deliberately not
    /// the full typed-data hash so the id is signature-scheme independent.
    pub fn hash_struct(&self) -> [u8; 32] {
        self.kind_data.hash_struct()
    }

    pub fn id(&self) -> OrderId {
        OrderId(self.hash_struct())
    }

    pub fn token_set_id(&self) -> String {
        self.token_set.id()
    }

    /// Whether the validity window contains `now`.
    pub fn is_live_at(&self, now: u64) -> bool {
        self.valid_from <= now && (self.valid_until == 0 || now < self.valid_until)
    }

    pub fn is_expired_at(&self, now: u64) -> bool {
        self.valid_until != 0 && now >= self.valid_until
    }
}

/// Engine state attached to an order; everything here is mutated by the
/// reconciler and the revalidation jobs, never by the canonicalizer.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderMetadata {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub fillability_status: FillabilityStatus,
    pub approval_status: ApprovalStatus,
    #[serde(with = "u256_decimal")]
    pub quantity_filled: U256,
    #[serde(with = "u256_decimal")]
    pub quantity_remaining: U256,
}

impl OrderMetadata {
    pub fn new(now: DateTime<Utc>, amount: U256) -> Self {
        Self {
            created_at: now,
            updated_at: now,
            fillability_status: FillabilityStatus::Fillable,
            approval_status: ApprovalStatus::Approved,
            quantity_filled: U256::zero(),
            quantity_remaining: amount,
        }
    }
}

/// An order as stored and ranked by the orderbook.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    #[serde(flatten)]
    pub metadata: OrderMetadata,
    #[serde(flatten)]
    pub data: CanonicalOrder,
    pub signature: SignatureData,
}

impl Order {
    pub fn new(data: CanonicalOrder, signature: SignatureData, now: DateTime<Utc>) -> Self {
        Self {
            id: data.id(),
            metadata: OrderMetadata::new(now, data.amount),
            data,
            signature,
        }
    }

    /// Invariant: `quantity_filled + quantity_remaining == amount`.
    pub fn quantities_consistent(&self) -> bool {
        self.metadata
            .quantity_filled
            .checked_add(self.metadata.quantity_remaining)
            == Some(self.data.amount)
    }

    /// Whether the order currently participates in best-order ranking.
    pub fn is_rankable_at(&self, now: u64) -> bool {
        self.metadata.fillability_status == FillabilityStatus::Fillable
            && self.metadata.approval_status == ApprovalStatus::Approved
            && self.data.is_live_at(now)
    }
}
