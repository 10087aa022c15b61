//! Per-kind order schemas.
//!
//! Each supported marketplace contributes one module that knows how to parse
//! its native signed struct, compute its EIP-712 struct hash and map it onto
//! [`CanonicalOrder`]. The [`Handler`] table is the only place the rest of
//! the system dispatches on the order kind.

pub mod blur;
pub mod looks_rare;
pub mod seaport_v1_4;
pub mod test_util;
pub mod zeroex_v4;

use {
    crate::{
        order::{CanonicalOrder, OrderKind},
        DomainSeparator,
    },
    primitive_types::{H160, U256},
    serde::{Deserialize, Serialize},
    web3::{
        ethabi::{encode, Token},
        signing,
    },
};

/// Why an order payload could not be canonicalized.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("malformed order payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("order kind is not deployed on chain {0}")]
    UnsupportedChain(u64),
    #[error("unsupported order structure: {0}")]
    UnsupportedStructure(&'static str),
    #[error("inconsistent order: {0}")]
    InconsistentOrder(&'static str),
    #[error("criteria token ids are missing or do not match the declared root")]
    InvalidCriteria,
    #[error("order amount must not be zero")]
    ZeroAmount,
    #[error("fees exceed the order price")]
    FeesExceedPrice,
    #[error("canonical fields do not match the kind data")]
    RoundTrip,
}

impl From<crate::fee::FeesExceedPrice> for FormatError {
    fn from(_: crate::fee::FeesExceedPrice) -> Self {
        Self::FeesExceedPrice
    }
}

#[derive(Clone, Debug)]
pub struct CanonicalizeContext {
    pub chain_id: u64,
    /// Upper bound on the number of explicit criteria token ids an order may
    /// commit to.
    pub max_token_list_len: usize,
}

impl Default for CanonicalizeContext {
    fn default() -> Self {
        Self {
            chain_id: 1,
            max_token_list_len: 10_000,
        }
    }
}

/// The kind-specific signed struct an order was canonicalized from. Kept
/// alongside the canonical fields because it is the input to both hashing and
/// settlement.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind")]
pub enum KindData {
    #[serde(rename = "seaport-v1.4")]
    SeaportV1_4(seaport_v1_4::Order),
    #[serde(rename = "looks-rare")]
    LooksRare(looks_rare::MakerOrder),
    #[serde(rename = "zeroex-v4")]
    ZeroExV4(zeroex_v4::Erc1155Order),
    #[serde(rename = "blur")]
    Blur(blur::Order),
}

impl KindData {
    pub fn kind(&self) -> OrderKind {
        match self {
            Self::SeaportV1_4(_) => OrderKind::SeaportV1_4,
            Self::LooksRare(_) => OrderKind::LooksRare,
            Self::ZeroExV4(_) => OrderKind::ZeroExV4,
            Self::Blur(_) => OrderKind::Blur,
        }
    }

    pub fn hash_struct(&self) -> [u8; 32] {
        match self {
            Self::SeaportV1_4(order) => order.hash_struct(),
            Self::LooksRare(order) => order.hash_struct(),
            Self::ZeroExV4(order) => order.hash_struct(),
            Self::Blur(order) => order.hash_struct(),
        }
    }

    /// Re-derives the canonical order from the kind data.
    pub fn canonicalize(
        &self,
        context: &CanonicalizeContext,
    ) -> Result<CanonicalOrder, FormatError> {
        match self {
            Self::SeaportV1_4(order) => seaport_v1_4::canonical(order.clone(), context),
            Self::LooksRare(order) => looks_rare::canonical(order.clone(), context),
            Self::ZeroExV4(order) => zeroex_v4::canonical(order.clone(), context),
            Self::Blur(order) => blur::canonical(order.clone(), context),
        }
    }
}

/// Static capability table for one order kind.
pub struct Handler {
    pub kind: OrderKind,
    /// The exchange contract orders of this kind settle on.
    pub exchange: fn(chain_id: u64) -> Option<H160>,
    pub domain: fn(chain_id: u64) -> Option<DomainSeparator>,
    /// The spender that needs the maker's asset approval for the order to be
    /// executable.
    pub transfer_operator: fn(chain_id: u64) -> Option<H160>,
    pub canonicalize:
        fn(&serde_json::Value, &CanonicalizeContext) -> Result<CanonicalOrder, FormatError>,
}

static SEAPORT_V1_4: Handler = Handler {
    kind: OrderKind::SeaportV1_4,
    exchange: seaport_v1_4::exchange,
    domain: seaport_v1_4::domain,
    transfer_operator: seaport_v1_4::transfer_operator,
    canonicalize: seaport_v1_4::canonicalize_json,
};

static LOOKS_RARE: Handler = Handler {
    kind: OrderKind::LooksRare,
    exchange: looks_rare::exchange,
    domain: looks_rare::domain,
    transfer_operator: looks_rare::transfer_operator,
    canonicalize: looks_rare::canonicalize_json,
};

static ZEROEX_V4: Handler = Handler {
    kind: OrderKind::ZeroExV4,
    exchange: zeroex_v4::exchange,
    domain: zeroex_v4::domain,
    transfer_operator: zeroex_v4::transfer_operator,
    canonicalize: zeroex_v4::canonicalize_json,
};

static BLUR: Handler = Handler {
    kind: OrderKind::Blur,
    exchange: blur::exchange,
    domain: blur::domain,
    transfer_operator: blur::transfer_operator,
    canonicalize: blur::canonicalize_json,
};

pub fn handler(kind: OrderKind) -> &'static Handler {
    match kind {
        OrderKind::SeaportV1_4 => &SEAPORT_V1_4,
        OrderKind::LooksRare => &LOOKS_RARE,
        OrderKind::ZeroExV4 => &ZEROEX_V4,
        OrderKind::Blur => &BLUR,
    }
}

/// Canonicalizes a raw kind-specific order payload.
pub fn canonicalize(
    kind: OrderKind,
    payload: &serde_json::Value,
    context: &CanonicalizeContext,
) -> Result<CanonicalOrder, FormatError> {
    (handler(kind).canonicalize)(payload, context)
}

/// Checks that a canonical order really is the canonicalization of its own
/// kind data. Orders that arrive pre-canonicalized (replication, reorgs) go
/// through this instead of [`canonicalize`].
pub fn verify_canonical(
    order: &CanonicalOrder,
    context: &CanonicalizeContext,
) -> Result<(), FormatError> {
    let rebuilt = order.kind_data.canonicalize(context)?;
    if rebuilt != *order {
        return Err(FormatError::RoundTrip);
    }
    Ok(())
}

pub(crate) fn hash_encoded(tokens: &[Token]) -> [u8; 32] {
    signing::keccak256(&encode(tokens))
}

/// EIP-712 array member hash: keccak over the concatenated element hashes.
pub(crate) fn hash_concat(hashes: impl IntoIterator<Item = [u8; 32]>) -> [u8; 32] {
    let bytes: Vec<u8> = hashes.into_iter().flatten().collect();
    signing::keccak256(&bytes)
}

/// Payloads that omit the salt get a random one so that otherwise identical
/// orders hash to distinct ids.
pub(crate) fn random_salt() -> U256 {
    U256::from(rand::random::<u128>())
}
