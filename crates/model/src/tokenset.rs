//! Canonical description of which token(s) an order applies to.
//!
//! A token set's id is a pure function of its content: recomputing it from
//! the same members always yields the same id, which is what makes token set
//! rows deduplicatable in storage.

use {
    crate::merkle,
    primitive_types::{H160, U256},
    serde::{Deserialize, Serialize},
};

#[derive(Clone, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TokenSet {
    SingleToken {
        contract: H160,
        #[serde(with = "crate::u256_decimal")]
        token_id: U256,
    },
    ContractWide {
        contract: H160,
    },
    TokenRange {
        contract: H160,
        #[serde(with = "crate::u256_decimal")]
        start: U256,
        #[serde(with = "crate::u256_decimal")]
        end: U256,
    },
    /// An explicit list committed to by a Merkle root. The member ids are
    /// kept sorted and deduplicated so that the root (and therefore the set
    /// id) only depends on the set's content.
    TokenList {
        contract: H160,
        #[serde(with = "u256_vec_decimal")]
        token_ids: Vec<U256>,
    },
    Attribute {
        contract: H160,
        key: String,
        value: String,
    },
}

impl TokenSet {
    /// Builds a token list set, normalizing member order.
    pub fn token_list(contract: H160, mut token_ids: Vec<U256>) -> Self {
        token_ids.sort();
        token_ids.dedup();
        Self::TokenList {
            contract,
            token_ids,
        }
    }

    pub fn contract(&self) -> H160 {
        match self {
            Self::SingleToken { contract, .. }
            | Self::ContractWide { contract }
            | Self::TokenRange { contract, .. }
            | Self::TokenList { contract, .. }
            | Self::Attribute { contract, .. } => *contract,
        }
    }

    /// The deterministic id, e.g. `token:0xabc…:17` or `list:0xabc…:0x123…`.
    pub fn id(&self) -> String {
        match self {
            Self::SingleToken { contract, token_id } => {
                format!("token:{contract:?}:{token_id}")
            }
            Self::ContractWide { contract } => format!("contract:{contract:?}"),
            Self::TokenRange {
                contract,
                start,
                end,
            } => format!("range:{contract:?}:{start}:{end}"),
            Self::TokenList { contract, .. } => {
                format!(
                    "list:{contract:?}:0x{}",
                    hex::encode(self.merkle_root().unwrap_or_default())
                )
            }
            Self::Attribute {
                contract,
                key,
                value,
            } => format!("attribute:{contract:?}:{key}:{value}"),
        }
    }

    /// The Merkle root over the member token ids, for list sets.
    pub fn merkle_root(&self) -> Option<merkle::Hash> {
        match self {
            Self::TokenList { token_ids, .. } => Some(merkle::root(&leaves(token_ids))),
            _ => None,
        }
    }

    /// The membership proof for `token_id`, for list sets.
    pub fn merkle_proof(&self, token_id: U256) -> Option<Vec<merkle::Hash>> {
        match self {
            Self::TokenList { token_ids, .. } => {
                let index = token_ids.iter().position(|id| *id == token_id)?;
                merkle::proof(&leaves(token_ids), index)
            }
            _ => None,
        }
    }

    /// Whether the given token is a member of this set. Attribute sets have
    /// no intrinsic membership; it is resolved against the materialized
    /// `token_sets_tokens` table instead.
    pub fn matches(&self, contract: H160, token_id: U256) -> bool {
        if contract != self.contract() {
            return false;
        }
        match self {
            Self::SingleToken { token_id: id, .. } => *id == token_id,
            Self::ContractWide { .. } => true,
            Self::TokenRange { start, end, .. } => *start <= token_id && token_id <= *end,
            Self::TokenList { token_ids, .. } => token_ids.binary_search(&token_id).is_ok(),
            Self::Attribute { .. } => false,
        }
    }

    /// The member token ids when the set can be expanded eagerly, bounded by
    /// `limit`. `None` for attribute sets and for sets above the bound.
    pub fn members(&self, limit: usize) -> Option<Vec<U256>> {
        match self {
            Self::SingleToken { token_id, .. } => Some(vec![*token_id]),
            Self::TokenRange { start, end, .. } => {
                let size = end.checked_sub(*start)?.checked_add(U256::one())?;
                if size > U256::from(limit) {
                    return None;
                }
                let mut ids = Vec::with_capacity(size.as_usize());
                let mut id = *start;
                while id <= *end {
                    ids.push(id);
                    id += U256::one();
                }
                Some(ids)
            }
            Self::TokenList { token_ids, .. } => {
                (token_ids.len() <= limit).then(|| token_ids.clone())
            }
            Self::ContractWide { .. } | Self::Attribute { .. } => None,
        }
    }
}

/// Leaf hash of a token id: keccak over its big endian 32 byte encoding.
pub fn leaf(token_id: U256) -> merkle::Hash {
    let mut bytes = [0u8; 32];
    token_id.to_big_endian(&mut bytes);
    web3::signing::keccak256(&bytes)
}

fn leaves(token_ids: &[U256]) -> Vec<merkle::Hash> {
    token_ids.iter().copied().map(leaf).collect()
}

mod u256_vec_decimal {
    use {
        primitive_types::U256,
        serde::{Deserialize, Deserializer, Serialize, Serializer},
    };

    pub fn serialize<S: Serializer>(ids: &[U256], serializer: S) -> Result<S::Ok, S::Error> {
        ids.iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<U256>, D::Error> {
        let strings = Vec::<String>::deserialize(deserializer)?;
        strings
            .iter()
            .map(|s| U256::from_dec_str(s).map_err(serde::de::Error::custom))
            .collect()
    }
}
