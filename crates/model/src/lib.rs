//! Contains the canonical order model shared between the orderbook service
//! and the event reconciliation workers.

pub mod bytes_hex;
pub mod fee;
pub mod kinds;
pub mod merkle;
pub mod order;
pub mod signature;
pub mod tokenset;
pub mod u256_decimal;

use {
    hex::{FromHex, FromHexError},
    primitive_types::H160,
    std::fmt,
    web3::{
        ethabi::{encode, Token},
        signing,
    },
};

/// The sentinel address denoting the chain's native token. Marketplaces that
/// encode native payments as the zero address are normalized to this value.
pub const NATIVE_ETH: H160 = H160([0xee; 20]);

/// An EIP-712 domain separator.
///
/// Every order kind has its own verifying contract and therefore its own
/// domain separator per chain.
#[derive(Copy, Clone, Default, Eq, PartialEq)]
pub struct DomainSeparator(pub [u8; 32]);

impl std::str::FromStr for DomainSeparator {
    type Err = FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(FromHex::from_hex(s)?))
    }
}

impl fmt::Debug for DomainSeparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut hex = [0u8; 64];
        // Unwrap because we know the length is correct.
        hex::encode_to_slice(self.0, &mut hex).unwrap();
        // Unwrap because we know it is valid utf8.
        f.write_str(std::str::from_utf8(&hex).unwrap())
    }
}

impl DomainSeparator {
    pub fn new(name: &str, version: &str, chain_id: u64, verifying_contract: H160) -> Self {
        lazy_static::lazy_static! {
            /// The EIP-712 domain type used for computing the domain separator.
            static ref DOMAIN_TYPE_HASH: [u8; 32] = signing::keccak256(
                b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)",
            );
        }
        let abi_encode_string = encode(&[
            Token::Uint((*DOMAIN_TYPE_HASH).into()),
            Token::Uint(signing::keccak256(name.as_bytes()).into()),
            Token::Uint(signing::keccak256(version.as_bytes()).into()),
            Token::Uint(chain_id.into()),
            Token::Address(verifying_contract),
        ]);
        DomainSeparator(signing::keccak256(abi_encode_string.as_slice()))
    }
}
