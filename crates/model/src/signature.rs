//! Signature verification for canonical orders.
//!
//! All schemes operate on the order's EIP-712 struct hash. Direct orders are
//! signed over the usual `\x19\x01 ‖ domain ‖ structHash` message. Bulk
//! signed orders commit a batch of struct hashes to a sorted-pair Merkle tree
//! and sign only the root; each order carries its own proof. Either variant
//! can additionally carry an oracle co-signature over a block-bounded
//! commitment of the order hash.

use {
    crate::{merkle, DomainSeparator},
    anyhow::{Context as _, Result},
    primitive_types::{H160, H256},
    serde::{de, Deserialize, Serialize},
    std::{
        collections::HashSet,
        fmt::{self, Debug, Formatter},
    },
    web3::{
        signing::{self, Key, SecretKeyRef},
        types::Recovery,
    },
};

/// See [`Signature`].
#[derive(Eq, PartialEq, Clone, Copy, Debug, Default, Deserialize, Serialize, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum SigningScheme {
    #[default]
    Eip712,
    /// EIP-712 over the root of a bulk-signed batch.
    Eip712Bulk,
}

/// The maker's signature over the order's struct hash.
#[derive(Eq, PartialEq, Clone, Deserialize, Serialize, Hash)]
#[serde(into = "JsonSignature", try_from = "JsonSignature")]
pub enum Signature {
    /// The order struct is signed directly according to EIP-712.
    Eip712(EcdsaSignature),
    /// The maker signed the Merkle root of a batch of orders; `proof` links
    /// this order's struct hash to that root.
    Eip712Bulk {
        signature: EcdsaSignature,
        proof: Vec<merkle::Hash>,
    },
}

impl Default for Signature {
    fn default() -> Self {
        Self::Eip712(Default::default())
    }
}

impl Debug for Signature {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let scheme = format!("{:?}", self.scheme());
        let bytes = format!("0x{}", hex::encode(self.to_bytes()));
        f.debug_tuple(&scheme).field(&bytes).finish()
    }
}

/// The EIP-712 struct wrapping a bulk batch root; this is what the maker
/// actually signs for [`Signature::Eip712Bulk`].
pub fn bulk_order_hash_struct(root: &merkle::Hash) -> [u8; 32] {
    lazy_static::lazy_static! {
        static ref BULK_ORDER_TYPE_HASH: [u8; 32] =
            signing::keccak256(b"BulkOrder(bytes32 tree)");
    }
    let mut hash_data = [0u8; 64];
    hash_data[0..32].copy_from_slice(&*BULK_ORDER_TYPE_HASH);
    hash_data[32..64].copy_from_slice(root);
    signing::keccak256(&hash_data)
}

#[derive(Debug)]
pub enum VerificationError {
    UnableToRecover(anyhow::Error),
    /// The recovered signer does not match the claimed maker.
    UnexpectedSigner(H160),
    InvalidOracleSignature(anyhow::Error),
    /// The oracle co-signer is not in the configured allow-list.
    UnknownOracle(H160),
    /// The kind requires an oracle co-signature but none was provided.
    MissingOracleSignature,
}

impl Signature {
    /// Recovers the signer and verifies it matches the expected maker.
    /// Returns the recovered signer on success.
    pub fn verify_maker(
        &self,
        domain: &DomainSeparator,
        struct_hash: &[u8; 32],
        maker: H160,
    ) -> Result<H160, VerificationError> {
        let signed_hash = match self {
            Self::Eip712(_) => *struct_hash,
            Self::Eip712Bulk { proof, .. } => {
                bulk_order_hash_struct(&merkle::root_from_proof(struct_hash, proof))
            }
        };
        let message = hashed_eip712_message(domain, &signed_hash);
        let signer = self
            .ecdsa()
            .recover(&message)
            .map_err(VerificationError::UnableToRecover)?;
        if signer != maker {
            return Err(VerificationError::UnexpectedSigner(signer));
        }
        Ok(signer)
    }

    fn ecdsa(&self) -> &EcdsaSignature {
        match self {
            Self::Eip712(signature) | Self::Eip712Bulk { signature, .. } => signature,
        }
    }

    pub fn scheme(&self) -> SigningScheme {
        match self {
            Signature::Eip712(_) => SigningScheme::Eip712,
            Signature::Eip712Bulk { .. } => SigningScheme::Eip712Bulk,
        }
    }

    /// r + s + v, followed by the proof nodes for bulk signatures.
    #[allow(clippy::wrong_self_convention)]
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Eip712(signature) => signature.to_bytes().to_vec(),
            Self::Eip712Bulk { signature, proof } => {
                let mut bytes = signature.to_bytes().to_vec();
                for node in proof {
                    bytes.extend_from_slice(node);
                }
                bytes
            }
        }
    }

    pub fn from_bytes(scheme: SigningScheme, bytes: &[u8]) -> Result<Self> {
        let ecdsa: [u8; 65] = bytes
            .get(..65)
            .context("signature too short")?
            .try_into()
            .expect("sliced to 65 bytes");
        let ecdsa = EcdsaSignature::from_bytes(&ecdsa);
        match scheme {
            SigningScheme::Eip712 => {
                anyhow::ensure!(bytes.len() == 65, "EIP-712 signature must be 65 bytes");
                Ok(Self::Eip712(ecdsa))
            }
            SigningScheme::Eip712Bulk => {
                let proof_bytes = &bytes[65..];
                anyhow::ensure!(
                    proof_bytes.len() % 32 == 0,
                    "bulk proof must be a sequence of 32 byte nodes"
                );
                let proof = proof_bytes
                    .chunks_exact(32)
                    .map(|chunk| chunk.try_into().expect("chunked to 32 bytes"))
                    .collect();
                Ok(Self::Eip712Bulk {
                    signature: ecdsa,
                    proof,
                })
            }
        }
    }
}

/// An internal type used for deriving `serde` implementations for the
/// `Signature` type.
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonSignature {
    signing_scheme: SigningScheme,
    #[serde(with = "crate::bytes_hex")]
    signature: Vec<u8>,
}

impl From<Signature> for JsonSignature {
    fn from(signature: Signature) -> Self {
        Self {
            signing_scheme: signature.scheme(),
            signature: signature.to_bytes(),
        }
    }
}

impl TryFrom<JsonSignature> for Signature {
    type Error = anyhow::Error;

    fn try_from(json: JsonSignature) -> Result<Self, Self::Error> {
        Self::from_bytes(json.signing_scheme, &json.signature)
    }
}

/// A trusted co-signature attesting that the order was still valid as of
/// `block_number`. The oracle signs an eth_sign style message over
/// `keccak256(orderHash ‖ uint256(blockNumber))`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleSignature {
    pub block_number: u64,
    pub signature: EcdsaSignature,
}

impl OracleSignature {
    fn commitment(order_hash: &[u8; 32], block_number: u64) -> [u8; 32] {
        let mut buffer = [0u8; 64];
        buffer[..32].copy_from_slice(order_hash);
        buffer[56..64].copy_from_slice(&block_number.to_be_bytes());
        signing::keccak256(&buffer)
    }

    fn message(order_hash: &[u8; 32], block_number: u64) -> [u8; 32] {
        let commitment = Self::commitment(order_hash, block_number);
        let mut buffer = [0u8; 60];
        buffer[..28].copy_from_slice(b"\x19Ethereum Signed Message:\n32");
        buffer[28..].copy_from_slice(&commitment);
        signing::keccak256(&buffer)
    }

    /// Recovers the co-signer and requires membership in the allow-list.
    pub fn verify(
        &self,
        order_hash: &[u8; 32],
        allowed_oracles: &HashSet<H160>,
    ) -> Result<H160, VerificationError> {
        let message = Self::message(order_hash, self.block_number);
        let signer = self
            .signature
            .recover(&message)
            .map_err(VerificationError::InvalidOracleSignature)?;
        if !allowed_oracles.contains(&signer) {
            return Err(VerificationError::UnknownOracle(signer));
        }
        Ok(signer)
    }

    pub fn sign(order_hash: &[u8; 32], block_number: u64, key: SecretKeyRef) -> Self {
        let message = Self::message(order_hash, block_number);
        Self {
            block_number,
            signature: EcdsaSignature::sign(&message, key),
        }
    }
}

/// The full signature payload attached to an order. Never interpreted
/// outside this module.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureData {
    #[serde(flatten)]
    pub signature: Signature,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oracle: Option<OracleSignature>,
}

impl SignatureData {
    /// Verifies the maker signature and, when present or required, the
    /// oracle co-signature.
    pub fn verify(
        &self,
        domain: &DomainSeparator,
        struct_hash: &[u8; 32],
        maker: H160,
        oracle_required: bool,
        allowed_oracles: &HashSet<H160>,
    ) -> Result<(), VerificationError> {
        self.signature.verify_maker(domain, struct_hash, maker)?;
        match &self.oracle {
            Some(oracle) => {
                oracle.verify(struct_hash, allowed_oracles)?;
            }
            None if oracle_required => return Err(VerificationError::MissingOracleSignature),
            None => (),
        }
        Ok(())
    }
}

pub fn hashed_eip712_message(
    domain_separator: &DomainSeparator,
    struct_hash: &[u8; 32],
) -> [u8; 32] {
    let mut message = [0u8; 66];
    message[0..2].copy_from_slice(&[0x19, 0x01]);
    message[2..34].copy_from_slice(&domain_separator.0);
    message[34..66].copy_from_slice(struct_hash);
    signing::keccak256(&message)
}

#[derive(Eq, PartialEq, Clone, Copy, Debug, Default, Hash)]
pub struct EcdsaSignature {
    pub r: H256,
    pub s: H256,
    pub v: u8,
}

impl EcdsaSignature {
    /// r + s + v
    pub fn to_bytes(self) -> [u8; 65] {
        let mut bytes = [0u8; 65];
        bytes[..32].copy_from_slice(self.r.as_bytes());
        bytes[32..64].copy_from_slice(self.s.as_bytes());
        bytes[64] = self.v;
        bytes
    }

    pub fn from_bytes(bytes: &[u8; 65]) -> Self {
        EcdsaSignature {
            r: H256::from_slice(&bytes[..32]),
            s: H256::from_slice(&bytes[32..64]),
            v: bytes[64],
        }
    }

    pub fn recover(&self, message: &[u8; 32]) -> Result<H160> {
        let recovery = Recovery::new(*message, self.v as u64, self.r, self.s);
        let (signature, recovery_id) = recovery
            .as_signature()
            .context("unexpectedly invalid signature")?;
        Ok(signing::recover(message, &signature, recovery_id)?)
    }

    pub fn sign(message: &[u8; 32], key: SecretKeyRef) -> Self {
        // Unwrap because the only error is for invalid messages which we
        // don't create.
        let signature = key.sign(message, None).unwrap();
        Self {
            v: signature.v as u8,
            r: signature.r,
            s: signature.s,
        }
    }

    /// Signs the EIP-712 message for the given struct hash.
    pub fn sign_typed(
        domain: &DomainSeparator,
        struct_hash: &[u8; 32],
        key: SecretKeyRef,
    ) -> Self {
        Self::sign(&hashed_eip712_message(domain, struct_hash), key)
    }

    /// Returns an arbitrary non-zero signature that can be used when you
    /// don't actually care about recovery.
    pub fn non_zero() -> Self {
        Self {
            r: H256([1; 32]),
            s: H256([2; 32]),
            v: 27,
        }
    }
}

impl Serialize for EcdsaSignature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut bytes = [0u8; 2 + 65 * 2];
        bytes[..2].copy_from_slice(b"0x");
        // Can only fail if the buffer size does not match but we know it is correct.
        hex::encode_to_slice(self.to_bytes(), &mut bytes[2..]).unwrap();
        // Hex encoding is always valid utf8.
        let str = std::str::from_utf8(&bytes).unwrap();
        serializer.serialize_str(str)
    }
}

impl<'de> Deserialize<'de> for EcdsaSignature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct Visitor {}
        impl de::Visitor<'_> for Visitor {
            type Value = EcdsaSignature;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(
                    formatter,
                    "the 65 ecdsa signature bytes as a hex encoded string, ordered as r, s, v, \
                     where v is either 27 or 28"
                )
            }

            fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                let s = s.strip_prefix("0x").ok_or_else(|| {
                    de::Error::custom(format!(
                        "{s:?} can't be decoded as hex ecdsa signature because it does not start \
                         with '0x'"
                    ))
                })?;
                let mut bytes = [0u8; 65];
                hex::decode_to_slice(s, &mut bytes).map_err(|err| {
                    de::Error::custom(format!(
                        "failed to decode {s:?} as hex ecdsa signature: {err}"
                    ))
                })?;
                Ok(EcdsaSignature::from_bytes(&bytes))
            }
        }

        deserializer.deserialize_str(Visitor {})
    }
}
