use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use rand_core::OsRng;
use spigot_common::types::{Address, ADDRESS_LENGTH};
use std::fmt;
use thiserror::Error;

/// Length of a recoverable signature: `r || s || v`.
pub const SIGNATURE_LENGTH: usize = 65;

#[derive(Error, Debug)]
pub enum EcdsaError {
    #[error("Invalid Hex String")]
    HexError(#[from] hex::FromHexError),
    #[error("Invalid Key")]
    KeyError,
    #[error("Signing failed: {0}")]
    SigningFailed(String),
    #[error("Invalid Signature")]
    InvalidSignature,
}

/// secp256k1 keypair together with its Ethereum address.
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
    address: Address,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair").field("address", &self.address).finish()
    }
}

impl KeyPair {
    pub fn random() -> Self {
        Self::from_signing_key(SigningKey::random(&mut OsRng))
    }

    /// Imports a 32-byte private key given as hex, with or without `0x`.
    pub fn from_private_key_hex(hex_str: &str) -> Result<Self, EcdsaError> {
        let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
        let bytes = hex::decode(hex_str)?;
        if bytes.len() != 32 {
            return Err(EcdsaError::KeyError);
        }
        let signing_key = SigningKey::from_slice(&bytes).map_err(|_| EcdsaError::KeyError)?;
        Ok(Self::from_signing_key(signing_key))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = public_key_to_address(signing_key.verifying_key());
        Self {
            signing_key,
            address,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Signs a 32-byte digest, returning the signature and its recovery id.
    pub fn sign_prehash(&self, digest: &[u8; 32]) -> Result<(Signature, RecoveryId), EcdsaError> {
        self.signing_key
            .sign_prehash_recoverable(digest)
            .map_err(|e| EcdsaError::SigningFailed(e.to_string()))
    }

    /// Ethereum personal-message signature (`r || s || v`, with `v` in {0, 1}).
    pub fn sign_message(&self, msg: &[u8]) -> Result<[u8; SIGNATURE_LENGTH], EcdsaError> {
        let (signature, recovery_id) = self.sign_prehash(&hash_message(msg))?;
        let mut out = [0u8; SIGNATURE_LENGTH];
        out[..64].copy_from_slice(&signature.to_bytes());
        out[64] = recovery_id.to_byte();
        Ok(out)
    }
}

/// Derives the Ethereum address: last 20 bytes of keccak256 of the
/// uncompressed public key without its 0x04 tag.
pub fn public_key_to_address(public_key: &VerifyingKey) -> Address {
    let point = public_key.to_encoded_point(false);
    let hash = keccak_hash::keccak(&point.as_bytes()[1..]);
    let mut addr = [0u8; ADDRESS_LENGTH];
    addr.copy_from_slice(&hash.0[12..]);
    Address(addr)
}

/// keccak256("\x19Ethereum Signed Message:\n" || len(msg) || msg)
pub fn hash_message(msg: &[u8]) -> [u8; 32] {
    let mut data = format!("\x19Ethereum Signed Message:\n{}", msg.len()).into_bytes();
    data.extend_from_slice(msg);
    keccak_hash::keccak(&data).0
}

/// Recovers the signer address of a digest from a 64-byte `r || s` pair.
pub fn recover_prehash(
    digest: &[u8; 32],
    rs: &[u8],
    recovery_id: u8,
) -> Result<Address, EcdsaError> {
    let signature = Signature::from_slice(rs).map_err(|_| EcdsaError::InvalidSignature)?;
    let recovery_id = RecoveryId::from_byte(recovery_id).ok_or(EcdsaError::InvalidSignature)?;
    let key = VerifyingKey::recover_from_prehash(digest, &signature, recovery_id)
        .map_err(|_| EcdsaError::InvalidSignature)?;
    Ok(public_key_to_address(&key))
}

/// Recovers the signer of a personal-message signature. Accepts `v` as
/// either {0, 1} or the legacy {27, 28}.
pub fn recover_message_signer(msg: &[u8], signature: &[u8]) -> Result<Address, EcdsaError> {
    if signature.len() != SIGNATURE_LENGTH {
        return Err(EcdsaError::InvalidSignature);
    }
    let v = match signature[64] {
        v @ 0..=1 => v,
        v @ 27..=28 => v - 27,
        _ => return Err(EcdsaError::InvalidSignature),
    };
    recover_prehash(&hash_message(msg), &signature[..64], v)
}
