//! Legacy (pre EIP-2718) value transfers with EIP-155 replay protection.

use crate::ecdsa::{recover_prehash, EcdsaError, KeyPair};
use rlp::{Rlp, RlpStream};
use spigot_common::types::{Address, Hash, ADDRESS_LENGTH};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TxError {
    #[error("Invalid transaction format: {0}")]
    InvalidFormat(String),
    #[error("Signature error: {0}")]
    Signature(#[from] EcdsaError),
}

impl From<rlp::DecoderError> for TxError {
    fn from(err: rlp::DecoderError) -> Self {
        TxError::InvalidFormat(err.to_string())
    }
}

/// Unsigned value transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyTransfer {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: Address,
    pub value: u128,
    pub chain_id: u64,
}

/// RLP-encoded signed transfer ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransfer {
    pub raw: Vec<u8>,
    pub hash: Hash,
}

impl LegacyTransfer {
    /// Gas price times gas limit.
    pub fn max_fee(&self) -> u128 {
        self.gas_price.saturating_mul(self.gas_limit as u128)
    }

    fn append_body(&self, stream: &mut RlpStream) {
        stream.append(&self.nonce);
        stream.append(&trim_u128(self.gas_price));
        stream.append(&self.gas_limit);
        stream.append(&self.to.0.to_vec());
        stream.append(&trim_u128(self.value));
        stream.append(&Vec::<u8>::new()); // data
    }

    /// EIP-155 signing hash: keccak(rlp([nonce, gasPrice, gas, to, value, data, chainId, 0, 0])).
    pub fn signing_hash(&self) -> [u8; 32] {
        let mut stream = RlpStream::new_list(9);
        self.append_body(&mut stream);
        stream.append(&self.chain_id);
        stream.append(&0u8);
        stream.append(&0u8);
        keccak_hash::keccak(stream.out()).0
    }

    pub fn sign(&self, keys: &KeyPair) -> Result<SignedTransfer, TxError> {
        let (signature, recovery_id) = keys.sign_prehash(&self.signing_hash())?;
        let v = self
            .chain_id
            .checked_mul(2)
            .and_then(|v| v.checked_add(35 + u64::from(recovery_id.to_byte())))
            .ok_or_else(|| TxError::InvalidFormat(format!("chain id {} too large", self.chain_id)))?;
        let r = signature.r().to_bytes();
        let s = signature.s().to_bytes();

        let mut stream = RlpStream::new_list(9);
        self.append_body(&mut stream);
        stream.append(&v);
        stream.append(&trim_leading_zeros(&r));
        stream.append(&trim_leading_zeros(&s));

        let raw = stream.out().to_vec();
        let hash = Hash(keccak_hash::keccak(&raw).0);
        Ok(SignedTransfer { raw, hash })
    }
}

impl SignedTransfer {
    /// Decodes a raw signed transfer and recovers its sender.
    pub fn decode(raw: &[u8]) -> Result<(LegacyTransfer, Address), TxError> {
        let rlp = Rlp::new(raw);
        if !rlp.is_list() || rlp.item_count()? != 9 {
            return Err(TxError::InvalidFormat("expected a 9 item list".to_string()));
        }

        let to_bytes: Vec<u8> = rlp.val_at(3)?;
        if to_bytes.len() != ADDRESS_LENGTH {
            return Err(TxError::InvalidFormat(format!(
                "invalid 'to' address length: {}",
                to_bytes.len()
            )));
        }
        let mut to = [0u8; ADDRESS_LENGTH];
        to.copy_from_slice(&to_bytes);

        let v: u64 = rlp.val_at(6)?;
        if v < 35 {
            return Err(TxError::InvalidFormat("missing EIP-155 chain id".to_string()));
        }

        let transfer = LegacyTransfer {
            nonce: rlp.val_at(0)?,
            gas_price: to_u128(&rlp.val_at::<Vec<u8>>(1)?)?,
            gas_limit: rlp.val_at(2)?,
            to: Address(to),
            value: to_u128(&rlp.val_at::<Vec<u8>>(4)?)?,
            chain_id: (v - 35) / 2,
        };

        let mut rs = [0u8; 64];
        left_pad_into(&rlp.val_at::<Vec<u8>>(7)?, &mut rs[..32])?;
        left_pad_into(&rlp.val_at::<Vec<u8>>(8)?, &mut rs[32..])?;
        let sender = recover_prehash(&transfer.signing_hash(), &rs, ((v - 35) % 2) as u8)?;

        Ok((transfer, sender))
    }
}

fn trim_leading_zeros(bytes: &[u8]) -> Vec<u8> {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes[start..].to_vec()
}

fn trim_u128(value: u128) -> Vec<u8> {
    trim_leading_zeros(&value.to_be_bytes())
}

fn left_pad_into(bytes: &[u8], out: &mut [u8]) -> Result<(), TxError> {
    if bytes.len() > out.len() {
        return Err(TxError::InvalidFormat("integer field too long".to_string()));
    }
    let offset = out.len() - bytes.len();
    out[offset..].copy_from_slice(bytes);
    Ok(())
}

fn to_u128(bytes: &[u8]) -> Result<u128, TxError> {
    let mut buf = [0u8; 16];
    left_pad_into(bytes, &mut buf)?;
    Ok(u128::from_be_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer(nonce: u64) -> LegacyTransfer {
        LegacyTransfer {
            nonce,
            gas_price: 20_000_000_000,
            gas_limit: 21_000,
            to: Address([0x35; ADDRESS_LENGTH]),
            value: 1_000_000_000_000_000_000,
            chain_id: 1,
        }
    }

    #[test]
    fn test_eip155_signing_hash_vector() {
        // Example transaction from EIP-155.
        let tx = LegacyTransfer {
            nonce: 9,
            ..transfer(0)
        };
        assert_eq!(
            hex::encode(tx.signing_hash()),
            "daf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53"
        );
    }

    #[test]
    fn test_signed_transfer_recovers_sender() {
        let keys = KeyPair::random();
        let tx = transfer(7);
        let signed = tx.sign(&keys).unwrap();

        let (decoded, sender) = SignedTransfer::decode(&signed.raw).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(sender, keys.address());
        assert_eq!(signed.hash, Hash(keccak_hash::keccak(&signed.raw).0));
    }

    #[test]
    fn test_v_encodes_chain_id() {
        let keys = KeyPair::random();
        let tx = LegacyTransfer {
            chain_id: 11_155_111,
            ..transfer(0)
        };
        let signed = tx.sign(&keys).unwrap();
        let v: u64 = Rlp::new(&signed.raw).val_at(6).unwrap();
        assert!(v == 11_155_111 * 2 + 35 || v == 11_155_111 * 2 + 36);
    }

    #[test]
    fn test_zero_value_encodes_as_empty_string() {
        let keys = KeyPair::random();
        let tx = LegacyTransfer {
            value: 0,
            ..transfer(0)
        };
        let signed = tx.sign(&keys).unwrap();
        let value: Vec<u8> = Rlp::new(&signed.raw).val_at(4).unwrap();
        assert!(value.is_empty());
        assert_eq!(SignedTransfer::decode(&signed.raw).unwrap().0.value, 0);
    }

    #[test]
    fn test_oversized_chain_id_is_rejected() {
        let keys = KeyPair::random();
        let tx = LegacyTransfer {
            chain_id: u64::MAX / 2,
            ..transfer(0)
        };
        assert!(matches!(tx.sign(&keys), Err(TxError::InvalidFormat(_))));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(SignedTransfer::decode(&[0xc0]).is_err());
        assert!(SignedTransfer::decode(b"not rlp at all").is_err());
    }
}
