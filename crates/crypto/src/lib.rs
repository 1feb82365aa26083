//! secp256k1 signing primitives for the faucet: keypairs, Ethereum
//! personal-message signatures and EIP-155 value transfers.

pub mod ecdsa;
pub mod transaction;

pub use ecdsa::{EcdsaError, KeyPair};
pub use transaction::{LegacyTransfer, SignedTransfer, TxError};
