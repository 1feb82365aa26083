//! Shared primitives and process bootstrap helpers for the spigot faucet.

pub mod types;
pub mod utils;
