//! Supported networks for both dispensing modes.

use crate::error::FaucetError;
use std::fmt;
use std::str::FromStr;

/// EVM chains the faucet can transfer on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvmNetwork {
    Mainnet,
    Goerli,
    Sepolia,
    Matic,
    Mumbai,
    GnosisChain,
    /// Local development chain (geth `--dev`, simulated backends).
    EvmTest,
}

impl EvmNetwork {
    pub const ALL: [EvmNetwork; 7] = [
        EvmNetwork::Mainnet,
        EvmNetwork::Goerli,
        EvmNetwork::Sepolia,
        EvmNetwork::Matic,
        EvmNetwork::Mumbai,
        EvmNetwork::GnosisChain,
        EvmNetwork::EvmTest,
    ];

    /// Name used in configuration and request paths.
    pub fn name(&self) -> &'static str {
        match self {
            EvmNetwork::Mainnet => "mainnet",
            EvmNetwork::Goerli => "goerli",
            EvmNetwork::Sepolia => "sepolia",
            EvmNetwork::Matic => "matic",
            EvmNetwork::Mumbai => "mumbai",
            EvmNetwork::GnosisChain => "gnosisChain",
            EvmNetwork::EvmTest => "evmtest",
        }
    }

    pub fn chain_id(&self) -> u64 {
        match self {
            EvmNetwork::Mainnet => 1,
            EvmNetwork::Goerli => 5,
            EvmNetwork::Sepolia => 11_155_111,
            EvmNetwork::Matic => 137,
            EvmNetwork::Mumbai => 80_001,
            EvmNetwork::GnosisChain => 100,
            EvmNetwork::EvmTest => 1337,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            EvmNetwork::Mainnet => "Ethereum Mainnet",
            EvmNetwork::Goerli => "Ethereum Goerli",
            EvmNetwork::Sepolia => "Ethereum Sepolia",
            EvmNetwork::Matic => "Polygon",
            EvmNetwork::Mumbai => "Polygon Mumbai",
            EvmNetwork::GnosisChain => "Gnosis Chain",
            EvmNetwork::EvmTest => "EVM Test",
        }
    }
}

impl FromStr for EvmNetwork {
    type Err = FaucetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|n| n.name() == s)
            .ok_or_else(|| FaucetError::InvalidNetwork(s.to_string()))
    }
}

impl fmt::Display for EvmNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Vocdoni networks served by the package signer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VocdoniNetwork {
    Dev,
    Stage,
    Azeno,
    Lts,
}

impl VocdoniNetwork {
    pub const ALL: [VocdoniNetwork; 4] = [
        VocdoniNetwork::Dev,
        VocdoniNetwork::Stage,
        VocdoniNetwork::Azeno,
        VocdoniNetwork::Lts,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            VocdoniNetwork::Dev => "dev",
            VocdoniNetwork::Stage => "stage",
            VocdoniNetwork::Azeno => "azeno",
            VocdoniNetwork::Lts => "lts",
        }
    }

    /// Chain identifier of the network; Vocdoni chains are named, not numbered.
    pub fn chain_id(&self) -> &'static str {
        self.name()
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            VocdoniNetwork::Dev => "Vocdoni Dev",
            VocdoniNetwork::Stage => "Vocdoni Stage",
            VocdoniNetwork::Azeno => "Vocdoni Azeno",
            VocdoniNetwork::Lts => "Vocdoni LTS",
        }
    }
}

impl FromStr for VocdoniNetwork {
    type Err = FaucetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|n| n.name() == s)
            .ok_or_else(|| FaucetError::InvalidNetwork(s.to_string()))
    }
}

impl fmt::Display for VocdoniNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
