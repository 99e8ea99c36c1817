//! Network parameters.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The Bitcoin-family network a peer connection speaks on.
///
/// Selects the magic bytes every frame starts with; connecting to a node on
/// the wrong network fails on the first message.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
    Regtest,
}

impl Network {
    /// The frame magic, in the little-endian order it is read off the wire.
    pub const fn magic(self) -> u32 {
        match self {
            Self::Mainnet => 0xe8f3_e1e3,
            Self::Testnet => 0xf4f3_e5f4,
            Self::Regtest => 0xfabf_b5da,
        }
    }

    /// The conventional peer port for this network.
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Mainnet => 8333,
            Self::Testnet => 18333,
            Self::Regtest => 18444,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
            Self::Regtest => "regtest",
        })
    }
}
