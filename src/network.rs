use std::str::FromStr;

use super::errors::Violation;

/// Represents the network to which a message belongs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Network {
    /// Mainnet
    /// Default Port 8333
    MainNet,

    /// Testnet
    /// Default Port 18333
    TestNet,

    /// Regtest
    /// Default Port 18444
    #[default]
    RegTest,
}

impl Network {
    /// The start string of every header sent on this network
    pub fn magic(self) -> [u8; 4] {
        match self {
            Network::MainNet => [0xf9, 0xbe, 0xb4, 0xd9],
            Network::TestNet => [0x0b, 0x11, 0x09, 0x07],
            Network::RegTest => [0xfa, 0xbf, 0xb5, 0xda],
        }
    }

    /// The magic read as the little-endian u32 stored in the header
    pub fn magic_value(self) -> u32 {
        u32::from_le_bytes(self.magic())
    }

    pub fn default_port(self) -> u16 {
        match self {
            Network::MainNet => 8333,
            Network::TestNet => 18333,
            Network::RegTest => 18444,
        }
    }

    pub fn from_magic(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [0xf9, 0xbe, 0xb4, 0xd9] => Some(Self::MainNet),
            [0x0b, 0x11, 0x09, 0x07] => Some(Self::TestNet),
            [0xfa, 0xbf, 0xb5, 0xda] => Some(Self::RegTest),
            _ => None,
        }
    }

    /// Rejects traffic whose magic belongs to another network
    pub fn check_magic(self, magic: u32) -> std::result::Result<(), Violation> {
        if magic == self.magic_value() {
            return Ok(());
        }

        Err(Violation::WrongNetwork {
            expected: self,
            received: magic.to_le_bytes(),
        })
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "main" => Ok(Self::MainNet),
            "testnet" | "test" => Ok(Self::TestNet),
            "regtest" => Ok(Self::RegTest),
            other => Err(other.to_string()),
        }
    }
}
