use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::{
    io::{Read, Write},
    time::SystemTime,
};

use super::{
    command::Command,
    config::MessageConfig,
    encode::{Decodable, EncodeResult, Encodable},
    errors::EncodingError,
};

/// Version of the p2p protocol advertised by this implementation
pub const PROTOCOL_VERSION: i32 = 70015;

/// Size of a network address block in the version payload
pub const NET_ADDR_SIZE: usize = 26;

/// Longest user agent the single length byte can announce
pub const MAX_USER_AGENT_SIZE: usize = u8::MAX as usize;

/// Payload represents the payload of a message
/// Only version carries data, every other command is sent empty
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Version(VersionPayload),
    Empty,
}

impl Payload {
    /// Builds the payload sent along with `command`
    pub fn build(command: Command, config: &MessageConfig) -> Self {
        match command {
            Command::Version => Payload::Version(VersionPayload::build(config)),
            Command::VerAck => Payload::Empty,
        }
    }

    /// to_bytes converts the payload to bytes
    pub fn to_bytes(&self) -> EncodeResult<Vec<u8>> {
        match self {
            Payload::Version(version_payload) => version_payload.to_bytes(),
            Payload::Empty => Ok(vec![]),
        }
    }
}

/// ServiceFlags represents the service flags of a node
/// https://developer.bitcoin.org/reference/p2p_networking.html#version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceFlags(u64);

impl ServiceFlags {
    /// This node is not a full node. It may not be able to provide any data except for the transactions it originates.
    pub const UNNAMED: ServiceFlags = ServiceFlags(0);

    /// This is a full node and can be asked for full blocks.
    pub const NODE_NETWORK: ServiceFlags = ServiceFlags(0x1);

    /// This is a full node capable and willing to handle bloom-filtered connections.
    pub const NODE_BLOOM: ServiceFlags = ServiceFlags(0x4);

    /// This is a full node that can be asked for blocks and transactions including witness data.
    pub const NODE_WITNESS: ServiceFlags = ServiceFlags(0x8);

    /// This is the same as NODE_NETWORK but the node has at least the last 288 blocks (last 2 days).
    pub const NODE_NETWORK_LIMITED: ServiceFlags = ServiceFlags(0x0400);

    /// Gets the integer representation of this ServiceFlags
    pub fn to_u64(self) -> u64 {
        self.0
    }

    /// Whether every bit of `other` is set
    pub fn contains(self, other: ServiceFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl From<u64> for ServiceFlags {
    fn from(n: u64) -> Self {
        ServiceFlags(n)
    }
}

/// VersionPayload represents the payload of a version message
/// https://developer.bitcoin.org/reference/p2p_networking.html#version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionPayload {
    /// The highest protocol version understood by the transmitting node.
    pub version: i32,

    /// The services supported by the transmitting node encoded as a bitfield.
    pub services: u64,

    /// The current Unix epoch time according to the transmitting node’s clock.
    pub timestamp: i64,

    /// Address of the receiving node. We always send it zero filled.
    pub addr_recv: [u8; NET_ADDR_SIZE],

    /// Address of the transmitting node. We always send it zero filled.
    pub addr_from: [u8; NET_ADDR_SIZE],

    /// If the nonce is 0, the nonce field is ignored.
    pub nonce: u64,

    /// Sent behind a single length byte.
    pub user_agent: String,

    /// The height of the transmitting node’s best block chain.
    pub start_height: i32,

    /// Transaction relay flag (BIP37).
    pub relay: bool,
}

impl VersionPayload {
    pub fn build(config: &MessageConfig) -> Self {
        let timestamp = config.timestamp.unwrap_or_else(unix_now);

        VersionPayload {
            version: config.protocol_version,
            services: config.services,
            timestamp,
            addr_recv: [0u8; NET_ADDR_SIZE],
            addr_from: [0u8; NET_ADDR_SIZE],
            nonce: config.nonce,
            user_agent: config.user_agent.clone(),
            start_height: config.start_height,
            relay: config.relay,
        }
    }

    pub fn services(&self) -> ServiceFlags {
        ServiceFlags::from(self.services)
    }
}

impl Encodable for VersionPayload {
    /// to_bytes converts the payload to bytes
    fn to_bytes(&self) -> EncodeResult<Vec<u8>> {
        let user_agent = self.user_agent.as_bytes();
        if user_agent.len() > MAX_USER_AGENT_SIZE {
            return Err(EncodingError::UserAgentTooLong(user_agent.len()));
        }

        let mut buffer: Vec<u8> = vec![];
        buffer.write_i32::<LittleEndian>(self.version)?;
        buffer.write_u64::<LittleEndian>(self.services)?;
        buffer.write_i64::<LittleEndian>(self.timestamp)?;
        buffer.write_all(&self.addr_recv)?;
        buffer.write_all(&self.addr_from)?;
        buffer.write_u64::<LittleEndian>(self.nonce)?;
        buffer.write_u8(user_agent.len() as u8)?;
        buffer.write_all(user_agent)?;
        buffer.write_i32::<LittleEndian>(self.start_height)?;
        buffer.write_u8(self.relay.into())?;
        Ok(buffer)
    }
}

impl Decodable for VersionPayload {
    /// from_bytes converts bytes to a payload
    /// a missing relay byte reads as true, as older peers omit it
    fn from_bytes(mut bytes: &[u8]) -> EncodeResult<Self> {
        let version = bytes.read_i32::<LittleEndian>()?;
        let services = bytes.read_u64::<LittleEndian>()?;
        let timestamp = bytes.read_i64::<LittleEndian>()?;

        let mut addr_recv = [0u8; NET_ADDR_SIZE];
        bytes.read_exact(&mut addr_recv)?;
        let mut addr_from = [0u8; NET_ADDR_SIZE];
        bytes.read_exact(&mut addr_from)?;

        let nonce = bytes.read_u64::<LittleEndian>()?;

        let user_agent_len = bytes.read_u8()?;
        let mut user_agent = vec![0u8; user_agent_len as usize];
        bytes.read_exact(&mut user_agent)?;
        let user_agent = String::from_utf8(user_agent)?;

        let start_height = bytes.read_i32::<LittleEndian>()?;
        let relay = match bytes.read_u8() {
            Ok(flag) => flag != 0x00,
            Err(_) => true,
        };

        Ok(VersionPayload {
            version,
            services,
            timestamp,
            addr_recv,
            addr_from,
            nonce,
            user_agent,
            start_height,
            relay,
        })
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{Arbitrary, TestResult};
    use quickcheck_macros::quickcheck;

    impl Arbitrary for VersionPayload {
        fn arbitrary(g: &mut quickcheck::Gen) -> VersionPayload {
            let user_agent: String = String::arbitrary(g)
                .chars()
                .filter(char::is_ascii)
                .take(MAX_USER_AGENT_SIZE)
                .collect();

            VersionPayload {
                version: i32::arbitrary(g),
                services: u64::arbitrary(g),
                timestamp: i64::arbitrary(g),
                addr_recv: [0u8; NET_ADDR_SIZE],
                addr_from: [0u8; NET_ADDR_SIZE],
                nonce: u64::arbitrary(g),
                user_agent,
                start_height: i32::arbitrary(g),
                relay: bool::arbitrary(g),
            }
        }
    }

    fn fixed_config() -> MessageConfig {
        MessageConfig::default()
            .with_user_agent("/TestNode:0.0.1/")
            .with_timestamp(1_700_000_000)
    }

    #[quickcheck]
    fn version_data_from_bytes(version_payload: VersionPayload) -> TestResult {
        let bytes = version_payload.to_bytes().unwrap();
        let decoded = VersionPayload::from_bytes(&bytes).unwrap();
        TestResult::from_bool(decoded == version_payload)
    }

    #[quickcheck]
    fn encoded_len_tracks_user_agent(version_payload: VersionPayload) -> TestResult {
        let bytes = version_payload.to_bytes().unwrap();
        let fixed = 4 + 8 + 8 + NET_ADDR_SIZE * 2 + 8 + 1 + 4 + 1;
        TestResult::from_bool(bytes.len() == fixed + version_payload.user_agent.len())
    }

    #[test]
    fn test_field_layout() {
        let payload = VersionPayload::build(&fixed_config().with_nonce(0x0102));
        let bytes = payload.to_bytes().unwrap();

        assert_eq!(&bytes[0..4], &70015i32.to_le_bytes());
        assert_eq!(&bytes[4..12], &1u64.to_le_bytes());
        assert_eq!(&bytes[12..20], &1_700_000_000i64.to_le_bytes());
        assert_eq!(&bytes[20..72], &[0u8; NET_ADDR_SIZE * 2][..]);
        assert_eq!(&bytes[72..80], &0x0102u64.to_le_bytes());
        assert_eq!(bytes[80], 16);
        assert_eq!(&bytes[81..97], b"/TestNode:0.0.1/");
        assert_eq!(&bytes[97..101], &0i32.to_le_bytes());
        assert_eq!(bytes[101], 0x00);
        assert_eq!(bytes.len(), 102);
    }

    #[test]
    fn test_build_uses_config() {
        let payload = VersionPayload::build(&fixed_config().with_relay(true).with_start_height(9));

        assert_eq!(payload.version, PROTOCOL_VERSION);
        assert_eq!(payload.timestamp, 1_700_000_000);
        assert_eq!(payload.nonce, 0);
        assert_eq!(payload.start_height, 9);
        assert!(payload.relay);
        assert!(payload.services().contains(ServiceFlags::NODE_NETWORK));
    }

    #[test]
    fn test_build_stamps_current_time() {
        let payload = VersionPayload::build(&MessageConfig::default());
        assert!(payload.timestamp > 1_600_000_000);
    }

    #[test]
    fn test_user_agent_boundary() {
        let longest = "a".repeat(MAX_USER_AGENT_SIZE);
        let bytes = VersionPayload::build(&fixed_config().with_user_agent(longest.clone()))
            .to_bytes()
            .unwrap();

        assert_eq!(bytes[80], 255);
        assert_eq!(&bytes[81..81 + 255], longest.as_bytes());
        assert_eq!(bytes.len(), 102 - 16 + 255);

        let too_long = "a".repeat(MAX_USER_AGENT_SIZE + 1);
        assert!(matches!(
            VersionPayload::build(&fixed_config().with_user_agent(too_long)).to_bytes(),
            Err(EncodingError::UserAgentTooLong(256))
        ));
    }

    #[test]
    fn test_payload_for_command() {
        let config = fixed_config();

        assert_eq!(Payload::build(Command::VerAck, &config), Payload::Empty);
        assert!(Payload::build(Command::VerAck, &config).to_bytes().unwrap().is_empty());
        assert!(matches!(
            Payload::build(Command::Version, &config),
            Payload::Version(_)
        ));
    }

    #[test]
    fn test_missing_relay_byte() {
        let mut bytes = VersionPayload::build(&fixed_config()).to_bytes().unwrap();
        bytes.pop();

        assert!(VersionPayload::from_bytes(&bytes).unwrap().relay);
    }

    #[test]
    fn test_truncated_payload() {
        let bytes = VersionPayload::build(&fixed_config()).to_bytes().unwrap();

        assert!(matches!(
            VersionPayload::from_bytes(&bytes[..50]),
            Err(EncodingError::BufferIOError(_))
        ));
    }
}
