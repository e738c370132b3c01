use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use sha2::{Digest, Sha256};
use std::io::Write;

use super::{
    command::{pad_command, unpad_command, Command, COMMAND_NAME_SIZE},
    config::MessageConfig,
    encode::{Decodable, EncodeResult, Encodable},
    errors::{EncodingError, Violation},
    network::Network,
    payload::Payload,
};

const START_STRING_SIZE: usize = 4;
const PAYLOAD_LEN_SIZE: usize = 4;
const CHECKSUM_SIZE: usize = 4;
pub const HEADER_SIZE: usize =
    START_STRING_SIZE + COMMAND_NAME_SIZE + PAYLOAD_LEN_SIZE + CHECKSUM_SIZE;

// 32 MB
pub const MAX_PAYLOAD_SIZE: usize = 32 * 1024 * 1024;

const HEADER_START_STRING_RANGE: std::ops::Range<usize> = 0..4;
const HEADER_COMMAND_NAME_RANGE: std::ops::Range<usize> = 4..16;
const HEADER_PAYLOAD_LEN_RANGE: std::ops::Range<usize> = 16..20;
const HEADER_CHECKSUM_RANGE: std::ops::Range<usize> = 20..24;

/// Header is the fixed 24 byte frame in front of every payload
/// https://developer.bitcoin.org/reference/p2p_networking.html#message-headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: u32,
    pub command: [u8; COMMAND_NAME_SIZE],
    pub length: u32,
    pub checksum: [u8; CHECKSUM_SIZE],
}

impl Header {
    /// Frames `payload` under the command `name` for `network`
    pub fn new(network: Network, name: &str, payload: &[u8]) -> EncodeResult<Self> {
        Ok(Self {
            magic: network.magic_value(),
            command: pad_command(name)?,
            length: payload.len() as u32,
            checksum: checksum(payload),
        })
    }

    /// The command name without its NUL padding
    pub fn command_name(&self) -> String {
        unpad_command(&self.command)
    }

    pub fn payload_len(&self) -> usize {
        self.length as usize
    }

    /// Checks the magic and announced length before any payload is read
    pub fn validate(&self, network: Network) -> Result<(), Violation> {
        network.check_magic(self.magic)?;

        if self.payload_len() > MAX_PAYLOAD_SIZE {
            return Err(Violation::PayloadTooLarge(self.length));
        }

        Ok(())
    }

    /// Checks that `payload` is the one this header announced
    pub fn verify_payload(&self, payload: &[u8]) -> Result<(), Violation> {
        if payload.len() != self.payload_len() || checksum(payload) != self.checksum {
            return Err(Violation::InvalidChecksum {
                command: self.command_name(),
            });
        }

        Ok(())
    }

    pub fn to_array(&self) -> EncodeResult<[u8; HEADER_SIZE]> {
        let mut buffer = [0u8; HEADER_SIZE];
        let mut cursor = &mut buffer[..];

        // start string char[4]
        cursor.write_u32::<LittleEndian>(self.magic)?;

        // command name char[12], NUL padded
        cursor.write_all(&self.command)?;

        // payload length uint32 (4 bytes)
        cursor.write_u32::<LittleEndian>(self.length)?;

        // checksum char[4]
        cursor.write_all(&self.checksum)?;

        Ok(buffer)
    }
}

impl Encodable for Header {
    fn to_bytes(&self) -> EncodeResult<Vec<u8>> {
        Ok(self.to_array()?.to_vec())
    }
}

impl Decodable for Header {
    fn from_bytes(bytes: &[u8]) -> EncodeResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(EncodingError::InvalidHeaderSize);
        }

        Ok(Self {
            magic: (&bytes[HEADER_START_STRING_RANGE]).read_u32::<LittleEndian>()?,
            command: bytes[HEADER_COMMAND_NAME_RANGE].try_into()?,
            length: (&bytes[HEADER_PAYLOAD_LEN_RANGE]).read_u32::<LittleEndian>()?,
            checksum: bytes[HEADER_CHECKSUM_RANGE].try_into()?,
        })
    }
}

/// Message is a header plus the raw payload bytes it frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Message {
    /// Builds the message for `command`, tagging the header with that command
    pub fn build(command: Command, config: &MessageConfig) -> EncodeResult<Self> {
        let payload = Payload::build(command, config).to_bytes()?;
        let header = Header::new(config.network, command.name(), &payload)?;

        Ok(Self { header, payload })
    }

    /// The exact bytes written to the wire
    pub fn serialize(&self) -> EncodeResult<Vec<u8>> {
        // buffer for the BTC proto: https://developer.bitcoin.org/reference/p2p_networking.html#message-headers
        let mut buffer = Vec::with_capacity(HEADER_SIZE + self.payload.len());

        buffer.write_all(&self.header.to_array()?)?;

        // payload char[..] (variable length)
        buffer.write_all(&self.payload)?;

        Ok(buffer)
    }

    /// Reads one framed message; trailing bytes after the payload are ignored
    pub fn deserialize(bytes: &[u8]) -> EncodeResult<Self> {
        let header = Header::from_bytes(bytes)?;

        let payload = &bytes[HEADER_SIZE..];
        if payload.len() < header.payload_len() {
            return Err(EncodingError::TruncatedPayload {
                expected: header.payload_len(),
                actual: payload.len(),
            });
        }

        Ok(Self {
            header,
            payload: payload[..header.payload_len()].to_vec(),
        })
    }
}

impl Encodable for Message {
    fn to_bytes(&self) -> EncodeResult<Vec<u8>> {
        self.serialize()
    }
}

impl Decodable for Message {
    fn from_bytes(bytes: &[u8]) -> EncodeResult<Self>
    where
        Self: Sized,
    {
        Message::deserialize(bytes)
    }
}

/// Command name carried by a raw header, without its padding
/// Magic, length and checksum are not looked at
pub fn extract_command(header: &[u8; HEADER_SIZE]) -> String {
    unpad_command(&header[HEADER_COMMAND_NAME_RANGE])
}

/// Computes Bitcoin checksum for given data
pub fn checksum(data: &[u8]) -> [u8; CHECKSUM_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let hash = hasher.finalize();

    let mut hasher = Sha256::new();
    hasher.update(hash);
    let hash = hasher.finalize();

    let mut buffer = [0u8; CHECKSUM_SIZE];
    buffer.clone_from_slice(&hash[..CHECKSUM_SIZE]);

    buffer
}
