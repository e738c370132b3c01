// #![warn(unused_crate_dependencies)]
#![deny(unused_must_use, rust_2018_idioms)]

//! Bitcoin p2p handshake
//!
//! This crate frames `version` and `verack` messages and drives the
//! version/verack exchange with a single peer.

mod command;
mod config;
mod encode;
mod errors;
mod handshake;
mod message;
mod network;
mod payload;

pub use command::{Command, COMMAND_NAME_SIZE};
pub use config::{default_user_agent, ConfigError, MessageConfig, NodeConfig};
pub use encode::{decode, encode, Decodable, Encodable};
pub use errors::{EncodingError, HandshakeError, Phase, Result, Violation};
pub use handshake::{connect, perform, run, HandshakeOutcome};
pub use message::{checksum, extract_command, Header, Message, HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use network::Network;
pub use payload::{Payload, ServiceFlags, VersionPayload, MAX_USER_AGENT_SIZE, PROTOCOL_VERSION};
