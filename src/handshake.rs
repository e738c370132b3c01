//! Version/verack handshake with a single peer.
//!
//! The stream is split in two. A send task owns the write half and writes
//! whatever frames are queued for it, while a receive task owns the read half
//! and walks the handshake states. The caller only waits for the receive task
//! to reach a terminal state.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf},
    net::TcpStream,
    sync::mpsc::{channel, Receiver, Sender},
    task::JoinError,
    time::{timeout, Instant},
};

use super::{
    command::Command,
    config::{MessageConfig, NodeConfig},
    encode::Decodable,
    errors::{HandshakeError, Phase, Result, Violation},
    message::{extract_command, Header, Message, HEADER_SIZE},
    network::Network,
    payload::{ServiceFlags, VersionPayload},
};

/// Frames waiting for the send task: version and verack.
const FRAMES_BUFFER_SIZE: usize = 2;

/// What a completed handshake learned about the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeOutcome {
    /// The peer's version payload, when it could be decoded.
    pub peer_version: Option<VersionPayload>,

    /// Messages skipped while waiting for verack.
    pub ignored: usize,

    /// Frames written to the peer.
    pub frames_sent: usize,

    /// Time from the first send to the peer's verack.
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitVersion,
    SendVerack,
    AwaitVerack,
    Done,
}

/// A serialized message queued for the send task.
#[derive(Debug)]
struct Frame {
    command: Command,
    bytes: Vec<u8>,
}

impl Frame {
    fn new(command: Command, config: &MessageConfig) -> Result<Self> {
        let phase = Self::phase_of(command);
        let bytes = Message::build(command, config)
            .and_then(|msg| msg.serialize())
            .map_err(HandshakeError::encoding(phase))?;
        Ok(Self { command, bytes })
    }

    fn phase(&self) -> Phase {
        Self::phase_of(self.command)
    }

    fn phase_of(command: Command) -> Phase {
        match command {
            Command::Version => Phase::SendingVersion,
            Command::VerAck => Phase::SendingVerack,
        }
    }
}

/// Opens the TCP connection to the configured peer.
pub async fn connect(config: &NodeConfig) -> Result<TcpStream> {
    let phase = Phase::Connecting;
    within(phase, config.connect_timeout, async {
        TcpStream::connect(&config.address)
            .await
            .map_err(HandshakeError::transport(phase))
    })
    .await
}

/// Connects to the configured peer and performs the handshake.
pub async fn run(config: &NodeConfig) -> Result<HandshakeOutcome> {
    tracing::info!("Connecting to {}", config.address);
    let stream = connect(config).await?;
    tracing::info!("Connected to {}", config.address);

    perform(stream, config).await
}

/// Performs the handshake over an already connected stream.
pub async fn perform<S>(stream: S, config: &NodeConfig) -> Result<HandshakeOutcome>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let started = Instant::now();
    let version = Frame::new(Command::Version, &config.message)?;

    let (reader, writer) = tokio::io::split(stream);
    let (frames_tx, frames_rx) = channel::<Frame>(FRAMES_BUFFER_SIZE);

    let mut send_task = tokio::spawn(send_frames(writer, frames_rx));

    tracing::info!("Sending version on {:?}", config.message.network);
    frames_tx
        .send(version)
        .await
        .map_err(|_| send_task_stopped(Phase::SendingVersion))?;

    let coordinator = Coordinator {
        reader,
        header: [0u8; HEADER_SIZE],
        frames: frames_tx,
        network: config.message.network,
        message: config.message.clone(),
        version_timeout: config.version_timeout,
        verack_timeout: config.verack_timeout,
    };
    let mut receive_task = tokio::spawn(coordinator.run());

    // A failed write ends the handshake early; a finished send task is kept
    // until the receive side is done.
    let mut sent = None;
    let received = loop {
        tokio::select! {
            biased;
            joined = &mut receive_task => break joined,
            joined = &mut send_task, if sent.is_none() => match joined {
                Ok(Err(err)) => {
                    receive_task.abort();
                    return Err(err);
                }
                other => sent = Some(other),
            },
        }
    };

    let (peer_version, ignored) = unwrap_join(Phase::AwaitingVerack, received)?;
    let sent = match sent {
        Some(sent) => sent,
        None => send_task.await,
    };
    let frames_sent = unwrap_join(Phase::SendingVerack, sent)?;

    let outcome = HandshakeOutcome {
        peer_version,
        ignored,
        frames_sent,
        elapsed: started.elapsed(),
    };
    tracing::info!("Handshake completed in {:?}", outcome.elapsed);

    Ok(outcome)
}

/// Receive side of the handshake.
struct Coordinator<R> {
    reader: ReadHalf<R>,
    header: [u8; HEADER_SIZE],
    frames: Sender<Frame>,
    network: Network,
    message: MessageConfig,
    version_timeout: Duration,
    verack_timeout: Duration,
}

impl<R: AsyncRead> Coordinator<R> {
    async fn run(mut self) -> Result<(Option<VersionPayload>, usize)> {
        let mut state = State::AwaitVersion;
        let mut peer_version = None;
        let mut ignored = 0;

        loop {
            let next = match state {
                State::AwaitVersion => {
                    let limit = self.version_timeout;
                    peer_version = within(Phase::AwaitingVersion, limit, self.await_version()).await?;
                    State::SendVerack
                }
                State::SendVerack => {
                    self.send_verack().await?;
                    State::AwaitVerack
                }
                State::AwaitVerack => {
                    let limit = self.verack_timeout;
                    ignored = within(Phase::AwaitingVerack, limit, self.await_verack()).await?;
                    State::Done
                }
                State::Done => return Ok((peer_version, ignored)),
            };

            tracing::debug!("{:?} -> {:?}", state, next);
            state = next;
        }
    }

    async fn await_version(&mut self) -> Result<Option<VersionPayload>> {
        let phase = Phase::AwaitingVersion;
        let (command, header) = self.read_header(phase).await?;

        if Command::from_name(&command) != Some(Command::Version) {
            return Err(HandshakeError::ProtocolViolation {
                phase,
                violation: Violation::UnexpectedCommand {
                    expected: Command::Version.name(),
                    received: command,
                },
            });
        }

        let payload = self.read_payload(&header, phase).await?;
        match VersionPayload::from_bytes(&payload) {
            Ok(peer) => {
                tracing::info!(
                    "Received version {} from {:?} at height {} (full node: {})",
                    peer.version,
                    peer.user_agent,
                    peer.start_height,
                    peer.services().contains(ServiceFlags::NODE_NETWORK)
                );
                Ok(Some(peer))
            }
            Err(err) => {
                tracing::warn!("Received version with unreadable payload: {}", err);
                Ok(None)
            }
        }
    }

    async fn send_verack(&mut self) -> Result<()> {
        let verack = Frame::new(Command::VerAck, &self.message)?;

        tracing::info!("Sending verack");
        self.frames
            .send(verack)
            .await
            .map_err(|_| send_task_stopped(Phase::SendingVerack))
    }

    /// Reads frames until a verack, returning how many others were skipped.
    async fn await_verack(&mut self) -> Result<usize> {
        let phase = Phase::AwaitingVerack;
        let mut ignored = 0;

        loop {
            let (command, header) = self.read_header(phase).await?;
            // Skipped payloads are still consumed so the next header stays aligned.
            self.read_payload(&header, phase).await?;

            if Command::from_name(&command) == Some(Command::VerAck) {
                tracing::info!("Received verack");
                return Ok(ignored);
            }

            tracing::debug!("Ignoring {:?} while waiting for verack", command);
            ignored += 1;
        }
    }

    /// Reads one header into the reused buffer and checks its magic and length.
    async fn read_header(&mut self, phase: Phase) -> Result<(String, Header)> {
        self.reader
            .read_exact(&mut self.header)
            .await
            .map_err(HandshakeError::transport(phase))?;

        let command = extract_command(&self.header);
        let header = Header::from_bytes(&self.header).map_err(HandshakeError::encoding(phase))?;
        header
            .validate(self.network)
            .map_err(HandshakeError::violation(phase))?;

        tracing::debug!("Read {:?} header announcing {} bytes", command, header.length);
        Ok((command, header))
    }

    /// Reads the payload announced by `header` and checks its checksum.
    async fn read_payload(&mut self, header: &Header, phase: Phase) -> Result<Vec<u8>> {
        let mut payload = vec![0u8; header.payload_len()];
        self.reader
            .read_exact(&mut payload)
            .await
            .map_err(HandshakeError::transport(phase))?;
        header
            .verify_payload(&payload)
            .map_err(HandshakeError::violation(phase))?;

        Ok(payload)
    }
}

/// Writes queued frames until every sender is gone.
async fn send_frames<W: AsyncWrite + Unpin>(mut writer: W, mut frames: Receiver<Frame>) -> Result<usize> {
    let mut sent = 0;

    while let Some(frame) = frames.recv().await {
        if let Err(err) = write_frame(&mut writer, &frame.bytes).await {
            tracing::error!("Failed to send {}: {}", frame.command.name(), err);
            return Err(HandshakeError::transport(frame.phase())(err));
        }

        tracing::debug!("Sent {} ({} bytes)", frame.command.name(), frame.bytes.len());
        sent += 1;
    }

    Ok(sent)
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, bytes: &[u8]) -> io::Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await
}

/// Runs `fut`, failing with a timeout for `phase` once `limit` has passed.
async fn within<T>(phase: Phase, limit: Duration, fut: impl Future<Output = Result<T>>) -> Result<T> {
    timeout(limit, fut)
        .await
        .map_err(|_| HandshakeError::HandshakeTimeout {
            phase,
            timeout: limit,
        })?
}

fn send_task_stopped(phase: Phase) -> HandshakeError {
    HandshakeError::Transport {
        phase,
        source: io::Error::new(io::ErrorKind::BrokenPipe, "send task stopped"),
    }
}

/// Unwraps a joined task, blaming `phase` if the task was cancelled.
fn unwrap_join<T>(phase: Phase, joined: std::result::Result<Result<T>, JoinError>) -> Result<T> {
    match joined {
        Ok(result) => result,
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        Err(err) => Err(HandshakeError::Transport {
            phase,
            source: io::Error::new(io::ErrorKind::Interrupted, err),
        }),
    }
}
