use std::time::{Duration, Instant};

use brpnav_frame::{
    Body, FrameConfig, FrameError, Matrix4x4, Message, MessageHeader, MessageReader,
    MessageWriter, StatusBody, StringBody, DEFAULT_MAX_BODY,
};
use brpnav_transport::IgtStream;
use serde::Serialize;
use tracing::debug;

use crate::error::{ConnectionError, Result};

/// Receive deadline used when the caller passes no explicit one.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on a single blocking write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

// Sockets reject a zero timeout.
const MIN_SOCKET_TIMEOUT: Duration = Duration::from_millis(1);

/// Connection behavior knobs.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Deadline for a receive that does not name one. `None` blocks
    /// until a message arrives.
    pub default_timeout: Option<Duration>,
    /// Bound on a single blocking write.
    pub write_timeout: Option<Duration>,
    /// Maximum accepted body size.
    pub max_body_size: usize,
}

impl ConnectionConfig {
    /// Configuration for the responding side, which waits on its peer
    /// without a deadline.
    pub fn responder() -> Self {
        Self {
            default_timeout: None,
            ..Self::default()
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            default_timeout: Some(DEFAULT_RECEIVE_TIMEOUT),
            write_timeout: Some(DEFAULT_WRITE_TIMEOUT),
            max_body_size: DEFAULT_MAX_BODY,
        }
    }
}

/// Body-less query messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    Status,
    Transform,
}

/// Message counters for one connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MessageStats {
    pub sent: u64,
    pub received: u64,
    pub bytes_sent: u64,
}

/// An established connection to a navigation peer.
///
/// Exactly one owner sends and receives on it. Dropping the connection
/// closes the socket.
pub struct Connection {
    id: String,
    reader: MessageReader<IgtStream>,
    writer: MessageWriter<IgtStream>,
    config: ConnectionConfig,
    /// Window of the receive in progress; the body read reuses it.
    window: Option<Duration>,
    /// Whether the socket currently carries a read timeout.
    timeout_armed: bool,
    stats: MessageStats,
}

impl Connection {
    /// Wrap a connected stream.
    pub fn from_stream(
        id: impl Into<String>,
        stream: IgtStream,
        config: ConnectionConfig,
    ) -> Result<Self> {
        let reader_stream = stream.try_clone()?;
        let frame_config = FrameConfig {
            max_body_size: config.max_body_size,
            read_timeout: config.default_timeout.map(socket_timeout),
            write_timeout: config.write_timeout.map(socket_timeout),
        };
        let timeout_armed = frame_config.read_timeout.is_some();
        let reader = MessageReader::with_config_igt(reader_stream, frame_config.clone())?;
        let writer = MessageWriter::with_config_igt(stream, frame_config)?;

        let id = id.into();
        debug!(
            connection = %id,
            peer = %reader.get_ref().peer_description(),
            "connection established"
        );

        Ok(Self {
            id,
            reader,
            writer,
            window: config.default_timeout,
            config,
            timeout_armed,
            stats: MessageStats::default(),
        })
    }

    /// Connection identifier used in logs.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human-readable peer address.
    pub fn peer_description(&self) -> String {
        self.writer.get_ref().peer_description()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Messages exchanged so far.
    pub fn stats(&self) -> MessageStats {
        self.stats
    }

    /// Send one message.
    pub fn send(&mut self, name: &str, body: &Body) -> Result<()> {
        let written = self
            .writer
            .send(name, body)
            .map_err(|err| self.map_err(err, self.config.write_timeout))?;
        self.stats.sent += 1;
        self.stats.bytes_sent += written as u64;
        debug!(
            connection = %self.id,
            message_type = %body.message_type(),
            name,
            "sent"
        );
        Ok(())
    }

    /// Send a STRING message.
    pub fn send_string(&mut self, name: &str, text: &str) -> Result<()> {
        self.send(name, &Body::String(StringBody::new(text)))
    }

    /// Send a STATUS message.
    pub fn send_status(&mut self, name: &str, status: StatusBody) -> Result<()> {
        self.send(name, &Body::Status(status))
    }

    /// Send a TRANSFORM message.
    pub fn send_transform(&mut self, name: &str, matrix: &Matrix4x4) -> Result<()> {
        self.send(name, &Body::Transform(*matrix))
    }

    /// Send a GET_STATUS or GET_TRANSFORM query.
    pub fn send_query(&mut self, name: &str, query: Query) -> Result<()> {
        let body = match query {
            Query::Status => Body::GetStatus,
            Query::Transform => Body::GetTransform,
        };
        self.send(name, &body)
    }

    /// Wait for the next message header.
    ///
    /// `timeout` of `None` falls back to [`ConnectionConfig::default_timeout`].
    /// The timeout is a deadline for the whole header, however slowly its
    /// bytes arrive. An unread body of the previous message is skipped
    /// first, within the same deadline.
    pub fn receive_header(&mut self, timeout: Option<Duration>) -> Result<MessageHeader> {
        let window = timeout.or(self.config.default_timeout);
        self.window = window;
        let header = match window {
            Some(window) => {
                self.timeout_armed = true;
                self.reader.read_header_until(Instant::now() + window)
            }
            None => {
                self.disarm_read_timeout()?;
                self.reader.read_header()
            }
        }
        .map_err(|err| self.map_err(err, window))?;
        self.stats.received += 1;
        debug!(
            connection = %self.id,
            message_type = %header.message_type,
            name = %header.device_name,
            body_size = header.body_size,
            "received header"
        );
        Ok(header)
    }

    /// Read and decode the body of the header just received.
    ///
    /// Bounded by a fresh deadline as long as the header's.
    pub fn receive_body(&mut self, header: &MessageHeader) -> Result<Body> {
        let window = self.window;
        match window {
            Some(window) => self.reader.read_body_until(header, Instant::now() + window),
            None => {
                self.disarm_read_timeout()?;
                self.reader.read_body(header)
            }
        }
        .map_err(|err| self.map_err(err, window))
    }

    /// Discard the body of the header just received.
    pub fn skip_body(&mut self, header: &MessageHeader) -> Result<()> {
        let window = self.window;
        match window {
            Some(window) => self.reader.skip_body_until(header, Instant::now() + window),
            None => {
                self.disarm_read_timeout()?;
                self.reader.skip_body(header)
            }
        }
        .map_err(|err| self.map_err(err, window))
    }

    /// Receive one complete message.
    pub fn receive(&mut self, timeout: Option<Duration>) -> Result<Message> {
        let header = self.receive_header(timeout)?;
        let body = self.receive_body(&header)?;
        Ok(Message { header, body })
    }

    /// Shut the socket down in both directions.
    pub fn close(self) -> Result<()> {
        debug!(
            connection = %self.id,
            sent = self.stats.sent,
            received = self.stats.received,
            "closing connection"
        );
        self.writer.get_ref().shutdown()?;
        Ok(())
    }

    fn disarm_read_timeout(&mut self) -> Result<()> {
        if self.timeout_armed {
            self.reader.get_ref().set_read_timeout(None)?;
            self.timeout_armed = false;
        }
        Ok(())
    }

    fn map_err(&self, err: FrameError, deadline: Option<Duration>) -> ConnectionError {
        if err.is_timeout() {
            return ConnectionError::Timeout(deadline.unwrap_or_default());
        }
        match err {
            FrameError::ConnectionClosed => ConnectionError::Disconnected(self.id.clone()),
            FrameError::Io(io)
                if matches!(
                    io.kind(),
                    std::io::ErrorKind::BrokenPipe
                        | std::io::ErrorKind::ConnectionReset
                        | std::io::ErrorKind::ConnectionAborted
                ) =>
            {
                ConnectionError::Disconnected(format!("{}: {io}", self.id))
            }
            other => ConnectionError::Frame(other),
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer_description())
            .field("stats", &self.stats)
            .finish()
    }
}

fn socket_timeout(timeout: Duration) -> Duration {
    timeout.max(MIN_SOCKET_TIMEOUT)
}
