use std::io::{ErrorKind, Read};
use std::time::Instant;

use brpnav_transport::IgtStream;
use bytes::{Buf, BytesMut};
use tracing::{debug, trace, warn};

use crate::body::Body;
use crate::codec::{FrameConfig, Message, MessageHeader};
use crate::crc::crc64;
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads messages from any `Read` stream, header first.
///
/// After [`read_header`](Self::read_header) the body stays pending until it
/// is read with [`read_body`](Self::read_body) or dropped with
/// [`skip_body`](Self::skip_body). Reading the next header skips a pending
/// body automatically. Bytes already buffered survive a read timeout, so a
/// timed-out call can simply be retried.
pub struct MessageReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
    pending: Option<MessageHeader>,
    /// Bytes of a rejected body still to be dropped, unbuffered.
    oversized: u64,
}

impl<T: Read> MessageReader<T> {
    /// Create a new message reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new message reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
            pending: None,
            oversized: 0,
        }
    }

    /// Read the next message header (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    /// After `BodyTooLarge` the rejected body is dropped by the next call,
    /// so the stream stays framed.
    pub fn read_header(&mut self) -> Result<MessageHeader> {
        self.read_header_with(&mut |_: &T| Ok(()))
    }

    /// Read and decode the body belonging to `header` (blocking).
    ///
    /// `header` must be the one most recently returned by
    /// [`read_header`](Self::read_header). The body CRC is verified before
    /// decoding.
    pub fn read_body(&mut self, header: &MessageHeader) -> Result<Body> {
        self.read_body_with(header, &mut |_: &T| Ok(()))
    }

    /// Discard the body belonging to `header` without decoding it.
    pub fn skip_body(&mut self, header: &MessageHeader) -> Result<()> {
        self.skip_body_with(header, &mut |_: &T| Ok(()))
    }

    /// Read a complete message.
    pub fn read_message(&mut self) -> Result<Message> {
        let header = self.read_header()?;
        let body = self.read_body(&header)?;
        Ok(Message { header, body })
    }

    /// Header whose body has not been consumed yet.
    pub fn pending_header(&self) -> Option<&MessageHeader> {
        self.pending.as_ref()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum body size for subsequent headers.
    pub fn set_max_body_size(&mut self, max_body_size: usize) {
        self.config.max_body_size = max_body_size;
    }

    /// Current reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// `before_read` runs ahead of every read from the stream and may
    /// refuse it.
    fn read_header_with<F>(&mut self, before_read: &mut F) -> Result<MessageHeader>
    where
        F: FnMut(&T) -> Result<()>,
    {
        self.drop_oversized(before_read)?;
        if let Some(previous) = self.pending.take() {
            debug!(
                message_type = %previous.message_type,
                device_name = %previous.device_name,
                "skipping unread body"
            );
            if let Err(err) = self.discard(previous.body_size as usize, before_read) {
                self.pending = Some(previous);
                return Err(err);
            }
        }

        loop {
            if let Some(header) = MessageHeader::decode(&mut self.buf)? {
                if header.body_size > self.config.max_body_size as u64 {
                    warn!(
                        device_name = %header.device_name,
                        body_size = header.body_size,
                        "rejecting oversized body"
                    );
                    self.oversized = header.body_size;
                    return Err(FrameError::BodyTooLarge {
                        size: header.body_size,
                        max: self.config.max_body_size,
                    });
                }
                trace!(
                    message_type = %header.message_type,
                    device_name = %header.device_name,
                    body_size = header.body_size,
                    "header received"
                );
                self.pending = Some(header.clone());
                return Ok(header);
            }
            self.fill(before_read)?;
        }
    }

    fn read_body_with<F>(&mut self, header: &MessageHeader, before_read: &mut F) -> Result<Body>
    where
        F: FnMut(&T) -> Result<()>,
    {
        self.expect_pending(header)?;
        let size = header.body_size as usize;
        self.fill_to(size, before_read)?;
        self.pending = None;

        let payload = self.buf.split_to(size).freeze();
        let actual = crc64(&payload);
        if actual != header.crc {
            return Err(FrameError::ChecksumMismatch {
                expected: header.crc,
                actual,
            });
        }
        Body::decode(&header.message_type, payload)
    }

    fn skip_body_with<F>(&mut self, header: &MessageHeader, before_read: &mut F) -> Result<()>
    where
        F: FnMut(&T) -> Result<()>,
    {
        self.expect_pending(header)?;
        self.discard(header.body_size as usize, before_read)?;
        self.pending = None;
        Ok(())
    }

    fn expect_pending(&self, header: &MessageHeader) -> Result<()> {
        match &self.pending {
            Some(pending) if pending == header => Ok(()),
            _ => Err(FrameError::NoPendingBody(format!(
                "{} {}",
                header.message_type, header.device_name
            ))),
        }
    }

    fn drop_oversized<F>(&mut self, before_read: &mut F) -> Result<()>
    where
        F: FnMut(&T) -> Result<()>,
    {
        while self.oversized > 0 {
            if self.buf.is_empty() {
                self.fill(before_read)?;
            }
            let n = self.buf.len().min(usize::try_from(self.oversized).unwrap_or(usize::MAX));
            self.buf.advance(n);
            self.oversized -= n as u64;
        }
        Ok(())
    }

    fn discard<F>(&mut self, size: usize, before_read: &mut F) -> Result<()>
    where
        F: FnMut(&T) -> Result<()>,
    {
        self.fill_to(size, before_read)?;
        self.buf.advance(size);
        Ok(())
    }

    fn fill_to<F>(&mut self, size: usize, before_read: &mut F) -> Result<()>
    where
        F: FnMut(&T) -> Result<()>,
    {
        while self.buf.len() < size {
            self.fill(before_read)?;
        }
        Ok(())
    }

    fn fill<F>(&mut self, before_read: &mut F) -> Result<()>
    where
        F: FnMut(&T) -> Result<()>,
    {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            before_read(&self.inner)?;
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
            return Ok(());
        }
    }
}

impl MessageReader<IgtStream> {
    /// Create a message reader for `IgtStream` and apply read timeout from config.
    pub fn with_config_igt(inner: IgtStream, config: FrameConfig) -> Result<Self> {
        inner.set_read_timeout(config.read_timeout)?;
        Ok(Self::with_config(inner, config))
    }

    /// Like [`read_header`](Self::read_header), but fails with a timed-out
    /// I/O error once `deadline` passes, however the bytes are paced.
    ///
    /// The socket read timeout is left at whatever remained before the last
    /// read.
    pub fn read_header_until(&mut self, deadline: Instant) -> Result<MessageHeader> {
        self.read_header_with(&mut |stream: &IgtStream| arm_until(stream, deadline))
    }

    /// Like [`read_body`](Self::read_body), bounded by `deadline`.
    pub fn read_body_until(&mut self, header: &MessageHeader, deadline: Instant) -> Result<Body> {
        self.read_body_with(header, &mut |stream: &IgtStream| arm_until(stream, deadline))
    }

    /// Like [`skip_body`](Self::skip_body), bounded by `deadline`.
    pub fn skip_body_until(&mut self, header: &MessageHeader, deadline: Instant) -> Result<()> {
        self.skip_body_with(header, &mut |stream: &IgtStream| arm_until(stream, deadline))
    }
}

fn arm_until(stream: &IgtStream, deadline: Instant) -> Result<()> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        return Err(FrameError::Io(std::io::Error::new(
            ErrorKind::TimedOut,
            "receive deadline passed",
        )));
    }
    stream.set_read_timeout(Some(remaining))?;
    Ok(())
}
