use std::io::{ErrorKind, Write};

use brpnav_transport::IgtStream;
use bytes::BytesMut;
use tracing::trace;

use crate::body::Body;
use crate::codec::{encode_message, timestamp_now, FrameConfig, HEADER_SIZE};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete messages to any `Write` stream.
pub struct MessageWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> MessageWriter<T> {
    /// Create a new message writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new message writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Encode and send one message stamped with the current time.
    ///
    /// Returns the number of bytes written.
    pub fn send(&mut self, device_name: &str, body: &Body) -> Result<usize> {
        self.send_at(device_name, body, timestamp_now())
    }

    /// Encode and send one message with an explicit timestamp.
    pub fn send_at(&mut self, device_name: &str, body: &Body, timestamp: u64) -> Result<usize> {
        self.buf.clear();
        encode_message(device_name, body, timestamp, &mut self.buf)?;

        let body_size = self.buf.len() - HEADER_SIZE;
        if body_size > self.config.max_body_size {
            return Err(FrameError::BodyTooLarge {
                size: body_size as u64,
                max: self.config.max_body_size,
            });
        }

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        trace!(
            message_type = %body.message_type(),
            device_name,
            bytes = offset,
            "message written"
        );
        self.flush()?;
        Ok(offset)
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl MessageWriter<IgtStream> {
    /// Create a message writer for `IgtStream` and apply write timeout from config.
    pub fn with_config_igt(inner: IgtStream, config: FrameConfig) -> Result<Self> {
        inner.set_write_timeout(config.write_timeout)?;
        Ok(Self::with_config(inner, config))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::body::{StatusBody, StringBody, IDENTITY};
    use crate::reader::MessageReader;
    use crate::types::StatusCode;

    fn written(writer: MessageWriter<Cursor<Vec<u8>>>) -> MessageReader<Cursor<Vec<u8>>> {
        MessageReader::new(Cursor::new(writer.into_inner().into_inner()))
    }

    #[test]
    fn write_single_message() {
        let mut writer = MessageWriter::new(Cursor::new(Vec::<u8>::new()));
        let n = writer
            .send("CMD_0001", &Body::String(StringBody::new("START_UP")))
            .unwrap();
        assert_eq!(n, HEADER_SIZE + 4 + 8);

        let message = written(writer).read_message().unwrap();
        assert_eq!(message.header.device_name, "CMD_0001");
        assert_eq!(message.body, Body::String(StringBody::new("START_UP")));
    }

    #[test]
    fn write_multiple_messages_in_order() {
        let mut writer = MessageWriter::new(Cursor::new(Vec::<u8>::new()));
        writer
            .send("CMD_0003", &Body::String(StringBody::new("CALIBRATION")))
            .unwrap();
        writer.send("CLB_0004", &Body::Transform(IDENTITY)).unwrap();
        writer
            .send("STATUS", &Body::Status(StatusBody::new(StatusCode::Ok)))
            .unwrap();

        let mut reader = written(writer);
        let names: Vec<String> = (0..3)
            .map(|_| reader.read_message().unwrap().header.device_name)
            .collect();
        assert_eq!(names, ["CMD_0003", "CLB_0004", "STATUS"]);
    }

    #[test]
    fn explicit_timestamp_is_written() {
        let mut writer = MessageWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.send_at("Q", &Body::GetStatus, 42).unwrap();
        let header = written(writer).read_header().unwrap();
        assert_eq!(header.timestamp, 42);
    }

    #[test]
    fn body_too_large_rejected() {
        let cfg = FrameConfig {
            max_body_size: 8,
            ..FrameConfig::default()
        };
        let mut writer = MessageWriter::with_config(Cursor::new(Vec::<u8>::new()), cfg);
        let err = writer.send("CLB_0004", &Body::Transform(IDENTITY)).unwrap_err();
        assert!(matches!(err, FrameError::BodyTooLarge { size: 48, max: 8 }));
        assert!(writer.into_inner().into_inner().is_empty());
    }

    #[test]
    fn flush_propagates() {
        let sink = FlushTrackingWriter::default();
        let flag = Arc::clone(&sink.flushed);
        let mut writer = MessageWriter::new(sink);

        writer.send("X", &Body::GetTransform).unwrap();

        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn handles_interrupted_write_and_flush() {
        let mut writer = MessageWriter::new(InterruptedWriteThenFlush {
            wrote_once: false,
            flush_interrupted: false,
            data: Vec::new(),
        });
        writer.send("X", &Body::GetStatus).unwrap();
        assert_eq!(writer.into_inner().data.len(), HEADER_SIZE);
    }

    #[test]
    fn write_timeout_surfaces_as_io_error() {
        let mut writer = MessageWriter::new(AlwaysWouldBlock);
        let err = writer.send("X", &Body::GetStatus).unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn connection_closed_when_write_returns_zero() {
        let mut writer = MessageWriter::new(ZeroWriter);
        let err = writer.send("X", &Body::GetStatus).unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn applies_write_timeout_for_igt_stream() {
        let (left, _right) = IgtStream::pair().unwrap();
        let cfg = FrameConfig {
            write_timeout: Some(std::time::Duration::from_millis(10)),
            ..FrameConfig::default()
        };
        assert!(MessageWriter::with_config_igt(left, cfg).is_ok());
    }

    #[derive(Default)]
    struct FlushTrackingWriter {
        flushed: Arc<AtomicBool>,
        data: Vec<u8>,
    }

    impl Write for FlushTrackingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct InterruptedWriteThenFlush {
        wrote_once: bool,
        flush_interrupted: bool,
        data: Vec<u8>,
    }

    impl Write for InterruptedWriteThenFlush {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.wrote_once {
                self.wrote_once = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if !self.flush_interrupted {
                self.flush_interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            Ok(())
        }
    }

    struct AlwaysWouldBlock;

    impl Write for AlwaysWouldBlock {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::WouldBlock))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
