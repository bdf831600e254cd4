use std::net::{SocketAddr, TcpListener, TcpStream};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::IgtStream;

/// TCP transport.
///
/// Robot controllers and navigation software speak OpenIGTLink over plain
/// TCP. Nagle's algorithm is disabled on every stream so that small
/// status/transform messages are not delayed behind each other.
pub struct TcpTransport {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpTransport {
    /// Bind and listen on `host:port`. Port 0 picks an ephemeral port.
    pub fn bind(host: &str, port: u16) -> Result<Self> {
        let address = format!("{host}:{port}");
        let listener = TcpListener::bind((host, port)).map_err(|e| TransportError::Bind {
            address: address.clone(),
            source: e,
        })?;
        let local_addr = listener.local_addr().map_err(|e| TransportError::Bind {
            address,
            source: e,
        })?;

        info!(%local_addr, "listening on tcp");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<IgtStream> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        stream.set_nodelay(true)?;
        debug!(%peer, "accepted connection");
        Ok(stream.into())
    }

    /// Connect to a listening peer (blocking).
    pub fn connect(host: &str, port: u16) -> Result<IgtStream> {
        let stream = TcpStream::connect((host, port)).map_err(|e| TransportError::Connect {
            address: format!("{host}:{port}"),
            source: e,
        })?;
        stream.set_nodelay(true)?;
        debug!(host, port, "connected over tcp");
        Ok(stream.into())
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn test_bind_accept_connect() {
        let listener = TcpTransport::bind("127.0.0.1", 0).unwrap();
        let port = listener.local_addr().port();
        assert_ne!(port, 0);

        let handle = std::thread::spawn(move || {
            let mut client = TcpTransport::connect("127.0.0.1", port).unwrap();
            client.write_all(b"hello").unwrap();
        });

        let mut server = listener.accept().unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        assert_eq!(server.transport_name(), "tcp");

        handle.join().unwrap();
    }

    #[test]
    fn test_connect_refused() {
        // Bind then drop to find a port nobody listens on.
        let port = TcpTransport::bind("127.0.0.1", 0)
            .unwrap()
            .local_addr()
            .port();
        let result = TcpTransport::connect("127.0.0.1", port);
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}
