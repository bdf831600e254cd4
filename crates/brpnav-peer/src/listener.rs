use std::sync::atomic::{AtomicU64, Ordering};

use brpnav_transport::{Endpoint, TcpTransport};
#[cfg(unix)]
use brpnav_transport::UnixDomainSocket;

use crate::connection::{Connection, ConnectionConfig};
use crate::error::Result;

enum Socket {
    Tcp(TcpTransport),
    #[cfg(unix)]
    Unix(UnixDomainSocket),
}

/// Listens for and accepts navigation peers on behalf of a robot.
pub struct RobotListener {
    socket: Socket,
    config: ConnectionConfig,
    next_peer_id: AtomicU64,
}

impl RobotListener {
    /// Bind to a TCP or Unix domain socket endpoint.
    ///
    /// Accepted connections use [`ConnectionConfig::responder`].
    pub fn bind(endpoint: &Endpoint) -> Result<Self> {
        let socket = match endpoint {
            Endpoint::Tcp { host, port } => Socket::Tcp(TcpTransport::bind(host, *port)?),
            #[cfg(unix)]
            Endpoint::Unix(path) => Socket::Unix(UnixDomainSocket::bind(path)?),
            #[cfg(not(unix))]
            Endpoint::Unix(_) => {
                let err = brpnav_transport::TransportError::Unsupported(endpoint.to_string());
                return Err(err.into());
            }
        };
        Ok(Self {
            socket,
            config: ConnectionConfig::responder(),
            next_peer_id: AtomicU64::new(1),
        })
    }

    /// Override the configuration of accepted connections.
    pub fn with_config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Accept the next connection (blocking).
    pub fn accept(&self) -> Result<Connection> {
        let stream = match &self.socket {
            Socket::Tcp(tcp) => tcp.accept()?,
            #[cfg(unix)]
            Socket::Unix(uds) => uds.accept()?,
        };
        let id = self.next_peer_id.fetch_add(1, Ordering::Relaxed);
        Connection::from_stream(format!("peer-{id}"), stream, self.config.clone())
    }

    /// The endpoint clients should connect to. For TCP this carries the
    /// actual bound port.
    pub fn local_endpoint(&self) -> Endpoint {
        match &self.socket {
            Socket::Tcp(tcp) => {
                let addr = tcp.local_addr();
                Endpoint::Tcp {
                    host: addr.ip().to_string(),
                    port: addr.port(),
                }
            }
            #[cfg(unix)]
            Socket::Unix(uds) => Endpoint::Unix(uds.path().to_path_buf()),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::path::PathBuf;
    use std::thread;

    use super::*;
    use crate::connector::connect;

    fn make_sock_path(tag: &str) -> PathBuf {
        let dir = PathBuf::from(format!(
            "/tmp/brpnav-{}-{}-{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir.join("robot.sock")
    }

    #[test]
    fn accepts_over_unix_socket() {
        let sock_path = make_sock_path("accept");
        let listener =
            RobotListener::bind(&Endpoint::Unix(sock_path.clone())).expect("listener should bind");
        assert_eq!(listener.local_endpoint(), Endpoint::Unix(sock_path.clone()));

        let server = thread::spawn(move || {
            let mut robot = listener.accept().expect("listener should accept");
            assert_eq!(robot.id(), "peer-1");
            assert!(robot.config().default_timeout.is_none());
            let message = robot.receive(None).expect("command should arrive");
            assert_eq!(message.header.device_name, "CMD_0002");
        });

        let mut tester =
            connect(&Endpoint::Unix(sock_path.clone())).expect("client should connect");
        tester.send_string("CMD_0002", "PLANNING").expect("command should send");
        server.join().expect("server thread should finish");

        if let Some(parent) = sock_path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }

    #[test]
    fn accepts_multiple_sequential_connections() {
        let endpoint: Endpoint = "127.0.0.1:0".parse().expect("endpoint should parse");
        let listener = RobotListener::bind(&endpoint).expect("listener should bind");
        let target = listener.local_endpoint();

        let server = thread::spawn(move || {
            let first = listener.accept().expect("first accept should succeed");
            let second = listener.accept().expect("second accept should succeed");
            assert_eq!(first.id(), "peer-1");
            assert_eq!(second.id(), "peer-2");
        });

        let _c1 = connect(&target).expect("first client should connect");
        let _c2 = connect(&target).expect("second client should connect");
        server.join().expect("server thread should finish");
    }
}
