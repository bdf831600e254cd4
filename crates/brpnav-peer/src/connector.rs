use brpnav_transport::Endpoint;
use tracing::info;

use crate::connection::{Connection, ConnectionConfig};
use crate::error::Result;

/// Connect to a robot controller with default configuration.
pub fn connect(endpoint: &Endpoint) -> Result<Connection> {
    connect_with_config(endpoint, ConnectionConfig::default())
}

/// Connect with explicit configuration.
pub fn connect_with_config(endpoint: &Endpoint, config: ConnectionConfig) -> Result<Connection> {
    let stream = endpoint.connect()?;
    info!(%endpoint, "connected to navigation peer");
    Connection::from_stream(endpoint.to_string(), stream, config)
}

#[cfg(all(test, unix))]
mod tests {
    use std::thread;

    use brpnav_transport::TransportError;

    use super::*;
    use crate::error::ConnectionError;
    use crate::listener::RobotListener;

    #[test]
    fn connect_over_tcp() {
        let endpoint: Endpoint = "127.0.0.1:0".parse().expect("endpoint should parse");
        let listener = RobotListener::bind(&endpoint).expect("listener should bind");
        let target = listener.local_endpoint();

        let server = thread::spawn(move || {
            let mut robot = listener.accept().expect("listener should accept");
            let message = robot.receive(None).expect("command should arrive");
            robot
                .send(&message.header.device_name.replace("CMD", "ACK"), &message.body)
                .expect("echo should send");
        });

        let mut tester = connect(&target).expect("tester should connect");
        tester.send_string("CMD_0001", "START_UP").expect("command should send");
        let ack = tester.receive(None).expect("ack should arrive");
        assert_eq!(ack.header.device_name, "ACK_0001");

        server.join().expect("server thread should complete");
    }

    #[test]
    fn connect_refused_is_transport_error() {
        let port = brpnav_transport::TcpTransport::bind("127.0.0.1", 0)
            .expect("listener should bind")
            .local_addr()
            .port();
        let endpoint = Endpoint::Tcp {
            host: "127.0.0.1".to_string(),
            port,
        };
        let err = connect(&endpoint).expect_err("nobody listens");
        assert!(matches!(
            err,
            ConnectionError::Transport(TransportError::Connect { .. })
        ));
    }
}
