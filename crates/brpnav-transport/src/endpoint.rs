use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Result, TransportError};
use crate::stream::IgtStream;
use crate::tcp::TcpTransport;

/// Default OpenIGTLink server port.
pub const DEFAULT_IGTL_PORT: u16 = 18944;

const UNIX_PREFIX: &str = "unix:";
const TCP_PREFIX: &str = "tcp:";

/// Address of a navigation peer.
///
/// Parsed from `host:port`, `tcp:host:port`, a bare `host` (default port
/// 18944) or `unix:/path/to/socket`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    Unix(PathBuf),
}

impl Endpoint {
    /// Connect to this endpoint (blocking).
    pub fn connect(&self) -> Result<IgtStream> {
        match self {
            Endpoint::Tcp { host, port } => TcpTransport::connect(host.as_str(), *port),
            #[cfg(unix)]
            Endpoint::Unix(path) => crate::uds::UnixDomainSocket::connect(path),
            #[cfg(not(unix))]
            Endpoint::Unix(path) => Err(TransportError::Unsupported(format!(
                "unix:{}",
                path.display()
            ))),
        }
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let invalid = |reason: &str| TransportError::InvalidEndpoint {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        if let Some(path) = trimmed.strip_prefix(UNIX_PREFIX) {
            if path.is_empty() {
                return Err(invalid("missing socket path"));
            }
            return Ok(Endpoint::Unix(PathBuf::from(path)));
        }

        let address = trimmed.strip_prefix(TCP_PREFIX).unwrap_or(trimmed);
        if address.is_empty() {
            return Err(invalid("empty address"));
        }

        // Bracketed IPv6 literal, e.g. [::1]:18944
        if let Some(rest) = address.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| invalid("unterminated '[' in IPv6 address"))?;
            let port = match tail.strip_prefix(':') {
                Some(port) => parse_port(port).ok_or_else(|| invalid("invalid port"))?,
                None if tail.is_empty() => DEFAULT_IGTL_PORT,
                None => return Err(invalid("unexpected characters after ']'")),
            };
            return Ok(Endpoint::Tcp {
                host: host.to_string(),
                port,
            });
        }

        match address.rsplit_once(':') {
            Some((host, port)) => {
                if host.is_empty() {
                    return Err(invalid("missing host"));
                }
                let port = parse_port(port).ok_or_else(|| invalid("invalid port"))?;
                Ok(Endpoint::Tcp {
                    host: host.to_string(),
                    port,
                })
            }
            None => Ok(Endpoint::Tcp {
                host: address.to_string(),
                port: DEFAULT_IGTL_PORT,
            }),
        }
    }
}

fn parse_port(input: &str) -> Option<u16> {
    input.parse::<u16>().ok()
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } if host.contains(':') => write!(f, "[{host}]:{port}"),
            Endpoint::Tcp { host, port } => write!(f, "{host}:{port}"),
            Endpoint::Unix(path) => write!(f, "{UNIX_PREFIX}{}", path.display()),
        }
    }
}
