use brpnav_frame::Message;
use brpnav_peer::{connect_with_config, ConnectionConfig, ConnectionError, Query};
use tracing::debug;

use crate::cmd::{parse_duration, parse_endpoint, QueryArg, SendArgs};
use crate::exit::{connection_error, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_message, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let endpoint = parse_endpoint(&args.endpoint)?;
    let quiet = parse_duration(&args.quiet, false)?;
    let mut conn = connect_with_config(
        &endpoint,
        ConnectionConfig {
            default_timeout: Some(quiet),
            ..ConnectionConfig::default()
        },
    )
    .map_err(|err| connection_error("connect failed", err))?;

    let sent = match (&args.command, args.query) {
        (_, Some(query)) => {
            let query = match query {
                QueryArg::Status => Query::Status,
                QueryArg::Transform => Query::Transform,
            };
            conn.send_query(&args.name, query)
        }
        (Some(command), None) => conn.send_string(&args.name, command),
        (None, None) => Ok(()),
    };
    sent.map_err(|err| connection_error("send failed", err))?;

    let replies = collect_replies(|| conn.receive(None))
        .map_err(|err| connection_error("receive failed", err))?;
    for reply in &replies {
        print_message(reply, format);
    }

    if replies.is_empty() {
        return Ok(TIMEOUT);
    }
    Ok(SUCCESS)
}

/// Receive until the peer goes quiet or hangs up.
fn collect_replies<F>(mut receive: F) -> Result<Vec<Message>, ConnectionError>
where
    F: FnMut() -> Result<Message, ConnectionError>,
{
    let mut replies = Vec::new();
    loop {
        match receive() {
            Ok(message) => replies.push(message),
            Err(err) if err.is_timeout() => break,
            Err(ConnectionError::Disconnected(peer)) => {
                debug!(%peer, "peer closed the connection");
                break;
            }
            Err(err) => return Err(err),
        }
    }
    Ok(replies)
}
