use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use brpnav_conformance::config::load_json;
use brpnav_conformance::{Fault, RobotSimulator, SimulatorConfig};
use brpnav_peer::RobotListener;
use tracing::{info, warn};

use crate::cmd::{parse_duration, parse_endpoint, SimulateArgs};
use crate::exit::{config_error, connection_error, CliError, CliResult, INTERNAL, SUCCESS, USAGE};
use crate::output::{print_session, OutputFormat};

pub fn run(args: SimulateArgs, format: OutputFormat) -> CliResult<i32> {
    let endpoint = parse_endpoint(&args.endpoint)?;
    let config = simulator_config(&args)?;
    let listener =
        RobotListener::bind(&endpoint).map_err(|err| connection_error("bind failed", err))?;
    info!(
        endpoint = %listener.local_endpoint(),
        fault = ?config.fault,
        "robot simulator listening"
    );

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    while running.load(Ordering::SeqCst) {
        let conn = listener
            .accept()
            .map_err(|err| connection_error("accept failed", err))?;
        let peer = conn.id().to_string();

        match RobotSimulator::new(config.clone()).serve(conn) {
            Ok(report) => print_session(&report, &peer, format),
            Err(err) => warn!(peer = %peer, error = %err, "session failed"),
        }

        if args.once {
            break;
        }
    }

    Ok(SUCCESS)
}

fn simulator_config(args: &SimulateArgs) -> CliResult<SimulatorConfig> {
    let mut config: SimulatorConfig = match &args.config {
        Some(path) => load_json(path).map_err(config_error)?,
        None => SimulatorConfig::default(),
    };
    if let Some(updates) = args.motion_updates {
        config.motion_updates = updates;
    }
    if let Some(interval) = &args.motion_interval {
        config.motion_interval = parse_duration(interval, true)?;
    }
    if let Some(fault) = &args.fault {
        config.fault = Some(
            fault
                .parse::<Fault>()
                .map_err(|err| CliError::new(USAGE, err))?,
        );
    }
    Ok(config)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn args() -> SimulateArgs {
        SimulateArgs {
            endpoint: "unix:/tmp/robot.sock".to_string(),
            config: None,
            motion_updates: None,
            motion_interval: None,
            fault: None,
            once: false,
        }
    }

    #[test]
    fn flags_override_defaults() {
        let config = simulator_config(&SimulateArgs {
            motion_updates: Some(0),
            motion_interval: Some("0".to_string()),
            fault: Some("silent".to_string()),
            ..args()
        })
        .expect("flags should apply");
        assert_eq!(config.motion_updates, 0);
        assert_eq!(config.motion_interval, Duration::ZERO);
        assert_eq!(config.fault, Some(Fault::Silent));
    }

    #[test]
    fn unknown_fault_is_usage_error() {
        let err = simulator_config(&SimulateArgs {
            fault: Some("explode".to_string()),
            ..args()
        })
        .expect_err("unknown fault");
        assert_eq!(err.code, USAGE);
    }
}
