use std::path::PathBuf;
use std::time::Duration;

use brpnav_transport::Endpoint;
use clap::{Args, Subcommand, ValueEnum};

use crate::exit::{transport_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod run;
pub mod send;
pub mod simulate;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the conformance script against a robot controller.
    Run(RunArgs),
    /// Serve the reference robot simulator.
    Simulate(SimulateArgs),
    /// Send one command or query and print the replies.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Run(args) => run::run(args, format),
        Command::Simulate(args) => simulate::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ScopeArg {
    /// All eight workflow phases.
    Full,
    /// START_UP, PLANNING and CALIBRATION.
    Reference,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum QueryArg {
    Status,
    Transform,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Robot controller endpoint (host:port or unix:/path).
    pub endpoint: String,
    /// Script configuration file (JSON).
    #[arg(long, value_name = "FILE", env = "BRPNAV_CONFIG")]
    pub config: Option<PathBuf>,
    /// Workflow phases to drive.
    #[arg(long)]
    pub scope: Option<ScopeArg>,
    /// Pause after a successful run (e.g. 5s, 0).
    #[arg(long, value_name = "DURATION")]
    pub settle: Option<String>,
    /// Deadline for receives without an explicit wait class.
    #[arg(long, value_name = "DURATION")]
    pub receive_timeout: Option<String>,
    /// Short wait class deadline.
    #[arg(long, value_name = "DURATION")]
    pub short: Option<String>,
    /// Medium wait class deadline.
    #[arg(long, value_name = "DURATION")]
    pub medium: Option<String>,
    /// Long wait class deadline.
    #[arg(long, value_name = "DURATION")]
    pub long: Option<String>,
    /// Allowed final distance to the target, in mm.
    #[arg(long, value_name = "MM")]
    pub reach_tolerance: Option<f64>,
    /// Allowed element-wise difference from the target rotation.
    #[arg(long, value_name = "TOL")]
    pub orientation_tolerance: Option<f64>,
    /// Submit random rigid calibration and target matrices.
    #[arg(long)]
    pub random_matrices: bool,
    /// Seed for --random-matrices.
    #[arg(long, requires = "random_matrices")]
    pub seed: Option<u64>,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Endpoint to listen on (host:port or unix:/path).
    pub endpoint: String,
    /// Simulator configuration file (JSON).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// CURRENT_POSITION updates streamed while moving.
    #[arg(long, value_name = "N")]
    pub motion_updates: Option<usize>,
    /// Pause between streamed updates (e.g. 100ms).
    #[arg(long, value_name = "DURATION")]
    pub motion_interval: Option<String>,
    /// Inject a fault, e.g. wrong-startup-code, silent, calibration-drift,
    /// fall-short or stall-on-stop.
    #[arg(long, value_name = "FAULT")]
    pub fault: Option<String>,
    /// Exit after the first session ends.
    #[arg(long)]
    pub once: bool,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Robot controller endpoint (host:port or unix:/path).
    pub endpoint: String,
    /// Command text, e.g. START_UP.
    #[arg(required_unless_present = "query", conflicts_with = "query")]
    pub command: Option<String>,
    /// Send a GET_STATUS or GET_TRANS query instead of a command.
    #[arg(long)]
    pub query: Option<QueryArg>,
    /// Device name of the sent message.
    #[arg(long, default_value = "CMD_0001")]
    pub name: String,
    /// Stop after no reply arrives for this long (e.g. 1s, 500ms).
    #[arg(long, default_value = "1s")]
    pub quiet: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_endpoint(input: &str) -> CliResult<Endpoint> {
    input
        .parse()
        .map_err(|err| transport_error("invalid endpoint", err))
}

/// Parse `5s`, `150ms` or a bare number of seconds. Zero is allowed only
/// when `allow_zero` is set.
pub fn parse_duration(input: &str, allow_zero: bool) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 && !allow_zero {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(
            parse_duration("2s", false).expect("seconds"),
            Duration::from_secs(2)
        );
        assert_eq!(
            parse_duration("150ms", false).expect("millis"),
            Duration::from_millis(150)
        );
        assert_eq!(
            parse_duration("3", false).expect("bare"),
            Duration::from_secs(3)
        );
        assert_eq!(parse_duration("0", true).expect("zero"), Duration::ZERO);
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s", false).is_err());
        assert!(parse_duration("bad", true).is_err());
        assert!(parse_duration("", true).is_err());
        assert!(parse_duration("5m", true).is_err());
    }

    #[test]
    fn parse_endpoint_maps_errors_to_usage() {
        assert!(parse_endpoint("unix:/tmp/robot.sock").is_ok());
        let err = parse_endpoint("localhost:notaport").expect_err("bad port");
        assert_eq!(err.code, USAGE);
    }
}
