mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "brpnav",
    version,
    about = "OpenIGTLink navigation conformance tester"
)]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    match cmd::run(cli.command, format) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_subcommand() {
        let cli = Cli::try_parse_from([
            "brpnav",
            "--format",
            "json",
            "run",
            "127.0.0.1:18944",
            "--scope",
            "reference",
            "--settle",
            "0",
        ])
        .expect("run args should parse");

        assert!(matches!(cli.command, Command::Run(_)));
        assert_eq!(cli.format, Some(OutputFormat::Json));
    }

    #[test]
    fn send_requires_command_or_query() {
        let err = Cli::try_parse_from(["brpnav", "send", "unix:/tmp/robot.sock"])
            .expect_err("missing command should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);

        let err = Cli::try_parse_from([
            "brpnav",
            "send",
            "unix:/tmp/robot.sock",
            "START_UP",
            "--query",
            "status",
        ])
        .expect_err("command and query conflict");
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn seed_requires_random_matrices() {
        let err = Cli::try_parse_from(["brpnav", "run", "localhost", "--seed", "4"])
            .expect_err("seed alone should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn parses_simulate_subcommand() {
        let cli = Cli::try_parse_from([
            "brpnav",
            "simulate",
            "unix:/tmp/robot.sock",
            "--once",
            "--fault",
            "silent",
        ])
        .expect("simulate args should parse");
        assert!(matches!(cli.command, Command::Simulate(ref args) if args.once));
    }
}
