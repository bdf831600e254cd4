use brpnav_conformance::{
    CaseStatus, MatrixSource, NavigationScript, NormalOperation, Runner, ScriptConfig,
    WorkflowScope,
};
use brpnav_peer::connect_with_config;
use tracing::info;

use crate::cmd::{parse_duration, parse_endpoint, RunArgs, ScopeArg};
use crate::exit::{config_error, failure_code, CliResult, SUCCESS, TRANSPORT_ERROR};
use crate::output::{print_reports, OutputFormat};

pub fn run(args: RunArgs, format: OutputFormat) -> CliResult<i32> {
    let endpoint = parse_endpoint(&args.endpoint)?;
    let config = script_config(&args)?;
    let script = NavigationScript::new(config);
    let connection_config = script.connection_config();

    let mut runner = Runner::new(|| connect_with_config(&endpoint, connection_config.clone()));
    runner.add(NormalOperation::new(script));

    info!(%endpoint, cases = runner.len(), "starting conformance run");
    let reports = runner.run_all();
    print_reports(&reports, format);

    let code = reports
        .iter()
        .find(|report| !report.passed())
        .map_or(SUCCESS, |report| match (report.status, report.kind) {
            (CaseStatus::Failed, Some(kind)) => failure_code(kind),
            _ => TRANSPORT_ERROR,
        });
    Ok(code)
}

/// File configuration (if any) overridden by flags.
fn script_config(args: &RunArgs) -> CliResult<ScriptConfig> {
    let mut config = match &args.config {
        Some(path) => ScriptConfig::load(path).map_err(config_error)?,
        None => ScriptConfig::default(),
    };

    if let Some(scope) = args.scope {
        config.scope = match scope {
            ScopeArg::Full => WorkflowScope::Full,
            ScopeArg::Reference => WorkflowScope::Reference,
        };
    }
    if let Some(settle) = &args.settle {
        config.settle_delay = parse_duration(settle, true)?;
    }
    if let Some(timeout) = &args.receive_timeout {
        config.receive_timeout = parse_duration(timeout, false)?;
    }
    if let Some(short) = &args.short {
        config.timeouts.short = parse_duration(short, false)?;
    }
    if let Some(medium) = &args.medium {
        config.timeouts.medium = parse_duration(medium, false)?;
    }
    if let Some(long) = &args.long {
        config.timeouts.long = parse_duration(long, false)?;
    }
    if let Some(tolerance) = args.reach_tolerance {
        config.reach_tolerance = tolerance;
    }
    if let Some(tolerance) = args.orientation_tolerance {
        config.orientation_tolerance = tolerance;
    }
    if args.random_matrices {
        config.calibration = MatrixSource::Random { seed: args.seed };
        config.target = MatrixSource::Random {
            seed: args.seed.map(|seed| seed.wrapping_add(1)),
        };
    }

    config.validate().map_err(config_error)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::exit::{DATA_INVALID, USAGE};

    fn args() -> RunArgs {
        RunArgs {
            endpoint: "unix:/tmp/robot.sock".to_string(),
            config: None,
            scope: None,
            settle: None,
            receive_timeout: None,
            short: None,
            medium: None,
            long: None,
            reach_tolerance: None,
            orientation_tolerance: None,
            random_matrices: false,
            seed: None,
        }
    }

    #[test]
    fn flags_override_defaults() {
        let config = script_config(&RunArgs {
            scope: Some(ScopeArg::Reference),
            settle: Some("0".to_string()),
            long: Some("1500ms".to_string()),
            random_matrices: true,
            seed: Some(9),
            orientation_tolerance: Some(0.01),
            ..args()
        })
        .expect("flags should apply");
        assert_eq!(config.scope, WorkflowScope::Reference);
        assert_eq!(config.settle_delay, Duration::ZERO);
        assert_eq!(config.timeouts.long, Duration::from_millis(1500));
        assert_eq!(config.calibration, MatrixSource::Random { seed: Some(9) });
        assert_eq!(config.target, MatrixSource::Random { seed: Some(10) });
        assert_eq!(config.orientation_tolerance, 0.01);
    }

    #[test]
    fn invalid_overrides_are_rejected() {
        let zero = script_config(&RunArgs {
            receive_timeout: Some("0s".to_string()),
            ..args()
        })
        .expect_err("zero receive timeout");
        assert_eq!(zero.code, USAGE);

        let negative = script_config(&RunArgs {
            reach_tolerance: Some(-2.0),
            ..args()
        })
        .expect_err("negative tolerance");
        assert_eq!(negative.code, DATA_INVALID);
    }
}
