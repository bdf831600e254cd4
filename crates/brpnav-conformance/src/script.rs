//! The navigation conformance script.
//!
//! Drives a robot controller through the workflow phases in order. Each
//! phase sends a command and then checks a fixed sequence of replies; the
//! first reply that does not match ends the run with the step/substep of
//! that expectation. Nothing is retried.

use std::fmt;
use std::time::{Duration, Instant};

use brpnav_frame::{Matrix4x4, MessageHeader, MessageType};
use brpnav_peer::{Connection, ConnectionConfig, ConnectionError, MessageStats};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{ScriptConfig, WorkflowScope};
use crate::matrix::{
    format_matrix, rotation_difference, translation_distance, validate_matrix, MatrixCheck,
};
use crate::protocol::{
    ack_name, Phase, SequenceCounter, CURRENT_POSITION, CURRENT_STATUS, TARGET,
};
use crate::timeout::WaitClass;
use crate::validate::{
    receive_status, receive_string, receive_transform, Expected, Mismatch, StatusExpectation,
};

/// Location of a failed expectation: workflow step and substep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ErrorPoint {
    pub step: u8,
    pub substep: u8,
}

impl ErrorPoint {
    pub fn new(step: u8, substep: u8) -> Self {
        Self { step, substep }
    }
}

impl fmt::Display for ErrorPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.step, self.substep)
    }
}

/// Broad class of a failure, for exit status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// A reply arrived but did not match.
    Validation,
    /// No reply arrived before the deadline.
    Timeout,
    /// The connection failed or a frame could not be decoded.
    Transport,
}

/// A failed run.
#[derive(Debug, thiserror::Error)]
#[error("step {point} ({phase}, {expectation}): {cause}")]
pub struct StepFailure {
    pub point: ErrorPoint,
    pub phase: Phase,
    /// The expectation that failed, e.g. `STATUS(CURRENT_STATUS)`.
    pub expectation: String,
    #[source]
    pub cause: Mismatch,
}

impl StepFailure {
    pub fn kind(&self) -> FailureKind {
        match &self.cause {
            Mismatch::Connection(ConnectionError::Timeout(_)) => FailureKind::Timeout,
            Mismatch::Connection(_) => FailureKind::Transport,
            _ => FailureKind::Validation,
        }
    }
}

/// What a successful run observed.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub phases: Vec<Phase>,
    pub position_updates: usize,
    pub calibration: Matrix4x4,
    pub target: Option<Matrix4x4>,
    pub final_position: Option<Matrix4x4>,
    pub messages: MessageStats,
    #[serde(with = "crate::config::duration_ms")]
    pub elapsed: Duration,
}

/// The ordered navigation workflow.
#[derive(Debug, Clone, Default)]
pub struct NavigationScript {
    config: ScriptConfig,
}

impl NavigationScript {
    pub fn new(config: ScriptConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScriptConfig {
        &self.config
    }

    /// Connection settings matching this script's default receive deadline.
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            default_timeout: Some(self.config.receive_timeout),
            ..ConnectionConfig::default()
        }
    }

    /// Run the workflow from START_UP over `conn`.
    pub fn run(&self, conn: &mut Connection) -> Result<RunSummary, StepFailure> {
        let started = Instant::now();
        let mut session = Session {
            conn,
            config: &self.config,
            counter: SequenceCounter::new(),
            send_error: None,
            phases: Vec::new(),
            position_updates: 0,
            calibration: self.config.calibration.resolve(),
            target: None,
            final_position: None,
        };

        if let Err(failure) = session.drive() {
            warn!(
                point = %failure.point,
                phase = %failure.phase,
                "conformance failure: {failure}"
            );
            return Err(failure);
        }

        if !self.config.settle_delay.is_zero() {
            debug!(delay = ?self.config.settle_delay, "settling before teardown");
            std::thread::sleep(self.config.settle_delay);
        }

        Ok(RunSummary {
            phases: session.phases,
            position_updates: session.position_updates,
            calibration: session.calibration,
            target: session.target,
            final_position: session.final_position,
            messages: session.conn.stats(),
            elapsed: started.elapsed(),
        })
    }
}

struct Session<'a> {
    conn: &'a mut Connection,
    config: &'a ScriptConfig,
    counter: SequenceCounter,
    send_error: Option<ConnectionError>,
    phases: Vec<Phase>,
    position_updates: usize,
    calibration: Matrix4x4,
    target: Option<Matrix4x4>,
    final_position: Option<Matrix4x4>,
}

type Step<T> = Result<T, StepFailure>;

impl Session<'_> {
    fn drive(&mut self) -> Step<()> {
        self.start_up()?;
        self.planning()?;
        self.calibration()?;
        if self.config.scope == WorkflowScope::Reference {
            return Ok(());
        }
        self.targeting()?;
        self.move_to_target()?;
        for phase in [Phase::Manual, Phase::Stop, Phase::Emergency] {
            self.simple_phase(phase)?;
        }
        Ok(())
    }

    fn start_up(&mut self) -> Step<()> {
        let phase = Phase::StartUp;
        self.begin(phase);
        self.command_and_ack(phase, WaitClass::Default)?;
        self.current_status(phase, 2, WaitClass::Default)?;
        self.terminal_status(phase, 3, WaitClass::Default)?;
        self.complete(phase);
        Ok(())
    }

    fn planning(&mut self) -> Step<()> {
        let phase = Phase::Planning;
        self.begin(phase);
        self.command_and_ack(phase, WaitClass::Default)?;
        self.current_status(phase, 2, WaitClass::Default)?;
        self.complete(phase);
        Ok(())
    }

    fn calibration(&mut self) -> Step<()> {
        let phase = Phase::Calibration;
        self.begin(phase);
        self.command_and_ack(phase, WaitClass::Default)?;
        self.current_status(phase, 2, WaitClass::Default)?;

        let matrix = self.calibration;
        let name = self.counter.next_calibration();
        debug!("calibration matrix:\n{}", format_matrix(&matrix));
        self.send_transform(&name, &matrix);
        self.expect_transform(
            phase,
            3,
            WaitClass::Default,
            Expected::transform(ack_name(&name)),
            &matrix,
            MatrixCheck::Exact,
        )?;

        if self.config.scope == WorkflowScope::Full {
            self.terminal_status(phase, 4, WaitClass::Long)?;
        }
        self.complete(phase);
        Ok(())
    }

    fn targeting(&mut self) -> Step<()> {
        let phase = Phase::Targeting;
        self.begin(phase);
        self.command_and_ack(phase, WaitClass::Medium)?;
        self.current_status(phase, 2, WaitClass::Long)?;
        self.terminal_status(phase, 3, WaitClass::Long)?;

        let target = self.config.target.resolve();
        let name = self.counter.next_target();
        debug!("target matrix:\n{}", format_matrix(&target));
        self.send_transform(&name, &target);
        self.expect_transform(
            phase,
            4,
            WaitClass::Medium,
            Expected::transform(ack_name(&name)),
            &target,
            MatrixCheck::Exact,
        )?;
        self.expect_status(
            phase,
            6,
            WaitClass::Long,
            Expected::status(TARGET),
            &StatusExpectation::ok(),
        )?;
        let accepted = self.expect_transform(
            phase,
            7,
            WaitClass::Medium,
            Expected::transform(TARGET),
            &target,
            MatrixCheck::Exact,
        )?;
        validate_matrix(&accepted)
            .map_err(|defect| self.failure(phase, 8, "rigid TARGET", defect.into()))?;

        self.target = Some(target);
        self.complete(phase);
        Ok(())
    }

    fn move_to_target(&mut self) -> Step<()> {
        let phase = Phase::MoveToTarget;
        self.begin(phase);
        self.command_and_ack(phase, WaitClass::Medium)?;
        self.current_status(phase, 2, WaitClass::Long)?;

        let position = Expected::transform(CURRENT_POSITION);
        let terminal = Expected::status(phase.command());
        let header = loop {
            let header = self.receive_header(phase, 4, &terminal, WaitClass::Long)?;
            if header.message_type != MessageType::Transform {
                break header;
            }
            let update = receive_transform(
                self.conn,
                &header,
                &position,
                &brpnav_frame::IDENTITY,
                MatrixCheck::Any,
            )
            .map_err(|cause| self.failure(phase, 3, &position, cause))?;
            validate_matrix(&update)
                .map_err(|defect| self.failure(phase, 3, &position, defect.into()))?;
            self.position_updates += 1;
            debug!(
                update = self.position_updates,
                "position:\n{}",
                format_matrix(&update)
            );
        };
        info!(updates = self.position_updates, "position stream ended");
        receive_status(self.conn, &header, &terminal, &StatusExpectation::ok())
            .map_err(|cause| self.failure(phase, 4, &terminal, cause))?;

        let target = self.target.unwrap_or(self.calibration);
        let final_position = self.expect_transform(
            phase,
            5,
            WaitClass::Medium,
            position.clone(),
            &target,
            MatrixCheck::Any,
        )?;
        check_reach(self.config, &final_position, &target)
            .map_err(|cause| self.failure(phase, 5, &position, cause))?;
        self.final_position = Some(final_position);
        self.complete(phase);
        Ok(())
    }

    fn simple_phase(&mut self, phase: Phase) -> Step<()> {
        self.begin(phase);
        self.command_and_ack(phase, WaitClass::Medium)?;
        self.current_status(phase, 2, WaitClass::Long)?;
        self.terminal_status(phase, 3, WaitClass::Long)?;
        self.complete(phase);
        Ok(())
    }

    fn begin(&self, phase: Phase) {
        info!(step = phase.step(), "===== Step {}: {} =====", phase.step(), phase);
    }

    fn complete(&mut self, phase: Phase) {
        self.phases.push(phase);
    }

    /// Send the phase command and expect its acknowledgment (substep 1).
    fn command_and_ack(&mut self, phase: Phase, wait: WaitClass) -> Step<()> {
        let name = self.counter.next_command();
        if let Err(err) = self.conn.send_string(&name, phase.command()) {
            self.send_error = Some(err);
        }
        let ack = Expected::string(ack_name(&name));
        let header = self.receive_header(phase, 1, &ack, wait)?;
        receive_string(self.conn, &header, &ack, phase.command())
            .map_err(|cause| self.failure(phase, 1, &ack, cause))?;
        Ok(())
    }

    /// CURRENT_STATUS confirming the transition, named after the phase.
    fn current_status(&mut self, phase: Phase, substep: u8, wait: WaitClass) -> Step<()> {
        self.expect_status(
            phase,
            substep,
            wait,
            Expected::status(CURRENT_STATUS),
            &StatusExpectation::ok().with_error_name(phase.command()),
        )
    }

    /// Status named after the phase, confirming its work completed.
    fn terminal_status(&mut self, phase: Phase, substep: u8, wait: WaitClass) -> Step<()> {
        self.expect_status(
            phase,
            substep,
            wait,
            Expected::status(phase.command()),
            &StatusExpectation::ok(),
        )
    }

    fn expect_status(
        &mut self,
        phase: Phase,
        substep: u8,
        wait: WaitClass,
        expected: Expected,
        status: &StatusExpectation,
    ) -> Step<()> {
        let header = self.receive_header(phase, substep, &expected, wait)?;
        receive_status(self.conn, &header, &expected, status)
            .map_err(|cause| self.failure(phase, substep, &expected, cause))?;
        Ok(())
    }

    fn expect_transform(
        &mut self,
        phase: Phase,
        substep: u8,
        wait: WaitClass,
        expected: Expected,
        matrix: &Matrix4x4,
        check: MatrixCheck,
    ) -> Step<Matrix4x4> {
        let header = self.receive_header(phase, substep, &expected, wait)?;
        receive_transform(self.conn, &header, &expected, matrix, check)
            .map_err(|cause| self.failure(phase, substep, &expected, cause))
    }

    fn send_transform(&mut self, name: &str, matrix: &Matrix4x4) {
        if let Err(err) = self.conn.send_transform(name, matrix) {
            self.send_error = Some(err);
        }
    }

    /// Next header under `wait`. A failed send before this receive is
    /// reported here.
    fn receive_header(
        &mut self,
        phase: Phase,
        substep: u8,
        expected: &Expected,
        wait: WaitClass,
    ) -> Step<MessageHeader> {
        if let Some(err) = self.send_error.take() {
            return Err(self.failure(phase, substep, expected, err.into()));
        }
        let deadline = self.config.timeouts.deadline(wait);
        self.conn
            .receive_header(deadline)
            .map_err(|err| self.failure(phase, substep, expected, err.into()))
    }

    fn failure(
        &self,
        phase: Phase,
        substep: u8,
        expected: impl fmt::Display,
        cause: Mismatch,
    ) -> StepFailure {
        StepFailure {
            point: ErrorPoint::new(phase.step(), substep),
            phase,
            expectation: expected.to_string(),
            cause,
        }
    }
}

/// The final position must be rigid, at the target point, and in the
/// target's orientation. NaN never passes.
fn check_reach(
    config: &ScriptConfig,
    position: &Matrix4x4,
    target: &Matrix4x4,
) -> Result<(), Mismatch> {
    validate_matrix(position)?;

    let distance = translation_distance(position, target);
    let tolerance = config.reach_tolerance;
    if distance.is_nan() || distance > tolerance {
        return Err(Mismatch::OutOfReach {
            distance,
            tolerance,
        });
    }

    let max_difference = rotation_difference(position, target);
    let tolerance = config.orientation_tolerance;
    if max_difference.is_nan() || max_difference > tolerance {
        return Err(Mismatch::WrongOrientation {
            max_difference,
            tolerance,
        });
    }
    Ok(())
}
