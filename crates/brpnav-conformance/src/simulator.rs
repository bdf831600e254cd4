//! Reference robot controller.
//!
//! Answers every exchange the navigation script expects, keeps a
//! [`RobotStatus`] per session, and can inject faults so that the tester
//! itself can be exercised.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use brpnav_frame::{Body, Matrix4x4, MessageHeader, StatusBody, StatusCode, StringBody, IDENTITY};
use brpnav_peer::{Connection, ConnectionError, MessageStats};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::protocol::{
    ack_name, Phase, CALIBRATION_PREFIX, COMMAND_PREFIX, CURRENT_POSITION, CURRENT_STATUS, TARGET,
    TARGET_PREFIX,
};
use crate::robot::RobotStatus;

/// Translation error (mm) added to an echoed matrix under
/// [`Fault::CalibrationDrift`] and [`Fault::TargetDrift`].
pub const ECHO_DRIFT_MM: f32 = 0.5;

/// Distance (mm) the final position stops short of the target under
/// [`Fault::FallShort`].
pub const FALL_SHORT_MM: f32 = 2.0;

/// Name the streamed positions carry under [`Fault::MislabeledPosition`].
pub const MISLABELED_POSITION: &str = "POSITION";

/// Deliberate misbehavior of the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Fault {
    /// Report START_UP's CURRENT_STATUS as NOT_READY.
    WrongStartupCode,
    /// Read everything, answer nothing.
    Silent,
    /// Echo the calibration matrix with a translation error.
    CalibrationDrift,
    /// Close the connection on receipt of the first command.
    DisconnectAfterFirstCommand,
    /// Report the CALIBRATION status as NOT_READY.
    CalibrationNotCompleted,
    /// Refuse every target with a NOT_READY TARGET status.
    TargetRejected,
    /// Confirm the accepted target with a translation error.
    TargetDrift,
    /// Send positions under another name while moving.
    MislabeledPosition,
    /// Report MOVE_TO_TARGET as a hardware failure.
    MoveAborted,
    /// Stop the final position short of the target.
    FallShort,
    /// Reach the target point turned 90 degrees about z.
    WrongOrientation,
    /// Send NaN translations in every position while moving.
    CorruptPosition,
    /// Refuse MANUAL as an unknown instruction.
    RejectManual,
    /// Go silent once STOP arrives.
    StallOnStop,
    /// Report EMERGENCY as a hardware failure.
    EmergencyNotEngaged,
}

impl Fault {
    pub const ALL: [Fault; 15] = [
        Fault::WrongStartupCode,
        Fault::Silent,
        Fault::CalibrationDrift,
        Fault::DisconnectAfterFirstCommand,
        Fault::CalibrationNotCompleted,
        Fault::TargetRejected,
        Fault::TargetDrift,
        Fault::MislabeledPosition,
        Fault::MoveAborted,
        Fault::FallShort,
        Fault::WrongOrientation,
        Fault::CorruptPosition,
        Fault::RejectManual,
        Fault::StallOnStop,
        Fault::EmergencyNotEngaged,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Fault::WrongStartupCode => "wrong-startup-code",
            Fault::Silent => "silent",
            Fault::CalibrationDrift => "calibration-drift",
            Fault::DisconnectAfterFirstCommand => "disconnect-after-first-command",
            Fault::CalibrationNotCompleted => "calibration-not-completed",
            Fault::TargetRejected => "target-rejected",
            Fault::TargetDrift => "target-drift",
            Fault::MislabeledPosition => "mislabeled-position",
            Fault::MoveAborted => "move-aborted",
            Fault::FallShort => "fall-short",
            Fault::WrongOrientation => "wrong-orientation",
            Fault::CorruptPosition => "corrupt-position",
            Fault::RejectManual => "reject-manual",
            Fault::StallOnStop => "stall-on-stop",
            Fault::EmergencyNotEngaged => "emergency-not-engaged",
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Fault {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|fault| fault.as_str() == s)
            .ok_or_else(|| format!("unknown fault '{s}'"))
    }
}

/// Simulator behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulatorConfig {
    /// CURRENT_POSITION updates streamed while moving to the target.
    pub motion_updates: usize,
    /// Pause between streamed updates.
    #[serde(with = "crate::config::duration_ms")]
    pub motion_interval: Duration,
    pub fault: Option<Fault>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            motion_updates: 3,
            motion_interval: Duration::from_millis(100),
            fault: None,
        }
    }
}

/// What happened during one served session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub commands: usize,
    pub messages: MessageStats,
    pub robot: RobotStatus,
}

/// One robot session.
#[derive(Debug)]
pub struct RobotSimulator {
    config: SimulatorConfig,
    status: RobotStatus,
    position: Matrix4x4,
    commands: usize,
    stalled: bool,
}

enum Flow {
    Continue,
    Hangup,
}

impl RobotSimulator {
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            config,
            status: RobotStatus::new(),
            position: IDENTITY,
            commands: 0,
            stalled: false,
        }
    }

    pub fn status(&self) -> &RobotStatus {
        &self.status
    }

    /// Serve `conn` until the peer disconnects.
    pub fn serve(mut self, mut conn: Connection) -> Result<SessionReport, ConnectionError> {
        info!(connection = conn.id(), fault = ?self.config.fault, "serving navigation session");
        loop {
            let message = match conn.receive(None) {
                Ok(message) => message,
                Err(ConnectionError::Disconnected(_)) => break,
                Err(err) => return Err(err),
            };
            if self.stalled || self.config.fault == Some(Fault::Silent) {
                debug!(name = %message.header.device_name, "ignoring message");
                continue;
            }
            match self.handle(&mut conn, &message.header, message.body) {
                Ok(Flow::Continue) => {}
                // The tester may hang up mid-reply once it has seen a deviation.
                Err(ConnectionError::Disconnected(_)) => break,
                Err(err) => return Err(err),
                Ok(Flow::Hangup) => {
                    warn!("closing connection after first command");
                    let report = self.report(&conn);
                    conn.close()?;
                    return Ok(report);
                }
            }
        }
        info!(commands = self.commands, "navigation session ended");
        Ok(self.report(&conn))
    }

    fn report(&self, conn: &Connection) -> SessionReport {
        SessionReport {
            commands: self.commands,
            messages: conn.stats(),
            robot: self.status.clone(),
        }
    }

    fn faulty(&self, fault: Fault) -> bool {
        self.config.fault == Some(fault)
    }

    fn handle(
        &mut self,
        conn: &mut Connection,
        header: &MessageHeader,
        body: Body,
    ) -> Result<Flow, ConnectionError> {
        let name = header.device_name.as_str();
        match body {
            Body::String(StringBody { text, .. }) if name.starts_with(COMMAND_PREFIX) => {
                self.commands += 1;
                if self.config.fault == Some(Fault::DisconnectAfterFirstCommand) {
                    return Ok(Flow::Hangup);
                }
                self.command(conn, name, &text)?;
            }
            Body::Transform(matrix) if name.starts_with(CALIBRATION_PREFIX) => {
                self.calibration(conn, name, matrix)?;
            }
            Body::Transform(matrix) if name.starts_with(TARGET_PREFIX) => {
                self.target(conn, name, matrix)?;
            }
            Body::GetStatus => {
                let current = self.status.phase().map_or("", Phase::command);
                conn.send_status(
                    CURRENT_STATUS,
                    StatusBody::new(StatusCode::Ok).with_error_name(current),
                )?;
            }
            Body::GetTransform => conn.send_transform(CURRENT_POSITION, &self.position)?,
            other => {
                debug!(name, message_type = %other.message_type(), "ignoring unexpected message");
            }
        }
        Ok(Flow::Continue)
    }

    fn command(
        &mut self,
        conn: &mut Connection,
        name: &str,
        text: &str,
    ) -> Result<(), ConnectionError> {
        let phase = Phase::from_command(text);
        if phase == Some(Phase::Stop) && self.faulty(Fault::StallOnStop) {
            warn!("stalling on STOP");
            self.stalled = true;
            return Ok(());
        }
        conn.send_string(&ack_name(name), text)?;

        let Some(phase) = phase else {
            warn!(command = text, "unknown command");
            return conn.send_status(
                CURRENT_STATUS,
                StatusBody::new(StatusCode::UnknownInstruction).with_error_name(text),
            );
        };

        let ready = match phase {
            Phase::Targeting => self.status.calibration_flag(),
            Phase::MoveToTarget => self.status.target_flag(),
            _ => true,
        };
        if !ready {
            warn!(%phase, "precondition not met");
            return conn.send_status(
                CURRENT_STATUS,
                StatusBody::new(StatusCode::NotReady).with_error_name(text),
            );
        }

        let code = match (phase, self.config.fault) {
            (Phase::StartUp, Some(Fault::WrongStartupCode)) => StatusCode::NotReady,
            (Phase::Manual, Some(Fault::RejectManual)) => StatusCode::UnknownInstruction,
            _ => StatusCode::Ok,
        };
        self.status.enter(phase);
        info!(%phase, "entered phase");
        conn.send_status(CURRENT_STATUS, StatusBody::new(code).with_error_name(text))?;

        match phase {
            // Completion of these is reported once their transform arrives.
            Phase::Planning | Phase::Calibration => Ok(()),
            Phase::MoveToTarget => self.move_to_target(conn),
            Phase::Emergency if self.faulty(Fault::EmergencyNotEngaged) => {
                conn.send_status(text, StatusBody::new(StatusCode::HardwareFailure))
            }
            _ => conn.send_status(text, StatusBody::new(StatusCode::Ok)),
        }
    }

    fn calibration(
        &mut self,
        conn: &mut Connection,
        name: &str,
        matrix: Matrix4x4,
    ) -> Result<(), ConnectionError> {
        self.status.set_calibration_matrix(matrix);
        let mut echo = matrix;
        if self.faulty(Fault::CalibrationDrift) {
            echo[0][3] += ECHO_DRIFT_MM;
        }
        conn.send_transform(&ack_name(name), &echo)?;
        let code = if self.faulty(Fault::CalibrationNotCompleted) {
            StatusCode::NotReady
        } else {
            StatusCode::Ok
        };
        conn.send_status(Phase::Calibration.command(), StatusBody::new(code))
    }

    fn target(
        &mut self,
        conn: &mut Connection,
        name: &str,
        matrix: Matrix4x4,
    ) -> Result<(), ConnectionError> {
        conn.send_transform(&ack_name(name), &matrix)?;
        if !self.status.calibration_flag() || self.faulty(Fault::TargetRejected) {
            return conn.send_status(TARGET, StatusBody::new(StatusCode::NotReady));
        }
        self.status.set_target_matrix(matrix);
        conn.send_status(TARGET, StatusBody::new(StatusCode::Ok))?;
        let mut accepted = matrix;
        if self.faulty(Fault::TargetDrift) {
            accepted[1][3] += ECHO_DRIFT_MM;
        }
        conn.send_transform(TARGET, &accepted)
    }

    fn move_to_target(&mut self, conn: &mut Connection) -> Result<(), ConnectionError> {
        let target = self.status.target_matrix().copied().unwrap_or(IDENTITY);
        let start = self.position;
        let steps = self.config.motion_updates;
        for i in 1..=steps {
            let fraction = i as f32 / (steps + 1) as f32;
            let mut waypoint = target;
            for (row, from) in waypoint.iter_mut().zip(start.iter()).take(3) {
                row[3] = from[3] + (row[3] - from[3]) * fraction;
            }
            if !self.config.motion_interval.is_zero() {
                std::thread::sleep(self.config.motion_interval);
            }
            self.position = waypoint;
            self.send_position(conn)?;
        }

        let code = if self.faulty(Fault::MoveAborted) {
            StatusCode::HardwareFailure
        } else {
            StatusCode::Ok
        };
        conn.send_status(Phase::MoveToTarget.command(), StatusBody::new(code))?;

        self.position = target;
        if self.faulty(Fault::FallShort) {
            self.position[2][3] -= FALL_SHORT_MM;
        }
        if self.faulty(Fault::WrongOrientation) {
            self.position = turned_about_z(&self.position);
        }
        self.send_position(conn)
    }

    fn send_position(&self, conn: &mut Connection) -> Result<(), ConnectionError> {
        let name = if self.faulty(Fault::MislabeledPosition) {
            MISLABELED_POSITION
        } else {
            CURRENT_POSITION
        };
        let mut position = self.position;
        if self.faulty(Fault::CorruptPosition) {
            for row in position.iter_mut().take(3) {
                row[3] = f32::NAN;
            }
        }
        conn.send_transform(name, &position)
    }
}

/// `matrix` with its rotation turned 90 degrees about z.
fn turned_about_z(matrix: &Matrix4x4) -> Matrix4x4 {
    let mut turned = *matrix;
    for col in 0..3 {
        turned[0][col] = -matrix[1][col];
        turned[1][col] = matrix[0][col];
    }
    turned
}

#[cfg(test)]
mod tests {
    use std::thread;

    use brpnav_frame::MessageType;
    use brpnav_peer::ConnectionConfig;
    use brpnav_transport::IgtStream;

    use super::*;

    fn spawn(config: SimulatorConfig) -> (Connection, thread::JoinHandle<SessionReport>) {
        let (left, right) = IgtStream::pair().expect("pair");
        let robot = Connection::from_stream("robot", left, ConnectionConfig::responder())
            .expect("robot side");
        let tester = Connection::from_stream("tester", right, ConnectionConfig::default())
            .expect("tester side");
        let handle = thread::spawn(move || {
            RobotSimulator::new(config)
                .serve(robot)
                .expect("session should end cleanly")
        });
        (tester, handle)
    }

    fn quick() -> SimulatorConfig {
        SimulatorConfig {
            motion_interval: Duration::ZERO,
            ..SimulatorConfig::default()
        }
    }

    fn names(tester: &mut Connection, count: usize) -> Vec<String> {
        (0..count)
            .map(|_| tester.receive(None).expect("reply").header.device_name)
            .collect()
    }

    #[test]
    fn start_up_replies() {
        let (mut tester, handle) = spawn(quick());
        tester.send_string("CMD_0001", "START_UP").expect("send");

        let ack = tester.receive(None).expect("ack");
        assert_eq!(ack.header.device_name, "ACK_0001");
        assert_eq!(ack.body, Body::String(StringBody::new("START_UP")));

        let current = tester.receive(None).expect("current status");
        assert_eq!(
            current.body,
            Body::Status(StatusBody::new(StatusCode::Ok).with_error_name("START_UP"))
        );
        assert_eq!(names(&mut tester, 1), ["START_UP"]);

        drop(tester);
        let report = handle.join().expect("simulator thread");
        assert_eq!(report.commands, 1);
        assert_eq!(report.robot.phase(), Some(Phase::StartUp));
    }

    #[test]
    fn targeting_requires_calibration() {
        let (mut tester, handle) = spawn(quick());
        tester.send_string("CMD_0001", "TARGETING").expect("send");
        assert_eq!(names(&mut tester, 1), ["ACK_0001"]);
        let status = tester.receive(None).expect("status");
        assert!(matches!(
            status.body,
            Body::Status(ref s) if s.code == StatusCode::NotReady.as_u16()
        ));
        drop(tester);
        handle.join().expect("simulator thread");
    }

    #[test]
    fn move_streams_interpolated_positions() {
        let (mut tester, handle) = spawn(quick());
        tester.send_transform("CLB_0001", &IDENTITY).expect("send");
        assert_eq!(names(&mut tester, 2), ["ACK_0001", "CALIBRATION"]);

        let mut target = IDENTITY;
        target[2][3] = 40.0;
        tester.send_transform("TGT_0002", &target).expect("send");
        assert_eq!(names(&mut tester, 3), ["ACK_0002", TARGET, TARGET]);

        tester.send_string("CMD_0003", "MOVE_TO_TARGET").expect("send");
        assert_eq!(names(&mut tester, 2), ["ACK_0003", CURRENT_STATUS]);
        let mut depths = Vec::new();
        for _ in 0..3 {
            let update = tester.receive(None).expect("update");
            assert_eq!(update.header.device_name, CURRENT_POSITION);
            let Body::Transform(m) = update.body else {
                panic!("expected transform");
            };
            depths.push(m[2][3]);
        }
        assert_eq!(depths, [10.0, 20.0, 30.0]);
        assert_eq!(names(&mut tester, 1), ["MOVE_TO_TARGET"]);
        let last = tester.receive(None).expect("final position");
        assert_eq!(last.body, Body::Transform(target));

        drop(tester);
        handle.join().expect("simulator thread");
    }

    #[test]
    fn answers_queries() {
        let (mut tester, handle) = spawn(quick());
        tester.send_query("STATUS", brpnav_peer::Query::Status).expect("send");
        let status = tester.receive(None).expect("status reply");
        assert_eq!(status.header.device_name, CURRENT_STATUS);

        tester.send_query("POSITION", brpnav_peer::Query::Transform).expect("send");
        let position = tester.receive(None).expect("position reply");
        assert_eq!(position.header.message_type, MessageType::Transform);
        assert_eq!(position.body, Body::Transform(IDENTITY));

        drop(tester);
        handle.join().expect("simulator thread");
    }

    #[test]
    fn unknown_command_is_reported() {
        let (mut tester, handle) = spawn(quick());
        tester.send_string("CMD_0001", "RETRACT_NEEDLE").expect("send");
        assert_eq!(names(&mut tester, 1), ["ACK_0001"]);
        let status = tester.receive(None).expect("status");
        assert!(matches!(
            status.body,
            Body::Status(ref s) if s.code == StatusCode::UnknownInstruction.as_u16()
        ));
        drop(tester);
        handle.join().expect("simulator thread");
    }

    #[test]
    fn stall_on_stop_ignores_later_messages() {
        let (mut tester, handle) = spawn(SimulatorConfig {
            fault: Some(Fault::StallOnStop),
            ..quick()
        });
        tester.send_string("CMD_0001", "STOP").expect("send");
        tester.send_query("STATUS", brpnav_peer::Query::Status).expect("send");
        let err = tester
            .receive(Some(Duration::from_millis(100)))
            .expect_err("stalled robot should stay silent");
        assert!(err.is_timeout());
        drop(tester);
        let report = handle.join().expect("simulator thread");
        assert_eq!(report.commands, 1);
    }

    #[test]
    fn wrong_orientation_keeps_a_rigid_transform() {
        let mut target = crate::matrix::quaternion_to_matrix([0.1, 0.2, 0.3, 0.9]);
        target[0][3] = 5.0;
        let turned = turned_about_z(&target);
        assert!(crate::matrix::is_well_formed(&turned));
        assert_eq!(turned[0][3], 5.0);
        assert!(crate::matrix::rotation_difference(&turned, &target) > 0.1);
    }

    #[test]
    fn fault_names_parse() {
        for fault in Fault::ALL {
            assert_eq!(fault.as_str().parse::<Fault>(), Ok(fault));
        }
        assert!("loud".parse::<Fault>().is_err());
        let config: SimulatorConfig =
            serde_json::from_str(r#"{"fault": "calibration-drift", "motion_updates": 0}"#)
                .expect("config should parse");
        assert_eq!(config.fault, Some(Fault::CalibrationDrift));
        assert_eq!(config.motion_interval, Duration::from_millis(100));
    }
}
