//! Protocol vocabulary: workflow phases and message names.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Status message confirming a requested phase transition.
pub const CURRENT_STATUS: &str = "CURRENT_STATUS";
/// Transform stream reporting the robot's position.
pub const CURRENT_POSITION: &str = "CURRENT_POSITION";
/// Status and transform announcing the accepted target.
pub const TARGET: &str = "TARGET";

/// Prefix of outbound commands.
pub const COMMAND_PREFIX: &str = "CMD_";
/// Prefix of acknowledgments.
pub const ACK_PREFIX: &str = "ACK_";
/// Prefix of calibration transform submissions.
pub const CALIBRATION_PREFIX: &str = "CLB_";
/// Prefix of target transform submissions.
pub const TARGET_PREFIX: &str = "TGT_";

/// Workflow phase of a navigation session.
///
/// The discriminant is the step number used in failure reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    StartUp = 1,
    Planning = 2,
    Calibration = 3,
    Targeting = 4,
    MoveToTarget = 5,
    Manual = 6,
    Stop = 9,
    Emergency = 10,
}

impl Phase {
    /// Every phase, in workflow order.
    pub const ALL: [Phase; 8] = [
        Phase::StartUp,
        Phase::Planning,
        Phase::Calibration,
        Phase::Targeting,
        Phase::MoveToTarget,
        Phase::Manual,
        Phase::Stop,
        Phase::Emergency,
    ];

    pub fn step(self) -> u8 {
        self as u8
    }

    /// Command text, which is also the name of the phase's terminal status.
    pub fn command(self) -> &'static str {
        match self {
            Phase::StartUp => "START_UP",
            Phase::Planning => "PLANNING",
            Phase::Calibration => "CALIBRATION",
            Phase::Targeting => "TARGETING",
            Phase::MoveToTarget => "MOVE_TO_TARGET",
            Phase::Manual => "MANUAL",
            Phase::Stop => "STOP",
            Phase::Emergency => "EMERGENCY",
        }
    }

    /// Look up a phase by its command text.
    pub fn from_command(command: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|phase| phase.command() == command)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_command(&s.to_ascii_uppercase().replace('-', "_"))
            .ok_or_else(|| format!("unknown workflow phase '{s}'"))
    }
}

/// Per-session message sequence numbers.
///
/// Commands and transform submissions draw from one counter, so a session
/// reads `CMD_0001`, `CMD_0002`, `CMD_0003`, `CLB_0004`, ... The number is
/// for traceability only; replies echo it with the `ACK_` prefix.
#[derive(Debug, Clone, Default)]
pub struct SequenceCounter {
    last: u32,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance and return the next sequence number.
    pub fn next_number(&mut self) -> u32 {
        self.last += 1;
        self.last
    }

    /// Next command name, e.g. `CMD_0001`.
    pub fn next_command(&mut self) -> String {
        sequenced(COMMAND_PREFIX, self.next_number())
    }

    /// Next calibration submission name, e.g. `CLB_0004`.
    pub fn next_calibration(&mut self) -> String {
        sequenced(CALIBRATION_PREFIX, self.next_number())
    }

    /// Next target submission name, e.g. `TGT_0006`.
    pub fn next_target(&mut self) -> String {
        sequenced(TARGET_PREFIX, self.next_number())
    }

    /// Last number handed out.
    pub fn last(&self) -> u32 {
        self.last
    }
}

fn sequenced(prefix: &str, number: u32) -> String {
    format!("{prefix}{number:04}")
}

/// Acknowledgment name answering `name`: the prefix is replaced with `ACK_`.
///
/// Names without a recognizable `XXX_` prefix get `ACK_` prepended.
pub fn ack_name(name: &str) -> String {
    match name.split_once('_') {
        Some((_, suffix)) if !suffix.is_empty() => format!("{ACK_PREFIX}{suffix}"),
        _ => format!("{ACK_PREFIX}{name}"),
    }
}
