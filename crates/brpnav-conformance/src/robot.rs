use brpnav_frame::Matrix4x4;
use serde::Serialize;

use crate::protocol::Phase;

/// Responder-side session state.
///
/// Calibration and target are each set once per workflow, when the
/// corresponding exchange completes, and read by later phases.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RobotStatus {
    phase: Option<Phase>,
    calibration: Option<Matrix4x4>,
    target: Option<Matrix4x4>,
}

impl RobotStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Phase most recently entered.
    pub fn phase(&self) -> Option<Phase> {
        self.phase
    }

    pub fn enter(&mut self, phase: Phase) {
        self.phase = Some(phase);
    }

    pub fn calibration_flag(&self) -> bool {
        self.calibration.is_some()
    }

    pub fn calibration_matrix(&self) -> Option<&Matrix4x4> {
        self.calibration.as_ref()
    }

    pub fn set_calibration_matrix(&mut self, matrix: Matrix4x4) {
        self.calibration = Some(matrix);
    }

    pub fn target_flag(&self) -> bool {
        self.target.is_some()
    }

    pub fn target_matrix(&self) -> Option<&Matrix4x4> {
        self.target.as_ref()
    }

    pub fn set_target_matrix(&mut self, matrix: Matrix4x4) {
        self.target = Some(matrix);
    }
}

#[cfg(test)]
mod tests {
    use brpnav_frame::IDENTITY;

    use super::*;

    #[test]
    fn flags_follow_matrices() {
        let mut status = RobotStatus::new();
        assert!(!status.calibration_flag());
        assert!(!status.target_flag());
        assert!(status.calibration_matrix().is_none());

        status.set_calibration_matrix(IDENTITY);
        assert!(status.calibration_flag());
        assert_eq!(status.calibration_matrix(), Some(&IDENTITY));

        let mut target = IDENTITY;
        target[2][3] = 40.0;
        status.set_target_matrix(target);
        assert!(status.target_flag());
        assert_eq!(status.target_matrix(), Some(&target));
    }

    #[test]
    fn tracks_phase() {
        let mut status = RobotStatus::new();
        assert_eq!(status.phase(), None);
        status.enter(Phase::Planning);
        assert_eq!(status.phase(), Some(Phase::Planning));
    }
}
