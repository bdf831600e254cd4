//! Navigation protocol conformance testing.
//!
//! [`NavigationScript`] plays the navigation software against a robot
//! controller and stops at the first reply that deviates from the
//! workflow, reporting the step and substep. [`RobotSimulator`] is a
//! conforming robot with optional injected faults, used to exercise the
//! script and as a stand-in peer during integration work.

pub mod case;
pub mod config;
pub mod matrix;
pub mod protocol;
pub mod robot;
pub mod script;
pub mod simulator;
pub mod timeout;
pub mod validate;

pub use case::{CaseReport, CaseStatus, NormalOperation, Runner, TestCase};
pub use config::{ConfigError, MatrixSource, ScriptConfig, WorkflowScope};
pub use matrix::MatrixCheck;
pub use protocol::{Phase, SequenceCounter};
pub use robot::RobotStatus;
pub use script::{ErrorPoint, FailureKind, NavigationScript, RunSummary, StepFailure};
pub use simulator::{Fault, RobotSimulator, SessionReport, SimulatorConfig};
pub use timeout::{TimeoutPolicy, WaitClass};
pub use validate::{Expected, Mismatch, StatusExpectation};
