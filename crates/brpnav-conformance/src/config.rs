//! Script configuration and JSON loading.

use std::path::{Path, PathBuf};
use std::time::Duration;

use brpnav_frame::{Matrix4x4, IDENTITY};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::matrix::{random_test_matrix, validate_matrix};
use crate::timeout::TimeoutPolicy;

/// Errors loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Which phases the script drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowScope {
    /// START_UP through EMERGENCY.
    #[default]
    Full,
    /// START_UP, PLANNING and CALIBRATION only.
    Reference,
}

/// Where a submitted calibration or target matrix comes from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MatrixSource {
    #[default]
    Identity,
    /// Random rigid transform; seeded for reproducible runs.
    Random {
        #[serde(default)]
        seed: Option<u64>,
    },
    Fixed {
        matrix: Matrix4x4,
    },
}

impl MatrixSource {
    /// Produce the matrix to submit.
    pub fn resolve(&self) -> Matrix4x4 {
        match self {
            MatrixSource::Identity => IDENTITY,
            MatrixSource::Random { seed: Some(seed) } => {
                random_test_matrix(&mut StdRng::seed_from_u64(*seed))
            }
            MatrixSource::Random { seed: None } => random_test_matrix(&mut rand::thread_rng()),
            MatrixSource::Fixed { matrix } => *matrix,
        }
    }
}

/// Navigation script settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScriptConfig {
    pub scope: WorkflowScope,
    /// Deadlines per wait class.
    pub timeouts: TimeoutPolicy,
    /// Deadline of receives in the default wait class.
    #[serde(with = "duration_ms")]
    pub receive_timeout: Duration,
    /// Pause after a successful run before the session is torn down.
    #[serde(with = "duration_ms")]
    pub settle_delay: Duration,
    /// Allowed distance (mm) between the final position and the target.
    pub reach_tolerance: f64,
    /// Allowed element-wise difference between the final rotation and the
    /// target's.
    pub orientation_tolerance: f64,
    pub calibration: MatrixSource,
    pub target: MatrixSource,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            scope: WorkflowScope::Full,
            timeouts: TimeoutPolicy::default(),
            receive_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_secs(5),
            reach_tolerance: 1.0,
            orientation_tolerance: 1.0e-3,
            calibration: MatrixSource::Identity,
            target: MatrixSource::Identity,
        }
    }
}

impl ScriptConfig {
    /// Load from a JSON file and validate. Missing fields take defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: Self = load_json(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, tolerance) in [
            ("reach_tolerance", self.reach_tolerance),
            ("orientation_tolerance", self.orientation_tolerance),
        ] {
            if !tolerance.is_finite() || tolerance < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be finite and non-negative, got {tolerance}"
                )));
            }
        }
        for (name, deadline) in [
            ("timeouts.short", self.timeouts.short),
            ("timeouts.medium", self.timeouts.medium),
            ("timeouts.long", self.timeouts.long),
            ("receive_timeout", self.receive_timeout),
        ] {
            if deadline.is_zero() {
                return Err(ConfigError::Invalid(format!("{name} must be non-zero")));
            }
        }
        for (name, source) in [("calibration", &self.calibration), ("target", &self.target)] {
            if let MatrixSource::Fixed { matrix } = source {
                validate_matrix(matrix)
                    .map_err(|defect| ConfigError::Invalid(format!("{name} matrix: {defect}")))?;
            }
        }
        Ok(())
    }
}

/// Read and deserialize a JSON file.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Serde adapter storing a `Duration` as integer milliseconds.
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
