use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Logical wait class of a receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitClass {
    /// No explicit deadline: the connection's own default applies.
    /// This is not a zero wait.
    Default,
    Short,
    Medium,
    Long,
}

impl fmt::Display for WaitClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WaitClass::Default => "default",
            WaitClass::Short => "short",
            WaitClass::Medium => "medium",
            WaitClass::Long => "long",
        };
        f.write_str(name)
    }
}

/// Maps wait classes to concrete receive deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutPolicy {
    #[serde(with = "crate::config::duration_ms")]
    pub short: Duration,
    #[serde(with = "crate::config::duration_ms")]
    pub medium: Duration,
    #[serde(with = "crate::config::duration_ms")]
    pub long: Duration,
}

impl TimeoutPolicy {
    /// Deadline for the next receive. `None` defers to the connection.
    pub fn deadline(&self, class: WaitClass) -> Option<Duration> {
        match class {
            WaitClass::Default => None,
            WaitClass::Short => Some(self.short),
            WaitClass::Medium => Some(self.medium),
            WaitClass::Long => Some(self.long),
        }
    }

    /// The same deadline for every explicit class.
    pub fn uniform(deadline: Duration) -> Self {
        Self {
            short: deadline,
            medium: deadline,
            long: deadline,
        }
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            short: Duration::from_secs(2),
            medium: Duration::from_secs(5),
            long: Duration::from_secs(10),
        }
    }
}
