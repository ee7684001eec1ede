//! Stage boundaries interceptors attach to.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A stage boundary of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterceptorStage {
    /// Once, before the first operation.
    FirstOperation,
    /// Before every operation.
    PreOperation,
    /// After every operation.
    PostOperation,
    /// Once, after the last operation, only if the run is not faulty.
    LastOperation,
    /// Once, the first time an operation leaves the context locked.
    Locked,
    /// Once, the first time an operation leaves the context faulty.
    Faulty,
}

impl InterceptorStage {
    /// All stages, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::FirstOperation,
        Self::PreOperation,
        Self::PostOperation,
        Self::LastOperation,
        Self::Locked,
        Self::Faulty,
    ];

    /// Returns true for stages consumed once per run.
    #[must_use]
    pub fn is_one_shot(&self) -> bool {
        matches!(self, Self::Locked | Self::Faulty)
    }

    /// Returns true for stages whose interceptors run regardless of the
    /// lock and fault gates.
    #[must_use]
    pub fn bypasses_gates(&self) -> bool {
        self.is_one_shot()
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for InterceptorStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FirstOperation => write!(f, "first_operation"),
            Self::PreOperation => write!(f, "pre_operation"),
            Self::PostOperation => write!(f, "post_operation"),
            Self::LastOperation => write!(f, "last_operation"),
            Self::Locked => write!(f, "locked"),
            Self::Faulty => write!(f, "faulty"),
        }
    }
}
