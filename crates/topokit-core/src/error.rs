//! Error types for topology validation.

use thiserror::Error;

/// Errors raised while validating or expanding a topology.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    /// Two groups expanded to the same node name.
    #[error("duplicate node name {name} (groups {first_group} and {second_group})")]
    DuplicateNodeName {
        /// The colliding name.
        name: String,
        /// Index of the group that produced the name first.
        first_group: usize,
        /// Index of the group that produced it again.
        second_group: usize,
    },

    /// A group is malformed.
    #[error("invalid node group {group}: {reason}")]
    InvalidGroup {
        /// Group name pattern.
        group: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl TopologyError {
    /// Creates an invalid group error.
    pub fn invalid_group(group: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidGroup {
            group: group.into(),
            reason: reason.into(),
        }
    }
}
