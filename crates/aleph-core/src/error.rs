use std::fmt;

use crate::node::NodeId;

/// Machine-readable error codes for callers that branch on failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidConstruction,
    UnknownNode,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidConstruction => "E1001",
            Self::UnknownNode => "E1002",
        }
    }

    /// Short human-facing summary for logs.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::InvalidConstruction => "Interior node has no parents",
            Self::UnknownNode => "Node handle not issued by this store",
        }
    }

    /// Optional remediation hint.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::InvalidConstruction => {
                Some("Pass at least one existing parent, or create a root node instead.")
            }
            Self::UnknownNode => Some("Create nodes through the same NodeStore the graph borrows."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors raised while constructing nodes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeError {
    /// An interior node was requested with no resolvable parent.
    #[error("cannot create an interior node without any parent nodes")]
    InvalidConstruction,

    /// A parent handle does not belong to the store creating the node.
    #[error("parent {0} is not a node of this store")]
    UnknownParent(NodeId),
}

impl NodeError {
    /// Return the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidConstruction => ErrorCode::InvalidConstruction,
            Self::UnknownParent(_) => ErrorCode::UnknownNode,
        }
    }
}
