//! Error types for compilation and evaluation.

use alloc::string::String;
use core::fmt;
use thiserror::Error;

/// Result type alias for zsql operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Identity of the plan fragment an operator or error originates from.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Origin {
    /// Id of the relational plan node, when the fragment is a plan node.
    pub node: Option<usize>,
    /// Short description of the fragment, e.g. `Join(INNER)`.
    pub description: String,
}

impl Origin {
    /// Creates an origin for a plan node.
    pub fn node(node: usize, description: impl Into<String>) -> Self {
        Self {
            node: Some(node),
            description: description.into(),
        }
    }

    /// Creates an origin that is not tied to a plan node (statements, columns).
    pub fn describe(description: impl Into<String>) -> Self {
        Self {
            node: None,
            description: description.into(),
        }
    }

    /// The origin of synthesized objects.
    pub fn empty() -> Self {
        Self::default()
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.node, self.description.is_empty()) {
            (Some(id), false) => write!(f, "#{} {}", id, self.description),
            (Some(id), true) => write!(f, "#{}", id),
            (None, false) => f.write_str(&self.description),
            (None, true) => f.write_str("<unknown>"),
        }
    }
}

/// Errors raised while compiling plans into circuits or evaluating circuits.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// A recognized construct that is not supported yet.
    #[error("Not yet implemented: {message} ({origin})")]
    Unimplemented { message: String, origin: Origin },
    /// An invariant the incoming plan was expected to satisfy does not hold.
    #[error("Internal compiler error: {message} ({origin})")]
    Internal { message: String, origin: Origin },
    /// A construct the front end should never hand over.
    #[error("Unsupported: {message} ({origin})")]
    Unsupported { message: String, origin: Origin },
    /// An operator was appended before one of its inputs.
    #[error("Circuit invariant violated: {message}")]
    InvariantViolation { message: String },
    /// A table or view name that is not known.
    #[error("Unknown relation: {name}")]
    UnknownRelation { name: String },
    /// A value did not have the expected type during evaluation.
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },
    /// Runtime failure of the reference evaluator.
    #[error("Evaluation error: {message}")]
    Evaluation { message: String },
}

impl Error {
    /// Creates an Unimplemented error.
    pub fn unimplemented(message: impl Into<String>, origin: Origin) -> Self {
        Error::Unimplemented {
            message: message.into(),
            origin,
        }
    }

    /// Creates an Internal error.
    pub fn internal(message: impl Into<String>, origin: Origin) -> Self {
        Error::Internal {
            message: message.into(),
            origin,
        }
    }

    /// Creates an Unsupported error.
    pub fn unsupported(message: impl Into<String>, origin: Origin) -> Self {
        Error::Unsupported {
            message: message.into(),
            origin,
        }
    }

    /// Creates an InvariantViolation error.
    pub fn invariant(message: impl Into<String>) -> Self {
        Error::InvariantViolation {
            message: message.into(),
        }
    }

    /// Creates an UnknownRelation error.
    pub fn unknown_relation(name: impl Into<String>) -> Self {
        Error::UnknownRelation { name: name.into() }
    }

    /// Creates a TypeMismatch error.
    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Error::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Creates an Evaluation error.
    pub fn evaluation(message: impl Into<String>) -> Self {
        Error::Evaluation {
            message: message.into(),
        }
    }

    /// Returns true for Unimplemented errors.
    pub fn is_unimplemented(&self) -> bool {
        matches!(self, Error::Unimplemented { .. })
    }

    /// Returns true for Internal errors.
    pub fn is_internal(&self) -> bool {
        matches!(self, Error::Internal { .. })
    }

    /// Returns the plan fragment the error was raised for, if any.
    pub fn origin(&self) -> Option<&Origin> {
        match self {
            Error::Unimplemented { origin, .. }
            | Error::Internal { origin, .. }
            | Error::Unsupported { origin, .. } => Some(origin),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_error_display() {
        let err = Error::unimplemented("ANTI join", Origin::node(3, "Join"));
        assert_eq!(err.to_string(), "Not yet implemented: ANTI join (#3 Join)");

        let err = Error::invariant("operator 4 references missing input 9");
        assert_eq!(
            err.to_string(),
            "Circuit invariant violated: operator 4 references missing input 9"
        );
    }

    #[test]
    fn test_error_classification() {
        let origin = Origin::describe("CREATE VIEW v");
        assert!(Error::unimplemented("x", origin.clone()).is_unimplemented());
        assert!(Error::internal("x", origin.clone()).is_internal());
        assert!(!Error::unsupported("x", origin.clone()).is_internal());
        assert_eq!(Error::internal("x", origin.clone()).origin(), Some(&origin));
        assert_eq!(Error::evaluation("x").origin(), None);
    }

    #[test]
    fn test_origin_display() {
        assert_eq!(Origin::empty().to_string(), "<unknown>");
        assert_eq!(Origin::node(1, "").to_string(), "#1");
    }
}
