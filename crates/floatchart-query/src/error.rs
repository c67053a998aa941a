use thiserror::Error;

use crate::intent::QueryIntent;

/// Outcomes that stop a query before SQL is produced.
/// Each one maps to a distinct response for the caller, not a generic failure.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueryError {
    /// A location phrase matched nothing in the gazetteer. Ask the user to clarify.
    #[error("could not resolve location \"{phrase}\"")]
    UnresolvedLocation { phrase: String },

    /// No rule matched and no provider produced a valid tag. Ask the user to rephrase.
    #[error("could not determine what the question asks for ({cause})")]
    AmbiguousIntent { cause: String },

    /// The intent was recognized but its minimum entity is missing.
    #[error("{intent} query needs {missing}")]
    InsufficientEntities { intent: QueryIntent, missing: String },
}

pub type Result<T> = std::result::Result<T, QueryError>;
