//! Error types for Strata operations.

use std::fmt;

/// The primary error type for all Strata operations.
#[derive(Debug)]
pub enum Error {
    /// Query execution errors surfaced by the connection
    Query(QueryError),
    /// Type conversion errors
    Type(TypeError),
    /// Association configuration and eager-loading errors
    Association(AssociationError),
    /// Configuration errors (unknown tables, finders, invalid config documents)
    Config(ConfigError),
    /// Operation was cancelled via asupersync
    Cancelled,
    /// Serialization/deserialization errors
    Serde(String),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

/// An association was misconfigured or could not be loaded.
#[derive(Debug)]
pub struct AssociationError {
    pub kind: AssociationErrorKind,
    /// Name of the association involved, when known
    pub association: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationErrorKind {
    /// The alias is not associated with the table
    NotAssociated,
    /// Foreign key and binding key arity differ
    KeyMismatch,
    /// A key was required but the table defines no primary key
    MissingPrimaryKey,
    /// The source key column was not selected for an external load
    MissingForeignKey,
    /// A matching association with JOIN strategy declared nested containments
    UnsupportedContain,
    /// The strategy is not valid for the association kind
    InvalidStrategy,
    /// A required field is absent from an explicit select list
    MissingField,
    /// Junction data is missing from many-to-many results
    MissingJoinData,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AssociationError {
    pub fn new(kind: AssociationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            association: None,
            message: message.into(),
        }
    }

    /// Attach the association name.
    pub fn for_association(mut self, name: impl Into<String>) -> Self {
        self.association = Some(name.into());
        self
    }
}

impl Error {
    /// Shorthand for an association error.
    pub fn association(kind: AssociationErrorKind, message: impl Into<String>) -> Self {
        Error::Association(AssociationError::new(kind, message))
    }

    /// Attach the association name to an association error; other errors
    /// pass through unchanged.
    #[must_use]
    pub fn for_association(self, name: impl Into<String>) -> Self {
        match self {
            Error::Association(e) => Error::Association(e.for_association(name)),
            other => other,
        }
    }

    /// Shorthand for a configuration error without a source.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            message: message.into(),
            source: None,
        })
    }

    /// The association error kind, if this is an association error.
    pub fn association_kind(&self) -> Option<AssociationErrorKind> {
        match self {
            Error::Association(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Query(e) => write!(f, "Query error: {}", e.message),
            Error::Type(e) => {
                if let Some(col) = &e.column {
                    write!(
                        f,
                        "Type error in column '{}': expected {}, found {}",
                        col, e.expected, e.actual
                    )
                } else {
                    write!(f, "Type error: expected {}, found {}", e.expected, e.actual)
                }
            }
            Error::Association(e) => write!(f, "Association error: {}", e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Cancelled => write!(f, "Operation cancelled"),
            Error::Serde(msg) => write!(f, "Serialization error: {}", msg),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for AssociationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<AssociationError> for Error {
    fn from(err: AssociationError) -> Self {
        Error::Association(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

/// Result type alias for Strata operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn association_error_carries_kind_and_name() {
        let err = Error::Association(
            AssociationError::new(
                AssociationErrorKind::KeyMismatch,
                "Cannot match provided foreignKey for `Authors`",
            )
            .for_association("Authors"),
        );
        assert_eq!(
            err.association_kind(),
            Some(AssociationErrorKind::KeyMismatch)
        );
        assert_eq!(
            err.to_string(),
            "Association error: Cannot match provided foreignKey for `Authors`"
        );
        match err {
            Error::Association(e) => assert_eq!(e.association.as_deref(), Some("Authors")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn association_name_attaches_through_error() {
        let err = Error::association(AssociationErrorKind::MissingJoinData, "no join data")
            .for_association("Tags");
        match err {
            Error::Association(e) => {
                assert_eq!(e.association.as_deref(), Some("Tags"));
                assert_eq!(e.kind, AssociationErrorKind::MissingJoinData);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let config = Error::config("bad").for_association("Tags");
        assert!(config.association_kind().is_none());
    }

    #[test]
    fn query_error_exposes_sql() {
        let err = Error::Query(QueryError {
            kind: QueryErrorKind::Syntax,
            sql: Some("SELECT".to_string()),
            message: "syntax error".to_string(),
            source: None,
        });
        assert_eq!(err.sql(), Some("SELECT"));
        assert!(err.association_kind().is_none());
    }

    #[test]
    fn serde_errors_convert() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Serde(_)));
    }
}
