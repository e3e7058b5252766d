use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Reading an attribute that is neither a declared field nor a stored
    /// expando field. The message is identical for both kinds of miss.
    #[error("'{record_type}' has no attribute '{attribute}'")]
    AttributeNotFound {
        record_type: String,
        attribute: String,
    },

    #[error("Record of type '{0}' has no primary key after save")]
    IdentityUnavailable(String),

    #[error("Expando entry already exists: {owner_type}#{owner_id}.{key}")]
    DuplicateEntry {
        owner_type: String,
        owner_id: String,
        key: String,
    },

    #[error("Expando entry not found: {owner_type}#{owner_id}.{key}")]
    EntryNotFound {
        owner_type: String,
        owner_id: String,
        key: String,
    },

    #[error("Record type '{0}' is not registered")]
    RecordTypeNotFound(String),

    #[error("Record '{record_type}' with id {id} not found")]
    RecordNotFound { record_type: String, id: String },

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("I/0 error: {0}")]
    IoError(String),
}

impl DbError {
    pub fn attribute_not_found(record_type: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::AttributeNotFound {
            record_type: record_type.into(),
            attribute: attribute.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<std::io::Error> for DbError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}
