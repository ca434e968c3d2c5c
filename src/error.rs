use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Classified persistence failure.
///
/// Store adapters translate their backend errors into one of these variants
/// exactly once; services never inspect backend error strings.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("foreign key violated: {0}")]
    ForeignKeyViolation(String),
    #[error("write conflict: {0}")]
    Conflict(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for StoreError {
    fn from(err: rocksdb::Error) -> Self {
        use rocksdb::ErrorKind;
        match err.kind() {
            ErrorKind::Busy | ErrorKind::TimedOut | ErrorKind::TryAgain => {
                StoreError::Unavailable(err.to_string())
            }
            ErrorKind::Corruption => StoreError::Backend(format!("corruption: {}", err)),
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failure reported by the notification collaborator.
#[derive(Error, Debug, Clone)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Stable error kind carried by every [`FulfillmentError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ValidationFailed,
    NotFound,
    AuthorizationFailed,
    InvalidOperation,
    InsufficientStock,
    ServiceUnavailable,
    DbError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ValidationFailed => "validation_failed",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AuthorizationFailed => "authorization_failed",
            ErrorKind::InvalidOperation => "invalid_operation",
            ErrorKind::InsufficientStock => "insufficient_stock",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::DbError => "db_error",
        }
    }

    /// Status class a presentation layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::ValidationFailed => 400,
            ErrorKind::AuthorizationFailed => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::InvalidOperation | ErrorKind::InsufficientStock => 409,
            ErrorKind::ServiceUnavailable => 503,
            ErrorKind::DbError => 500,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum FulfillmentError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("Authorization failed: {0}")]
    Authorization(String),
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        requested: u32,
        available: u32,
    },
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("Database error during {operation} ({context}): {source}")]
    Db {
        operation: &'static str,
        context: String,
        #[source]
        source: StoreError,
    },
}

impl FulfillmentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FulfillmentError::Validation(_) => ErrorKind::ValidationFailed,
            FulfillmentError::NotFound { .. } => ErrorKind::NotFound,
            FulfillmentError::Authorization(_) => ErrorKind::AuthorizationFailed,
            FulfillmentError::InvalidOperation(_) => ErrorKind::InvalidOperation,
            FulfillmentError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            FulfillmentError::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
            FulfillmentError::Db { .. } => ErrorKind::DbError,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        FulfillmentError::Validation(message.into())
    }

    pub fn invalid_operation(message: impl Into<String>) -> Self {
        FulfillmentError::InvalidOperation(message.into())
    }

    pub fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        FulfillmentError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Builds a `map_err` adapter that tags a store failure with the
    /// operation name and the identifiers involved.
    ///
    /// ```ignore
    /// store.get_order(id).await.map_err(FulfillmentError::db("validate_payment", id))?;
    /// ```
    pub fn db(
        operation: &'static str,
        context: impl fmt::Display,
    ) -> impl FnOnce(StoreError) -> FulfillmentError {
        let context = context.to_string();
        move |source| FulfillmentError::Db {
            operation,
            context,
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, FulfillmentError>;

/// Shortage helper used by the inventory ledger.
pub(crate) fn insufficient(product_id: Uuid, requested: u32, available: u32) -> FulfillmentError {
    FulfillmentError::InsufficientStock {
        product_id,
        requested,
        available,
    }
}

/// Formats a decimal amount for error messages.
pub(crate) fn fmt_amount(amount: Decimal) -> String {
    amount.normalize().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_status_mapping() {
        let err = FulfillmentError::invalid_operation("bad transition");
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        assert_eq!(err.kind().status_code(), 409);

        let err = FulfillmentError::not_found("order", "abc");
        assert_eq!(err.kind().as_str(), "not_found");
        assert_eq!(err.to_string(), "order not found: abc");
    }

    #[test]
    fn test_db_error_carries_operation_and_context() {
        let map = FulfillmentError::db("create_order", "ORD-20260101-00001");
        let err = map(StoreError::Unavailable("timeout".to_string()));

        assert_eq!(err.kind(), ErrorKind::DbError);
        let rendered = err.to_string();
        assert!(rendered.contains("create_order"));
        assert!(rendered.contains("ORD-20260101-00001"));
        assert!(rendered.contains("timeout"));
    }

    #[test]
    fn test_serde_errors_classify_as_serialization() {
        let err = serde_json::from_str::<u32>("not json").unwrap_err();
        assert!(matches!(StoreError::from(err), StoreError::Serialization(_)));
    }
}
